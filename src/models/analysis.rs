use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{Direction, TranscriptQuality};

/// Overall compliance verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Compliance {
    Pass,
    Fail,
    Review,
}

impl Compliance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Compliance::Pass => "Pass",
            Compliance::Fail => "Fail",
            Compliance::Review => "Review",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "Pass" => Some(Compliance::Pass),
            "Fail" => Some(Compliance::Fail),
            "Review" => Some(Compliance::Review),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Sentiment {
    #[serde(alias = "positive")]
    Positive,
    #[serde(alias = "neutral")]
    Neutral,
    #[serde(alias = "negative")]
    Negative,
}

impl Sentiment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sentiment::Positive => "Positive",
            Sentiment::Neutral => "Neutral",
            Sentiment::Negative => "Negative",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "positive" => Some(Sentiment::Positive),
            "neutral" => Some(Sentiment::Neutral),
            "negative" => Some(Sentiment::Negative),
            _ => None,
        }
    }
}

/// A stored analysis row. One per call, overwritten on re-analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Analysis {
    pub call_id: String,
    /// Rubric variant that produced this result
    pub direction: Direction,
    /// Always within 0..=100
    pub score: u8,
    pub summary: String,
    pub compliance: Compliance,
    pub sentiment: Sentiment,
    pub notes: String,
    /// `routing`, `rubric` and `model` entries
    pub metadata: Value,
    pub analyzed_at: DateTime<Utc>,
}

impl Analysis {
    /// Zero-score result for a transcript that cannot be scored
    pub fn placeholder(
        call_id: &str,
        direction: Direction,
        quality: TranscriptQuality,
        metadata: Value,
        now: DateTime<Utc>,
    ) -> Self {
        let (summary, notes) = match quality {
            TranscriptQuality::Broken => (
                "Transcript data is malformed; the call could not be analyzed.",
                "Every dialogue item was missing its speaker or text. Review the recording manually.",
            ),
            _ => (
                "Transcript is empty; the call could not be analyzed.",
                "The provider returned no usable dialogue for this call.",
            ),
        };
        Self {
            call_id: call_id.to_string(),
            direction,
            score: 0,
            summary: summary.to_string(),
            compliance: Compliance::Review,
            sentiment: Sentiment::Neutral,
            notes: notes.to_string(),
            metadata,
            analyzed_at: now,
        }
    }
}
