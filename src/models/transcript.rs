use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One canonical utterance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    /// Start offset in seconds
    pub start: f64,
    /// End offset in seconds
    pub end: f64,
    pub speaker: String,
    pub text: String,
}

/// Content classification of a transcript.
///
/// `Empty` means the provider sent nothing meaningful; `Broken` means it sent
/// structure with required fields missing everywhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TranscriptQuality {
    Valid,
    Empty,
    Broken,
}

impl TranscriptQuality {
    pub fn as_str(&self) -> &'static str {
        match self {
            TranscriptQuality::Valid => "valid",
            TranscriptQuality::Empty => "empty",
            TranscriptQuality::Broken => "broken",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "valid" => Some(TranscriptQuality::Valid),
            "empty" => Some(TranscriptQuality::Empty),
            "broken" => Some(TranscriptQuality::Broken),
            _ => None,
        }
    }

    pub fn is_analyzable(&self) -> bool {
        matches!(self, TranscriptQuality::Valid)
    }
}

/// A stored transcript row, overwritten wholesale on every re-fetch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transcript {
    pub call_id: String,
    /// `speaker: text` lines joined with newlines
    pub text: String,
    pub segments: Vec<Segment>,
    pub duration_secs: Option<u32>,
    pub status: Option<String>,
    pub quality: TranscriptQuality,
    pub updated_at: DateTime<Utc>,
}

impl Transcript {
    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }
}
