use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use super::prompts::RubricVariant;
use crate::models::{Compliance, Sentiment};

/// Structural problems with a scoring response. Never retried.
#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("response is not a JSON object")]
    NotAnObject,
    #[error("response has no score")]
    MissingScore,
    #[error("score is not a number: {0}")]
    NonNumericScore(String),
    #[error("score {0} is outside 0-100")]
    ScoreOutOfRange(f64),
    #[error("response does not match the rubric schema: {0}")]
    Schema(String),
}

/// One rubric line item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RubricItem {
    pub score: f64,
    pub compliant: bool,
    #[serde(default)]
    pub notes: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundAssessment {
    pub summary: String,
    pub sentiment: Sentiment,
    #[serde(default)]
    pub notes: String,
    pub greeting: RubricItem,
    pub needs_assessment: RubricItem,
    pub problem_solving: RubricItem,
    pub scheduling: RubricItem,
    pub empathy: RubricItem,
    #[serde(default)]
    pub best_practices: Vec<String>,
    #[serde(default)]
    pub improvements: Vec<String>,
}

impl InboundAssessment {
    fn checks(&self) -> [&RubricItem; 5] {
        [
            &self.greeting,
            &self.needs_assessment,
            &self.problem_solving,
            &self.scheduling,
            &self.empathy,
        ]
    }

    /// Pass if all checks are compliant, Fail if fewer than half are, Review otherwise
    pub fn compliance(&self) -> Compliance {
        let checks = self.checks();
        let compliant = checks.iter().filter(|c| c.compliant).count();
        if compliant == checks.len() {
            Compliance::Pass
        } else if compliant * 2 < checks.len() {
            Compliance::Fail
        } else {
            Compliance::Review
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Objection {
    pub objection: String,
    #[serde(default)]
    pub response: String,
    pub handled: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundAssessment {
    pub summary: String,
    pub sentiment: Sentiment,
    #[serde(default)]
    pub notes: String,
    pub script_adherence: RubricItem,
    pub objection_handling: RubricItem,
    #[serde(default)]
    pub objections: Vec<Objection>,
    #[serde(default)]
    pub breakdown_point: Option<String>,
    pub outcome: String,
}

impl OutboundAssessment {
    /// Booked outcomes pass; a flat refusal or a call lost at the introduction fails
    pub fn compliance(&self) -> Compliance {
        let outcome = self.outcome.trim();
        let broke_at_intro = self
            .breakdown_point
            .as_deref()
            .is_some_and(|b| b.trim().eq_ignore_ascii_case("introduction"));

        if outcome.eq_ignore_ascii_case("appointment")
            || outcome.eq_ignore_ascii_case("callback scheduled")
        {
            Compliance::Pass
        } else if outcome.eq_ignore_ascii_case("not interested") || broke_at_intro {
            Compliance::Fail
        } else {
            Compliance::Review
        }
    }
}

/// Direction-specific structured result
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "variant", rename_all = "lowercase")]
pub enum Assessment {
    Inbound(InboundAssessment),
    Outbound(OutboundAssessment),
}

impl Assessment {
    pub fn compliance(&self) -> Compliance {
        match self {
            Assessment::Inbound(a) => a.compliance(),
            Assessment::Outbound(a) => a.compliance(),
        }
    }

    pub fn summary(&self) -> &str {
        match self {
            Assessment::Inbound(a) => &a.summary,
            Assessment::Outbound(a) => &a.summary,
        }
    }

    pub fn sentiment(&self) -> Sentiment {
        match self {
            Assessment::Inbound(a) => a.sentiment,
            Assessment::Outbound(a) => a.sentiment,
        }
    }

    pub fn notes(&self) -> &str {
        match self {
            Assessment::Inbound(a) => &a.notes,
            Assessment::Outbound(a) => &a.notes,
        }
    }

    pub fn to_metadata(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// A response that passed validation
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedAssessment {
    /// Integer score within 0..=100
    pub score: u8,
    pub assessment: Assessment,
}

/// The score must be a JSON number within [0, 100]; fractional scores are rounded
pub fn validate_score(response: &Value) -> Result<u8, ValidationError> {
    let object = response.as_object().ok_or(ValidationError::NotAnObject)?;
    let score = object.get("score").ok_or(ValidationError::MissingScore)?;
    let value = score
        .as_f64()
        .ok_or_else(|| ValidationError::NonNumericScore(score.to_string()))?;

    if !value.is_finite() || !(0.0..=100.0).contains(&value) {
        return Err(ValidationError::ScoreOutOfRange(value));
    }
    Ok(value.round() as u8)
}

/// Validate a raw scoring response against the rubric variant
pub fn parse_assessment(
    variant: RubricVariant,
    response: Value,
) -> Result<ValidatedAssessment, ValidationError> {
    let score = validate_score(&response)?;
    let assessment = match variant {
        RubricVariant::Inbound => serde_json::from_value(response).map(Assessment::Inbound),
        RubricVariant::Outbound => serde_json::from_value(response).map(Assessment::Outbound),
    }
    .map_err(|e| ValidationError::Schema(e.to_string()))?;

    Ok(ValidatedAssessment { score, assessment })
}
