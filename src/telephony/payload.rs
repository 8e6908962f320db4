use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::models::{CallUpdate, Direction, IngestSource, normalize_number};

/// Page envelope returned by `GET /calls`
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallListResponse {
    /// Items that do not decode as a call are dropped instead of failing the page
    #[serde(default, deserialize_with = "lenient::calls")]
    pub data: Vec<ProviderCall>,
    #[serde(default)]
    pub next_page_token: Option<String>,
    #[serde(default)]
    pub total_items: Option<u64>,
}

/// Envelope returned by `GET /call-transcripts/{id}`
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TranscriptResponse {
    pub data: TranscriptPayload,
}

/// A call as the provider describes it.
///
/// Every field except the id is optional and loosely typed so a partial or
/// slightly malformed object still yields a usable update. A null or
/// wrong-typed field reads as absent.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderCall {
    pub id: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub direction: Option<String>,
    #[serde(default, deserialize_with = "lenient::string")]
    pub status: Option<String>,
    #[serde(default)]
    pub duration: Option<Value>,
    #[serde(default, deserialize_with = "lenient::string")]
    pub created_at: Option<String>,
    #[serde(default, deserialize_with = "lenient::string")]
    pub answered_at: Option<String>,
    #[serde(default, deserialize_with = "lenient::string")]
    pub completed_at: Option<String>,
    #[serde(default, deserialize_with = "lenient::string")]
    pub phone_number_id: Option<String>,
    #[serde(default, deserialize_with = "lenient::string")]
    pub user_id: Option<String>,
    #[serde(default, deserialize_with = "lenient::strings")]
    pub participants: Vec<String>,
    #[serde(default, deserialize_with = "lenient::string")]
    pub from: Option<String>,
    #[serde(default, deserialize_with = "lenient::string")]
    pub to: Option<String>,
    /// Present on some webhook deliveries that embed the conversation
    #[serde(default, deserialize_with = "lenient::dialogue")]
    pub dialogue: Option<Vec<DialogueItem>>,
}

impl ProviderCall {
    pub fn is_completed(&self) -> bool {
        self.status.as_deref() == Some("completed")
    }

    pub fn parsed_direction(&self) -> Option<Direction> {
        self.direction.as_deref().and_then(Direction::parse)
    }

    /// Convert into the canonical partial-call representation
    pub fn to_update(&self, source: IngestSource) -> CallUpdate {
        let direction = self.parsed_direction();
        let external = self.participants.first().and_then(|p| normalize_number(p));

        // The external participant is the caller on inbound calls and the callee on outbound.
        let from_number = self
            .from
            .as_deref()
            .and_then(normalize_number)
            .or_else(|| match direction {
                Some(Direction::Inbound) => external.clone(),
                _ => None,
            });
        let to_number = self
            .to
            .as_deref()
            .and_then(normalize_number)
            .or_else(|| match direction {
                Some(Direction::Outbound) => external.clone(),
                _ => None,
            });

        let mut metadata = Map::new();
        if !self.participants.is_empty() {
            metadata.insert(
                "participants".to_string(),
                Value::Array(
                    self.participants
                        .iter()
                        .map(|p| Value::String(p.clone()))
                        .collect(),
                ),
            );
        }

        CallUpdate {
            id: self.id.clone(),
            direction,
            from_number,
            to_number,
            duration_secs: self.duration.as_ref().and_then(duration_secs),
            created_at: self.created_at.as_deref().and_then(parse_timestamp),
            answered_at: self.answered_at.as_deref().and_then(parse_timestamp),
            completed_at: self.completed_at.as_deref().and_then(parse_timestamp),
            status: self.status.clone(),
            phone_number_id: self.phone_number_id.clone(),
            user_id: self.user_id.clone(),
            metadata,
            source,
        }
    }
}

/// Transcript object, shared by the REST endpoint and the transcript webhook
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptPayload {
    #[serde(default, alias = "call_id", deserialize_with = "lenient::string")]
    pub call_id: Option<String>,
    #[serde(default, deserialize_with = "lenient::dialogue")]
    pub dialogue: Option<Vec<DialogueItem>>,
    #[serde(default)]
    pub duration: Option<Value>,
    #[serde(default, deserialize_with = "lenient::string")]
    pub status: Option<String>,
    #[serde(default, deserialize_with = "lenient::string")]
    pub created_at: Option<String>,
}

impl TranscriptPayload {
    pub fn duration_secs(&self) -> Option<u32> {
        self.duration.as_ref().and_then(duration_secs)
    }
}

/// One raw utterance. The REST API and webhooks disagree on field names, so
/// both conventions are accepted.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DialogueItem {
    #[serde(default, alias = "text", deserialize_with = "lenient::string")]
    pub content: Option<String>,
    /// External party phone number
    #[serde(default, alias = "phoneNumber", deserialize_with = "lenient::string")]
    pub identifier: Option<String>,
    /// Internal user id, preferred over `identifier` as the speaker
    #[serde(default, alias = "user_id", deserialize_with = "lenient::string")]
    pub user_id: Option<String>,
    #[serde(default, alias = "startTime", deserialize_with = "lenient::number")]
    pub start: Option<f64>,
    #[serde(default, alias = "endTime", deserialize_with = "lenient::number")]
    pub end: Option<f64>,
}

/// Field decoders that turn nulls and wrong types into "absent"
mod lenient {
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    use super::{DialogueItem, ProviderCall};

    pub fn string<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
        Ok(match Value::deserialize(d)? {
            Value::String(s) => Some(s),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
    }

    pub fn strings<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<String>, D::Error> {
        Ok(match Value::deserialize(d)? {
            Value::Array(items) => items
                .into_iter()
                .filter_map(|v| match v {
                    Value::String(s) => Some(s),
                    _ => None,
                })
                .collect(),
            _ => Vec::new(),
        })
    }

    pub fn number<'de, D: Deserializer<'de>>(d: D) -> Result<Option<f64>, D::Error> {
        Ok(match Value::deserialize(d)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        })
    }

    /// Non-object items become empty items, which the normalizer counts as dropped
    pub fn dialogue<'de, D: Deserializer<'de>>(
        d: D,
    ) -> Result<Option<Vec<DialogueItem>>, D::Error> {
        Ok(match Value::deserialize(d)? {
            Value::Array(items) => Some(
                items
                    .into_iter()
                    .map(|v| serde_json::from_value(v).unwrap_or_default())
                    .collect(),
            ),
            _ => None,
        })
    }

    pub fn calls<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<ProviderCall>, D::Error> {
        Ok(match Value::deserialize(d)? {
            Value::Array(items) => items
                .into_iter()
                .filter_map(|v| serde_json::from_value(v).ok())
                .collect(),
            _ => Vec::new(),
        })
    }
}

/// Accept integer, float or numeric-string durations; negatives clamp to zero
pub fn duration_secs(value: &Value) -> Option<u32> {
    let secs = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    if !secs.is_finite() {
        return None;
    }
    Some(secs.max(0.0).round().min(u32::MAX as f64) as u32)
}

pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}
