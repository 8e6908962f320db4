use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Direction of a call as seen from the owning line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[serde(alias = "incoming")]
    Inbound,
    #[serde(alias = "outgoing")]
    Outbound,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Inbound => "inbound",
            Direction::Outbound => "outbound",
        }
    }

    /// Parse both our own vocabulary and the provider's (`incoming`/`outgoing`)
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "inbound" | "incoming" => Some(Direction::Inbound),
            "outbound" | "outgoing" => Some(Direction::Outbound),
            _ => None,
        }
    }
}

/// Which ingestion path produced a write
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IngestSource {
    #[default]
    Poll,
    Webhook,
    Manual,
}

impl IngestSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            IngestSource::Poll => "poll",
            IngestSource::Webhook => "webhook",
            IngestSource::Manual => "manual",
        }
    }
}

/// A partial view of a call carried by one sighting (a poll page item or a webhook event).
///
/// Every `None` means "this sighting does not know", never "clear the stored value".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallUpdate {
    /// External call id from the provider
    pub id: String,
    pub direction: Option<Direction>,
    pub from_number: Option<String>,
    pub to_number: Option<String>,
    pub duration_secs: Option<u32>,
    pub created_at: Option<DateTime<Utc>>,
    pub answered_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Provider status vocabulary (`completed`, `missed`, ...)
    pub status: Option<String>,
    pub phone_number_id: Option<String>,
    pub user_id: Option<String>,
    /// Extra metadata; merged key by key into the stored map
    pub metadata: Map<String, Value>,
    pub source: IngestSource,
}

impl CallUpdate {
    pub fn new(id: impl Into<String>, source: IngestSource) -> Self {
        Self {
            id: id.into(),
            source,
            ..Default::default()
        }
    }
}

/// A stored call row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Call {
    pub id: String,
    pub direction: Option<Direction>,
    pub from_number: Option<String>,
    pub to_number: Option<String>,
    pub duration_secs: u32,
    pub created_at: DateTime<Utc>,
    pub answered_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub status: Option<String>,
    pub phone_number_id: Option<String>,
    pub user_id: Option<String>,
    /// Provenance: `source`, `field_sources`, `routing`, `participants`, ...
    pub metadata: Map<String, Value>,
    pub updated_at: DateTime<Utc>,
}

impl Call {
    /// Build a fresh row from the first sighting of a call
    pub fn from_update(update: &CallUpdate, now: DateTime<Utc>) -> Self {
        let mut call = Self {
            id: update.id.clone(),
            direction: None,
            from_number: None,
            to_number: None,
            duration_secs: 0,
            created_at: update.created_at.unwrap_or(now),
            answered_at: None,
            completed_at: None,
            status: None,
            phone_number_id: None,
            user_id: None,
            metadata: Map::new(),
            updated_at: now,
        };
        call.metadata.insert(
            "source".to_string(),
            Value::String(update.source.as_str().to_string()),
        );
        call.apply(update, now);
        call
    }

    /// Merge a later sighting into this row.
    ///
    /// Fields the update carries overwrite; fields it lacks are preserved. Each written
    /// field is recorded under `metadata.field_sources` with the path that wrote it.
    pub fn apply(&mut self, update: &CallUpdate, now: DateTime<Utc>) {
        let mut written = Vec::new();

        merge(&mut self.direction, &update.direction, "direction", &mut written);
        merge(&mut self.from_number, &update.from_number, "from_number", &mut written);
        merge(&mut self.to_number, &update.to_number, "to_number", &mut written);
        merge(&mut self.answered_at, &update.answered_at, "answered_at", &mut written);
        merge(&mut self.completed_at, &update.completed_at, "completed_at", &mut written);
        merge(&mut self.status, &update.status, "status", &mut written);
        merge(
            &mut self.phone_number_id,
            &update.phone_number_id,
            "phone_number_id",
            &mut written,
        );
        merge(&mut self.user_id, &update.user_id, "user_id", &mut written);

        if let Some(duration) = update.duration_secs {
            self.duration_secs = duration;
            written.push("duration_secs");
        }
        if let Some(created_at) = update.created_at {
            self.created_at = created_at;
            written.push("created_at");
        }

        for (key, value) in &update.metadata {
            if key != "field_sources" {
                self.metadata.insert(key.clone(), value.clone());
            }
        }

        if !written.is_empty() {
            let sources = self
                .metadata
                .entry("field_sources")
                .or_insert_with(|| Value::Object(Map::new()));
            if !sources.is_object() {
                *sources = Value::Object(Map::new());
            }
            if let Value::Object(sources) = sources {
                for field in written {
                    sources.insert(
                        field.to_string(),
                        Value::String(update.source.as_str().to_string()),
                    );
                }
            }
        }

        self.updated_at = now;
    }
}

fn merge<T: Clone>(
    slot: &mut Option<T>,
    value: &Option<T>,
    field: &'static str,
    written: &mut Vec<&'static str>,
) {
    if let Some(value) = value {
        *slot = Some(value.clone());
        written.push(field);
    }
}

/// Best-effort E.164 normalization: keep digits and a leading `+`.
///
/// Returns `None` when nothing dialable is left.
pub fn normalize_number(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    let digits: String = trimmed.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return None;
    }
    if trimmed.starts_with('+') {
        Some(format!("+{}", digits))
    } else {
        Some(digits)
    }
}
