pub mod memory;
pub mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::models::{Analysis, Call, CallUpdate, Transcript};

/// Sync-state key prefix; each line keeps the RFC 3339 time of its last successful poll run
pub const LAST_SYNC_KEY: &str = "last_successful_sync";

pub fn sync_key(line: &str) -> String {
    format!("{LAST_SYNC_KEY}:{line}")
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("invalid stored value: {0}")]
    InvalidValue(String),
    #[error("store lock poisoned")]
    Poisoned,
    #[error("store task failed: {0}")]
    Join(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UpsertOutcome {
    Inserted,
    Updated,
}

/// Outcome plus the row as it now stands
#[derive(Debug, Clone)]
pub struct Upserted<T> {
    pub outcome: UpsertOutcome,
    pub record: T,
}

/// One received webhook delivery
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WebhookHeartbeat {
    pub id: String,
    pub event_type: String,
    pub call_id: Option<String>,
    pub received_at: DateTime<Utc>,
}

impl WebhookHeartbeat {
    pub fn new(event_type: impl Into<String>, call_id: Option<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            event_type: event_type.into(),
            call_id,
            received_at: Utc::now(),
        }
    }
}

/// Persistence for calls, transcripts, analyses and small bits of runtime state.
///
/// All keyed writes are upserts on the external call id.
#[async_trait]
pub trait CallStore: Send + Sync {
    /// Insert, or merge the fields the update carries into the existing row
    async fn upsert_call(&self, update: &CallUpdate) -> Result<Upserted<Call>, StoreError>;
    async fn get_call(&self, id: &str) -> Result<Option<Call>, StoreError>;
    /// Calls created in `[from, to)`, oldest first
    async fn calls_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Call>, StoreError>;

    /// Insert or overwrite wholesale
    async fn upsert_transcript(&self, transcript: &Transcript) -> Result<UpsertOutcome, StoreError>;
    async fn get_transcript(&self, call_id: &str) -> Result<Option<Transcript>, StoreError>;

    /// Insert or overwrite wholesale
    async fn save_analysis(&self, analysis: &Analysis) -> Result<UpsertOutcome, StoreError>;
    async fn get_analysis(&self, call_id: &str) -> Result<Option<Analysis>, StoreError>;

    async fn get_state(&self, key: &str) -> Result<Option<String>, StoreError>;
    async fn set_state(&self, key: &str, value: &str) -> Result<(), StoreError>;

    async fn record_heartbeat(&self, heartbeat: &WebhookHeartbeat) -> Result<(), StoreError>;
    async fn latest_heartbeat(&self) -> Result<Option<WebhookHeartbeat>, StoreError>;
}

pub async fn last_successful_sync(
    store: &dyn CallStore,
    line: &str,
) -> Result<Option<DateTime<Utc>>, StoreError> {
    let key = sync_key(line);
    match store.get_state(&key).await? {
        Some(value) => DateTime::parse_from_rfc3339(&value)
            .map(|t| Some(t.with_timezone(&Utc)))
            .map_err(|e| StoreError::InvalidValue(format!("{key}={value}: {e}"))),
        None => Ok(None),
    }
}

pub async fn record_successful_sync(
    store: &dyn CallStore,
    line: &str,
    at: DateTime<Utc>,
) -> Result<(), StoreError> {
    store.set_state(&sync_key(line), &at.to_rfc3339()).await
}
