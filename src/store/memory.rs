use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{CallStore, StoreError, UpsertOutcome, Upserted, WebhookHeartbeat};
use crate::models::{Analysis, Call, CallUpdate, Transcript};

#[derive(Default)]
struct Tables {
    calls: HashMap<String, Call>,
    transcripts: HashMap<String, Transcript>,
    analyses: HashMap<String, Analysis>,
    state: HashMap<String, String>,
    heartbeats: Vec<WebhookHeartbeat>,
}

/// Process-local store; used by tests and `--memory` runs
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Tables>, StoreError> {
        self.tables.lock().map_err(|_| StoreError::Poisoned)
    }

    pub fn call_count(&self) -> usize {
        self.lock().map(|t| t.calls.len()).unwrap_or(0)
    }

    pub fn transcript_count(&self) -> usize {
        self.lock().map(|t| t.transcripts.len()).unwrap_or(0)
    }

    pub fn analysis_count(&self) -> usize {
        self.lock().map(|t| t.analyses.len()).unwrap_or(0)
    }
}

#[async_trait]
impl CallStore for MemoryStore {
    async fn upsert_call(&self, update: &CallUpdate) -> Result<Upserted<Call>, StoreError> {
        let now = Utc::now();
        let mut tables = self.lock()?;
        match tables.calls.get_mut(&update.id) {
            Some(existing) => {
                existing.apply(update, now);
                Ok(Upserted {
                    outcome: UpsertOutcome::Updated,
                    record: existing.clone(),
                })
            }
            None => {
                let call = Call::from_update(update, now);
                tables.calls.insert(call.id.clone(), call.clone());
                Ok(Upserted {
                    outcome: UpsertOutcome::Inserted,
                    record: call,
                })
            }
        }
    }

    async fn get_call(&self, id: &str) -> Result<Option<Call>, StoreError> {
        Ok(self.lock()?.calls.get(id).cloned())
    }

    async fn calls_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Call>, StoreError> {
        let mut calls: Vec<Call> = self
            .lock()?
            .calls
            .values()
            .filter(|c| c.created_at >= from && c.created_at < to)
            .cloned()
            .collect();
        calls.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(calls)
    }

    async fn upsert_transcript(&self, transcript: &Transcript) -> Result<UpsertOutcome, StoreError> {
        let previous = self
            .lock()?
            .transcripts
            .insert(transcript.call_id.clone(), transcript.clone());
        Ok(if previous.is_some() {
            UpsertOutcome::Updated
        } else {
            UpsertOutcome::Inserted
        })
    }

    async fn get_transcript(&self, call_id: &str) -> Result<Option<Transcript>, StoreError> {
        Ok(self.lock()?.transcripts.get(call_id).cloned())
    }

    async fn save_analysis(&self, analysis: &Analysis) -> Result<UpsertOutcome, StoreError> {
        let previous = self
            .lock()?
            .analyses
            .insert(analysis.call_id.clone(), analysis.clone());
        Ok(if previous.is_some() {
            UpsertOutcome::Updated
        } else {
            UpsertOutcome::Inserted
        })
    }

    async fn get_analysis(&self, call_id: &str) -> Result<Option<Analysis>, StoreError> {
        Ok(self.lock()?.analyses.get(call_id).cloned())
    }

    async fn get_state(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.lock()?.state.get(key).cloned())
    }

    async fn set_state(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.lock()?.state.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn record_heartbeat(&self, heartbeat: &WebhookHeartbeat) -> Result<(), StoreError> {
        self.lock()?.heartbeats.push(heartbeat.clone());
        Ok(())
    }

    async fn latest_heartbeat(&self) -> Result<Option<WebhookHeartbeat>, StoreError> {
        Ok(self
            .lock()?
            .heartbeats
            .iter()
            .max_by_key(|h| h.received_at)
            .cloned())
    }
}
