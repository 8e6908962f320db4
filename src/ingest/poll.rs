use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::normalize::normalize_dialogue;
use super::record_routing;
use crate::dispatch::{AnalysisDispatcher, AnalyzeRequest};
use crate::models::{Call, IngestSource, Transcript};
use crate::store::{CallStore, UpsertOutcome, record_successful_sync};
use crate::telephony::{DEFAULT_PAGE_SIZE, ListCallsQuery, ProviderCall, TelephonyApi};

pub const DEFAULT_SYNC_DAYS: u32 = 1;

/// Parameters for one poll run
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Line to list calls for
    pub phone_number_id: String,
    /// Restrict to calls with these participants
    pub participants: Vec<String>,
    pub user_id: Option<String>,
    /// Look-back window in days, ending now
    pub days: u32,
    /// Dispatch analysis for calls the routing policy accepts
    pub auto_analyze: bool,
}

impl SyncOptions {
    pub fn new(phone_number_id: impl Into<String>) -> Self {
        Self {
            phone_number_id: phone_number_id.into(),
            participants: Vec::new(),
            user_id: None,
            days: DEFAULT_SYNC_DAYS,
            auto_analyze: true,
        }
    }
}

/// Summary of one poll run
#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncReport {
    /// False only when paging or a call upsert failed
    pub success: bool,
    pub calls_fetched: usize,
    pub calls_synced: usize,
    pub calls_inserted: usize,
    pub calls_updated: usize,
    /// Fetched but not completed
    pub calls_skipped: usize,
    pub transcripts_synced: usize,
    pub analyses_triggered: usize,
    pub errors: Vec<String>,
    #[serde(with = "duration_secs_f64")]
    pub duration: Duration,
}

mod duration_secs_f64 {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(duration.as_secs_f64())
    }
}

/// Pull-based ingestion: list recent calls for a line, store them, fetch transcripts,
/// and hand qualifying calls to the dispatcher
pub struct PollPipeline {
    telephony: Arc<dyn TelephonyApi>,
    store: Arc<dyn CallStore>,
    dispatcher: Arc<AnalysisDispatcher>,
}

impl PollPipeline {
    pub fn new(
        telephony: Arc<dyn TelephonyApi>,
        store: Arc<dyn CallStore>,
        dispatcher: Arc<AnalysisDispatcher>,
    ) -> Self {
        Self {
            telephony,
            store,
            dispatcher,
        }
    }

    /// Run one sync. Per-call failures are collected into the report; nothing escapes.
    pub async fn run(&self, options: &SyncOptions) -> SyncReport {
        let started = Instant::now();
        let run_at = Utc::now();
        let mut report = SyncReport {
            success: true,
            ..Default::default()
        };

        info!(
            line = %options.phone_number_id,
            days = options.days,
            auto_analyze = options.auto_analyze,
            "starting call sync"
        );

        let calls = self.fetch_all(options, run_at, &mut report).await;
        report.calls_fetched = calls.len();

        for item in &calls {
            if !item.is_completed() {
                report.calls_skipped += 1;
                debug!(call_id = %item.id, status = ?item.status, "skipping call that is not completed");
                continue;
            }
            self.sync_call(item, options, &mut report).await;
        }

        if report.success {
            let line = &options.phone_number_id;
            if let Err(e) = record_successful_sync(self.store.as_ref(), line, run_at).await {
                warn!("failed to record sync time: {}", e);
                report.errors.push(format!("record sync time: {e}"));
            }
        }

        report.duration = started.elapsed();
        info!(
            success = report.success,
            fetched = report.calls_fetched,
            synced = report.calls_synced,
            inserted = report.calls_inserted,
            updated = report.calls_updated,
            skipped = report.calls_skipped,
            transcripts = report.transcripts_synced,
            analyses = report.analyses_triggered,
            errors = report.errors.len(),
            "call sync finished in {:.1}s",
            report.duration.as_secs_f64()
        );
        report
    }

    /// Page through the listing until there is no continuation token.
    /// A failed page stops paging and keeps what was already fetched.
    async fn fetch_all(
        &self,
        options: &SyncOptions,
        now: chrono::DateTime<Utc>,
        report: &mut SyncReport,
    ) -> Vec<ProviderCall> {
        let mut query = ListCallsQuery {
            phone_number_id: options.phone_number_id.clone(),
            participants: options.participants.clone(),
            user_id: options.user_id.clone(),
            created_after: now - chrono::Duration::days(i64::from(options.days)),
            created_before: now,
            page_token: None,
            max_results: DEFAULT_PAGE_SIZE,
        };

        let mut calls = Vec::new();
        loop {
            match self.telephony.list_calls(&query).await {
                Ok(page) => {
                    debug!(
                        items = page.items.len(),
                        has_more = page.next_page_token.is_some(),
                        "fetched call page"
                    );
                    calls.extend(page.items);
                    match page.next_page_token {
                        Some(token) if !token.is_empty() => query.page_token = Some(token),
                        _ => break,
                    }
                }
                Err(e) => {
                    warn!(line = %options.phone_number_id, "call listing failed: {}", e);
                    report.errors.push(format!("list calls: {e}"));
                    report.success = false;
                    break;
                }
            }
        }
        calls
    }

    async fn sync_call(&self, item: &ProviderCall, options: &SyncOptions, report: &mut SyncReport) {
        let update = item.to_update(IngestSource::Poll);
        let upserted = match self.store.upsert_call(&update).await {
            Ok(upserted) => upserted,
            Err(e) => {
                warn!(call_id = %item.id, "call upsert failed: {}", e);
                report.errors.push(format!("{}: upsert call: {e}", item.id));
                report.success = false;
                return;
            }
        };
        report.calls_synced += 1;
        match upserted.outcome {
            UpsertOutcome::Inserted => report.calls_inserted += 1,
            UpsertOutcome::Updated => report.calls_updated += 1,
        }
        let call = upserted.record;

        let transcript = self.sync_transcript(&call, report).await;

        let routing = self.dispatcher.policy().evaluate(
            call.phone_number_id.as_deref(),
            call.direction,
            call.duration_secs,
        );
        record_routing(self.store.as_ref(), &call.id, IngestSource::Poll, &routing).await;

        if !options.auto_analyze {
            return;
        }
        if !routing.should_analyze {
            debug!(call_id = %call.id, reason = %routing.reason, "call not routed for analysis");
            return;
        }
        let Some(transcript) = transcript else {
            debug!(call_id = %call.id, "no transcript available yet, analysis deferred");
            return;
        };

        let outcome = self
            .dispatcher
            .analyze(AnalyzeRequest {
                call_id: call.id.clone(),
                quality: Some(transcript.quality),
                transcript_text: Some(transcript.text),
                direction: call.direction,
                line_id: call.phone_number_id.clone(),
            })
            .await;
        report.analyses_triggered += 1;
        if let Some(error) = outcome.error {
            report.errors.push(format!("{}: analysis: {error}", call.id));
        }
    }

    /// Best effort: a missing or failed transcript never fails the call
    async fn sync_transcript(&self, call: &Call, report: &mut SyncReport) -> Option<Transcript> {
        let payload = match self.telephony.get_transcript(&call.id).await {
            Ok(Some(payload)) => payload,
            Ok(None) => {
                debug!(call_id = %call.id, "no transcript yet");
                return None;
            }
            Err(e) => {
                warn!(call_id = %call.id, "transcript fetch failed: {}", e);
                report.errors.push(format!("{}: fetch transcript: {e}", call.id));
                return None;
            }
        };

        let normalized = normalize_dialogue(payload.dialogue.as_deref().unwrap_or_default());
        if normalized.dropped > 0 {
            debug!(call_id = %call.id, dropped = normalized.dropped, "dropped malformed dialogue items");
        }
        let transcript = normalized.into_transcript(
            &call.id,
            payload.duration_secs().or(Some(call.duration_secs)),
            payload.status.clone(),
            Utc::now(),
        );

        match self.store.upsert_transcript(&transcript).await {
            Ok(_) => {
                report.transcripts_synced += 1;
                Some(transcript)
            }
            Err(e) => {
                warn!(call_id = %call.id, "transcript upsert failed: {}", e);
                report.errors.push(format!("{}: upsert transcript: {e}", call.id));
                None
            }
        }
    }
}
