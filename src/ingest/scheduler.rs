use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveTime, Utc};
use tracing::{info, warn};

use super::poll::{PollPipeline, SyncOptions, SyncReport};
use crate::store::{CallStore, last_successful_sync};

/// A sync older than this triggers a run at startup
pub const CATCH_UP_AFTER_HOURS: i64 = 24;

pub fn needs_catch_up(last_sync: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    match last_sync {
        Some(last) => now - last > Duration::hours(CATCH_UP_AFTER_HOURS),
        None => true,
    }
}

/// Next occurrence of `at` (UTC) strictly after `now`
pub fn next_run_after(now: DateTime<Utc>, at: NaiveTime) -> DateTime<Utc> {
    let today = now.date_naive().and_time(at).and_utc();
    if today > now {
        today
    } else {
        today + Duration::days(1)
    }
}

/// Runs the poll pipeline for every configured line once a day
pub struct SyncScheduler {
    pipeline: Arc<PollPipeline>,
    store: Arc<dyn CallStore>,
    lines: Vec<SyncOptions>,
    sync_time: NaiveTime,
}

impl SyncScheduler {
    pub fn new(
        pipeline: Arc<PollPipeline>,
        store: Arc<dyn CallStore>,
        lines: Vec<SyncOptions>,
        sync_time: NaiveTime,
    ) -> Self {
        Self {
            pipeline,
            store,
            lines,
            sync_time,
        }
    }

    pub async fn run_all(&self) -> Vec<SyncReport> {
        let mut reports = Vec::with_capacity(self.lines.len());
        for options in &self.lines {
            reports.push(self.pipeline.run(options).await);
        }
        reports
    }

    /// Oldest last-success time across lines; `None` when any line never synced
    async fn oldest_line_sync(&self) -> Option<DateTime<Utc>> {
        let mut oldest: Option<DateTime<Utc>> = None;
        for options in &self.lines {
            let line = &options.phone_number_id;
            match last_successful_sync(self.store.as_ref(), line).await {
                Ok(Some(at)) => oldest = Some(oldest.map_or(at, |o| o.min(at))),
                Ok(None) => return None,
                Err(e) => {
                    warn!(line = %line, "could not read last sync time, treating as never synced: {}", e);
                    return None;
                }
            }
        }
        oldest
    }

    /// Sync now if any line's last successful run is stale or unknown
    pub async fn catch_up(&self) -> Option<Vec<SyncReport>> {
        let last = self.oldest_line_sync().await;
        if needs_catch_up(last, Utc::now()) {
            info!(last_sync = ?last, "last sync is stale, running catch-up sync");
            Some(self.run_all().await)
        } else {
            info!(last_sync = ?last, "last sync is recent, skipping catch-up");
            None
        }
    }

    /// Catch up, then sync daily at the configured time. Never returns.
    pub async fn run(self: Arc<Self>) {
        if self.lines.is_empty() {
            warn!("no phone lines configured, scheduled sync disabled");
            return;
        }
        self.catch_up().await;

        loop {
            let now = Utc::now();
            let next = next_run_after(now, self.sync_time);
            let wait = (next - now).to_std().unwrap_or_default();
            info!(next_run = %next.to_rfc3339(), "next scheduled sync");
            tokio::time::sleep(wait).await;

            let reports = self.run_all().await;
            let failed = reports.iter().filter(|r| !r.success).count();
            if failed > 0 {
                warn!(failed, lines = reports.len(), "scheduled sync finished with failures");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::{AnalysisDispatcher, DispatchConfig};
    use crate::store::MemoryStore;
    use crate::telephony::TelephonyError;
    use crate::testing::{FakeScorer, FakeTelephony, test_policy};
    use chrono::TimeZone;

    fn scheduler(telephony: Arc<FakeTelephony>, store: Arc<MemoryStore>) -> SyncScheduler {
        let dispatcher = Arc::new(AnalysisDispatcher::new(
            store.clone(),
            Arc::new(FakeScorer::default()),
            test_policy(),
            DispatchConfig::default(),
        ));
        let pipeline = Arc::new(PollPipeline::new(telephony, store.clone(), dispatcher));
        SyncScheduler::new(
            pipeline,
            store,
            vec![SyncOptions::new("PN_MAIN"), SyncOptions::new("PN_OUT")],
            at(6, 0),
        )
    }

    #[tokio::test]
    async fn test_failed_line_is_not_hidden_by_a_later_success() {
        let telephony = Arc::new(FakeTelephony::default());
        telephony.push_page_error(TelephonyError::InvalidCredential);
        let store = Arc::new(MemoryStore::new());
        let scheduler = scheduler(telephony, store.clone());

        let reports = scheduler.run_all().await;
        assert!(!reports[0].success);
        assert!(reports[1].success);
        assert!(last_successful_sync(store.as_ref(), "PN_MAIN").await.unwrap().is_none());
        assert!(last_successful_sync(store.as_ref(), "PN_OUT").await.unwrap().is_some());

        let retried = scheduler.catch_up().await.expect("main line still needs a sync");
        assert!(retried.iter().all(|r| r.success));
        assert!(scheduler.catch_up().await.is_none());
    }

    fn at(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn test_catch_up_decision() {
        let now = Utc.with_ymd_and_hms(2026, 3, 2, 12, 0, 0).unwrap();
        assert!(needs_catch_up(None, now));
        assert!(!needs_catch_up(Some(now - Duration::hours(23)), now));
        assert!(!needs_catch_up(Some(now - Duration::hours(24)), now));
        assert!(needs_catch_up(Some(now - Duration::hours(25)), now));
    }

    #[test]
    fn test_next_run_same_day_or_tomorrow() {
        let now = Utc.with_ymd_and_hms(2026, 3, 2, 12, 0, 0).unwrap();
        assert_eq!(
            next_run_after(now, at(18, 30)),
            Utc.with_ymd_and_hms(2026, 3, 2, 18, 30, 0).unwrap()
        );
        assert_eq!(
            next_run_after(now, at(6, 0)),
            Utc.with_ymd_and_hms(2026, 3, 3, 6, 0, 0).unwrap()
        );
        assert_eq!(
            next_run_after(now, at(12, 0)),
            Utc.with_ymd_and_hms(2026, 3, 3, 12, 0, 0).unwrap()
        );
    }
}
