use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};
use serde_json::{Map, Value};

use super::{CallStore, StoreError, UpsertOutcome, Upserted, WebhookHeartbeat};
use crate::models::{
    Analysis, Call, CallUpdate, Compliance, Direction, Segment, Sentiment, Transcript,
    TranscriptQuality,
};

pub const SCHEMA_VERSION: i64 = 1;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS calls (
    id TEXT PRIMARY KEY,
    direction TEXT,
    from_number TEXT,
    to_number TEXT,
    duration_secs INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    answered_at TEXT,
    completed_at TEXT,
    status TEXT,
    phone_number_id TEXT,
    user_id TEXT,
    metadata_json TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_calls_created_at ON calls(created_at);

CREATE TABLE IF NOT EXISTS transcripts (
    call_id TEXT PRIMARY KEY,
    text TEXT NOT NULL,
    segments_json TEXT NOT NULL,
    duration_secs INTEGER,
    status TEXT,
    quality TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS analyses (
    call_id TEXT PRIMARY KEY,
    direction TEXT NOT NULL,
    score INTEGER NOT NULL CHECK (score BETWEEN 0 AND 100),
    summary TEXT NOT NULL,
    compliance TEXT NOT NULL,
    sentiment TEXT NOT NULL,
    notes TEXT NOT NULL,
    metadata_json TEXT NOT NULL,
    analyzed_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS sync_state (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS webhook_heartbeats (
    id TEXT PRIMARY KEY,
    event_type TEXT NOT NULL,
    call_id TEXT,
    received_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_heartbeats_received_at ON webhook_heartbeats(received_at);
"#;

const CALL_COLUMNS: &str = "id, direction, from_number, to_number, duration_secs, created_at, \
     answered_at, completed_at, status, phone_number_id, user_id, metadata_json, updated_at";

/// SQLite-backed store. One connection, serialized behind a mutex. Every
/// statement runs on the blocking pool so async callers never stall a worker.
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA)?;
        conn.execute(&format!("PRAGMA user_version = {SCHEMA_VERSION}"), [])?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    async fn blocking<T, F>(&self, work: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T, StoreError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn.lock().map_err(|_| StoreError::Poisoned)?;
            work(&mut guard)
        })
        .await
        .map_err(|e| StoreError::Join(e.to_string()))?
    }

    pub fn schema_version(&self) -> Result<i64, StoreError> {
        Ok(self
            .lock()?
            .query_row("PRAGMA user_version", [], |row| row.get(0))?)
    }
}

/// Raw column values; conversion happens outside the rusqlite row closure
struct CallRow {
    id: String,
    direction: Option<String>,
    from_number: Option<String>,
    to_number: Option<String>,
    duration_secs: i64,
    created_at: String,
    answered_at: Option<String>,
    completed_at: Option<String>,
    status: Option<String>,
    phone_number_id: Option<String>,
    user_id: Option<String>,
    metadata_json: String,
    updated_at: String,
}

impl CallRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            direction: row.get(1)?,
            from_number: row.get(2)?,
            to_number: row.get(3)?,
            duration_secs: row.get(4)?,
            created_at: row.get(5)?,
            answered_at: row.get(6)?,
            completed_at: row.get(7)?,
            status: row.get(8)?,
            phone_number_id: row.get(9)?,
            user_id: row.get(10)?,
            metadata_json: row.get(11)?,
            updated_at: row.get(12)?,
        })
    }

    fn into_call(self) -> Result<Call, StoreError> {
        let metadata: Map<String, Value> = serde_json::from_str(&self.metadata_json)?;
        Ok(Call {
            direction: self.direction.as_deref().and_then(Direction::parse),
            from_number: self.from_number,
            to_number: self.to_number,
            duration_secs: u32::try_from(self.duration_secs.max(0)).unwrap_or(u32::MAX),
            created_at: parse_ts(&self.created_at)?,
            answered_at: self.answered_at.as_deref().map(parse_ts).transpose()?,
            completed_at: self.completed_at.as_deref().map(parse_ts).transpose()?,
            status: self.status,
            phone_number_id: self.phone_number_id,
            user_id: self.user_id,
            metadata,
            updated_at: parse_ts(&self.updated_at)?,
            id: self.id,
        })
    }
}

fn parse_ts(value: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StoreError::InvalidValue(format!("timestamp {value:?}: {e}")))
}

/// Fixed-width UTC so text comparison orders the same as time
fn fmt_ts(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn read_call(conn: &Connection, id: &str) -> Result<Option<Call>, StoreError> {
    let row = conn
        .query_row(
            &format!("SELECT {CALL_COLUMNS} FROM calls WHERE id = ?1"),
            params![id],
            CallRow::from_row,
        )
        .optional()?;
    row.map(CallRow::into_call).transpose()
}

fn write_call(conn: &Connection, call: &Call) -> Result<(), StoreError> {
    conn.execute(
        &format!(
            "INSERT INTO calls ({CALL_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
             ON CONFLICT(id) DO UPDATE SET
                direction=excluded.direction,
                from_number=excluded.from_number,
                to_number=excluded.to_number,
                duration_secs=excluded.duration_secs,
                created_at=excluded.created_at,
                answered_at=excluded.answered_at,
                completed_at=excluded.completed_at,
                status=excluded.status,
                phone_number_id=excluded.phone_number_id,
                user_id=excluded.user_id,
                metadata_json=excluded.metadata_json,
                updated_at=excluded.updated_at"
        ),
        params![
            call.id,
            call.direction.map(|d| d.as_str()),
            call.from_number,
            call.to_number,
            call.duration_secs as i64,
            fmt_ts(&call.created_at),
            call.answered_at.as_ref().map(fmt_ts),
            call.completed_at.as_ref().map(fmt_ts),
            call.status,
            call.phone_number_id,
            call.user_id,
            serde_json::to_string(&call.metadata)?,
            fmt_ts(&call.updated_at),
        ],
    )?;
    Ok(())
}

fn upsert_call(conn: &mut Connection, update: &CallUpdate) -> Result<Upserted<Call>, StoreError> {
    let now = Utc::now();
    let tx = conn.transaction()?;

    let (outcome, call) = match read_call(&tx, &update.id)? {
        Some(mut existing) => {
            existing.apply(update, now);
            (UpsertOutcome::Updated, existing)
        }
        None => (UpsertOutcome::Inserted, Call::from_update(update, now)),
    };
    write_call(&tx, &call)?;
    tx.commit()?;

    Ok(Upserted {
        outcome,
        record: call,
    })
}

fn calls_between(
    conn: &Connection,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
) -> Result<Vec<Call>, StoreError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {CALL_COLUMNS} FROM calls
         WHERE created_at >= ?1 AND created_at < ?2
         ORDER BY created_at, id"
    ))?;
    let rows = stmt
        .query_map(params![fmt_ts(&from), fmt_ts(&to)], CallRow::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    rows.into_iter().map(CallRow::into_call).collect()
}

fn row_exists(conn: &Connection, table: &str, call_id: &str) -> Result<bool, StoreError> {
    Ok(conn
        .query_row(
            &format!("SELECT 1 FROM {table} WHERE call_id = ?1"),
            params![call_id],
            |_| Ok(()),
        )
        .optional()?
        .is_some())
}

fn outcome(existed: bool) -> UpsertOutcome {
    if existed {
        UpsertOutcome::Updated
    } else {
        UpsertOutcome::Inserted
    }
}

fn upsert_transcript(conn: &Connection, transcript: &Transcript) -> Result<UpsertOutcome, StoreError> {
    let existed = row_exists(conn, "transcripts", &transcript.call_id)?;
    conn.execute(
        "INSERT INTO transcripts (call_id, text, segments_json, duration_secs, status, quality, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
         ON CONFLICT(call_id) DO UPDATE SET
            text=excluded.text,
            segments_json=excluded.segments_json,
            duration_secs=excluded.duration_secs,
            status=excluded.status,
            quality=excluded.quality,
            updated_at=excluded.updated_at",
        params![
            transcript.call_id,
            transcript.text,
            serde_json::to_string(&transcript.segments)?,
            transcript.duration_secs.map(i64::from),
            transcript.status,
            transcript.quality.as_str(),
            fmt_ts(&transcript.updated_at),
        ],
    )?;
    Ok(outcome(existed))
}

fn read_transcript(conn: &Connection, call_id: &str) -> Result<Option<Transcript>, StoreError> {
    let row = conn
        .query_row(
            "SELECT call_id, text, segments_json, duration_secs, status, quality, updated_at
             FROM transcripts WHERE call_id = ?1",
            params![call_id],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, Option<i64>>(3)?,
                    row.get::<_, Option<String>>(4)?,
                    row.get::<_, String>(5)?,
                    row.get::<_, String>(6)?,
                ))
            },
        )
        .optional()?;

    let Some((call_id, text, segments_json, duration, status, quality, updated_at)) = row else {
        return Ok(None);
    };

    let segments: Vec<Segment> = serde_json::from_str(&segments_json)?;
    let quality = TranscriptQuality::parse(&quality)
        .ok_or_else(|| StoreError::InvalidValue(format!("transcript quality {quality:?}")))?;

    Ok(Some(Transcript {
        call_id,
        text,
        segments,
        duration_secs: duration.map(|d| d.max(0) as u32),
        status,
        quality,
        updated_at: parse_ts(&updated_at)?,
    }))
}

fn save_analysis(conn: &Connection, analysis: &Analysis) -> Result<UpsertOutcome, StoreError> {
    let existed = row_exists(conn, "analyses", &analysis.call_id)?;
    conn.execute(
        "INSERT INTO analyses (call_id, direction, score, summary, compliance, sentiment, notes, metadata_json, analyzed_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
         ON CONFLICT(call_id) DO UPDATE SET
            direction=excluded.direction,
            score=excluded.score,
            summary=excluded.summary,
            compliance=excluded.compliance,
            sentiment=excluded.sentiment,
            notes=excluded.notes,
            metadata_json=excluded.metadata_json,
            analyzed_at=excluded.analyzed_at",
        params![
            analysis.call_id,
            analysis.direction.as_str(),
            analysis.score as i64,
            analysis.summary,
            analysis.compliance.as_str(),
            analysis.sentiment.as_str(),
            analysis.notes,
            serde_json::to_string(&analysis.metadata)?,
            fmt_ts(&analysis.analyzed_at),
        ],
    )?;
    Ok(outcome(existed))
}

fn read_analysis(conn: &Connection, call_id: &str) -> Result<Option<Analysis>, StoreError> {
    let row = conn
        .query_row(
            "SELECT call_id, direction, score, summary, compliance, sentiment, notes, metadata_json, analyzed_at
             FROM analyses WHERE call_id = ?1",
            params![call_id],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, String>(5)?,
                    row.get::<_, String>(6)?,
                    row.get::<_, String>(7)?,
                    row.get::<_, String>(8)?,
                ))
            },
        )
        .optional()?;

    let Some((call_id, direction, score, summary, compliance, sentiment, notes, metadata, at)) = row
    else {
        return Ok(None);
    };

    Ok(Some(Analysis {
        call_id,
        direction: Direction::parse(&direction)
            .ok_or_else(|| StoreError::InvalidValue(format!("direction {direction:?}")))?,
        score: u8::try_from(score)
            .ok()
            .filter(|s| *s <= 100)
            .ok_or_else(|| StoreError::InvalidValue(format!("score {score}")))?,
        summary,
        compliance: Compliance::parse(&compliance)
            .ok_or_else(|| StoreError::InvalidValue(format!("compliance {compliance:?}")))?,
        sentiment: Sentiment::parse(&sentiment)
            .ok_or_else(|| StoreError::InvalidValue(format!("sentiment {sentiment:?}")))?,
        notes,
        metadata: serde_json::from_str(&metadata)?,
        analyzed_at: parse_ts(&at)?,
    }))
}

fn read_latest_heartbeat(conn: &Connection) -> Result<Option<WebhookHeartbeat>, StoreError> {
    let row = conn
        .query_row(
            "SELECT id, event_type, call_id, received_at FROM webhook_heartbeats
             ORDER BY received_at DESC LIMIT 1",
            [],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<String>>(2)?,
                    row.get::<_, String>(3)?,
                ))
            },
        )
        .optional()?;

    row.map(|(id, event_type, call_id, received_at)| {
        Ok(WebhookHeartbeat {
            id,
            event_type,
            call_id,
            received_at: parse_ts(&received_at)?,
        })
    })
    .transpose()
}

#[async_trait]
impl CallStore for SqliteStore {
    async fn upsert_call(&self, update: &CallUpdate) -> Result<Upserted<Call>, StoreError> {
        let update = update.clone();
        self.blocking(move |conn| upsert_call(conn, &update)).await
    }

    async fn get_call(&self, id: &str) -> Result<Option<Call>, StoreError> {
        let id = id.to_string();
        self.blocking(move |conn| read_call(conn, &id)).await
    }

    async fn calls_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Call>, StoreError> {
        self.blocking(move |conn| calls_between(conn, from, to)).await
    }

    async fn upsert_transcript(&self, transcript: &Transcript) -> Result<UpsertOutcome, StoreError> {
        let transcript = transcript.clone();
        self.blocking(move |conn| upsert_transcript(conn, &transcript)).await
    }

    async fn get_transcript(&self, call_id: &str) -> Result<Option<Transcript>, StoreError> {
        let call_id = call_id.to_string();
        self.blocking(move |conn| read_transcript(conn, &call_id)).await
    }

    async fn save_analysis(&self, analysis: &Analysis) -> Result<UpsertOutcome, StoreError> {
        let analysis = analysis.clone();
        self.blocking(move |conn| save_analysis(conn, &analysis)).await
    }

    async fn get_analysis(&self, call_id: &str) -> Result<Option<Analysis>, StoreError> {
        let call_id = call_id.to_string();
        self.blocking(move |conn| read_analysis(conn, &call_id)).await
    }

    async fn get_state(&self, key: &str) -> Result<Option<String>, StoreError> {
        let key = key.to_string();
        self.blocking(move |conn| {
            Ok(conn
                .query_row(
                    "SELECT value FROM sync_state WHERE key = ?1",
                    params![key],
                    |row| row.get(0),
                )
                .optional()?)
        })
        .await
    }

    async fn set_state(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let (key, value) = (key.to_string(), value.to_string());
        self.blocking(move |conn| {
            conn.execute(
                "INSERT INTO sync_state (key, value, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET value=excluded.value, updated_at=excluded.updated_at",
                params![key, value, fmt_ts(&Utc::now())],
            )?;
            Ok(())
        })
        .await
    }

    async fn record_heartbeat(&self, heartbeat: &WebhookHeartbeat) -> Result<(), StoreError> {
        let heartbeat = heartbeat.clone();
        self.blocking(move |conn| {
            conn.execute(
                "INSERT OR REPLACE INTO webhook_heartbeats (id, event_type, call_id, received_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    heartbeat.id,
                    heartbeat.event_type,
                    heartbeat.call_id,
                    fmt_ts(&heartbeat.received_at),
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn latest_heartbeat(&self) -> Result<Option<WebhookHeartbeat>, StoreError> {
        self.blocking(|conn| read_latest_heartbeat(conn)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::IngestSource;
    use crate::store::{last_successful_sync, record_successful_sync};
    use serde_json::json;
    use tempfile::NamedTempFile;

    fn update(id: &str) -> CallUpdate {
        let mut update = CallUpdate::new(id, IngestSource::Webhook);
        update.direction = Some(Direction::Outbound);
        update.duration_secs = Some(12);
        update.status = Some("completed".to_string());
        update.phone_number_id = Some("PN_OUT".to_string());
        update
    }

    #[test]
    fn test_schema_version_is_set() {
        let store = SqliteStore::open_in_memory().expect("open db");
        assert_eq!(store.schema_version().unwrap(), SCHEMA_VERSION);
    }

    #[tokio::test]
    async fn test_upsert_call_twice_keeps_one_row() {
        let store = SqliteStore::open_in_memory().expect("open db");

        let first = store.upsert_call(&update("AC1")).await.unwrap();
        let second = store.upsert_call(&update("AC1")).await.unwrap();
        assert_eq!(first.outcome, UpsertOutcome::Inserted);
        assert_eq!(second.outcome, UpsertOutcome::Updated);

        let count: i64 = store
            .lock()
            .unwrap()
            .query_row("SELECT COUNT(*) FROM calls", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_partial_update_preserves_stored_fields() {
        let store = SqliteStore::open_in_memory().expect("open db");
        store.upsert_call(&update("AC2")).await.unwrap();

        let mut correction = CallUpdate::new("AC2", IngestSource::Webhook);
        correction.duration_secs = Some(95);
        store.upsert_call(&correction).await.unwrap();

        let call = store.get_call("AC2").await.unwrap().unwrap();
        assert_eq!(call.duration_secs, 95);
        assert_eq!(call.direction, Some(Direction::Outbound));
        assert_eq!(call.phone_number_id.as_deref(), Some("PN_OUT"));
    }

    #[tokio::test]
    async fn test_calls_between_orders_by_creation() {
        let store = SqliteStore::open_in_memory().expect("open db");
        let base = Utc::now();
        for (id, offset) in [("c", 20), ("a", 0), ("b", 10)] {
            let mut u = update(id);
            u.created_at = Some(base + chrono::Duration::seconds(offset));
            store.upsert_call(&u).await.unwrap();
        }

        let calls = store
            .calls_between(base, base + chrono::Duration::seconds(20))
            .await
            .unwrap();
        let ids: Vec<&str> = calls.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_upserts_for_one_call() {
        let store = Arc::new(SqliteStore::open_in_memory().expect("open db"));
        let mut tasks = Vec::new();
        for duration in 1..=8u32 {
            let store = store.clone();
            tasks.push(tokio::spawn(async move {
                let mut correction = CallUpdate::new("AC_RACE", IngestSource::Webhook);
                correction.duration_secs = Some(duration);
                store.upsert_call(&correction).await.unwrap();
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        let count: i64 = store
            .lock()
            .unwrap()
            .query_row("SELECT COUNT(*) FROM calls", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
        let call = store.get_call("AC_RACE").await.unwrap().unwrap();
        assert!((1..=8).contains(&call.duration_secs));
    }

    #[tokio::test]
    async fn test_transcript_and_analysis_overwrite() {
        let file = NamedTempFile::new().expect("temp db");
        let store = SqliteStore::open(file.path()).expect("open db");
        let now = Utc::now();

        let mut transcript = Transcript {
            call_id: "AC3".to_string(),
            text: "US1: hello".to_string(),
            segments: vec![Segment {
                start: 0.0,
                end: 1.5,
                speaker: "US1".to_string(),
                text: "hello".to_string(),
            }],
            duration_secs: Some(30),
            status: Some("completed".to_string()),
            quality: TranscriptQuality::Valid,
            updated_at: now,
        };
        assert_eq!(
            store.upsert_transcript(&transcript).await.unwrap(),
            UpsertOutcome::Inserted
        );
        transcript.text = "US1: hello again".to_string();
        assert_eq!(
            store.upsert_transcript(&transcript).await.unwrap(),
            UpsertOutcome::Updated
        );
        let stored = store.get_transcript("AC3").await.unwrap().unwrap();
        assert_eq!(stored.text, "US1: hello again");
        assert_eq!(stored.segments.len(), 1);

        let mut analysis = Analysis::placeholder(
            "AC3",
            Direction::Inbound,
            TranscriptQuality::Empty,
            json!({"routing": {"line": "main"}}),
            now,
        );
        store.save_analysis(&analysis).await.unwrap();
        analysis.score = 88;
        analysis.compliance = Compliance::Pass;
        assert_eq!(
            store.save_analysis(&analysis).await.unwrap(),
            UpsertOutcome::Updated
        );

        let reopened = SqliteStore::open(file.path()).expect("reopen db");
        let stored = reopened.get_analysis("AC3").await.unwrap().unwrap();
        assert_eq!(stored.score, 88);
        assert_eq!(stored.compliance, Compliance::Pass);
        assert_eq!(stored.metadata["routing"]["line"], "main");
    }

    #[tokio::test]
    async fn test_state_and_heartbeats() {
        let store = SqliteStore::open_in_memory().expect("open db");

        let at = Utc::now();
        record_successful_sync(&store, "PN_OUT", at).await.unwrap();
        let read = last_successful_sync(&store, "PN_OUT").await.unwrap().unwrap();
        assert_eq!(read.timestamp(), at.timestamp());

        assert!(store.latest_heartbeat().await.unwrap().is_none());
        let mut older = WebhookHeartbeat::new("call.completed", Some("AC1".to_string()));
        older.received_at = at - chrono::Duration::seconds(60);
        let newer = WebhookHeartbeat::new("call.transcript.completed", None);
        store.record_heartbeat(&older).await.unwrap();
        store.record_heartbeat(&newer).await.unwrap();

        let latest = store.latest_heartbeat().await.unwrap().unwrap();
        assert_eq!(latest.event_type, "call.transcript.completed");
    }
}
