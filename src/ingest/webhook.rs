use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::normalize::normalize_dialogue;
use super::record_routing;
use crate::dispatch::{AnalysisDispatcher, AnalyzeRequest};
use crate::models::{Call, CallUpdate, IngestSource, Transcript};
use crate::routing::RoutingDecision;
use crate::store::{CallStore, WebhookHeartbeat};
use crate::telephony::{DialogueItem, ProviderCall, TelephonyApi, TranscriptPayload};

pub const CALL_COMPLETED: &str = "call.completed";
pub const TRANSCRIPT_COMPLETED: &str = "call.transcript.completed";

/// Wait before fetching a transcript the call event did not carry
pub const DEFAULT_TRANSCRIPT_FETCH_DELAY: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("invalid JSON body: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("event has no data")]
    MissingData,
    #[error("transcript event without callId")]
    MissingCallId,
    #[error("call event without id")]
    MissingId,
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "type", default)]
    event_type: Option<String>,
    #[serde(default)]
    data: Option<Value>,
}

/// A provider webhook delivery
#[derive(Debug, Clone)]
pub enum WebhookEvent {
    CallCompleted(ProviderCall),
    TranscriptCompleted(TranscriptPayload),
    Ignored(String),
}

impl WebhookEvent {
    /// Parse a raw body, returning the declared event type alongside the event
    pub fn parse(body: &[u8]) -> Result<(String, WebhookEvent), WebhookError> {
        let envelope: Envelope = serde_json::from_slice(body)?;
        let event_type = envelope.event_type.unwrap_or_default();

        let event = match event_type.as_str() {
            CALL_COMPLETED => {
                let call: ProviderCall = serde_json::from_value(unwrap_object(envelope.data)?)?;
                if call.id.trim().is_empty() {
                    return Err(WebhookError::MissingId);
                }
                WebhookEvent::CallCompleted(call)
            }
            TRANSCRIPT_COMPLETED => {
                let transcript: TranscriptPayload =
                    serde_json::from_value(unwrap_object(envelope.data)?)?;
                WebhookEvent::TranscriptCompleted(transcript)
            }
            other => WebhookEvent::Ignored(other.to_string()),
        };
        Ok((event_type, event))
    }

    /// Reduce either shape to the canonical intermediate record
    pub fn extract(&self) -> Result<Option<IngestedCall>, WebhookError> {
        match self {
            WebhookEvent::CallCompleted(call) => Ok(Some(IngestedCall {
                update: call.to_update(IngestSource::Webhook),
                dialogue: call.dialogue.clone(),
                transcript_status: None,
                transcript_duration: None,
            })),
            WebhookEvent::TranscriptCompleted(transcript) => {
                let call_id = transcript
                    .call_id
                    .as_deref()
                    .map(str::trim)
                    .filter(|id| !id.is_empty())
                    .ok_or(WebhookError::MissingCallId)?;
                // The transcript's duration is the corrected call length. Its status
                // describes the transcript, not the call, so it only goes to metadata.
                let mut update = CallUpdate::new(call_id, IngestSource::Webhook);
                update.duration_secs = transcript.duration_secs();
                if let Some(status) = &transcript.status {
                    update
                        .metadata
                        .insert("transcript_status".to_string(), Value::String(status.clone()));
                }
                Ok(Some(IngestedCall {
                    update,
                    dialogue: transcript.dialogue.clone(),
                    transcript_status: transcript.status.clone(),
                    transcript_duration: transcript.duration_secs(),
                }))
            }
            WebhookEvent::Ignored(_) => Ok(None),
        }
    }
}

/// Payloads may wrap the object as `data.object`
fn unwrap_object(data: Option<Value>) -> Result<Value, WebhookError> {
    match data {
        Some(Value::Object(mut map)) => match map.remove("object") {
            Some(inner @ Value::Object(_)) => Ok(inner),
            Some(other) => {
                map.insert("object".to_string(), other);
                Ok(Value::Object(map))
            }
            None => Ok(Value::Object(map)),
        },
        _ => Err(WebhookError::MissingData),
    }
}

/// What an event contributes, whichever shape it came in
#[derive(Debug, Clone)]
pub struct IngestedCall {
    pub update: CallUpdate,
    pub dialogue: Option<Vec<DialogueItem>>,
    pub transcript_status: Option<String>,
    pub transcript_duration: Option<u32>,
}

/// Response body; always sent with 200
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookAck {
    pub received: bool,
    pub processed: bool,
    pub event: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub call_id: Option<String>,
}

impl WebhookAck {
    fn new(event: &str, processed: bool, call_id: Option<String>) -> Self {
        Self {
            received: true,
            processed,
            event: event.to_string(),
            call_id,
        }
    }
}

/// Work left over after the acknowledgement
#[derive(Debug, Clone)]
pub struct FollowUp {
    pub call: Call,
    pub routing: RoutingDecision,
    pub dialogue: Option<Vec<DialogueItem>>,
    pub transcript_status: Option<String>,
    pub transcript_duration: Option<u32>,
}

/// Push-based ingestion
pub struct WebhookProcessor {
    telephony: Arc<dyn TelephonyApi>,
    store: Arc<dyn CallStore>,
    dispatcher: Arc<AnalysisDispatcher>,
    fetch_delay: Duration,
}

impl WebhookProcessor {
    pub fn new(
        telephony: Arc<dyn TelephonyApi>,
        store: Arc<dyn CallStore>,
        dispatcher: Arc<AnalysisDispatcher>,
        fetch_delay: Duration,
    ) -> Self {
        Self {
            telephony,
            store,
            dispatcher,
            fetch_delay,
        }
    }

    /// Acknowledge immediately and run the follow-up on a background task
    pub async fn handle(self: Arc<Self>, body: &[u8]) -> WebhookAck {
        let (ack, follow_up) = self.receive(body).await;
        if let Some(follow_up) = follow_up {
            let this = Arc::clone(&self);
            tokio::spawn(async move { this.follow_up(follow_up).await });
        }
        ack
    }

    /// The synchronous part: heartbeat, parse, upsert, route
    pub async fn receive(&self, body: &[u8]) -> (WebhookAck, Option<FollowUp>) {
        let (event_type, event) = match WebhookEvent::parse(body) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!("rejected webhook body: {}", e);
                self.heartbeat("invalid", None).await;
                return (WebhookAck::new("unknown", false, None), None);
            }
        };

        let ingested = match event.extract() {
            Ok(Some(ingested)) => ingested,
            Ok(None) => {
                debug!(event = %event_type, "ignoring webhook event");
                self.heartbeat(&event_type, None).await;
                return (WebhookAck::new(&event_type, false, None), None);
            }
            Err(e) => {
                warn!(event = %event_type, "unusable webhook event: {}", e);
                self.heartbeat(&event_type, None).await;
                return (WebhookAck::new(&event_type, false, None), None);
            }
        };

        let call_id = ingested.update.id.clone();
        self.heartbeat(&event_type, Some(call_id.clone())).await;

        let call = match self.store.upsert_call(&ingested.update).await {
            Ok(upserted) => {
                debug!(call_id = %call_id, outcome = ?upserted.outcome, "webhook call upserted");
                upserted.record
            }
            Err(e) => {
                warn!(call_id = %call_id, event = %event_type, "webhook call upsert failed: {}", e);
                return (WebhookAck::new(&event_type, false, Some(call_id)), None);
            }
        };

        // Transcript events carry no line or direction, so route on the merged row
        let routing = self.dispatcher.policy().evaluate(
            call.phone_number_id.as_deref(),
            call.direction,
            call.duration_secs,
        );
        record_routing(self.store.as_ref(), &call.id, IngestSource::Webhook, &routing).await;

        info!(
            call_id = %call_id,
            event = %event_type,
            analyze = routing.should_analyze,
            reason = %routing.reason,
            has_dialogue = ingested.dialogue.is_some(),
            "webhook event processed"
        );

        let follow_up = if ingested.dialogue.is_some() || routing.should_analyze {
            Some(FollowUp {
                call,
                routing,
                dialogue: ingested.dialogue,
                transcript_status: ingested.transcript_status,
                transcript_duration: ingested.transcript_duration,
            })
        } else {
            None
        };

        (WebhookAck::new(&event_type, true, Some(call_id)), follow_up)
    }

    /// Store the transcript, fetching it first when the event had none, then
    /// dispatch analysis when the call is routed. Failures are logged only.
    pub async fn follow_up(&self, follow_up: FollowUp) {
        let FollowUp {
            call,
            routing,
            dialogue,
            transcript_status,
            transcript_duration,
        } = follow_up;

        let transcript = match dialogue {
            Some(items) => build_transcript(&call, &items, transcript_status, transcript_duration),
            None => {
                tokio::time::sleep(self.fetch_delay).await;
                match self.telephony.get_transcript(&call.id).await {
                    Ok(Some(payload)) => build_transcript(
                        &call,
                        payload.dialogue.as_deref().unwrap_or_default(),
                        payload.status.clone(),
                        payload.duration_secs(),
                    ),
                    Ok(None) => {
                        info!(call_id = %call.id, "transcript not available yet");
                        return;
                    }
                    Err(e) => {
                        warn!(call_id = %call.id, "delayed transcript fetch failed: {}", e);
                        return;
                    }
                }
            }
        };

        if let Err(e) = self.store.upsert_transcript(&transcript).await {
            warn!(call_id = %call.id, "transcript upsert failed: {}", e);
            return;
        }
        debug!(
            call_id = %call.id,
            quality = transcript.quality.as_str(),
            segments = transcript.segment_count(),
            "webhook transcript stored"
        );

        if !routing.should_analyze {
            return;
        }
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
        if let Some(error) = outcome.error {
            warn!(call_id = %call.id, "webhook analysis failed: {}", error);
        }
    }

    async fn heartbeat(&self, event_type: &str, call_id: Option<String>) {
        let heartbeat = WebhookHeartbeat::new(event_type, call_id);
        if let Err(e) = self.store.record_heartbeat(&heartbeat).await {
            warn!("failed to record webhook heartbeat: {}", e);
        }
    }
}

fn build_transcript(
    call: &Call,
    items: &[DialogueItem],
    status: Option<String>,
    duration: Option<u32>,
) -> Transcript {
    let normalized = normalize_dialogue(items);
    if normalized.dropped > 0 {
        debug!(call_id = %call.id, dropped = normalized.dropped, "dropped malformed dialogue items");
    }
    normalized.into_transcript(
        &call.id,
        duration.or(Some(call.duration_secs)),
        status,
        Utc::now(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::DispatchConfig;
    use crate::models::{Compliance, Direction, TranscriptQuality};
    use crate::store::MemoryStore;
    use crate::testing::{FakeScorer, FakeTelephony, dialogue, test_policy};
    use serde_json::json;

    struct Harness {
        processor: WebhookProcessor,
        store: Arc<MemoryStore>,
        telephony: Arc<FakeTelephony>,
        scorer: Arc<FakeScorer>,
    }

    fn harness() -> Harness {
        let store = Arc::new(MemoryStore::new());
        let telephony = Arc::new(FakeTelephony::default());
        let scorer = Arc::new(FakeScorer::default());
        let dispatcher = Arc::new(AnalysisDispatcher::new(
            store.clone(),
            scorer.clone(),
            test_policy(),
            DispatchConfig::default(),
        ));
        Harness {
            processor: WebhookProcessor::new(
                telephony.clone(),
                store.clone(),
                dispatcher,
                Duration::from_millis(1),
            ),
            store,
            telephony,
            scorer,
        }
    }

    fn body(value: serde_json::Value) -> Vec<u8> {
        serde_json::to_vec(&value).unwrap()
    }

    fn call_completed(id: &str, line: &str, direction: &str, duration: u32) -> Vec<u8> {
        body(json!({
            "id": "EV1",
            "object": "event",
            "type": "call.completed",
            "data": {"object": {
                "id": id,
                "direction": direction,
                "status": "completed",
                "duration": duration,
                "createdAt": "2026-03-02T15:04:05Z",
                "phoneNumberId": line,
                "participants": ["+1 (555) 123-4567"]
            }}
        }))
    }

    #[tokio::test]
    async fn test_outbound_call_without_dialogue_fetches_after_ack() {
        let h = harness();
        h.telephony.set_transcript(
            "AC_OUT",
            dialogue(&[("US2", "Hi, is this a good time?"), ("+15551234567", "Sure")]),
        );

        let (ack, follow_up) = h
            .processor
            .receive(&call_completed("AC_OUT", "PN_OUT", "outgoing", 10))
            .await;

        assert!(ack.processed);
        assert_eq!(ack.call_id.as_deref(), Some("AC_OUT"));
        assert_eq!(h.telephony.transcript_requests(), 0, "fetch happens after the ack");
        assert_eq!(h.scorer.invocations(), 0);

        h.processor.follow_up(follow_up.unwrap()).await;

        assert_eq!(h.telephony.transcript_requests(), 1);
        assert_eq!(h.scorer.invocations(), 1);
        let analysis = h.store.get_analysis("AC_OUT").await.unwrap().unwrap();
        assert_eq!(analysis.direction, Direction::Outbound);
        assert_eq!(analysis.compliance, Compliance::Pass);
    }

    #[tokio::test]
    async fn test_transcript_event_without_speakers_gets_placeholder() {
        let h = harness();
        let (seed, _) = h
            .processor
            .receive(&call_completed("AC_C", "PN_OUT", "outgoing", 120))
            .await;
        assert!(seed.processed);

        let event = body(json!({
            "type": "call.transcript.completed",
            "data": {"object": {
                "callId": "AC_C",
                "status": "completed",
                "duration": 118,
                "dialogue": [
                    {"content": "Hello there", "start": 0.0, "end": 1.5},
                    {"content": "Who is this?", "start": 1.6, "end": 3.0}
                ]
            }}
        }));
        let (ack, follow_up) = h.processor.receive(&event).await;
        assert!(ack.processed);
        assert_eq!(ack.event, TRANSCRIPT_COMPLETED);

        h.processor.follow_up(follow_up.unwrap()).await;

        let transcript = h.store.get_transcript("AC_C").await.unwrap().unwrap();
        assert_eq!(transcript.quality, TranscriptQuality::Broken);
        let analysis = h.store.get_analysis("AC_C").await.unwrap().unwrap();
        assert_eq!(analysis.score, 0);
        assert_eq!(analysis.compliance, Compliance::Review);
        assert_eq!(analysis.metadata["transcript_quality"], "broken");
        assert_eq!(h.scorer.invocations(), 0);
        assert_eq!(h.telephony.transcript_requests(), 0);
    }

    #[tokio::test]
    async fn test_transcript_event_corrects_duration_and_reroutes() {
        let h = harness();
        let (_, follow_up) = h
            .processor
            .receive(&call_completed("AC_FIX", "PN_MAIN", "incoming", 20))
            .await;
        assert!(follow_up.is_none(), "20s main-line call is below the threshold");

        let event = body(json!({
            "type": "call.transcript.completed",
            "data": {"object": {
                "callId": "AC_FIX",
                "status": "completed",
                "duration": 45,
                "dialogue": [
                    {"content": "Thanks for calling", "userId": "US1", "start": 0.0, "end": 1.5},
                    {"content": "Hi, I need a quote", "identifier": "+15551234567", "start": 1.6, "end": 3.0}
                ]
            }}
        }));
        let (ack, follow_up) = h.processor.receive(&event).await;
        assert!(ack.processed);

        let call = h.store.get_call("AC_FIX").await.unwrap().unwrap();
        assert_eq!(call.duration_secs, 45);
        assert_eq!(call.status.as_deref(), Some("completed"));
        assert_eq!(call.metadata["field_sources"]["duration_secs"], "webhook");
        assert_eq!(call.metadata["transcript_status"], "completed");
        assert_eq!(call.metadata["routing"]["should_analyze"], true);

        let follow_up = follow_up.unwrap();
        assert!(follow_up.routing.should_analyze);
        h.processor.follow_up(follow_up).await;

        assert_eq!(h.scorer.invocations(), 1);
        let analysis = h.store.get_analysis("AC_FIX").await.unwrap().unwrap();
        assert_eq!(analysis.score, 86);
        assert_eq!(analysis.direction, Direction::Inbound);
    }

    #[tokio::test]
    async fn test_transcript_event_does_not_erase_call_fields() {
        let h = harness();
        h.processor
            .receive(&call_completed("AC1", "PN_MAIN", "incoming", 45))
            .await;
        let event = body(json!({
            "type": "call.transcript.completed",
            "data": {"callId": "AC1", "dialogue": []}
        }));
        let (ack, _) = h.processor.receive(&event).await;
        assert!(ack.processed);

        let call = h.store.get_call("AC1").await.unwrap().unwrap();
        assert_eq!(call.direction, Some(Direction::Inbound));
        assert_eq!(call.duration_secs, 45);
        assert_eq!(call.phone_number_id.as_deref(), Some("PN_MAIN"));
        assert_eq!(call.from_number.as_deref(), Some("+15551234567"));
    }

    #[tokio::test]
    async fn test_duplicate_delivery_keeps_one_row() {
        let h = harness();
        let event = call_completed("AC_DUP", "PN_MAIN", "incoming", 10);
        h.processor.receive(&event).await;
        h.processor.receive(&event).await;
        assert_eq!(h.store.call_count(), 1);

        let transcript_event = body(json!({
            "type": "call.transcript.completed",
            "data": {"callId": "AC_DUP", "dialogue": [{"content": "Hello", "userId": "US1"}]}
        }));
        for _ in 0..2 {
            let (_, follow_up) = h.processor.receive(&transcript_event).await;
            h.processor.follow_up(follow_up.unwrap()).await;
        }
        assert_eq!(h.store.call_count(), 1);
        assert_eq!(h.store.transcript_count(), 1);
    }

    #[tokio::test]
    async fn test_unrouted_call_without_dialogue_has_no_follow_up() {
        let h = harness();
        let (ack, follow_up) = h
            .processor
            .receive(&call_completed("AC_SHORT", "PN_MAIN", "incoming", 12))
            .await;
        assert!(ack.processed);
        assert!(follow_up.is_none());

        let call = h.store.get_call("AC_SHORT").await.unwrap().unwrap();
        assert_eq!(call.metadata["routing"]["should_analyze"], false);
    }

    #[tokio::test]
    async fn test_bad_bodies_are_acknowledged_unprocessed() {
        let h = harness();

        let (ack, follow_up) = h.processor.receive(b"{not json").await;
        assert!(ack.received);
        assert!(!ack.processed);
        assert!(follow_up.is_none());

        let (ack, _) = h
            .processor
            .receive(&body(json!({"type": "contact.updated", "data": {"object": {}}})))
            .await;
        assert!(!ack.processed);
        assert_eq!(ack.event, "contact.updated");

        let (ack, _) = h
            .processor
            .receive(&body(json!({"type": "call.transcript.completed", "data": {"dialogue": []}})))
            .await;
        assert!(!ack.processed);

        assert_eq!(h.store.call_count(), 0);
        let heartbeat = h.store.latest_heartbeat().await.unwrap().unwrap();
        assert_eq!(heartbeat.event_type, TRANSCRIPT_COMPLETED);
    }

    #[tokio::test]
    async fn test_null_fields_do_not_drop_the_event() {
        let h = harness();
        let event = body(json!({
            "type": "call.completed",
            "data": {"object": {
                "id": "AC_NULLS",
                "direction": "outgoing",
                "status": "completed",
                "duration": 15,
                "phoneNumberId": "PN_OUT",
                "participants": null,
                "userId": null,
                "dialogue": null
            }}
        }));
        let (ack, _) = h.processor.receive(&event).await;
        assert!(ack.processed);

        let call = h.store.get_call("AC_NULLS").await.unwrap().unwrap();
        assert_eq!(call.direction, Some(Direction::Outbound));
        assert_eq!(call.duration_secs, 15);
        assert_eq!(call.user_id, None);
    }

    #[test]
    fn test_ack_serialization() {
        let ack = WebhookAck::new(CALL_COMPLETED, true, Some("AC1".to_string()));
        assert_eq!(
            serde_json::to_value(&ack).unwrap(),
            json!({"received": true, "processed": true, "event": "call.completed", "callId": "AC1"})
        );
        let unprocessed = WebhookAck::new("unknown", false, None);
        assert!(serde_json::to_value(&unprocessed).unwrap().get("callId").is_none());
    }

    #[test]
    fn test_both_shapes_unwrap_to_the_same_call() {
        let wrapped = WebhookEvent::parse(&call_completed("AC9", "PN_OUT", "outgoing", 3)).unwrap();
        let flat = WebhookEvent::parse(&body(json!({
            "type": "call.completed",
            "data": {"id": "AC9", "direction": "outgoing", "status": "completed", "duration": 3, "phoneNumberId": "PN_OUT"}
        })))
        .unwrap();

        let a = wrapped.1.extract().unwrap().unwrap().update;
        let b = flat.1.extract().unwrap().unwrap().update;
        assert_eq!(a.id, b.id);
        assert_eq!(a.direction, b.direction);
        assert_eq!(a.phone_number_id, b.phone_number_id);
        assert_eq!(a.duration_secs, b.duration_secs);
    }
}
