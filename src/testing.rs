//! Fakes and sample builders shared by unit tests

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::llm::{RubricVariant, Scorer, ScoringError, ScoringRequest};
use crate::routing::LinePolicy;
use crate::telephony::{
    CallPage, DialogueItem, ListCallsQuery, ProviderCall, TelephonyApi, TelephonyError,
    TranscriptPayload,
};

pub fn test_policy() -> LinePolicy {
    LinePolicy::new(Some("PN_MAIN".to_string()), Some("PN_OUT".to_string()))
}

pub fn provider_call(
    id: &str,
    line: &str,
    direction: &str,
    status: &str,
    duration: u32,
) -> ProviderCall {
    ProviderCall {
        id: id.to_string(),
        direction: Some(direction.to_string()),
        status: Some(status.to_string()),
        duration: Some(json!(duration)),
        created_at: Some("2026-03-02T15:04:05Z".to_string()),
        phone_number_id: Some(line.to_string()),
        participants: vec!["+15551234567".to_string()],
        ..Default::default()
    }
}

/// `(speaker, content)` pairs. Speakers starting with `US` are internal user ids,
/// an empty speaker leaves both speaker fields unset.
pub fn dialogue(lines: &[(&str, &str)]) -> Vec<DialogueItem> {
    lines
        .iter()
        .enumerate()
        .map(|(i, (speaker, content))| {
            let start = i as f64 * 2.0;
            let (identifier, user_id) = match *speaker {
                "" => (None, None),
                s if s.starts_with("US") => (None, Some(s.to_string())),
                s => (Some(s.to_string()), None),
            };
            DialogueItem {
                content: Some(content.to_string()),
                identifier,
                user_id,
                start: Some(start),
                end: Some(start + 1.5),
            }
        })
        .collect()
}

#[derive(Default)]
pub struct FakeTelephony {
    pages: Mutex<VecDeque<Result<CallPage, TelephonyError>>>,
    page_tokens: Mutex<Vec<Option<String>>>,
    transcripts: Mutex<HashMap<String, Vec<DialogueItem>>>,
    transcript_errors: Mutex<HashMap<String, TelephonyError>>,
    transcript_requests: AtomicUsize,
}

impl FakeTelephony {
    pub fn push_page(&self, items: Vec<ProviderCall>, next_page_token: Option<&str>) {
        self.pages.lock().unwrap().push_back(Ok(CallPage {
            items,
            next_page_token: next_page_token.map(str::to_string),
        }));
    }

    pub fn push_page_error(&self, error: TelephonyError) {
        self.pages.lock().unwrap().push_back(Err(error));
    }

    pub fn set_transcript(&self, call_id: &str, items: Vec<DialogueItem>) {
        self.transcripts
            .lock()
            .unwrap()
            .insert(call_id.to_string(), items);
    }

    pub fn fail_transcript(&self, call_id: &str, error: TelephonyError) {
        self.transcript_errors
            .lock()
            .unwrap()
            .insert(call_id.to_string(), error);
    }

    pub fn page_tokens(&self) -> Vec<Option<String>> {
        self.page_tokens.lock().unwrap().clone()
    }

    pub fn transcript_requests(&self) -> usize {
        self.transcript_requests.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TelephonyApi for FakeTelephony {
    async fn list_calls(&self, query: &ListCallsQuery) -> Result<CallPage, TelephonyError> {
        self.page_tokens
            .lock()
            .unwrap()
            .push(query.page_token.clone());
        self.pages
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(CallPage::default()))
    }

    async fn get_transcript(
        &self,
        call_id: &str,
    ) -> Result<Option<TranscriptPayload>, TelephonyError> {
        self.transcript_requests.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self.transcript_errors.lock().unwrap().remove(call_id) {
            return Err(error);
        }
        Ok(self
            .transcripts
            .lock()
            .unwrap()
            .get(call_id)
            .map(|items| TranscriptPayload {
                call_id: Some(call_id.to_string()),
                dialogue: Some(items.clone()),
                status: Some("completed".to_string()),
                ..Default::default()
            }))
    }
}

fn rubric_item(compliant: bool) -> Value {
    let score = if compliant { 9 } else { 2 };
    json!({"score": score, "compliant": compliant, "notes": ""})
}

pub fn inbound_response(score: Value) -> Value {
    json!({
        "score": score,
        "summary": "Caller asked about availability and booked a visit",
        "sentiment": "Positive",
        "notes": "",
        "greeting": rubric_item(true),
        "needs_assessment": rubric_item(true),
        "problem_solving": rubric_item(true),
        "scheduling": rubric_item(true),
        "empathy": rubric_item(true),
        "best_practices": ["Confirmed contact details"],
        "improvements": []
    })
}

pub fn outbound_response(score: Value, outcome: &str) -> Value {
    json!({
        "score": score,
        "summary": "Prospect agreed to a follow-up",
        "sentiment": "Neutral",
        "script_adherence": rubric_item(true),
        "objection_handling": rubric_item(true),
        "objections": [],
        "breakdown_point": null,
        "outcome": outcome
    })
}

/// Returns canned responses per rubric and counts invocations
pub struct FakeScorer {
    inbound: Value,
    outbound: Value,
    invocations: AtomicUsize,
    last_tool: Mutex<Option<String>>,
}

impl Default for FakeScorer {
    fn default() -> Self {
        Self::with_responses(inbound_response(json!(86)), outbound_response(json!(72), "Appointment"))
    }
}

impl FakeScorer {
    pub fn with_responses(inbound: Value, outbound: Value) -> Self {
        Self {
            inbound,
            outbound,
            invocations: AtomicUsize::new(0),
            last_tool: Mutex::new(None),
        }
    }

    pub fn invocations(&self) -> usize {
        self.invocations.load(Ordering::SeqCst)
    }

    pub fn last_tool(&self) -> Option<String> {
        self.last_tool.lock().unwrap().clone()
    }
}

#[async_trait]
impl Scorer for FakeScorer {
    fn model(&self) -> &str {
        "fake-model"
    }

    async fn score(&self, request: &ScoringRequest) -> Result<Value, ScoringError> {
        self.invocations.fetch_add(1, Ordering::SeqCst);
        *self.last_tool.lock().unwrap() = Some(request.output.name.to_string());
        if request.output.name == RubricVariant::Outbound.tool_name() {
            Ok(self.outbound.clone())
        } else {
            Ok(self.inbound.clone())
        }
    }
}
