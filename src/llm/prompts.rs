use serde::Serialize;
use serde_json::{Value, json};

use super::client::{ChatMessage, OutputSchema, ScoringRequest};
use crate::models::{Call, Direction};

/// Which rubric a call is scored against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RubricVariant {
    Inbound,
    Outbound,
}

impl RubricVariant {
    pub fn for_direction(direction: Direction) -> Self {
        match direction {
            Direction::Inbound => RubricVariant::Inbound,
            Direction::Outbound => RubricVariant::Outbound,
        }
    }

    pub fn tool_name(&self) -> &'static str {
        match self {
            RubricVariant::Inbound => "submit_inbound_analysis",
            RubricVariant::Outbound => "submit_outbound_analysis",
        }
    }

    pub fn system_prompt(&self) -> &'static str {
        match self {
            RubricVariant::Inbound => INBOUND_SYSTEM_PROMPT,
            RubricVariant::Outbound => OUTBOUND_SYSTEM_PROMPT,
        }
    }

    pub fn output_schema(&self) -> OutputSchema {
        match self {
            RubricVariant::Inbound => OutputSchema {
                name: self.tool_name(),
                description: "Submit the quality assessment of an inbound customer call",
                schema: inbound_schema(),
            },
            RubricVariant::Outbound => OutputSchema {
                name: self.tool_name(),
                description: "Submit the quality assessment of an outbound sales call",
                schema: outbound_schema(),
            },
        }
    }
}

pub const INBOUND_SYSTEM_PROMPT: &str = r#"You are a call quality analyst reviewing inbound customer calls handled by front-desk staff.

Score the call from 0 to 100 against this rubric:
1. Greeting: the agent answers promptly, names the business and themselves, and sounds welcoming.
2. Needs assessment: the agent asks open questions to understand why the caller is calling.
3. Problem solving: the agent resolves the request or gives a clear next step.
4. Scheduling: the agent offers to book, confirms date, time and contact details when relevant.
5. Empathy: the agent acknowledges the caller's situation and keeps a courteous tone.

For each rubric item give a 0-10 score, whether the agent was compliant, and a short note.
List concrete best practices the agent demonstrated and concrete improvements.
Base every judgement only on the transcript. If the transcript is too short to judge an item, mark it not compliant and say so in the note.
Submit the result with the provided tool."#;

pub const OUTBOUND_SYSTEM_PROMPT: &str = r#"You are a sales call analyst reviewing outbound calls made by sales representatives.

Score the call from 0 to 100 considering:
1. Script adherence: introduction, qualification questions, value pitch and close were delivered.
2. Objection handling: each objection the prospect raised was acknowledged and answered.

Also report:
- every objection raised, the representative's response, and whether it was handled
- the breakdown point: the stage where the call stopped progressing (Introduction, Qualification, Pitch, Objection Handling, Close), or null if it never broke down
- the outcome: one of "Appointment", "Callback Scheduled", "Not Interested", "No Decision", "Voicemail", "Wrong Number"

Base every judgement only on the transcript. Submit the result with the provided tool."#;

/// Build the user message for a call
pub fn build_user_prompt(call: &Call, transcript_text: &str) -> String {
    let mut prompt = String::new();

    prompt.push_str("# Call\n");
    prompt.push_str(&format!("Call ID: {}\n", call.id));
    if let Some(direction) = call.direction {
        prompt.push_str(&format!("Direction: {}\n", direction.as_str()));
    }
    prompt.push_str(&format!("Duration: {}s\n", call.duration_secs));
    prompt.push_str(&format!("Started: {}\n", call.created_at.to_rfc3339()));
    if let Some(from) = &call.from_number {
        prompt.push_str(&format!("From: {}\n", from));
    }
    if let Some(to) = &call.to_number {
        prompt.push_str(&format!("To: {}\n", to));
    }
    prompt.push('\n');

    prompt.push_str("# Transcript\n");
    prompt.push_str(transcript_text.trim());
    prompt.push_str("\n\n");

    prompt.push_str("Analyze this call and submit your assessment.\n");
    prompt
}

pub fn build_scoring_request(
    variant: RubricVariant,
    call: &Call,
    transcript_text: &str,
) -> ScoringRequest {
    ScoringRequest {
        system: variant.system_prompt().to_string(),
        messages: vec![ChatMessage::user(build_user_prompt(call, transcript_text))],
        output: variant.output_schema(),
    }
}

fn rubric_item_schema(description: &str) -> Value {
    json!({
        "type": "object",
        "description": description,
        "properties": {
            "score": {"type": "number", "minimum": 0, "maximum": 10},
            "compliant": {"type": "boolean"},
            "notes": {"type": "string"}
        },
        "required": ["score", "compliant", "notes"]
    })
}

fn shared_properties() -> serde_json::Map<String, Value> {
    let mut props = serde_json::Map::new();
    props.insert(
        "score".into(),
        json!({"type": "integer", "minimum": 0, "maximum": 100, "description": "Overall call score"}),
    );
    props.insert("summary".into(), json!({"type": "string"}));
    props.insert(
        "sentiment".into(),
        json!({"type": "string", "enum": ["Positive", "Neutral", "Negative"]}),
    );
    props.insert("notes".into(), json!({"type": "string"}));
    props
}

pub fn inbound_schema() -> Value {
    let mut props = shared_properties();
    props.insert("greeting".into(), rubric_item_schema("Greeting quality"));
    props.insert("needs_assessment".into(), rubric_item_schema("Needs assessment"));
    props.insert("problem_solving".into(), rubric_item_schema("Problem solving"));
    props.insert("scheduling".into(), rubric_item_schema("Scheduling"));
    props.insert("empathy".into(), rubric_item_schema("Empathy and tone"));
    props.insert(
        "best_practices".into(),
        json!({"type": "array", "items": {"type": "string"}}),
    );
    props.insert(
        "improvements".into(),
        json!({"type": "array", "items": {"type": "string"}}),
    );

    json!({
        "type": "object",
        "properties": props,
        "required": [
            "score", "summary", "sentiment", "greeting", "needs_assessment",
            "problem_solving", "scheduling", "empathy", "best_practices"
        ]
    })
}

pub fn outbound_schema() -> Value {
    let mut props = shared_properties();
    props.insert("script_adherence".into(), rubric_item_schema("Script adherence"));
    props.insert("objection_handling".into(), rubric_item_schema("Objection handling"));
    props.insert(
        "objections".into(),
        json!({
            "type": "array",
            "items": {
                "type": "object",
                "properties": {
                    "objection": {"type": "string"},
                    "response": {"type": "string"},
                    "handled": {"type": "boolean"}
                },
                "required": ["objection", "handled"]
            }
        }),
    );
    props.insert(
        "breakdown_point".into(),
        json!({
            "type": ["string", "null"],
            "enum": ["Introduction", "Qualification", "Pitch", "Objection Handling", "Close", null]
        }),
    );
    props.insert(
        "outcome".into(),
        json!({
            "type": "string",
            "enum": ["Appointment", "Callback Scheduled", "Not Interested", "No Decision", "Voicemail", "Wrong Number"]
        }),
    );

    json!({
        "type": "object",
        "properties": props,
        "required": [
            "score", "summary", "sentiment", "script_adherence", "objection_handling",
            "objections", "outcome"
        ]
    })
}
