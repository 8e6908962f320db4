use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::error::ScoringError;

pub const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";
const MESSAGES_URL: &str = "https://api.anthropic.com/v1/messages";

/// Configuration for the Anthropic API client
#[derive(Debug, Clone)]
pub struct AnthropicConfig {
    /// API key (from ANTHROPIC_API_KEY env var)
    pub api_key: String,
    /// Model to use (e.g., "claude-sonnet-4-20250514")
    pub model: String,
    /// Temperature (0-1, lower = more deterministic)
    pub temperature: f64,
    /// Maximum tokens in response
    pub max_tokens: u32,
}

impl AnthropicConfig {
    /// Create with custom settings
    pub fn new(api_key: String, model: String) -> Self {
        Self {
            api_key,
            model,
            temperature: 0.2,
            max_tokens: 4096,
        }
    }
}

/// A role-tagged message
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// The JSON shape the scoring function must return
#[derive(Debug, Clone)]
pub struct OutputSchema {
    pub name: &'static str,
    pub description: &'static str,
    pub schema: Value,
}

/// Input to the scoring function
#[derive(Debug, Clone)]
pub struct ScoringRequest {
    pub system: String,
    pub messages: Vec<ChatMessage>,
    pub output: OutputSchema,
}

/// Opaque scoring function: messages in, one schema-shaped JSON object out
#[async_trait]
pub trait Scorer: Send + Sync {
    /// Model identifier recorded alongside results
    fn model(&self) -> &str;

    async fn score(&self, request: &ScoringRequest) -> Result<Value, ScoringError>;
}

/// Anthropic API client. Structured output is obtained by forcing a single tool call
/// whose input schema is the requested output schema.
pub struct AnthropicScorer {
    client: Client,
    config: AnthropicConfig,
}

impl AnthropicScorer {
    pub fn new(config: AnthropicConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    fn build_request(&self, request: &ScoringRequest) -> AnthropicToolRequest {
        AnthropicToolRequest {
            model: self.config.model.clone(),
            max_tokens: self.config.max_tokens,
            temperature: Some(self.config.temperature),
            system: Some(request.system.clone()),
            messages: request.messages.clone(),
            tools: vec![Tool {
                name: request.output.name.to_string(),
                description: request.output.description.to_string(),
                input_schema: request.output.schema.clone(),
            }],
            tool_choice: Some(ToolChoice {
                choice_type: "tool".to_string(),
                name: request.output.name.to_string(),
            }),
        }
    }
}

#[async_trait]
impl Scorer for AnthropicScorer {
    fn model(&self) -> &str {
        &self.config.model
    }

    async fn score(&self, request: &ScoringRequest) -> Result<Value, ScoringError> {
        let body = self.build_request(request);

        let response = self
            .client
            .post(MESSAGES_URL)
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ScoringError::Api { status, body });
        }

        let response: AnthropicResponse = response
            .json()
            .await
            .map_err(|e| ScoringError::Decode(e.to_string()))?;

        extract_tool_input(response, request.output.name)
    }
}

/// Find the forced tool call in the response
fn extract_tool_input(response: AnthropicResponse, tool_name: &str) -> Result<Value, ScoringError> {
    response
        .content
        .into_iter()
        .find(|c| c.content_type == "tool_use" && c.name.as_deref() == Some(tool_name))
        .and_then(|c| c.input)
        .ok_or(ScoringError::MissingOutput)
}

#[derive(Debug, Serialize)]
struct AnthropicToolRequest {
    model: String,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<ChatMessage>,
    tools: Vec<Tool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<ToolChoice>,
}

#[derive(Debug, Serialize)]
struct Tool {
    name: String,
    description: String,
    input_schema: Value,
}

#[derive(Debug, Serialize)]
struct ToolChoice {
    #[serde(rename = "type")]
    choice_type: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    content_type: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    input: Option<Value>,
}
