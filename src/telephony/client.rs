use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::Client;
use tracing::debug;

use super::error::{TelephonyError, map_status};
use super::payload::{CallListResponse, ProviderCall, TranscriptPayload, TranscriptResponse};

pub const DEFAULT_BASE_URL: &str = "https://api.openphone.com/v1";
pub const DEFAULT_PAGE_SIZE: u32 = 100;

/// Configuration for the telephony API client
#[derive(Debug, Clone)]
pub struct OpenPhoneConfig {
    /// API key (from OPENPHONE_API_KEY env var)
    pub api_key: String,
    /// Base URL without a trailing slash
    pub base_url: String,
}

impl OpenPhoneConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }
}

/// Parameters for one `GET /calls` request
#[derive(Debug, Clone)]
pub struct ListCallsQuery {
    pub phone_number_id: String,
    /// Only included in the request when non-empty
    pub participants: Vec<String>,
    pub user_id: Option<String>,
    pub created_after: DateTime<Utc>,
    pub created_before: DateTime<Utc>,
    pub page_token: Option<String>,
    pub max_results: u32,
}

impl ListCallsQuery {
    pub fn to_params(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("phoneNumberId", self.phone_number_id.clone()),
            ("maxResults", self.max_results.to_string()),
            (
                "createdAfter",
                self.created_after.to_rfc3339_opts(SecondsFormat::Secs, true),
            ),
            (
                "createdBefore",
                self.created_before.to_rfc3339_opts(SecondsFormat::Secs, true),
            ),
        ];
        if let Some(token) = &self.page_token {
            params.push(("pageToken", token.clone()));
        }
        for participant in &self.participants {
            params.push(("participants[]", participant.clone()));
        }
        if let Some(user_id) = &self.user_id {
            params.push(("userId", user_id.clone()));
        }
        params
    }
}

/// One page of calls
#[derive(Debug, Clone, Default)]
pub struct CallPage {
    pub items: Vec<ProviderCall>,
    /// `None` on the final page
    pub next_page_token: Option<String>,
}

/// The provider operations the pipelines depend on
#[async_trait]
pub trait TelephonyApi: Send + Sync {
    async fn list_calls(&self, query: &ListCallsQuery) -> Result<CallPage, TelephonyError>;

    /// `Ok(None)` means the provider has no transcript for this call yet
    async fn get_transcript(
        &self,
        call_id: &str,
    ) -> Result<Option<TranscriptPayload>, TelephonyError>;
}

/// HTTP client for the OpenPhone public API
pub struct OpenPhoneClient {
    client: Client,
    config: OpenPhoneConfig,
}

impl OpenPhoneClient {
    /// Fails with `MissingCredential` before any request is made when no key is set
    pub fn new(config: OpenPhoneConfig) -> Result<Self, TelephonyError> {
        if config.api_key.trim().is_empty() {
            return Err(TelephonyError::MissingCredential);
        }
        Ok(Self {
            client: Client::new(),
            config,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }
}

#[async_trait]
impl TelephonyApi for OpenPhoneClient {
    async fn list_calls(&self, query: &ListCallsQuery) -> Result<CallPage, TelephonyError> {
        debug!(
            phone_number_id = %query.phone_number_id,
            page_token = ?query.page_token,
            "listing calls"
        );

        let response = self
            .client
            .get(self.url("/calls"))
            .header("Authorization", &self.config.api_key)
            .query(&query.to_params())
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(map_status(status.as_u16(), &body));
        }

        let page: CallListResponse = serde_json::from_str(&body)?;
        Ok(CallPage {
            items: page.data,
            next_page_token: page.next_page_token.filter(|t| !t.is_empty()),
        })
    }

    async fn get_transcript(
        &self,
        call_id: &str,
    ) -> Result<Option<TranscriptPayload>, TelephonyError> {
        let response = self
            .client
            .get(self.url(&format!("/call-transcripts/{}", call_id)))
            .header("Authorization", &self.config.api_key)
            .send()
            .await?;

        let status = response.status();
        if status.as_u16() == 404 {
            debug!(call_id, "no transcript available yet");
            return Ok(None);
        }

        let body = response.text().await?;
        if !status.is_success() {
            return Err(map_status(status.as_u16(), &body));
        }

        let transcript: TranscriptResponse = serde_json::from_str(&body)?;
        Ok(Some(transcript.data))
    }
}
