use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use thiserror::Error;
use tracing::{info, warn};

use crate::ingest::normalize::classify_text;
use crate::llm::{
    RetryPolicy, RubricVariant, Scorer, ScoringError, ValidationError, build_scoring_request,
    parse_assessment, retry_with_backoff,
};
use crate::models::{Analysis, Direction, TranscriptQuality};
use crate::routing::LinePolicy;
use crate::store::{CallStore, StoreError};

pub const DEFAULT_SCORING_TIMEOUT: Duration = Duration::from_secs(60);

/// Configuration for the analysis dispatcher
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Retry policy for transient scoring failures
    pub retry: RetryPolicy,
    /// Per-attempt timeout on the scoring call
    pub scoring_timeout: Duration,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            scoring_timeout: DEFAULT_SCORING_TIMEOUT,
        }
    }
}

/// A request to analyze one call
#[derive(Debug, Clone, Default)]
pub struct AnalyzeRequest {
    pub call_id: String,
    /// Already-rendered transcript text; looked up in the store when absent
    pub transcript_text: Option<String>,
    /// Quality the normalizer assigned to `transcript_text`
    pub quality: Option<TranscriptQuality>,
    /// Overrides the call's stored direction
    pub direction: Option<Direction>,
    /// Overrides the call's stored line for routing provenance
    pub line_id: Option<String>,
}

impl AnalyzeRequest {
    pub fn new(call_id: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            ..Default::default()
        }
    }
}

/// Result reported to callers. Never an `Err`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalyzeOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AnalyzeOutcome {
    pub fn scored(score: u8) -> Self {
        Self {
            success: true,
            score: Some(score),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            score: None,
            error: Some(error.into()),
        }
    }
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Call not found")]
    CallNotFound,
    #[error("Transcript not found")]
    TranscriptNotFound,
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error(transparent)]
    Scoring(#[from] ScoringError),
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),
}

/// Runs the scoring function for a call and owns all writes to analyses
pub struct AnalysisDispatcher {
    store: Arc<dyn CallStore>,
    scorer: Arc<dyn Scorer>,
    policy: LinePolicy,
    config: DispatchConfig,
}

impl AnalysisDispatcher {
    pub fn new(
        store: Arc<dyn CallStore>,
        scorer: Arc<dyn Scorer>,
        policy: LinePolicy,
        config: DispatchConfig,
    ) -> Self {
        Self {
            store,
            scorer,
            policy,
            config,
        }
    }

    pub fn policy(&self) -> &LinePolicy {
        &self.policy
    }

    /// Analyze a call, catching every failure into the outcome
    pub async fn analyze(&self, request: AnalyzeRequest) -> AnalyzeOutcome {
        let call_id = request.call_id.clone();
        match self.run(request).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(call_id = %call_id, "analysis failed: {}", e);
                AnalyzeOutcome::failed(e.to_string())
            }
        }
    }

    /// 1. Load the call
    /// 2. Resolve the transcript text
    /// 3. Short-circuit empty or broken transcripts with a placeholder
    /// 4. Score against the direction's rubric
    /// 5. Validate the response
    /// 6. Derive compliance
    /// 7. Persist
    async fn run(&self, request: AnalyzeRequest) -> Result<AnalyzeOutcome, DispatchError> {
        let call = self
            .store
            .get_call(&request.call_id)
            .await?
            .ok_or(DispatchError::CallNotFound)?;

        let (text, quality) = match request.transcript_text {
            Some(text) => {
                let quality = resolve_quality(request.quality, &text);
                (text, quality)
            }
            None => {
                let transcript = self
                    .store
                    .get_transcript(&call.id)
                    .await?
                    .ok_or(DispatchError::TranscriptNotFound)?;
                let quality = resolve_quality(Some(transcript.quality), &transcript.text);
                (transcript.text, quality)
            }
        };

        let direction = request
            .direction
            .or(call.direction)
            .unwrap_or(Direction::Inbound);
        let line_id = request
            .line_id
            .as_deref()
            .or(call.phone_number_id.as_deref());
        let routing = self.policy.evaluate(line_id, call.direction, call.duration_secs);
        let variant = RubricVariant::for_direction(direction);

        if !quality.is_analyzable() {
            let metadata = json!({
                "routing": routing.to_metadata(),
                "line_id": line_id,
                "transcript_quality": quality.as_str(),
                "rubric": null,
            });
            let analysis =
                Analysis::placeholder(&call.id, direction, quality, metadata, Utc::now());
            self.store.save_analysis(&analysis).await?;
            info!(
                call_id = %call.id,
                quality = quality.as_str(),
                "transcript not analyzable, stored placeholder result"
            );
            return Ok(AnalyzeOutcome::scored(0));
        }

        let scoring_request = build_scoring_request(variant, &call, &text);
        let scorer = &self.scorer;
        let request_ref = &scoring_request;
        let timeout = self.config.scoring_timeout;

        let response = retry_with_backoff(
            &self.config.retry,
            ScoringError::is_transient,
            move |_| async move {
                match tokio::time::timeout(timeout, scorer.score(request_ref)).await {
                    Ok(result) => result,
                    Err(_) => Err(ScoringError::Timeout(timeout)),
                }
            },
        )
        .await?;

        let validated = parse_assessment(variant, response)?;
        let compliance = validated.assessment.compliance();

        let analysis = Analysis {
            call_id: call.id.clone(),
            direction,
            score: validated.score,
            summary: validated.assessment.summary().to_string(),
            compliance,
            sentiment: validated.assessment.sentiment(),
            notes: validated.assessment.notes().to_string(),
            metadata: json!({
                "routing": routing.to_metadata(),
                "line_id": line_id,
                "transcript_quality": quality.as_str(),
                "rubric": validated.assessment.to_metadata(),
                "model": self.scorer.model(),
            }),
            analyzed_at: Utc::now(),
        };
        let outcome = self.store.save_analysis(&analysis).await?;

        info!(
            call_id = %call.id,
            score = analysis.score,
            compliance = compliance.as_str(),
            variant = ?variant,
            outcome = ?outcome,
            "analysis stored"
        );

        Ok(AnalyzeOutcome::scored(analysis.score))
    }
}

/// A label from normalization wins unless it says valid; the text is still
/// checked then, since it may carry the broken marker.
fn resolve_quality(recorded: Option<TranscriptQuality>, text: &str) -> TranscriptQuality {
    match recorded {
        Some(quality) if !quality.is_analyzable() => quality,
        _ => classify_text(text),
    }
}
