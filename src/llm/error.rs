use std::time::Duration;

use thiserror::Error;

/// Failures from the scoring function
#[derive(Debug, Error)]
pub enum ScoringError {
    #[error("scoring request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("scoring request timed out after {0:?}")]
    Timeout(Duration),
    #[error("scoring API error: {status} - {body}")]
    Api { status: u16, body: String },
    #[error("no structured output in scoring response")]
    MissingOutput,
    #[error("failed to decode scoring response: {0}")]
    Decode(String),
}

impl ScoringError {
    /// Transport problems, timeouts, rate limits and server errors are worth retrying.
    /// Anything about the shape of the response is not.
    pub fn is_transient(&self) -> bool {
        match self {
            ScoringError::Transport(_) | ScoringError::Timeout(_) => true,
            ScoringError::Api { status, .. } => *status == 429 || *status >= 500,
            ScoringError::MissingOutput | ScoringError::Decode(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(ScoringError::Timeout(Duration::from_secs(1)).is_transient());
        assert!(ScoringError::Api { status: 429, body: String::new() }.is_transient());
        assert!(ScoringError::Api { status: 529, body: String::new() }.is_transient());
        assert!(!ScoringError::Api { status: 401, body: String::new() }.is_transient());
        assert!(!ScoringError::MissingOutput.is_transient());
        assert!(!ScoringError::Decode("bad".into()).is_transient());
    }
}
