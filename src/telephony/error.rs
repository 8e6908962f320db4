use thiserror::Error;

/// Failures talking to the telephony provider
#[derive(Debug, Error)]
pub enum TelephonyError {
    #[error("telephony API key is not configured")]
    MissingCredential,
    #[error("telephony API credential invalid")]
    InvalidCredential,
    #[error("{0}")]
    NotFound(String),
    #[error("unknown line id (phoneNumberId not recognized by provider)")]
    UnknownLine,
    #[error("malformed participant filter")]
    MalformedParticipants,
    #[error("telephony API error {status}: {message}")]
    Api { status: u16, message: String },
    #[error("telephony request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("failed to decode telephony response: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Map a non-2xx provider response to a typed failure
pub fn map_status(status: u16, body: &str) -> TelephonyError {
    let message = provider_message(body);
    match status {
        401 => TelephonyError::InvalidCredential,
        404 => TelephonyError::NotFound(message),
        400 if message.contains("phoneNumberId") => TelephonyError::UnknownLine,
        400 if message.contains("participants") => TelephonyError::MalformedParticipants,
        _ => TelephonyError::Api { status, message },
    }
}

/// The provider puts a human message in `message`; fall back to the raw body
fn provider_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(String::from))
        .unwrap_or_else(|| body.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert!(matches!(map_status(401, ""), TelephonyError::InvalidCredential));
        assert!(matches!(
            map_status(400, r#"{"message": "Invalid phoneNumberId"}"#),
            TelephonyError::UnknownLine
        ));
        assert!(matches!(
            map_status(400, r#"{"message": "participants must be an array"}"#),
            TelephonyError::MalformedParticipants
        ));

        match map_status(404, r#"{"message": "Call AC9 not found"}"#) {
            TelephonyError::NotFound(msg) => assert_eq!(msg, "Call AC9 not found"),
            other => panic!("unexpected {other:?}"),
        }

        match map_status(503, "upstream unavailable") {
            TelephonyError::Api { status, message } => {
                assert_eq!(status, 503);
                assert_eq!(message, "upstream unavailable");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_credential_message() {
        assert!(
            TelephonyError::InvalidCredential
                .to_string()
                .contains("credential invalid")
        );
    }
}
