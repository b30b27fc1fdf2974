//! Moodle web-service error types.

use thiserror::Error;

/// Errors that can occur when talking to the Moodle REST endpoint.
#[derive(Debug, Error)]
pub enum MoodleError {
    /// The server returned a 429 rate limit response.
    #[error("rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    /// The token was rejected at the HTTP level (401/403).
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Moodle answered 200 with an exception payload.
    #[error("WS error [{errorcode}]: {message}")]
    WebService { errorcode: String, message: String },

    /// The server returned an error status, or a body that could not be decoded.
    #[error("API error (HTTP {status}): {message}")]
    ApiError { status: u16, message: String },

    /// The request timed out.
    #[error("request timed out after {0}s")]
    Timeout(u64),

    /// A network error occurred.
    #[error("network error: {0}")]
    NetworkError(String),

    /// The client could not be configured.
    #[error("invalid client configuration: {0}")]
    Config(String),
}

impl MoodleError {
    /// Transient failures worth another attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            MoodleError::RateLimited { .. }
            | MoodleError::Timeout(_)
            | MoodleError::NetworkError(_) => true,
            MoodleError::ApiError { status, .. } => matches!(status, 500 | 502 | 503 | 504),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_statuses() {
        let api = |status| MoodleError::ApiError {
            status,
            message: String::new(),
        };
        assert!(api(503).is_retryable());
        assert!(api(500).is_retryable());
        assert!(!api(404).is_retryable());
        assert!(!api(0).is_retryable());
        assert!(MoodleError::RateLimited { retry_after_ms: 0 }.is_retryable());
        assert!(!MoodleError::AuthenticationFailed("no".into()).is_retryable());
        assert!(!MoodleError::WebService {
            errorcode: "invalidtoken".into(),
            message: "Invalid token".into(),
        }
        .is_retryable());
    }

    #[test]
    fn web_service_message() {
        let err = MoodleError::WebService {
            errorcode: "invalidrecord".into(),
            message: "Can't find data record".into(),
        };
        assert_eq!(
            err.to_string(),
            "WS error [invalidrecord]: Can't find data record"
        );
    }
}
