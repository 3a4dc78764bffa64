//! Error types for TicketBridge
//!
//! Defines a comprehensive error enum covering all failure modes across the system.
//! Uses thiserror for ergonomic error handling.

use thiserror::Error;

/// Result type alias for TicketBridge operations
pub type Result<T> = std::result::Result<T, BridgeError>;

/// Comprehensive error type for TicketBridge operations
#[derive(Error, Debug)]
pub enum BridgeError {
    /// Configuration errors (bad settings file, missing env vars)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Tenant has no usable credentials. Surfaced to callers as a typed
    /// "not configured" result, never a 5xx.
    #[error("Tenant not configured: {0}")]
    NotConfigured(String),

    /// Webhook authentication errors. Mapped to 401 with no detail leaked.
    #[error("Authentication error: {0}")]
    Auth(String),

    /// Tracker API returned a non-2xx response. The body is logged
    /// internally and never included in client-facing responses.
    #[error("Upstream API error: HTTP {status}")]
    Upstream { status: u16, detail: String },

    /// OAuth token refresh failed terminally (revoked or expired grant)
    #[error("Token refresh failed: {0}")]
    TokenRefresh(String),

    /// Credential encryption/decryption errors
    #[error("Crypto error: {0}")]
    Crypto(String),

    /// Storage errors from the credential store
    #[error("Storage error: {0}")]
    Storage(String),

    /// Notification delivery errors
    #[error("Notify error: {0}")]
    Notify(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Other errors
    #[error("{0}")]
    Other(String),

    /// Anyhow errors (for more context)
    #[error("{0}")]
    Anyhow(#[from] anyhow::Error),
}

impl crate::retry::RetryableError for BridgeError {
    fn retry_decision(&self) -> crate::retry::RetryDecision {
        use crate::retry::RetryDecision;
        use std::time::Duration;

        match self {
            BridgeError::Http(e) => {
                // Connection and timeout errors are transient
                if e.is_connect() || e.is_timeout() {
                    RetryDecision::Retry
                } else if e.is_status() {
                    if let Some(status) = e.status() {
                        match status.as_u16() {
                            429 => RetryDecision::RetryAfter(Duration::from_secs(60)),
                            500..=599 => RetryDecision::Retry,
                            _ => RetryDecision::NoRetry,
                        }
                    } else {
                        RetryDecision::NoRetry
                    }
                } else {
                    RetryDecision::Retry
                }
            }
            BridgeError::Upstream { status, .. } => match status {
                429 => RetryDecision::RetryAfter(Duration::from_secs(60)),
                500..=599 => RetryDecision::Retry,
                _ => RetryDecision::NoRetry,
            },
            // Everything else is permanent for this request
            _ => RetryDecision::NoRetry,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::{RetryDecision, RetryableError};

    #[test]
    fn test_upstream_server_errors_retry() {
        let err = BridgeError::Upstream {
            status: 503,
            detail: "gateway".to_string(),
        };
        assert_eq!(err.retry_decision(), RetryDecision::Retry);
    }

    #[test]
    fn test_upstream_client_errors_do_not_retry() {
        let err = BridgeError::Upstream {
            status: 404,
            detail: "missing".to_string(),
        };
        assert_eq!(err.retry_decision(), RetryDecision::NoRetry);
    }

    #[test]
    fn test_auth_errors_do_not_retry() {
        let err = BridgeError::Auth("bad signature".to_string());
        assert_eq!(err.retry_decision(), RetryDecision::NoRetry);
    }

    #[test]
    fn test_upstream_display_hides_detail() {
        let err = BridgeError::Upstream {
            status: 500,
            detail: "stack trace with internals".to_string(),
        };
        assert!(!err.to_string().contains("stack trace"));
    }
}
