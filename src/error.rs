//! Error types for cache operations
//!
//! The remote store client is fail-open: none of these errors ever reach a
//! caller of the read path. They exist so the client can classify what went
//! wrong (and decide whether to trip its circuit breaker), and so
//! configuration loading can report bad input.

use thiserror::Error;

/// Main error type for cache and store operations
#[derive(Error, Debug)]
pub enum CacheError {
    /// Network-level failure talking to the remote store
    #[error("Transport error: {0}")]
    Transport(String),

    /// The remote store did not answer within the configured timeout
    #[error("Request timed out after {timeout_ms}ms: {action}")]
    Timeout { timeout_ms: u64, action: String },

    /// Non-2xx HTTP status from the remote store
    #[error("Remote store returned status {status} for {action}")]
    Status { status: u16, action: String },

    /// Response body was not the expected `{success, result}` shape
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// The remote store answered `success: false`
    #[error("Remote store rejected {action}")]
    Rejected { action: String },

    /// The circuit breaker is open; no request was made
    #[error("Circuit open: remote store disabled")]
    CircuitOpen,

    /// Serialization/Deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl CacheError {
    /// Whether this failure should trip the circuit breaker.
    ///
    /// Hard failures mean the backend is unreachable or broken. A 4xx or an
    /// explicit `success: false` proves the backend is alive, so those only
    /// count as a miss.
    pub fn is_hard_failure(&self) -> bool {
        match self {
            CacheError::Transport(_)
            | CacheError::Timeout { .. }
            | CacheError::MalformedResponse(_) => true,
            CacheError::Status { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

/// Result type alias for cache operations
pub type Result<T> = std::result::Result<T, CacheError>;

impl From<serde_json::Error> for CacheError {
    fn from(e: serde_json::Error) -> Self {
        CacheError::Serialization(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = CacheError::Transport("connection refused".to_string());
        assert_eq!(error.to_string(), "Transport error: connection refused");

        let timeout_error = CacheError::Timeout {
            timeout_ms: 5000,
            action: "get".to_string(),
        };
        assert!(timeout_error.to_string().contains("timed out after 5000ms"));

        let status_error = CacheError::Status {
            status: 503,
            action: "set".to_string(),
        };
        assert!(status_error.to_string().contains("503"));
    }

    #[test]
    fn test_hard_failure_classification() {
        assert!(CacheError::Transport("reset".into()).is_hard_failure());
        assert!(CacheError::MalformedResponse("eof".into()).is_hard_failure());
        assert!(CacheError::Timeout {
            timeout_ms: 10,
            action: "get".into()
        }
        .is_hard_failure());
        assert!(CacheError::Status {
            status: 502,
            action: "get".into()
        }
        .is_hard_failure());

        assert!(!CacheError::Status {
            status: 404,
            action: "get".into()
        }
        .is_hard_failure());
        assert!(!CacheError::Rejected {
            action: "set".into()
        }
        .is_hard_failure());
        assert!(!CacheError::CircuitOpen.is_hard_failure());
    }

    #[test]
    fn test_serde_error_conversion() {
        let parse = serde_json::from_str::<serde_json::Value>("{not json");
        let error: CacheError = parse.unwrap_err().into();
        assert!(matches!(error, CacheError::Serialization(_)));
    }
}
