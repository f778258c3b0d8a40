//! Error types for fetch-tracker
//!
//! Two kinds of failure live in this crate:
//! - [`Error`]: problems with the tracker itself (bad configuration, missing runtime,
//!   HTTP client construction). These are returned to the host from setup calls.
//! - [`FailureKind`]: a download failure observed on a tracked resource. These are
//!   recorded as data on the resource and reported through events. The original
//!   error is always handed back to the caller of the retriever untouched.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for fetch-tracker operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for fetch-tracker
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "tracked_files")
        key: Option<String>,
    },

    /// Tracking was started outside of a tokio runtime
    #[error("no tokio runtime available: {0}")]
    NoRuntime(String),

    /// HTTP client error (building the production retriever)
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Shorthand for a configuration error tied to a specific key
    pub(crate) fn config(key: &str, message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.to_string()),
        }
    }
}

/// How a tracked download failed
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The retrieval call itself failed before a response was obtained
    Transport,
    /// The body stream failed after a response was obtained
    StreamRead,
    /// Tracking stopped while the download was still running
    Incomplete,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureKind::Transport => write!(f, "transport error"),
            FailureKind::StreamRead => write!(f, "stream read error"),
            FailureKind::Incomplete => write!(f, "incomplete"),
        }
    }
}

/// A recorded download failure: what went wrong and the message of the original error
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadFailure {
    /// Failure classification
    pub kind: FailureKind,
    /// Display text of the underlying error
    pub message: String,
}

impl DownloadFailure {
    /// Create a failure record from any displayable error
    pub fn new(kind: FailureKind, error: &dyn std::fmt::Display) -> Self {
        Self {
            kind,
            message: error.to_string(),
        }
    }
}

impl std::fmt::Display for DownloadFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_carries_key_and_message() {
        let err = Error::config("report_interval", "must be greater than zero");
        match &err {
            Error::Config { message, key } => {
                assert_eq!(message, "must be greater than zero");
                assert_eq!(key.as_deref(), Some("report_interval"));
            }
            other => panic!("expected Config error, got {other:?}"),
        }
        assert_eq!(
            err.to_string(),
            "configuration error: must be greater than zero"
        );
    }

    #[test]
    fn download_failure_display_includes_kind() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset by peer");
        let failure = DownloadFailure::new(FailureKind::StreamRead, &io);
        assert_eq!(failure.to_string(), "stream read error: reset by peer");
    }

    #[test]
    fn failure_kind_serializes_snake_case() {
        let json = serde_json::to_string(&FailureKind::StreamRead).unwrap();
        assert_eq!(json, "\"stream_read\"");
    }
}
