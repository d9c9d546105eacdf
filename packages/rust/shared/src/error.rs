//! Error types for Brain.
//!
//! Library crates use [`BrainError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Top-level error type for all Brain operations.
#[derive(Debug, thiserror::Error)]
pub enum BrainError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Inference service call failed (transport, timeout, status, or body).
    #[error("inference error ({failure}): {message}")]
    Inference {
        failure: InferenceFailure,
        message: String,
    },

    /// Knowledge-base search failed as a whole.
    #[error("search error: {0}")]
    Search(String),

    /// No file of a non-empty ranked list could be loaded.
    #[error("content load error: {0}")]
    ContentLoad(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Invalid caller input (empty query, unknown mode, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, BrainError>;

/// Why an inference call failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InferenceFailure {
    /// Connection refused, DNS failure, or any other transport error.
    Unreachable,
    /// The request did not complete within the configured timeout.
    Timeout,
    /// The service answered with a non-success HTTP status.
    Status,
    /// The response body could not be decoded.
    Unparseable,
}

impl fmt::Display for InferenceFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Unreachable => "unreachable",
            Self::Timeout => "timeout",
            Self::Status => "http status",
            Self::Unparseable => "unparseable response",
        };
        f.write_str(s)
    }
}

/// Coarse error classification surfaced in the caller-facing result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Config,
    Inference,
    Search,
    ContentLoad,
    Io,
    Validation,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Config => "config",
            Self::Inference => "inference",
            Self::Search => "search",
            Self::ContentLoad => "content_load",
            Self::Io => "io",
            Self::Validation => "validation",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl BrainError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create an inference error of the given failure class.
    pub fn inference(failure: InferenceFailure, msg: impl Into<String>) -> Self {
        Self::Inference {
            failure,
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Classify this error for the caller-facing result.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Config { .. } => ErrorKind::Config,
            Self::Inference { .. } => ErrorKind::Inference,
            Self::Search(_) => ErrorKind::Search,
            Self::ContentLoad(_) => ErrorKind::ContentLoad,
            Self::Io { .. } => ErrorKind::Io,
            Self::Validation { .. } => ErrorKind::Validation,
        }
    }

    /// Whether a controller-level retry may help.
    ///
    /// Only transport-level inference failures qualify; a malformed body or a
    /// 4xx status will not change on a second attempt.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Inference {
                failure: InferenceFailure::Unreachable | InferenceFailure::Timeout,
                ..
            }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = BrainError::config("max_files must be at least 1");
        assert_eq!(err.to_string(), "config error: max_files must be at least 1");

        let err = BrainError::inference(InferenceFailure::Timeout, "no reply after 120s");
        assert_eq!(err.to_string(), "inference error (timeout): no reply after 120s");
    }

    #[test]
    fn error_kinds() {
        assert_eq!(BrainError::Search("x".into()).kind(), ErrorKind::Search);
        assert_eq!(
            BrainError::ContentLoad("x".into()).kind().as_str(),
            "content_load"
        );
        assert_eq!(BrainError::validation("x").kind(), ErrorKind::Validation);
    }

    #[test]
    fn only_transport_failures_are_transient() {
        assert!(BrainError::inference(InferenceFailure::Unreachable, "refused").is_transient());
        assert!(BrainError::inference(InferenceFailure::Timeout, "slow").is_transient());
        assert!(!BrainError::inference(InferenceFailure::Status, "404").is_transient());
        assert!(!BrainError::Search("all terms failed".into()).is_transient());
    }
}
