//! Error types for Debrief.
//!
//! Library crates use [`DebriefError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all Debrief operations.
#[derive(Debug, thiserror::Error)]
pub enum DebriefError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Network/HTTP error while talking to a remote service or fetching an article.
    #[error("network error: {0}")]
    Network(String),

    /// Embedding-map service error (unexpected payload, missing projection).
    #[error("atlas error: {0}")]
    Atlas(String),

    /// HTML, JSON, or tile decoding error.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Database or storage layer error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Language-model API or response error.
    #[error("llm error: {0}")]
    Llm(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (bad input, empty result set, blocked URL, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, DebriefError>;

impl DebriefError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
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
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = DebriefError::config("missing API key");
        assert_eq!(err.to_string(), "config error: missing API key");

        let err = DebriefError::validation("no relevant headlines");
        assert!(err.to_string().contains("no relevant headlines"));

        let err = DebriefError::Atlas("project has no projections".into());
        assert_eq!(err.to_string(), "atlas error: project has no projections");
    }

    #[test]
    fn io_error_keeps_path() {
        let err = DebriefError::io(
            "/tmp/debrief/out.json",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        let msg = err.to_string();
        assert!(msg.contains("/tmp/debrief/out.json"));
        assert!(msg.contains("denied"));
    }
}
