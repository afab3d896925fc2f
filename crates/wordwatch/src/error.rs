//! Error types for wordwatch.
//!
//! This module defines the error types used throughout the wordwatch crate.
//! Matching itself never fails: normalization, tokenization and matching are
//! total over any `&str`. Errors only arise at the configuration boundary
//! (settings, pattern payloads, lexicon files) and in the binary's I/O.

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for wordwatch operations.
#[derive(Error, Debug)]
pub enum Error {
    // === Configuration Errors ===
    /// Failed to load configuration.
    #[error("failed to load configuration: {0}")]
    ConfigLoad(Box<figment::Error>),

    /// Configuration validation failed.
    #[error("invalid configuration: {message}")]
    ConfigValidation {
        /// Description of the validation failure.
        message: String,
    },

    // === Pattern Errors ===
    /// A pattern payload was rejected.
    #[error("invalid pattern payload: {message}")]
    InvalidPatterns {
        /// Description of what was wrong with the payload.
        message: String,
    },

    // === Lexicon Errors ===
    /// Failed to read a lexicon word list.
    #[error("failed to read lexicon at {path}: {source}")]
    LexiconRead {
        /// Path to the word list.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    // === I/O Errors ===
    /// File system operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // === Serialization Errors ===
    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // === Generic Errors ===
    /// An internal error occurred (bug).
    #[error("internal error: {0}")]
    Internal(String),
}

/// A specialized Result type for wordwatch operations.
pub type Result<T> = std::result::Result<T, Error>;

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Self::ConfigLoad(Box::new(err))
    }
}

impl Error {
    /// Create a new configuration validation error.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::ConfigValidation {
            message: message.into(),
        }
    }

    /// Create a new pattern payload error.
    #[must_use]
    pub fn invalid_patterns(message: impl Into<String>) -> Self {
        Self::InvalidPatterns {
            message: message.into(),
        }
    }

    /// Create a new internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Check if this error came from a rejected configuration or payload.
    #[must_use]
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::ConfigLoad(_) | Self::ConfigValidation { .. } | Self::InvalidPatterns { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::validation("min_occurrences must be at least 1");
        assert_eq!(
            err.to_string(),
            "invalid configuration: min_occurrences must be at least 1"
        );

        let err = Error::invalid_patterns("duplicate id 'p1'");
        assert_eq!(err.to_string(), "invalid pattern payload: duplicate id 'p1'");
    }

    #[test]
    fn test_internal_error() {
        let err = Error::internal("something went wrong");
        assert_eq!(err.to_string(), "internal error: something went wrong");
    }

    #[test]
    fn test_is_config_error() {
        assert!(Error::validation("x").is_config_error());
        assert!(Error::invalid_patterns("x").is_config_error());
        assert!(!Error::internal("x").is_config_error());
    }

    #[test]
    fn test_lexicon_read_error_display() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "no such file");
        let err = Error::LexiconRead {
            path: PathBuf::from("/missing/words.txt"),
            source: io_err,
        };
        let msg = err.to_string();
        assert!(msg.contains("/missing/words.txt"));
        assert!(msg.contains("no such file"));
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn test_from_json_error() {
        let json_result: std::result::Result<i32, serde_json::Error> =
            serde_json::from_str("not valid json");
        if let Err(json_err) = json_result {
            let err: Error = json_err.into();
            assert!(matches!(err, Error::Json(_)));
        }
    }
}
