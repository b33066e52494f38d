//! Error types for GitScout.
//!
//! Defines the error taxonomy for the retrieval core: transport, parse,
//! rate-limit, not-found, and local I/O failures each get their own variant so
//! the retry wrapper and the fallback logic can dispatch on them.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the GitScout library.
#[derive(Debug, Error)]
pub enum GitScoutError {
    // Network errors
    #[error("Network error: {message}")]
    Network {
        message: String,
        /// Optional cause description
        cause: Option<String>,
    },

    #[error("Request timeout after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Rate limited by {service}")]
    RateLimited {
        service: String,
        /// Unix timestamp when the limit resets, if the server said so.
        reset_epoch: Option<u64>,
    },

    #[error("API error: {message}")]
    Api {
        message: String,
        status_code: Option<u16>,
    },

    #[error("Not found: {what}")]
    NotFound { what: String },

    // Parse errors (malformed JSON, HTML markup drift)
    #[error("Parse error: {message}")]
    Parse { message: String },

    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    // File system errors
    #[error("IO error at {path:?}: {message}")]
    Io {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<std::io::Error>,
    },

    // Download errors
    #[error("Download failed for {url}: {message}")]
    DownloadFailed { url: String, message: String },

    #[error("Download cancelled")]
    DownloadCancelled,

    // File content retrieval exhausted every strategy
    #[error("Could not retrieve content for {path}: {message}")]
    ContentUnavailable { path: String, message: String },

    // Connectivity gate
    #[error("Network unavailable")]
    Offline,

    // Git subprocess errors
    #[error("Git operation failed: {message}")]
    Git { message: String },

    // Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    // Generic errors
    #[error("{0}")]
    Other(String),
}

/// Result type alias for GitScout operations.
pub type Result<T> = std::result::Result<T, GitScoutError>;

// Conversion implementations for common error types

impl From<std::io::Error> for GitScoutError {
    fn from(err: std::io::Error) -> Self {
        GitScoutError::Io {
            message: err.to_string(),
            path: None,
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for GitScoutError {
    fn from(err: serde_json::Error) -> Self {
        GitScoutError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<reqwest::Error> for GitScoutError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            GitScoutError::Timeout(std::time::Duration::from_secs(0))
        } else {
            GitScoutError::Network {
                cause: std::error::Error::source(&err).map(|s| s.to_string()),
                message: err.to_string(),
            }
        }
    }
}

impl GitScoutError {
    /// Create an IO error with path context.
    pub fn io_with_path(err: std::io::Error, path: impl Into<PathBuf>) -> Self {
        GitScoutError::Io {
            message: err.to_string(),
            path: Some(path.into()),
            source: Some(err),
        }
    }

    /// Check if this error should trigger a retry.
    ///
    /// Not-found is deliberately excluded: a 404 is a terminal answer, not a
    /// transient condition.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            GitScoutError::Network { .. }
                | GitScoutError::Timeout(_)
                | GitScoutError::RateLimited { .. }
                | GitScoutError::Api {
                    status_code: Some(500..=599) | Some(408),
                    ..
                }
        )
    }

    /// Check if this error is a terminal not-found answer.
    pub fn is_not_found(&self) -> bool {
        matches!(self, GitScoutError::NotFound { .. })
    }
}
