//! Error types for the calmirror ecosystem.

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur in calmirror operations.
#[derive(Error, Debug)]
pub enum MirrorError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid sync window: {0}")]
    Window(String),

    #[error("Source error: {0}")]
    Source(String),

    #[error("Mapping store error: {0}")]
    Store(String),

    #[error("Destination object not found: {0}")]
    NotFound(String),

    #[error("Rate limited by destination: {message}")]
    RateLimited {
        message: String,
        /// Explicit server hint, takes precedence over computed backoff.
        retry_after: Option<Duration>,
    },

    #[error("Server error: {0}")]
    Server(String),

    #[error("Request timed out after {0}s")]
    Timeout(u64),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl MirrorError {
    /// Whether a failed network call may be retried. Rate limits,
    /// server-side errors, and timeouts are transient; everything else
    /// is terminal.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            MirrorError::RateLimited { .. } | MirrorError::Server(_) | MirrorError::Timeout(_)
        )
    }

    /// Server-provided retry hint, if the response carried one.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            MirrorError::RateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    /// "Object is gone": not an error during delete, self-heal during update.
    pub fn is_not_found(&self) -> bool {
        matches!(self, MirrorError::NotFound(_))
    }
}

/// Result type alias for calmirror operations.
pub type MirrorResult<T> = Result<T, MirrorError>;
