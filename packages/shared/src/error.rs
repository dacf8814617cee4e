//! Error types for zenrag.
//!
//! Library crates use [`ZenragError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all zenrag operations.
#[derive(Debug, thiserror::Error)]
pub enum ZenragError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Bad or missing credential. Fatal, never retried.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Workspace or resource does not exist. Fatal, never retried.
    #[error("not found: {0}")]
    NotFound(String),

    /// Rate limited by the remote API. Retried with backoff; surfaces
    /// only after the retry budget is exhausted. Carries the server's
    /// `Retry-After` value when one was sent.
    #[error("rate limited by remote API")]
    RateLimited { retry_after_secs: Option<u64> },

    /// Transport-level failure (connection, timeout, 5xx). Retried;
    /// surfaces only after the retry budget is exhausted.
    #[error("network error: {0}")]
    Network(String),

    /// Response payload did not match the expected shape.
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// Extraction aborted mid-run. Carries the number of items that were
    /// successfully fetched before the failure.
    #[error("extraction failed after {items_fetched} items: {source}")]
    Extraction {
        items_fetched: usize,
        #[source]
        source: Box<ZenragError>,
    },

    /// Enrichment request or response handling error.
    #[error("enrichment error: {0}")]
    Enrichment(String),

    /// Enrichment response count did not match the submitted batch size.
    /// The batch is marked failed and no records are mutated.
    #[error("enrichment returned {got} results for a batch of {expected}")]
    EnrichmentMismatch { expected: usize, got: usize },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (schema mismatch, invalid record, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, ZenragError>;

impl ZenragError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
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

    /// Wrap an error that aborted extraction, recording progress so far.
    pub fn extraction(items_fetched: usize, source: ZenragError) -> Self {
        Self::Extraction {
            items_fetched,
            source: Box::new(source),
        }
    }

    /// Whether the API client may retry the operation that produced this
    /// error. Auth, not-found, and malformed-request failures are final.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimited { .. } | Self::Network(_))
    }
}
