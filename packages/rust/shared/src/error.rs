//! Error types for meshctx.
//!
//! Library crates use [`MeshCtxError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all meshctx operations.
#[derive(Debug, thiserror::Error)]
pub enum MeshCtxError {
    /// Bad or missing request parameters (malformed timestamp, one-sided
    /// window, no source workloads configured).
    #[error("invalid input: {message}")]
    InvalidInput { message: String },

    /// The metrics backend could not be queried or answered with a failure.
    #[error("upstream error: {0}")]
    Upstream(#[from] UpstreamError),

    /// Topology store unreachable or a store query failed.
    #[error("store error: {0}")]
    Store(String),

    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Failure modes when talking to the metrics backend.
///
/// `QueryFailed` is kept apart from the transport-level variants so callers
/// can tell "backend unreachable" from "backend rejected the query".
#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    /// Connect failure, timeout, or other transport problem.
    #[error("request to {url} failed: {message}")]
    Transport { url: String, message: String },

    /// Backend answered with a non-2xx HTTP status.
    #[error("{url}: HTTP {status}: {body}")]
    HttpStatus {
        url: String,
        status: u16,
        body: String,
    },

    /// Response body could not be decoded.
    #[error("failed to decode response from {url}: {message}")]
    Decode { url: String, message: String },

    /// Backend decoded fine but reported a non-"success" status.
    #[error("query failed with status {status}{}", describe_query_error(.error_type, .error))]
    QueryFailed {
        status: String,
        error_type: Option<String>,
        error: Option<String>,
    },
}

fn describe_query_error(error_type: &Option<String>, error: &Option<String>) -> String {
    match (error_type, error) {
        (Some(kind), Some(msg)) => format!(" ({kind}: {msg})"),
        (None, Some(msg)) => format!(" ({msg})"),
        (Some(kind), None) => format!(" ({kind})"),
        (None, None) => String::new(),
    }
}

impl UpstreamError {
    /// True when the backend itself reported the query as failed.
    pub fn is_query_failure(&self) -> bool {
        matches!(self, Self::QueryFailed { .. })
    }
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, MeshCtxError>;

impl MeshCtxError {
    /// Create an invalid-input error from any displayable message.
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: msg.into(),
        }
    }

    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
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

    /// Whether the error was caused by the caller (maps to HTTP 400).
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::InvalidInput { .. })
    }
}
