//! Error types for the filter engine
//!
//! Most of the engine is fail-soft: the loader, the change bus and the gesture
//! interpreter never surface these errors to callers. They exist for the
//! boundaries that are allowed to fail (backend calls, snapshot IO, config).

use thiserror::Error;

/// Main error type for the crate
#[derive(Error, Debug)]
pub enum Error {
    /// Backend call failed
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    /// Snapshot persistence failed
    #[error("Snapshot error: {0}")]
    Snapshot(#[from] SnapshotError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Errors produced while talking to the aggregation backend
#[derive(Error, Debug, Clone)]
pub enum BackendError {
    /// The request could not be delivered (connection refused, DNS, TLS)
    #[error("Transport failure: {0}")]
    Transport(String),

    /// The backend answered with a non-2xx status
    #[error("Backend returned status {status}: {body}")]
    Status {
        /// HTTP status code
        status: u16,
        /// First bytes of the response body
        body: String,
    },

    /// The response body was not the expected JSON shape
    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    /// The request did not complete in time
    #[error("Request timed out after {0} ms")]
    Timeout(u64),
}

impl BackendError {
    /// Whether retrying later could succeed
    pub fn is_transient(&self) -> bool {
        !matches!(self, BackendError::MalformedPayload(_))
    }
}

/// Snapshot store errors
#[derive(Error, Debug)]
pub enum SnapshotError {
    /// Page id cannot be used as a storage key
    #[error("Invalid page id for snapshot: {0}")]
    InvalidPageId(String),

    /// IO failure on the snapshot directory
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Snapshot could not be encoded
    #[error("Encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
}

/// Failure reported by a subscriber's render callback
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Render failed: {message}")]
pub struct RenderError {
    /// Human-readable description
    pub message: String,
}

impl RenderError {
    /// Create a render error
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
