//! Crate-wide error types
//!
//! One taxonomy for the whole service: validation failures are rejected
//! before any I/O, transient conditions tell the caller to retry, and
//! transport failures are recovered internally by the watchers unless they
//! occur inside a synchronous request path.

use thiserror::Error;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for all service operations
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed or missing request fields, rejected before any I/O
    #[error("invalid request: {0}")]
    Validation(String),

    /// Stream id absent from the known-stream index
    #[error("stream not known: {0}")]
    StreamNotFound(String),

    /// No entry exists in the requested time range
    #[error("no data in requested range")]
    NoData,

    /// Write cursor not yet caught up; the caller should retry
    #[error("write cursor not ready, try again")]
    Transient,

    /// Underlying store unreachable or a subscription dropped
    #[error("transport: {0}")]
    Transport(String),

    /// State or payload could not be encoded/decoded
    #[error("state encoding: {0}")]
    Serialization(String),

    /// Initial full load could not complete; aborts startup
    #[error("startup: {0}")]
    Startup(String),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}
