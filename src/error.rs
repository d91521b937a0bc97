//! Unified error type for bustrace.
//!
//! Wraps the errors of the core, storage and engine crates and presents one
//! interface to callers.

use bustrace_core::{MalformedHeaderError, TraceError};
use bustrace_storage::StoreError;
use thiserror::Error;

/// All bustrace errors.
#[derive(Debug, Error)]
pub enum Error {
    /// A causality header could not be decoded
    #[error("malformed header: {0}")]
    MalformedHeader(String),

    /// The hand-off channel stayed full past the blocking timeout
    #[error("channel saturated (capacity {capacity})")]
    ChannelSaturated {
        /// Channel bound
        capacity: usize,
    },

    /// A record could not be committed
    #[error("persistence error: {0}")]
    Persistence(String),

    /// The store could not be opened; tracing is off
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    /// The store reported damage
    #[error("storage error: {0}")]
    Storage(String),

    /// Operation not allowed in the current lifecycle state
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Invalid configuration
    #[error("config error: {0}")]
    Config(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Result type for bustrace operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Check if this error disables tracing.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::StoreUnavailable(_))
    }

    /// Check if this error is retryable.
    ///
    /// Saturation and commit failures may clear once the store catches up.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::ChannelSaturated { .. } | Error::Persistence(_))
    }

    /// Check if this is a configuration error.
    pub fn is_config(&self) -> bool {
        matches!(self, Error::Config(_))
    }
}

impl From<TraceError> for Error {
    fn from(e: TraceError) -> Self {
        match e {
            TraceError::MalformedHeader(inner) => Error::MalformedHeader(inner.to_string()),
            TraceError::ChannelSaturated { capacity } => Error::ChannelSaturated { capacity },
            TraceError::Persistence(msg) => Error::Persistence(msg),
            TraceError::StoreUnavailable(msg) => Error::StoreUnavailable(msg),
            TraceError::InvalidState(msg) => Error::InvalidState(msg),
            TraceError::Serialization(msg) => Error::Serialization(msg),
            TraceError::Config(msg) => Error::Config(msg),
        }
    }
}

impl From<StoreError> for Error {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Unavailable { .. } => Error::StoreUnavailable(e.to_string()),
            StoreError::Io(io) => Error::Io(io),
            StoreError::Corruption { .. } => Error::Storage(e.to_string()),
            StoreError::Closed => Error::InvalidState("store closed".to_string()),
            StoreError::Rejected(msg) => Error::Persistence(msg),
        }
    }
}

impl From<MalformedHeaderError> for Error {
    fn from(e: MalformedHeaderError) -> Self {
        Error::MalformedHeader(e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}
