//! Error taxonomy for the tracing subsystem
//!
//! | Error | Recovery |
//! |-------|----------|
//! | [`MalformedHeaderError`] | Local: event captured unlabeled |
//! | [`TraceError::ChannelSaturated`] | Event dropped, drop counter incremented |
//! | [`TraceError::Persistence`] | Record dropped and logged |
//! | [`TraceError::StoreUnavailable`] | Fatal to tracing start, never to the bus |
//!
//! None of these ever crosses the interceptor boundary into bus delivery.

use thiserror::Error;

/// Longest prefix of the offending text kept in a [`MalformedHeaderError`]
const EXCERPT_LEN: usize = 64;

/// A causality header was present but could not be decoded
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("malformed causality header ({reason}): {excerpt:?}")]
pub struct MalformedHeaderError {
    /// Leading part of the header text
    pub excerpt: String,
    /// Decoder message
    pub reason: String,
}

impl MalformedHeaderError {
    /// Build the error, truncating long header text
    pub fn new(text: &str, reason: impl Into<String>) -> Self {
        MalformedHeaderError {
            excerpt: text.chars().take(EXCERPT_LEN).collect(),
            reason: reason.into(),
        }
    }
}

/// Errors raised by the capture pipeline
#[derive(Debug, Error)]
pub enum TraceError {
    /// Inbound header present but unparsable
    #[error(transparent)]
    MalformedHeader(#[from] MalformedHeaderError),

    /// Hand-off could not complete within the bounded wait
    #[error("hand-off channel saturated (capacity {capacity})")]
    ChannelSaturated {
        /// Channel capacity at the time of the failed hand-off
        capacity: usize,
    },

    /// The store rejected a write
    #[error("persistence error: {0}")]
    Persistence(String),

    /// The store could not be opened at start-up
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    /// Lifecycle operation invoked in the wrong state
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Record or header encoding failed
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Configuration rejected
    #[error("configuration error: {0}")]
    Config(String),
}

impl TraceError {
    /// Whether this error disables tracing entirely
    pub fn is_fatal(&self) -> bool {
        matches!(self, TraceError::StoreUnavailable(_))
    }
}

/// Result type for tracing operations
pub type Result<T> = std::result::Result<T, TraceError>;
