//! Storage errors

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by durable stores
#[derive(Debug, Error)]
pub enum StoreError {
    /// Store could not be opened
    #[error("cannot open store at {path}: {source}")]
    Unavailable {
        /// Location that failed to open
        path: PathBuf,
        /// Underlying I/O failure
        #[source]
        source: std::io::Error,
    },

    /// I/O failure on an open store
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// On-disk data failed validation
    #[error("corruption at offset {offset}: {reason}")]
    Corruption {
        /// Byte offset of the bad frame
        offset: u64,
        /// What failed
        reason: String,
    },

    /// Operation on a closed store
    #[error("store is closed")]
    Closed,

    /// The store refused the write
    #[error("write rejected: {0}")]
    Rejected(String),
}

impl StoreError {
    /// Whether this error happened while opening the store
    pub fn is_unavailable(&self) -> bool {
        matches!(self, StoreError::Unavailable { .. })
    }
}

/// Result type for storage operations
pub type Result<T> = std::result::Result<T, StoreError>;
