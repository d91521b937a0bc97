//! Storage layer for bustrace
//!
//! This crate implements the durable store behind the trace writer:
//! - [`DurableStore`]: atomic batch commit + close, single writer
//! - [`StoreReader`]: keyed reads for inspection tooling
//! - [`MemoryStore`]: in-memory engine for tests and ephemeral runs
//! - [`LogStore`]: append-only, CRC-framed log file with replay on open
//! - [`SyncMode`]: fsync policy of the log store

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod durability;
pub mod error;
pub mod format;
pub mod log;
pub mod memory;
pub mod traits;

pub use durability::SyncMode;
pub use error::{Result, StoreError};
pub use log::{LogSnapshot, LogStore, RecoveryInfo, LOG_FILE_NAME};
pub use memory::{MemoryHandle, MemoryStore};
pub use traits::{DurableStore, StoreReader, WriteBatch, WriteOp};
