//! Correlation index: `message_id -> record locator` for sent records
//!
//! The writer stages an entry into the same [`WriteBatch`] as the record so
//! both become visible together. An id is indexed at most once: the first
//! committed sent record wins, later duplicates are ignored.
//!
//! Reads go straight to the [`CORRELATION_PARTITION`] of any
//! [`StoreReader`], which every store backs with a hash map.

use bustrace_core::{RecordLocator, TraceRecord, CORRELATION_PARTITION};
use bustrace_storage::{StoreReader, WriteBatch};
use rustc_hash::FxHashSet;

/// Writer-side bookkeeping of indexed message ids
#[derive(Debug, Default)]
pub struct CorrelationIndex {
    indexed: FxHashSet<String>,
}

impl CorrelationIndex {
    /// Create an empty index
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage the entry for `record` into `batch`
    ///
    /// Returns whether an entry was staged. Call [`confirm`](Self::confirm)
    /// once the batch has committed.
    pub fn stage(&self, record: &TraceRecord, batch: &mut WriteBatch) -> bool {
        if !record.is_indexable() || self.indexed.contains(&record.message_id) {
            return false;
        }
        batch.put(
            CORRELATION_PARTITION,
            record.message_id.as_str(),
            record.locator().key().into_bytes(),
        );
        true
    }

    /// Record that `message_id` is now indexed
    pub fn confirm(&mut self, message_id: &str) {
        self.indexed.insert(message_id.to_string());
    }

    /// Whether `message_id` has a committed entry
    pub fn contains(&self, message_id: &str) -> bool {
        self.indexed.contains(message_id)
    }

    /// Number of committed entries
    pub fn len(&self) -> usize {
        self.indexed.len()
    }

    /// Whether nothing has been indexed
    pub fn is_empty(&self) -> bool {
        self.indexed.is_empty()
    }
}

/// Resolve `message_id` to the locator of its sent record
pub fn resolve(
    reader: &dyn StoreReader,
    message_id: &str,
) -> bustrace_storage::Result<Option<RecordLocator>> {
    let value = reader.get(CORRELATION_PARTITION, message_id)?;
    Ok(value.and_then(|bytes| {
        std::str::from_utf8(&bytes)
            .ok()
            .and_then(RecordLocator::parse)
    }))
}
