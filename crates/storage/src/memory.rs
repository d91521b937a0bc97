//! In-memory store
//!
//! Nothing touches disk. The store and every [`MemoryHandle`] share one
//! state, so a test can keep a handle and read what a writer persisted after
//! the writer has closed its store.

use crate::error::{Result, StoreError};
use crate::traits::{DurableStore, StoreReader, WriteBatch};
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::sync::Arc;

type Partition = FxHashMap<String, Vec<u8>>;

#[derive(Debug, Default)]
struct MemoryState {
    partitions: FxHashMap<String, Partition>,
    commits: u64,
    closes: u64,
}

/// In-memory [`DurableStore`]
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Arc<RwLock<MemoryState>>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Reader sharing this store's state
    pub fn handle(&self) -> MemoryHandle {
        MemoryHandle {
            state: Arc::clone(&self.state),
        }
    }
}

impl DurableStore for MemoryStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn commit(&mut self, batch: WriteBatch) -> Result<()> {
        let mut state = self.state.write();
        if state.closes > 0 {
            return Err(StoreError::Closed);
        }
        for op in batch.into_ops() {
            state
                .partitions
                .entry(op.partition)
                .or_default()
                .insert(op.key, op.value);
        }
        state.commits += 1;
        Ok(())
    }

    fn close(self: Box<Self>) -> Result<()> {
        self.state.write().closes += 1;
        Ok(())
    }
}

/// Shared read handle on a [`MemoryStore`]
#[derive(Debug, Clone)]
pub struct MemoryHandle {
    state: Arc<RwLock<MemoryState>>,
}

impl MemoryHandle {
    /// Whether the owning store has been closed
    pub fn is_closed(&self) -> bool {
        self.state.read().closes > 0
    }

    /// How many times the owning store was closed
    pub fn close_count(&self) -> u64 {
        self.state.read().closes
    }

    /// Number of committed batches
    pub fn commit_count(&self) -> u64 {
        self.state.read().commits
    }
}

impl StoreReader for MemoryHandle {
    fn get(&self, partition: &str, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self
            .state
            .read()
            .partitions
            .get(partition)
            .and_then(|p| p.get(key).cloned()))
    }

    fn keys(&self, partition: &str) -> Result<Vec<String>> {
        Ok(self
            .state
            .read()
            .partitions
            .get(partition)
            .map(|p| p.keys().cloned().collect())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commit_visible_through_handle() {
        let mut store = MemoryStore::new();
        let handle = store.handle();

        let mut batch = WriteBatch::new();
        batch.put("records", "1", b"one".to_vec());
        batch.put("correlation", "abc", b"1".to_vec());
        store.commit(batch).unwrap();

        assert_eq!(handle.get("records", "1").unwrap(), Some(b"one".to_vec()));
        assert_eq!(handle.get("correlation", "abc").unwrap(), Some(b"1".to_vec()));
        assert_eq!(handle.count("records").unwrap(), 1);
        assert_eq!(handle.commit_count(), 1);
    }

    #[test]
    fn test_missing_partition_is_empty() {
        let store = MemoryStore::new();
        let handle = store.handle();
        assert_eq!(handle.get("nope", "1").unwrap(), None);
        assert!(handle.keys("nope").unwrap().is_empty());
    }

    #[test]
    fn test_close_is_observable() {
        let store = MemoryStore::new();
        let handle = store.handle();
        assert!(!handle.is_closed());

        Box::new(store).close().unwrap();
        assert!(handle.is_closed());
        assert_eq!(handle.close_count(), 1);
    }
}
