//! Store capabilities
//!
//! - [`DurableStore`]: write side, owned by exactly one writer
//! - [`StoreReader`]: read side, used by inspection tooling
//!
//! Partitions are named logical namespaces. Any engine that persists keyed
//! values and is durable once [`DurableStore::close`] returns can stand in.

use crate::error::Result;

/// A single put inside a [`WriteBatch`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteOp {
    /// Target partition
    pub partition: String,
    /// Key within the partition
    pub key: String,
    /// Value bytes
    pub value: Vec<u8>,
}

/// Group of puts committed as one unit
///
/// Either every put in the batch becomes visible (and durable at the next
/// sync) or none does.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteBatch {
    ops: Vec<WriteOp>,
}

impl WriteBatch {
    /// Create an empty batch
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage a put
    pub fn put(
        &mut self,
        partition: impl Into<String>,
        key: impl Into<String>,
        value: impl Into<Vec<u8>>,
    ) -> &mut Self {
        self.ops.push(WriteOp {
            partition: partition.into(),
            key: key.into(),
            value: value.into(),
        });
        self
    }

    /// Staged operations in order
    pub fn ops(&self) -> &[WriteOp] {
        &self.ops
    }

    /// Consume the batch
    pub fn into_ops(self) -> Vec<WriteOp> {
        self.ops
    }

    /// Number of staged puts
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Whether nothing is staged
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

/// Write side of a durable store
///
/// Opened once, driven by a single writer, closed exactly once. `close`
/// consumes the store so a closed handle cannot be reused.
pub trait DurableStore: Send {
    /// Short engine name for logs
    fn name(&self) -> &'static str;

    /// Commit every put in `batch` atomically
    fn commit(&mut self, batch: WriteBatch) -> Result<()>;

    /// Commit a single put
    fn put(&mut self, partition: &str, key: &str, value: &[u8]) -> Result<()> {
        let mut batch = WriteBatch::new();
        batch.put(partition, key, value);
        self.commit(batch)
    }

    /// Release partition handles, flush, and close the store
    fn close(self: Box<Self>) -> Result<()>;
}

/// Read side of a store
pub trait StoreReader {
    /// Value stored under `key` in `partition`
    fn get(&self, partition: &str, key: &str) -> Result<Option<Vec<u8>>>;

    /// All keys of `partition`, unordered
    fn keys(&self, partition: &str) -> Result<Vec<String>>;

    /// Number of keys in `partition`
    fn count(&self, partition: &str) -> Result<usize> {
        Ok(self.keys(partition)?.len())
    }
}
