//! Read-side queries over a persisted trace
//!
//! Works on any [`StoreReader`]: a [`MemoryHandle`](bustrace_storage::MemoryHandle)
//! in tests, a [`LogSnapshot`](bustrace_storage::LogSnapshot) of a closed
//! run directory in the CLI.
//!
//! # Examples
//!
//! ```ignore
//! let inspector = TraceInspector::new(LogStore::read(run_dir)?);
//! for record in inspector.chain(reply_id)? {
//!     println!("{} {} {}", record.record_id, record.direction, record.target_address);
//! }
//! ```

use crate::index;
use bustrace_core::{Direction, RecordLocator, TraceError, TraceRecord, RECORDS_PARTITION};
use bustrace_storage::{StoreError, StoreReader};
use rustc_hash::FxHashSet;

/// Query API over a trace store
pub struct TraceInspector<R> {
    reader: R,
}

impl<R: StoreReader> TraceInspector<R> {
    /// Wrap a reader
    pub fn new(reader: R) -> Self {
        TraceInspector { reader }
    }

    /// Underlying reader
    pub fn reader(&self) -> &R {
        &self.reader
    }

    /// Record with `record_id`
    pub fn record(&self, record_id: u64) -> Result<Option<TraceRecord>, TraceError> {
        let key = RecordLocator(record_id).key();
        match self.reader.get(RECORDS_PARTITION, &key).map_err(read_error)? {
            Some(bytes) => Ok(Some(TraceRecord::from_json(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Every record in `record_id` order
    pub fn records(&self) -> Result<Vec<TraceRecord>, TraceError> {
        let mut ids: Vec<u64> = self
            .reader
            .keys(RECORDS_PARTITION)
            .map_err(read_error)?
            .iter()
            .filter_map(|k| RecordLocator::parse(k))
            .map(|l| l.0)
            .collect();
        ids.sort_unstable();

        let mut records = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(record) = self.record(id)? {
                records.push(record);
            }
        }
        Ok(records)
    }

    /// Number of persisted records
    pub fn count(&self) -> Result<usize, TraceError> {
        self.reader.count(RECORDS_PARTITION).map_err(read_error)
    }

    /// Locator of the sent record of `message_id`
    pub fn locate(&self, message_id: &str) -> Result<Option<RecordLocator>, TraceError> {
        index::resolve(&self.reader, message_id).map_err(read_error)
    }

    /// Sent record of `message_id`, via the correlation index
    pub fn lookup(&self, message_id: &str) -> Result<Option<TraceRecord>, TraceError> {
        match self.locate(message_id)? {
            Some(locator) => self.record(locator.0),
            None => Ok(None),
        }
    }

    /// Sent records from `message_id` back to its root, following first
    /// parents
    ///
    /// Stops at a root, at a parent with no sent record, or on a cycle.
    pub fn chain(&self, message_id: &str) -> Result<Vec<TraceRecord>, TraceError> {
        let mut chain = Vec::new();
        let mut seen = FxHashSet::default();
        let mut next = Some(message_id.to_string());

        while let Some(id) = next.take() {
            if !seen.insert(id.clone()) {
                break;
            }
            let Some(record) = self.lookup(&id)? else {
                break;
            };
            next = record.parent_ids.first().cloned();
            chain.push(record);
        }
        Ok(chain)
    }

    /// Sent records that list `message_id` as a parent, in `record_id` order
    pub fn children(&self, message_id: &str) -> Result<Vec<TraceRecord>, TraceError> {
        Ok(self
            .records()?
            .into_iter()
            .filter(|r| r.direction == Direction::Sent && r.parent_ids.iter().any(|p| p == message_id))
            .collect())
    }

    /// Received records of `message_id` (one per delivery)
    pub fn deliveries(&self, message_id: &str) -> Result<Vec<TraceRecord>, TraceError> {
        Ok(self
            .records()?
            .into_iter()
            .filter(|r| r.direction == Direction::Received && r.message_id == message_id)
            .collect())
    }
}

fn read_error(e: StoreError) -> TraceError {
    TraceError::Persistence(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bustrace_core::CORRELATION_PARTITION;
    use bustrace_storage::{DurableStore, MemoryStore, WriteBatch};

    fn put_record(store: &mut MemoryStore, record: &TraceRecord) {
        let mut batch = WriteBatch::new();
        batch.put(RECORDS_PARTITION, record.locator().key(), record.to_json().unwrap());
        if record.is_indexable() {
            batch.put(CORRELATION_PARTITION, record.message_id.as_str(), record.locator().key().into_bytes());
        }
        store.commit(batch).unwrap();
    }

    fn rec(id: u64, msg: &str, parents: &[&str], direction: Direction) -> TraceRecord {
        TraceRecord {
            record_id: id,
            message_id: msg.to_string(),
            parent_ids: parents.iter().map(|p| p.to_string()).collect(),
            label: String::new(),
            direction,
            timestamp: id as i64,
            target_address: "addr".into(),
            reply_address: String::new(),
            headers: String::new(),
            body: String::new(),
        }
    }

    fn seeded() -> TraceInspector<bustrace_storage::MemoryHandle> {
        let mut store = MemoryStore::new();
        let handle = store.handle();
        put_record(&mut store, &rec(1, "A", &[], Direction::Sent));
        put_record(&mut store, &rec(2, "A", &[], Direction::Received));
        put_record(&mut store, &rec(3, "B", &["A"], Direction::Sent));
        put_record(&mut store, &rec(4, "C", &["A"], Direction::Sent));
        put_record(&mut store, &rec(5, "D", &["B"], Direction::Sent));
        put_record(&mut store, &rec(6, "", &[], Direction::Received));
        TraceInspector::new(handle)
    }

    #[test]
    fn test_records_in_id_order() {
        let inspector = seeded();
        let ids: Vec<u64> = inspector.records().unwrap().iter().map(|r| r.record_id).collect();
        assert_eq!(ids, vec![1, 2, 3, 4, 5, 6]);
        assert_eq!(inspector.count().unwrap(), 6);
    }

    #[test]
    fn test_lookup_returns_sent_record() {
        let inspector = seeded();
        let record = inspector.lookup("A").unwrap().unwrap();
        assert_eq!(record.record_id, 1);
        assert_eq!(record.direction, Direction::Sent);
        assert!(inspector.lookup("Z").unwrap().is_none());
    }

    #[test]
    fn test_chain_walks_to_root() {
        let inspector = seeded();
        let ids: Vec<String> = inspector.chain("D").unwrap().into_iter().map(|r| r.message_id).collect();
        assert_eq!(ids, vec!["D", "B", "A"]);
    }

    #[test]
    fn test_chain_survives_cycle() {
        let mut store = MemoryStore::new();
        let handle = store.handle();
        put_record(&mut store, &rec(1, "X", &["Y"], Direction::Sent));
        put_record(&mut store, &rec(2, "Y", &["X"], Direction::Sent));

        let chain = TraceInspector::new(handle).chain("X").unwrap();
        assert_eq!(chain.len(), 2);
    }

    #[test]
    fn test_children_and_deliveries() {
        let inspector = seeded();
        let children: Vec<u64> = inspector.children("A").unwrap().iter().map(|r| r.record_id).collect();
        assert_eq!(children, vec![3, 4]);

        let deliveries = inspector.deliveries("A").unwrap();
        assert_eq!(deliveries.len(), 1);
        assert_eq!(deliveries[0].record_id, 2);
    }
}
