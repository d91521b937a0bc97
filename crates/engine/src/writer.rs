//! Background trace writer
//!
//! The single consumer of the hand-off channel. It owns the store handle,
//! the `record_id` counter and the writer side of the correlation index; no
//! other thread touches them.
//!
//! Loop: receive with a deadline, assign the next `record_id`, build the
//! [`TraceRecord`], commit it (with its index entry, for sent records) as one
//! batch. When the channel reports closed-and-empty the loop ends and the
//! store is closed exactly once.
//!
//! A failed commit is retried up to `commit_attempts` times. After that the
//! record is dropped and counted. Its id is still consumed: a store may have
//! applied the batch before reporting the error, and reusing the id would
//! let the next record overwrite it under an index entry that names another
//! message. Persisted ids are strictly increasing, with gaps where records
//! were dropped.

use crate::channel::{HandoffChannel, Recv};
use crate::index::CorrelationIndex;
use crate::stats::PipelineStats;
use bustrace_core::{CaptureEvent, TraceError, TraceRecord, RECORDS_PARTITION};
use bustrace_storage::{DurableStore, WriteBatch};
use std::io;
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Name of the writer thread
pub const WRITER_THREAD_NAME: &str = "bustrace-writer";

/// Result of a writer run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriterSummary {
    /// Records committed during the run
    pub persisted: u64,
    /// Records dropped after exhausting commit attempts
    pub failed: u64,
    /// Last `record_id` committed, if any
    pub last_record_id: Option<u64>,
    /// Error reported by the store on close
    pub close_error: Option<String>,
}

/// Drains the channel into a durable store
pub struct TraceWriter {
    store: Box<dyn DurableStore>,
    channel: Arc<HandoffChannel<CaptureEvent>>,
    stats: Arc<PipelineStats>,
    index: CorrelationIndex,
    next_record_id: u64,
    poll_interval: Duration,
    commit_attempts: u32,
}

impl TraceWriter {
    /// Create a writer; record ids start at 1
    pub fn new(
        store: Box<dyn DurableStore>,
        channel: Arc<HandoffChannel<CaptureEvent>>,
        stats: Arc<PipelineStats>,
    ) -> Self {
        TraceWriter {
            store,
            channel,
            stats,
            index: CorrelationIndex::new(),
            next_record_id: 1,
            poll_interval: Duration::from_secs(1),
            commit_attempts: 2,
        }
    }

    /// Receive timeout of the loop
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Attempts per record before it is dropped (minimum 1)
    pub fn commit_attempts(mut self, attempts: u32) -> Self {
        self.commit_attempts = attempts.max(1);
        self
    }

    /// Id the next committed record will get
    pub fn next_record_id(&self) -> u64 {
        self.next_record_id
    }

    /// Run the loop on a dedicated thread
    pub fn spawn(self) -> io::Result<WriterHandle> {
        let (done_tx, done_rx) = mpsc::channel();
        let thread = thread::Builder::new()
            .name(WRITER_THREAD_NAME.to_string())
            .spawn(move || {
                let summary = self.run();
                let _ = done_tx.send(());
                summary
            })?;
        Ok(WriterHandle {
            thread: Some(thread),
            done: done_rx,
            finished: false,
        })
    }

    /// Run the loop on the current thread until the channel is closed and
    /// empty, then close the store
    pub fn run(mut self) -> WriterSummary {
        info!(store = self.store.name(), "Trace writer started");
        let mut summary = WriterSummary::default();

        loop {
            match self.channel.recv_timeout(self.poll_interval) {
                Recv::Item(event) => match self.persist(event) {
                    Ok(record_id) => {
                        summary.persisted += 1;
                        summary.last_record_id = Some(record_id);
                    }
                    Err(_) => summary.failed += 1,
                },
                Recv::Timeout => continue,
                Recv::Closed => break,
            }
        }

        debug!(indexed = self.index.len(), "Trace channel drained");
        let name = self.store.name();
        if let Err(e) = self.store.close() {
            error!(store = name, error = %e, "Failed to close trace store");
            summary.close_error = Some(e.to_string());
        }
        info!(
            persisted = summary.persisted,
            failed = summary.failed,
            "Trace store closed, {} records persisted",
            summary.persisted
        );
        summary
    }

    /// Build and commit the record for `event`; returns its `record_id`
    pub fn persist(&mut self, event: CaptureEvent) -> Result<u64, TraceError> {
        let record = TraceRecord::from_event(self.next_record_id, event);
        let value = match record.to_json() {
            Ok(v) => v,
            Err(e) => {
                PipelineStats::incr(&self.stats.failed);
                warn!(record_id = record.record_id, error = %e, "Dropping unencodable trace record");
                return Err(e);
            }
        };

        let mut last_error = None;
        for attempt in 1..=self.commit_attempts {
            let mut batch = WriteBatch::new();
            batch.put(RECORDS_PARTITION, record.locator().key(), value.clone());
            let indexed = self.index.stage(&record, &mut batch);

            match self.store.commit(batch) {
                Ok(()) => {
                    if indexed {
                        self.index.confirm(&record.message_id);
                    }
                    self.next_record_id += 1;
                    PipelineStats::incr(&self.stats.persisted);
                    return Ok(record.record_id);
                }
                Err(e) => {
                    debug!(record_id = record.record_id, attempt, error = %e, "Trace commit failed");
                    last_error = Some(e);
                }
            }
        }

        self.next_record_id += 1;
        PipelineStats::incr(&self.stats.failed);
        let reason = last_error.map(|e| e.to_string()).unwrap_or_default();
        warn!(
            record_id = record.record_id,
            attempts = self.commit_attempts,
            error = %reason,
            "Dropping trace record after failed commits"
        );
        Err(TraceError::Persistence(reason))
    }
}

/// Handle on a spawned writer
pub struct WriterHandle {
    thread: Option<JoinHandle<WriterSummary>>,
    done: mpsc::Receiver<()>,
    finished: bool,
}

impl WriterHandle {
    /// Wait up to `timeout` for the writer to finish; returns whether it did
    pub fn wait(&mut self, timeout: Duration) -> bool {
        if !self.finished {
            self.finished = match self.done.recv_timeout(timeout) {
                Ok(()) => true,
                // Sender dropped without signalling: the thread panicked.
                Err(mpsc::RecvTimeoutError::Disconnected) => true,
                Err(mpsc::RecvTimeoutError::Timeout) => false,
            };
        }
        self.finished
    }

    /// Join a finished writer
    ///
    /// Returns `None` if the writer has not signalled completion (the thread
    /// is left detached) or if it panicked.
    pub fn join(mut self) -> Option<WriterSummary> {
        if !self.finished {
            return None;
        }
        match self.thread.take()?.join() {
            Ok(summary) => Some(summary),
            Err(_) => {
                error!("Trace writer thread panicked");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::Backpressure;
    use bustrace_core::{
        CausalityHeader, Direction, Headers, MessageSnapshot, RecordLocator, CORRELATION_PARTITION,
    };
    use crate::index::resolve;
    use bustrace_storage::{MemoryStore, StoreError, StoreReader};
    use std::sync::atomic::Ordering;

    fn event(header: Option<CausalityHeader>, direction: Direction) -> CaptureEvent {
        CaptureEvent::new(
            MessageSnapshot::new("addr", None, Headers::new(), "body"),
            header,
            direction,
        )
    }

    struct FlakyStore {
        inner: MemoryStore,
        failures_left: u32,
    }

    impl DurableStore for FlakyStore {
        fn name(&self) -> &'static str {
            "flaky"
        }

        fn commit(&mut self, batch: WriteBatch) -> bustrace_storage::Result<()> {
            if self.failures_left > 0 {
                self.failures_left -= 1;
                return Err(StoreError::Rejected("injected".into()));
            }
            self.inner.commit(batch)
        }

        fn close(self: Box<Self>) -> bustrace_storage::Result<()> {
            let this = *self;
            Box::new(this.inner).close()
        }
    }

    /// Applies every batch, then reports failure for the first
    /// `failures_left` commits
    struct WriteThenFail {
        inner: MemoryStore,
        failures_left: u32,
    }

    impl DurableStore for WriteThenFail {
        fn name(&self) -> &'static str {
            "write-then-fail"
        }

        fn commit(&mut self, batch: WriteBatch) -> bustrace_storage::Result<()> {
            self.inner.commit(batch)?;
            if self.failures_left > 0 {
                self.failures_left -= 1;
                return Err(StoreError::Rejected("ack lost".into()));
            }
            Ok(())
        }

        fn close(self: Box<Self>) -> bustrace_storage::Result<()> {
            let this = *self;
            Box::new(this.inner).close()
        }
    }

    fn writer_over(store: Box<dyn DurableStore>) -> (TraceWriter, Arc<HandoffChannel<CaptureEvent>>, Arc<PipelineStats>) {
        let channel = Arc::new(HandoffChannel::new(64, Backpressure::DropNewest));
        let stats = Arc::new(PipelineStats::new());
        let writer = TraceWriter::new(store, Arc::clone(&channel), Arc::clone(&stats))
            .poll_interval(Duration::from_millis(5));
        (writer, channel, stats)
    }

    #[test]
    fn test_sent_record_and_index_committed_together() {
        let store = MemoryStore::new();
        let handle = store.handle();
        let (mut writer, _, _) = writer_over(Box::new(store));

        let header = CausalityHeader::root(None);
        assert_eq!(writer.persist(event(Some(header.clone()), Direction::Sent)).unwrap(), 1);

        assert_eq!(handle.commit_count(), 1);
        assert!(handle.get(RECORDS_PARTITION, "1").unwrap().is_some());
        assert_eq!(
            handle.get(CORRELATION_PARTITION, header.message_id.as_str()).unwrap(),
            Some(RecordLocator(1).key().into_bytes())
        );
    }

    #[test]
    fn test_received_record_not_indexed() {
        let store = MemoryStore::new();
        let handle = store.handle();
        let (mut writer, _, _) = writer_over(Box::new(store));

        writer.persist(event(Some(CausalityHeader::root(None)), Direction::Received)).unwrap();
        writer.persist(event(None, Direction::Received)).unwrap();
        assert_eq!(handle.count(CORRELATION_PARTITION).unwrap(), 0);
        assert_eq!(handle.count(RECORDS_PARTITION).unwrap(), 2);
    }

    #[test]
    fn test_retry_then_succeed() {
        let store = FlakyStore {
            inner: MemoryStore::new(),
            failures_left: 1,
        };
        let handle = store.inner.handle();
        let (writer, _, stats) = writer_over(Box::new(store));
        let mut writer = writer.commit_attempts(2);

        assert_eq!(writer.persist(event(None, Direction::Received)).unwrap(), 1);
        assert_eq!(handle.count(RECORDS_PARTITION).unwrap(), 1);
        assert_eq!(stats.failed.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_exhausted_attempts_still_consume_id() {
        let store = FlakyStore {
            inner: MemoryStore::new(),
            failures_left: 2,
        };
        let handle = store.inner.handle();
        let (writer, _, stats) = writer_over(Box::new(store));
        let mut writer = writer.commit_attempts(2);

        let err = writer.persist(event(None, Direction::Received)).unwrap_err();
        assert!(matches!(err, TraceError::Persistence(_)));
        assert_eq!(stats.failed.load(Ordering::Relaxed), 1);
        assert_eq!(writer.next_record_id(), 2);

        assert_eq!(writer.persist(event(None, Direction::Received)).unwrap(), 2);
        assert_eq!(handle.count(RECORDS_PARTITION).unwrap(), 1);
        assert_eq!(stats.persisted.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_applied_but_failed_commit_keeps_index_on_own_record() {
        let store = WriteThenFail {
            inner: MemoryStore::new(),
            failures_left: 1,
        };
        let handle = store.inner.handle();
        let (writer, _, stats) = writer_over(Box::new(store));
        let mut writer = writer.commit_attempts(1);

        let first = CausalityHeader::root(None);
        let second = CausalityHeader::root(None);
        assert!(writer.persist(event(Some(first.clone()), Direction::Sent)).is_err());
        assert_eq!(writer.persist(event(Some(second.clone()), Direction::Sent)).unwrap(), 2);
        assert_eq!(stats.failed.load(Ordering::Relaxed), 1);

        for header in [&first, &second] {
            let locator = resolve(&handle, header.message_id.as_str()).unwrap().unwrap();
            let bytes = handle.get(RECORDS_PARTITION, &locator.key()).unwrap().unwrap();
            let record = TraceRecord::from_json(&bytes).unwrap();
            assert_eq!(record.message_id, header.message_id.as_str());
            assert_eq!(record.record_id, locator.0);
        }
    }

    #[test]
    fn test_retry_after_applied_commit_is_idempotent() {
        let store = WriteThenFail {
            inner: MemoryStore::new(),
            failures_left: 1,
        };
        let handle = store.inner.handle();
        let (writer, _, _) = writer_over(Box::new(store));
        let mut writer = writer.commit_attempts(2);

        let header = CausalityHeader::root(None);
        assert_eq!(writer.persist(event(Some(header.clone()), Direction::Sent)).unwrap(), 1);
        assert_eq!(handle.count(RECORDS_PARTITION).unwrap(), 1);
        assert_eq!(handle.count(CORRELATION_PARTITION).unwrap(), 1);
        assert_eq!(
            resolve(&handle, header.message_id.as_str()).unwrap(),
            Some(RecordLocator(1))
        );
    }

    #[test]
    fn test_run_drains_then_closes_once() {
        let store = MemoryStore::new();
        let handle = store.handle();
        let (writer, channel, _) = writer_over(Box::new(store));

        for _ in 0..10 {
            channel.push(event(None, Direction::Received)).unwrap();
        }
        channel.close();

        let summary = writer.run();
        assert_eq!(summary.persisted, 10);
        assert_eq!(summary.last_record_id, Some(10));
        assert_eq!(handle.count(RECORDS_PARTITION).unwrap(), 10);
        assert_eq!(handle.close_count(), 1);
    }

    #[test]
    fn test_spawned_writer_signals_done() {
        let store = MemoryStore::new();
        let handle = store.handle();
        let (writer, channel, _) = writer_over(Box::new(store));
        let mut running = writer.spawn().unwrap();

        channel.push(event(None, Direction::Received)).unwrap();
        assert!(!running.wait(Duration::from_millis(20)));
        channel.close();

        assert!(running.wait(Duration::from_secs(5)));
        let summary = running.join().unwrap();
        assert_eq!(summary.persisted, 1);
        assert!(handle.is_closed());
    }
}
