//! Pipeline Scenario Tests
//!
//! End-to-end behaviour of a pipeline attached to a [`LocalBus`]:
//! - request/reply and fan-out causality
//! - drain completeness and `record_id` ordering
//! - correlation index correctness
//! - persistence to a per-run log directory

use bustrace_core::{
    Direction, TraceRecord, CORRELATION_PARTITION, RECORDS_PARTITION, TRACE_HEADER,
};
use bustrace_engine::{
    Delivery, DeliveryContext, EventBus, LocalBus, StoreSource, TraceConfig, TraceInspector,
    TraceOptions, TracePipeline,
};
use bustrace_storage::{LogStore, MemoryHandle, MemoryStore, StoreReader};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

fn config() -> TraceConfig {
    TraceConfig::new()
        .poll_interval(Duration::from_millis(5))
        .drain_timeout(Duration::from_secs(10))
}

fn start_memory(bus: &LocalBus, config: TraceConfig) -> (TracePipeline, MemoryHandle) {
    let store = MemoryStore::new();
    let handle = store.handle();
    let mut pipeline = TracePipeline::new(config);
    pipeline.start(bus, StoreSource::provided(store)).unwrap();
    (pipeline, handle)
}

fn sent(records: &[TraceRecord]) -> Vec<&TraceRecord> {
    records.iter().filter(|r| r.direction == Direction::Sent).collect()
}

/// Test: A (root, "op1") -> reply B with parent A
#[test]
fn test_request_reply_chain() {
    let bus = LocalBus::new();
    let (mut pipeline, handle) = start_memory(&bus, config());

    bus.consumer("svc.ping", |d: Delivery| {
        d.reply("pong");
    });
    bus.request("svc.ping", "ping", Some(TraceOptions::new().label("op1")), |_| {});

    let report = pipeline.stop(&bus).unwrap();
    assert_eq!(report.persisted, 4);

    let inspector = TraceInspector::new(handle);
    let records = inspector.records().unwrap();
    let sent = sent(&records);
    assert_eq!(sent.len(), 2);

    let a = sent[0];
    let b = sent[1];
    assert!(a.parent_ids.is_empty());
    assert_eq!(a.label, "op1");
    assert_eq!(a.target_address, "svc.ping");
    assert!(!a.reply_address.is_empty());
    assert_eq!(b.parent_ids, vec![a.message_id.clone()]);
    assert_eq!(b.label, "op1");
    assert_eq!(b.target_address, a.reply_address);
    assert_eq!(b.reply_address, "");

    assert_eq!(inspector.lookup(&a.message_id).unwrap().as_ref(), Some(a));
    assert_eq!(inspector.lookup(&b.message_id).unwrap().as_ref(), Some(b));
    let chain: Vec<_> = inspector
        .chain(&b.message_id)
        .unwrap()
        .into_iter()
        .map(|r| r.record_id)
        .collect();
    assert_eq!(chain, vec![b.record_id, a.record_id]);
}

/// Test: A triggers B and C; both reference A, A's index entry unaffected
#[test]
fn test_fan_out() {
    let bus = LocalBus::new();
    let (mut pipeline, handle) = start_memory(&bus, config());

    bus.consumer("orders", |d: Delivery| {
        d.send("billing", "charge");
        d.send("shipping", "ship");
    });
    bus.consumer("billing", |_| {});
    bus.consumer("shipping", |_| {});
    bus.send("orders", "order-1");

    pipeline.stop(&bus).unwrap();

    let inspector = TraceInspector::new(handle);
    let records = inspector.records().unwrap();
    let sent = sent(&records);
    assert_eq!(sent.len(), 3);

    let a = sent[0];
    assert_eq!(a.target_address, "orders");
    for child in &sent[1..] {
        assert_eq!(child.parent_ids, vec![a.message_id.clone()]);
    }

    let located = inspector.lookup(&a.message_id).unwrap().unwrap();
    assert_eq!(located.record_id, a.record_id);
    let children: Vec<_> = inspector
        .children(&a.message_id)
        .unwrap()
        .into_iter()
        .map(|r| r.target_address)
        .collect();
    assert_eq!(children, vec!["billing", "shipping"]);
}

/// Test: publish records one received record per subscriber
#[test]
fn test_publish_deliveries_share_message_id() {
    let bus = LocalBus::new();
    let (mut pipeline, handle) = start_memory(&bus, config());

    for _ in 0..3 {
        bus.consumer("news", |_| {});
    }
    bus.publish("news", "headline");
    pipeline.stop(&bus).unwrap();

    let inspector = TraceInspector::new(handle);
    let records = inspector.records().unwrap();
    let a = sent(&records)[0].clone();
    assert_eq!(inspector.deliveries(&a.message_id).unwrap().len(), 3);
}

/// Test: everything enqueued before stop is persisted, ids strictly increase
#[test]
fn test_drain_completeness_and_ordering() {
    const THREADS: usize = 8;
    const PER_THREAD: usize = 250;

    let bus = LocalBus::new();
    let (mut pipeline, handle) = start_memory(&bus, config().channel_capacity(THREADS * PER_THREAD));

    let barrier = Arc::new(Barrier::new(THREADS));
    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let bus = bus.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                for i in 0..PER_THREAD {
                    bus.send(&format!("t{}", t), format!("{}", i));
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    let report = pipeline.stop(&bus).unwrap();
    assert_eq!(report.persisted, (THREADS * PER_THREAD) as u64);
    assert_eq!(report.dropped, 0);
    assert_eq!(report.lost, 0);
    assert!(!report.timed_out);

    assert_eq!(handle.count(RECORDS_PARTITION).unwrap(), THREADS * PER_THREAD);
    assert_eq!(handle.count(CORRELATION_PARTITION).unwrap(), THREADS * PER_THREAD);

    let records = TraceInspector::new(handle).records().unwrap();
    for (i, record) in records.iter().enumerate() {
        assert_eq!(record.record_id, i as u64 + 1);
    }

    // Per-thread send order survives the hand-off.
    for t in 0..THREADS {
        let address = format!("t{}", t);
        let bodies: Vec<usize> = records
            .iter()
            .filter(|r| r.target_address == address)
            .map(|r| r.body.parse().unwrap())
            .collect();
        assert_eq!(bodies, (0..PER_THREAD).collect::<Vec<_>>());
    }
}

/// Test: every sent id resolves to exactly its own record
#[test]
fn test_index_correctness() {
    let bus = LocalBus::new();
    let (mut pipeline, handle) = start_memory(&bus, config());

    bus.consumer("echo", |d: Delivery| {
        d.reply(d.body().to_text());
    });
    for i in 0..50 {
        bus.request("echo", format!("m{}", i), None, |_| {});
    }
    pipeline.stop(&bus).unwrap();

    let inspector = TraceInspector::new(handle);
    let records = inspector.records().unwrap();
    for record in sent(&records) {
        let found = inspector.lookup(&record.message_id).unwrap().unwrap();
        assert_eq!(&found, record);
    }
    assert_eq!(inspector.reader().count(CORRELATION_PARTITION).unwrap(), 100);
}

/// Test: inbound without a header is captured unlabeled, not discarded
#[test]
fn test_untraced_inbound_captured_unlabeled() {
    let bus = LocalBus::new();
    // Strip the header between the outbound hook and delivery.
    bus.add_inbound_interceptor(Arc::new(|ctx: &mut dyn DeliveryContext| {
        ctx.headers_mut().remove(TRACE_HEADER);
    }));
    let (mut pipeline, handle) = start_memory(&bus, config());
    bus.consumer("a", |_| {});

    bus.send("a", "x");
    let report = pipeline.stop(&bus).unwrap();
    assert_eq!(report.persisted, 2);
    assert_eq!(report.malformed_headers, 0);

    let records = TraceInspector::new(handle).records().unwrap();
    let received: Vec<_> = records
        .iter()
        .filter(|r| r.direction == Direction::Received)
        .collect();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].message_id, "");
    assert!(received[0].parent_ids.is_empty());
    assert_eq!(received[0].body, "x");
}

/// Test: a garbled inbound header is counted and captured unlabeled
#[test]
fn test_malformed_inbound_header_counted() {
    let bus = LocalBus::new();
    bus.add_inbound_interceptor(Arc::new(|ctx: &mut dyn DeliveryContext| {
        ctx.headers_mut().set(TRACE_HEADER, "{broken");
    }));
    let (mut pipeline, handle) = start_memory(&bus, config());
    bus.consumer("a", |_| {});

    assert_eq!(bus.send("a", "x"), 1);
    let report = pipeline.stop(&bus).unwrap();
    assert_eq!(report.malformed_headers, 1);
    assert_eq!(report.persisted, 2);
    assert_eq!(handle.count(CORRELATION_PARTITION).unwrap(), 1);
}

/// Test: captures after stop never reach the store
#[test]
fn test_no_capture_after_stop() {
    let bus = LocalBus::new();
    let (mut pipeline, handle) = start_memory(&bus, config());
    bus.consumer("a", |_| {});

    bus.send("a", "before");
    pipeline.stop(&bus).unwrap();
    bus.send("a", "after");

    assert_eq!(handle.count(RECORDS_PARTITION).unwrap(), 2);
    assert_eq!(handle.close_count(), 1);
}

/// Test: a run directory holds a readable log after stop
#[test]
fn test_run_directory_persistence() {
    let parent = tempfile::tempdir().unwrap();
    let bus = LocalBus::new();
    let mut pipeline = TracePipeline::new(config().output_dir(parent.path()));
    pipeline.start(&bus, StoreSource::RunDirectory).unwrap();
    let run_dir = pipeline.run_dir().unwrap().to_path_buf();
    assert!(run_dir.starts_with(parent.path()));

    bus.consumer("svc", |d: Delivery| {
        d.reply("ok");
    });
    bus.request("svc", "hello", None, |_| {});
    let report = pipeline.stop(&bus).unwrap();
    assert_eq!(report.run_dir.as_deref(), Some(run_dir.as_path()));

    let inspector = TraceInspector::new(LogStore::read(&run_dir).unwrap());
    let records = inspector.records().unwrap();
    assert_eq!(records.len() as u64, report.persisted);
    assert_eq!(records[0].record_id, 1);
    assert_eq!(records[0].body, "hello");

    // A second run gets its own directory and restarts numbering.
    pipeline.start(&bus, StoreSource::RunDirectory).unwrap();
    let second = pipeline.run_dir().unwrap().to_path_buf();
    assert_ne!(second, run_dir);
    bus.send("svc", "again");
    pipeline.stop(&bus).unwrap();

    let first = TraceInspector::new(LogStore::read(&second).unwrap()).records().unwrap();
    assert_eq!(first[0].record_id, 1);
}

/// Test: an unwritable output directory fails start with StoreUnavailable
#[test]
fn test_store_unavailable_on_start() {
    let parent = tempfile::tempdir().unwrap();
    let blocker = parent.path().join("not-a-dir");
    std::fs::write(&blocker, b"file").unwrap();

    let bus = LocalBus::new();
    let mut pipeline = TracePipeline::new(config().output_dir(&blocker));
    let err = pipeline.start(&bus, StoreSource::RunDirectory).unwrap_err();
    assert!(err.is_fatal());
    assert!(!pipeline.is_running());

    bus.consumer("a", |_| {});
    assert_eq!(bus.send("a", "still delivered"), 1);
}

/// Test: application headers are persisted without the causality header
#[test]
fn test_headers_persisted_without_trace_header() {
    let bus = LocalBus::new();
    bus.add_outbound_interceptor(Arc::new(|ctx: &mut dyn DeliveryContext| {
        ctx.headers_mut().set("tenant", "acme");
    }));
    let (mut pipeline, handle) = start_memory(&bus, config());
    bus.consumer("a", |_| {});
    bus.send("a", "x");
    pipeline.stop(&bus).unwrap();

    let records = TraceInspector::new(handle).records().unwrap();
    assert_eq!(records.len(), 2);
    for record in records {
        assert_eq!(record.headers, "tenant: acme");
    }
}
