//! Attach, trace and shut down through the facade

use crate::{fast_builder, memory_tracer};
use bustrace::prelude::*;

#[test]
fn test_attach_and_shutdown_reports_persisted() {
    let bus = LocalBus::new();
    let (tracer, handle) = memory_tracer(&bus);
    assert!(tracer.is_enabled());

    bus.consumer("greet", |d: Delivery| {
        d.reply("hi");
    });
    bus.request("greet", "hello", Some(TraceOptions::new().label("op1")), |_| {});

    let report = tracer.shutdown().unwrap();
    assert_eq!(report.persisted, 4);
    assert_eq!(report.total_lost(), 0);

    let records = TraceInspector::new(handle).records().unwrap();
    let labels: Vec<_> = records.iter().map(|r| r.label.as_str()).collect();
    assert_eq!(labels, vec!["op1"; 4]);
}

#[test]
fn test_run_directory_readable_after_shutdown() {
    let dir = tempfile::tempdir().unwrap();
    let bus = LocalBus::new();
    let tracer = fast_builder()
        .output_dir(dir.path())
        .strict_sync()
        .try_attach(bus.clone())
        .unwrap();
    let run_dir = tracer.run_dir().unwrap().to_path_buf();

    bus.consumer("orders", |d: Delivery| {
        d.send("billing", "charge");
    });
    bus.consumer("billing", |_| {});
    bus.send("orders", "order-1");

    let report = tracer.shutdown().unwrap();
    assert_eq!(report.run_dir.as_deref(), Some(run_dir.as_path()));

    let trace = TraceInspector::new(LogStore::read(&run_dir).unwrap());
    let order = trace
        .records()
        .unwrap()
        .into_iter()
        .find(|r| r.direction == Direction::Sent && r.target_address == "orders")
        .unwrap();
    let children = trace.children(&order.message_id).unwrap();
    assert_eq!(children.len(), 1);
    assert_eq!(children[0].target_address, "billing");
}

#[test]
fn test_drop_drains_like_shutdown() {
    let bus = LocalBus::new();
    let (tracer, handle) = memory_tracer(&bus);
    bus.consumer("a", |_| {});
    for _ in 0..20 {
        bus.send("a", "x");
    }
    drop(tracer);

    assert!(handle.is_closed());
    assert_eq!(TraceInspector::new(handle).count().unwrap(), 40);
}

#[test]
fn test_stats_while_running() {
    let bus = LocalBus::new();
    let (tracer, _handle) = memory_tracer(&bus);
    bus.send("nobody", "x");

    let stats = tracer.stats();
    assert_eq!(stats.enqueued, 1);
    tracer.shutdown().unwrap();
}

#[test]
fn test_config_file_applied() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bustrace.toml");
    std::fs::write(&path, "channel_capacity = 0\n").unwrap();

    let err = BusTracer::builder().config_file(&path).err().unwrap();
    assert!(err.is_config());
}

#[test]
fn test_labelled_sender_traced_with_context() {
    let bus = LocalBus::new();
    let (tracer, handle) = memory_tracer(&bus);

    bus.consumer("orders", |d: Delivery| {
        d.sender("billing").write("charge");
    });
    bus.consumer("billing", |_| {});
    let orders = bus.sender("orders").label("checkout");
    assert_eq!(orders.write("order-1"), 1);

    tracer.shutdown().unwrap();
    let trace = TraceInspector::new(handle);
    let records = trace.records().unwrap();
    let order = records
        .iter()
        .find(|r| r.direction == Direction::Sent && r.target_address == "orders")
        .unwrap();
    assert_eq!(order.label, "checkout");

    let children = trace.children(&order.message_id).unwrap();
    assert_eq!(children.len(), 1);
    assert_eq!(children[0].target_address, "billing");
    assert_eq!(children[0].label, "checkout");
}
