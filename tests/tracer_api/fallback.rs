//! Store-unavailable fallback: the bus keeps running untraced

use crate::fast_builder;
use bustrace::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn blocked_output() -> (tempfile::TempDir, std::path::PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("occupied");
    std::fs::write(&file, b"not a directory").unwrap();
    (dir, file)
}

#[test]
fn test_attach_falls_back_to_untraced() {
    let (_dir, blocked) = blocked_output();
    let bus = LocalBus::new();
    let tracer = BusTracer::attach(bus.clone(), TraceConfig::new().output_dir(&blocked));

    assert!(!tracer.is_enabled());
    assert!(tracer.disabled_reason().unwrap().contains("store unavailable"));

    let hits = Arc::new(AtomicUsize::new(0));
    {
        let hits = Arc::clone(&hits);
        bus.consumer("a", move |d: Delivery| {
            assert!(d.causality().is_none());
            hits.fetch_add(1, Ordering::SeqCst);
        });
    }
    assert_eq!(bus.send("a", "x"), 1);
    assert_eq!(hits.load(Ordering::SeqCst), 1);

    let report = tracer.shutdown().unwrap();
    assert_eq!(report, ShutdownReport::default());
}

#[test]
fn test_try_attach_surfaces_error() {
    let (_dir, blocked) = blocked_output();
    let bus = LocalBus::new();
    let err = fast_builder()
        .output_dir(&blocked)
        .try_attach(bus)
        .err()
        .unwrap();

    assert!(err.is_fatal());
    assert!(matches!(err, Error::StoreUnavailable(_)));
}
