//! Tracer API Test Suite
//!
//! Verifies the facade attaches to a bus, traces causal chains end to end
//! and degrades to an untraced bus when the store is unavailable.
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test --test tracer_api
//! cargo test --test tracer_api fallback::
//! ```

use bustrace::prelude::*;
use std::time::Duration;

// Test modules
pub mod fallback;
pub mod lifecycle;

// =============================================================================
// SHARED TEST UTILITIES
// =============================================================================

/// Route tracer logs to the test harness output
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

/// Builder with a short writer poll so tests drain quickly
pub fn fast_builder() -> BusTracerBuilder {
    init_tracing();
    BusTracer::builder()
        .poll_interval(Duration::from_millis(5))
        .drain_timeout(Duration::from_secs(10))
}

/// Attach a tracer backed by an in-memory store
pub fn memory_tracer(bus: &LocalBus) -> (BusTracer, bustrace::bustrace_storage::MemoryHandle) {
    let store = MemoryStore::new();
    let handle = store.handle();
    let tracer = fast_builder()
        .store(store)
        .try_attach(bus.clone())
        .expect("memory store always opens");
    (tracer, handle)
}
