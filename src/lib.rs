//! # bustrace
//!
//! Non-blocking causal tracing for publish/subscribe message buses.
//!
//! bustrace records every message that crosses a bus, sent and received,
//! tags each with a causal identity so request/reply and fan-out chains can
//! be reconstructed afterwards, and persists the records from a background
//! writer so delivery never waits on storage.
//!
//! ## Quick Start
//!
//! ```ignore
//! use bustrace::prelude::*;
//!
//! let bus = LocalBus::new();
//! let tracer = BusTracer::attach(bus.clone(), TraceConfig::default());
//!
//! bus.consumer("orders", |d: Delivery| {
//!     // Carries the order message as parent.
//!     d.send("billing", "charge");
//! });
//! bus.send_with("orders", "order-1", Some(TraceOptions::new().label("checkout")));
//!
//! let report = tracer.shutdown()?;
//! let trace = TraceInspector::new(LogStore::read(report.run_dir.unwrap())?);
//! for record in trace.records()? {
//!     println!("{} {} {}", record.record_id, record.direction, record.target_address);
//! }
//! ```
//!
//! ## Crates
//!
//! | Crate | Contents |
//! |-------|----------|
//! | `bustrace-core` | Causality header, capture event, trace record, errors |
//! | `bustrace-storage` | `DurableStore`, memory store, CRC-framed log store |
//! | `bustrace-engine` | Bus boundary, hand-off channel, writer, pipeline, inspector |
//!
//! ## Guarantees
//!
//! - Interceptors never block beyond the configured bounded wait
//! - Everything enqueued before shutdown is persisted, unless the drain
//!   timeout expires (the remainder is reported as lost)
//! - `record_id` is strictly increasing in persistence order
//! - The correlation index maps each sent message id to exactly its record

#![warn(missing_docs)]
#![warn(clippy::all)]

mod error;
mod tracer;

pub mod prelude;

// Re-export main entry points
pub use error::{Error, Result};
pub use tracer::{BusTracer, BusTracerBuilder};

// Re-export component crates
pub use bustrace_core;
pub use bustrace_engine;
pub use bustrace_storage;
