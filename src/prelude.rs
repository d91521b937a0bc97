//! Convenient imports for bustrace.
//!
//! ```ignore
//! use bustrace::prelude::*;
//!
//! let bus = LocalBus::new();
//! let tracer = BusTracer::attach(bus.clone(), TraceConfig::default());
//! ```

// Main entry point
pub use crate::tracer::{BusTracer, BusTracerBuilder};

// Error handling
pub use crate::error::{Error, Result};

// Bus
pub use bustrace_engine::{
    Delivery, DeliveryContext, EventBus, LocalBus, Message, MessageSender, TraceOptions,
};

// Configuration and reporting
pub use bustrace_engine::{ShutdownReport, StatsSnapshot, TraceConfig};

// Reading traces
pub use bustrace_core::{CausalityHeader, Direction, MessageId, TraceRecord};
pub use bustrace_engine::TraceInspector;
pub use bustrace_storage::{LogStore, MemoryStore};
