//! Capture pipeline for bustrace
//!
//! This crate moves intercepted messages from bus threads into a durable
//! store without blocking delivery:
//! - [`bus`]: the bus boundary ([`EventBus`], [`Interceptor`]) and [`LocalBus`]
//! - [`HandoffChannel`]: bounded MPSC queue with drop-newest or bounded-block
//!   backpressure
//! - [`InterceptorPair`]: outbound and inbound capture hooks
//! - [`TraceWriter`]: the single background consumer, owner of the store
//! - [`CorrelationIndex`]: `message_id -> record` for sent records
//! - [`TracePipeline`]: start/stop lifecycle with bounded drain
//! - [`TraceInspector`]: read-side queries over a persisted trace
//!
//! # Data flow
//!
//! ```text
//! bus thread -> Interceptor -> CaptureEvent -> HandoffChannel -> TraceWriter -> DurableStore
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod bus;
pub mod channel;
pub mod config;
pub mod index;
pub mod inspect;
pub mod interceptor;
pub mod pipeline;
pub mod stats;
pub mod writer;

pub use bus::{
    Delivery, DeliveryContext, EventBus, Interceptor, InterceptorId, LocalBus, Message,
    MessageSender, TraceOptions,
};
pub use channel::{Backpressure, ChannelMetrics, HandoffChannel, PushError, Recv};
pub use config::{BackpressurePolicy, SyncPolicy, TraceConfig};
pub use index::CorrelationIndex;
pub use inspect::TraceInspector;
pub use interceptor::{CaptureInterceptor, InterceptorPair};
pub use pipeline::{PipelineState, ShutdownReport, StoreSource, TracePipeline};
pub use stats::{PipelineStats, StatsSnapshot};
pub use writer::{TraceWriter, WriterHandle, WriterSummary};
