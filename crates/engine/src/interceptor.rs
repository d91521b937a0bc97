//! Capture hooks registered on the bus
//!
//! Each hook snapshots the in-flight message into a [`CaptureEvent`], pushes
//! it to the hand-off channel and returns. Nothing here touches the store or
//! waits on the writer; the only wait is the bounded one of
//! [`Backpressure::Block`](crate::channel::Backpressure::Block).
//!
//! | Direction | Header absent | Header malformed |
//! |-----------|---------------|------------------|
//! | Outbound | root header synthesised and attached | replaced by a root header |
//! | Inbound | captured unlabeled | captured unlabeled, counted |

use crate::bus::{DeliveryContext, EventBus, Interceptor, InterceptorId};
use crate::channel::{Backpressure, HandoffChannel, PushError};
use crate::stats::PipelineStats;
use bustrace_core::{CaptureEvent, CausalityHeader, Direction, TraceError};
use std::sync::Arc;
use tracing::{debug, trace};

/// Hook that captures one direction of traffic
pub struct CaptureInterceptor {
    direction: Direction,
    channel: Arc<HandoffChannel<CaptureEvent>>,
    stats: Arc<PipelineStats>,
}

impl CaptureInterceptor {
    /// Create a hook feeding `channel`
    pub fn new(
        direction: Direction,
        channel: Arc<HandoffChannel<CaptureEvent>>,
        stats: Arc<PipelineStats>,
    ) -> Self {
        CaptureInterceptor {
            direction,
            channel,
            stats,
        }
    }

    /// Direction this hook captures
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Capture the message and hand it off
    ///
    /// Errors describe what happened to the event; delivery is unaffected
    /// either way.
    pub fn capture(&self, ctx: &mut dyn DeliveryContext) -> Result<(), TraceError> {
        let causality = match self.direction {
            Direction::Sent => Some(self.ensure_header(ctx)),
            Direction::Received => self.read_header(ctx),
        };

        let event = CaptureEvent::new(ctx.snapshot(), causality, self.direction);
        match self.channel.push(event) {
            Ok(()) => Ok(()),
            Err(PushError::Full(_)) => match self.channel.policy() {
                Backpressure::Block { .. } => Err(TraceError::ChannelSaturated {
                    capacity: self.channel.capacity(),
                }),
                Backpressure::DropNewest => Ok(()),
            },
            Err(PushError::Closed(_)) => Err(TraceError::InvalidState(
                "trace channel closed".to_string(),
            )),
        }
    }

    fn ensure_header(&self, ctx: &mut dyn DeliveryContext) -> CausalityHeader {
        match CausalityHeader::extract(ctx.headers()) {
            Ok(Some(header)) => header,
            Ok(None) => {
                let header = CausalityHeader::root(None);
                header.attach(ctx.headers_mut());
                header
            }
            Err(e) => {
                PipelineStats::incr(&self.stats.malformed_headers);
                debug!(address = ctx.address(), error = %e, "Replacing malformed causality header");
                let header = CausalityHeader::root(None);
                header.attach(ctx.headers_mut());
                header
            }
        }
    }

    fn read_header(&self, ctx: &dyn DeliveryContext) -> Option<CausalityHeader> {
        match CausalityHeader::extract(ctx.headers()) {
            Ok(header) => header,
            Err(e) => {
                PipelineStats::incr(&self.stats.malformed_headers);
                debug!(address = ctx.address(), error = %e, "Capturing message unlabeled");
                None
            }
        }
    }
}

impl Interceptor for CaptureInterceptor {
    fn intercept(&self, ctx: &mut dyn DeliveryContext) {
        if let Err(e) = self.capture(ctx) {
            trace!(direction = %self.direction, error = %e, "Capture not enqueued");
        }
    }
}

/// Outbound and inbound hooks sharing one channel
pub struct InterceptorPair {
    outbound: Arc<CaptureInterceptor>,
    inbound: Arc<CaptureInterceptor>,
    registered: Option<(InterceptorId, InterceptorId)>,
}

impl InterceptorPair {
    /// Create both hooks over `channel`
    pub fn new(channel: Arc<HandoffChannel<CaptureEvent>>, stats: Arc<PipelineStats>) -> Self {
        InterceptorPair {
            outbound: Arc::new(CaptureInterceptor::new(
                Direction::Sent,
                Arc::clone(&channel),
                Arc::clone(&stats),
            )),
            inbound: Arc::new(CaptureInterceptor::new(Direction::Received, channel, stats)),
            registered: None,
        }
    }

    /// Register both hooks on `bus`; a second call is a no-op
    pub fn register(&mut self, bus: &dyn EventBus) {
        if self.registered.is_some() {
            return;
        }
        let out = bus.add_outbound_interceptor(self.outbound.clone());
        let inb = bus.add_inbound_interceptor(self.inbound.clone());
        self.registered = Some((out, inb));
    }

    /// Remove both hooks from `bus`
    pub fn unregister(&mut self, bus: &dyn EventBus) {
        if let Some((out, inb)) = self.registered.take() {
            bus.remove_interceptor(out);
            bus.remove_interceptor(inb);
        }
    }

    /// Whether the hooks are currently registered
    pub fn is_registered(&self) -> bool {
        self.registered.is_some()
    }
}
