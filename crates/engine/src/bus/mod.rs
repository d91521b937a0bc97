//! Message bus boundary
//!
//! The bus itself is an external collaborator. This module fixes what the
//! tracing layer needs from it:
//! - [`DeliveryContext`]: access to the in-flight message
//! - [`Interceptor`]: a hook invoked synchronously before delivery (inbound)
//!   or transmission (outbound); the bus proceeds once it returns
//! - [`EventBus`]: registration of outbound and inbound hooks
//!
//! [`LocalBus`] is a small in-process implementation of the boundary.

mod local;

pub use local::{Delivery, LocalBus, Message, MessageSender, TraceOptions};

use bustrace_core::{Headers, MessageSnapshot};
use std::sync::Arc;

/// View of an in-flight message handed to an interceptor
pub trait DeliveryContext {
    /// Destination address
    fn address(&self) -> &str;

    /// Reply address, if the sender expects a reply
    fn reply_address(&self) -> Option<&str>;

    /// Message headers
    fn headers(&self) -> &Headers;

    /// Mutable message headers (keys are case-insensitive)
    fn headers_mut(&mut self) -> &mut Headers;

    /// Text rendering of the body
    fn body_text(&self) -> String;

    /// Read-only copy of the message as it is now
    fn snapshot(&self) -> MessageSnapshot {
        MessageSnapshot::new(
            self.address(),
            self.reply_address().map(str::to_string),
            self.headers().clone(),
            self.body_text(),
        )
    }
}

/// Hook invoked on every message crossing the bus
///
/// Must return promptly and must never fail delivery: the bus continues as
/// soon as `intercept` returns.
pub trait Interceptor: Send + Sync {
    /// Observe (and possibly annotate) the message
    fn intercept(&self, ctx: &mut dyn DeliveryContext);
}

impl<F> Interceptor for F
where
    F: Fn(&mut dyn DeliveryContext) + Send + Sync,
{
    fn intercept(&self, ctx: &mut dyn DeliveryContext) {
        self(ctx)
    }
}

/// Handle returned by interceptor registration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InterceptorId(pub u64);

/// Registration API offered by a bus
pub trait EventBus {
    /// Register a hook for outgoing messages
    fn add_outbound_interceptor(&self, interceptor: Arc<dyn Interceptor>) -> InterceptorId;

    /// Register a hook for incoming messages
    fn add_inbound_interceptor(&self, interceptor: Arc<dyn Interceptor>) -> InterceptorId;

    /// Remove a hook; returns whether it was registered
    fn remove_interceptor(&self, id: InterceptorId) -> bool;
}
