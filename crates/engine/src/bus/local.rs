//! In-process message bus
//!
//! Synchronous point-to-point, publish and request/reply delivery on the
//! caller's thread, with outbound and inbound interceptor chains.
//!
//! ## Causal propagation
//!
//! Consumers receive a [`Delivery`]. Messages sent through it (`reply`,
//! `send`, `publish`, `request`) automatically carry a causality header whose
//! parent is the delivered message, so reply and forward chains link up
//! without the consumer touching headers.
//!
//! A [`MessageSender`] binds an address and a set of [`TraceOptions`] so a
//! producer can label or parent every message it writes.
//!
//! ## Reply handlers
//!
//! `request` parks its reply handler under a one-shot reply address. The
//! handler is removed when the reply arrives, when nothing received the
//! request, or when the request's [`Delivery`] is dropped without replying.

use super::{DeliveryContext, EventBus, Interceptor, InterceptorId};
use bustrace_core::{CausalityHeader, Headers, MessageId, Payload};
use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::trace;

const REPLY_PREFIX: &str = "__bustrace.reply.";

type Handler = Arc<dyn Fn(Delivery) + Send + Sync>;
type ReplyHandler = Box<dyn FnOnce(Delivery) + Send>;
type Chain = RwLock<Vec<(InterceptorId, Arc<dyn Interceptor>)>>;

/// A message travelling through a [`LocalBus`]
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    address: String,
    reply_address: Option<String>,
    headers: Headers,
    body: Payload,
}

impl Message {
    /// Create a message for `address`
    pub fn new(address: impl Into<String>, body: impl Into<Payload>) -> Self {
        Message {
            address: address.into(),
            reply_address: None,
            headers: Headers::new(),
            body: body.into(),
        }
    }

    /// Destination address
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Reply address, if any
    pub fn reply_address(&self) -> Option<&str> {
        self.reply_address.as_deref()
    }

    /// Headers
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Body
    pub fn body(&self) -> &Payload {
        &self.body
    }

    /// Causality header, if present and well-formed
    pub fn causality(&self) -> Option<CausalityHeader> {
        CausalityHeader::extract(&self.headers).ok().flatten()
    }
}

impl DeliveryContext for Message {
    fn address(&self) -> &str {
        &self.address
    }

    fn reply_address(&self) -> Option<&str> {
        self.reply_address.as_deref()
    }

    fn headers(&self) -> &Headers {
        &self.headers
    }

    fn headers_mut(&mut self) -> &mut Headers {
        &mut self.headers
    }

    fn body_text(&self) -> String {
        self.body.to_text()
    }
}

/// Causal options for an outgoing message
///
/// Without options the outbound tracing hook treats the message as a root.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TraceOptions {
    label: Option<String>,
    parents: Vec<MessageId>,
}

impl TraceOptions {
    /// Empty options
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the label
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Add a parent id
    pub fn parent(mut self, id: MessageId) -> Self {
        self.parents.push(id);
        self
    }

    /// Descend from `header`, inheriting its label when none is set
    pub fn context(mut self, header: &CausalityHeader) -> Self {
        self.parents.push(header.message_id.clone());
        if self.label.is_none() {
            self.label = header.label.clone();
        }
        self
    }

    /// Build a fresh header from these options
    pub fn header(&self) -> CausalityHeader {
        CausalityHeader::create(self.parents.clone(), self.label.clone())
    }
}

/// Producer bound to one address
///
/// `write` follows the sender's mode (point-to-point for
/// [`LocalBus::sender`], publish for [`LocalBus::publisher`]); `send` and
/// `request` are always point-to-point. Every message carries the sender's
/// options.
#[derive(Clone)]
pub struct MessageSender {
    bus: LocalBus,
    address: String,
    mode: Mode,
    options: TraceOptions,
}

impl MessageSender {
    /// Address messages go to
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Options attached to every message
    pub fn options(&self) -> &TraceOptions {
        &self.options
    }

    /// Label every message
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.options = self.options.label(label);
        self
    }

    /// Parent every message on `message`, if it carries a causality header
    pub fn context(mut self, message: &Message) -> Self {
        if let Some(header) = message.causality() {
            self.options = self.options.context(&header);
        }
        self
    }

    /// Replace the options
    pub fn with_options(mut self, options: TraceOptions) -> Self {
        self.options = options;
        self
    }

    /// Write using the sender's mode; returns deliveries made
    pub fn write(&self, body: impl Into<Payload>) -> usize {
        let message = prepare(
            Message::new(self.address.as_str(), body),
            Some(self.options.clone()),
        );
        self.bus.dispatch(message, self.mode)
    }

    /// Send to one consumer
    pub fn send(&self, body: impl Into<Payload>) -> usize {
        self.bus.send_with(&self.address, body, Some(self.options.clone()))
    }

    /// Send to one consumer and route its reply to `on_reply`
    pub fn request<F>(&self, body: impl Into<Payload>, on_reply: F) -> usize
    where
        F: FnOnce(Delivery) + Send + 'static,
    {
        self.bus
            .request(&self.address, body, Some(self.options.clone()), on_reply)
    }
}

/// A message handed to a consumer
pub struct Delivery {
    message: Message,
    bus: LocalBus,
}

impl Delivery {
    /// The delivered message
    pub fn message(&self) -> &Message {
        &self.message
    }

    /// Body of the delivered message
    pub fn body(&self) -> &Payload {
        &self.message.body
    }

    /// Headers of the delivered message
    pub fn headers(&self) -> &Headers {
        &self.message.headers
    }

    /// Causality header of the delivered message
    pub fn causality(&self) -> Option<CausalityHeader> {
        self.message.causality()
    }

    /// Options descending from this delivery
    pub fn options(&self) -> TraceOptions {
        match self.causality() {
            Some(header) => TraceOptions::new().context(&header),
            None => TraceOptions::new(),
        }
    }

    /// Reply to the sender; returns false if no reply was expected
    pub fn reply(&self, body: impl Into<Payload>) -> bool {
        match self.message.reply_address.as_deref() {
            Some(addr) => self.bus.send_with(addr, body, Some(self.options())) > 0,
            None => false,
        }
    }

    /// Send a downstream message descending from this delivery
    pub fn send(&self, address: &str, body: impl Into<Payload>) -> usize {
        self.bus.send_with(address, body, Some(self.options()))
    }

    /// Publish a downstream message descending from this delivery
    pub fn publish(&self, address: &str, body: impl Into<Payload>) -> usize {
        self.bus.publish_with(address, body, Some(self.options()))
    }

    /// Send a downstream request descending from this delivery
    pub fn request<F>(&self, address: &str, body: impl Into<Payload>, on_reply: F) -> usize
    where
        F: FnOnce(Delivery) + Send + 'static,
    {
        self.bus.request(address, body, Some(self.options()), on_reply)
    }

    /// Sender on `address` whose messages descend from this delivery
    pub fn sender(&self, address: impl Into<String>) -> MessageSender {
        self.bus.sender(address).with_options(self.options())
    }
}

impl Drop for Delivery {
    fn drop(&mut self) {
        if let Some(addr) = self.message.reply_address.as_deref() {
            if addr.starts_with(REPLY_PREFIX)
                && self.bus.inner.replies.lock().remove(addr).is_some()
            {
                trace!(reply_address = addr, "Request dropped without reply");
            }
        }
    }
}

#[derive(Clone, Copy)]
enum Mode {
    PointToPoint,
    Publish,
}

struct BusInner {
    consumers: RwLock<FxHashMap<String, Vec<(u64, Handler)>>>,
    replies: Mutex<FxHashMap<String, ReplyHandler>>,
    outbound: Chain,
    inbound: Chain,
    next_id: AtomicU64,
    cursor: AtomicUsize,
}

/// In-process bus
#[derive(Clone)]
pub struct LocalBus {
    inner: Arc<BusInner>,
}

impl Default for LocalBus {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalBus {
    /// Create a bus with no consumers and no interceptors
    pub fn new() -> Self {
        LocalBus {
            inner: Arc::new(BusInner {
                consumers: RwLock::new(FxHashMap::default()),
                replies: Mutex::new(FxHashMap::default()),
                outbound: RwLock::new(Vec::new()),
                inbound: RwLock::new(Vec::new()),
                next_id: AtomicU64::new(1),
                cursor: AtomicUsize::new(0),
            }),
        }
    }

    fn next_id(&self) -> u64 {
        self.inner.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Register a consumer on `address`; returns its id
    pub fn consumer<F>(&self, address: impl Into<String>, handler: F) -> u64
    where
        F: Fn(Delivery) + Send + Sync + 'static,
    {
        let id = self.next_id();
        self.inner
            .consumers
            .write()
            .entry(address.into())
            .or_default()
            .push((id, Arc::new(handler)));
        id
    }

    /// Remove a consumer; returns whether it existed
    pub fn remove_consumer(&self, id: u64) -> bool {
        let mut consumers = self.inner.consumers.write();
        let mut removed = false;
        for handlers in consumers.values_mut() {
            let before = handlers.len();
            handlers.retain(|(hid, _)| *hid != id);
            removed |= handlers.len() != before;
        }
        consumers.retain(|_, handlers| !handlers.is_empty());
        removed
    }

    /// Point-to-point sender bound to `address`
    pub fn sender(&self, address: impl Into<String>) -> MessageSender {
        MessageSender {
            bus: self.clone(),
            address: address.into(),
            mode: Mode::PointToPoint,
            options: TraceOptions::new(),
        }
    }

    /// Publishing sender bound to `address`
    pub fn publisher(&self, address: impl Into<String>) -> MessageSender {
        MessageSender {
            mode: Mode::Publish,
            ..self.sender(address)
        }
    }

    /// Reply handlers still waiting for a reply
    pub fn pending_replies(&self) -> usize {
        self.inner.replies.lock().len()
    }

    /// Send to one consumer of `address`; returns deliveries made
    pub fn send(&self, address: &str, body: impl Into<Payload>) -> usize {
        self.send_with(address, body, None)
    }

    /// Send with causal options
    pub fn send_with(
        &self,
        address: &str,
        body: impl Into<Payload>,
        options: Option<TraceOptions>,
    ) -> usize {
        let message = prepare(Message::new(address, body), options);
        self.dispatch(message, Mode::PointToPoint)
    }

    /// Deliver to every consumer of `address`
    pub fn publish(&self, address: &str, body: impl Into<Payload>) -> usize {
        self.publish_with(address, body, None)
    }

    /// Publish with causal options
    pub fn publish_with(
        &self,
        address: &str,
        body: impl Into<Payload>,
        options: Option<TraceOptions>,
    ) -> usize {
        let message = prepare(Message::new(address, body), options);
        self.dispatch(message, Mode::Publish)
    }

    /// Send to one consumer and route its reply to `on_reply`
    pub fn request<F>(
        &self,
        address: &str,
        body: impl Into<Payload>,
        options: Option<TraceOptions>,
        on_reply: F,
    ) -> usize
    where
        F: FnOnce(Delivery) + Send + 'static,
    {
        let reply_address = format!("{}{}", REPLY_PREFIX, self.next_id());
        self.inner
            .replies
            .lock()
            .insert(reply_address.clone(), Box::new(on_reply));

        let mut message = prepare(Message::new(address, body), options);
        message.reply_address = Some(reply_address.clone());
        let delivered = self.dispatch(message, Mode::PointToPoint);
        if delivered == 0 {
            self.inner.replies.lock().remove(&reply_address);
        }
        delivered
    }

    fn dispatch(&self, mut message: Message, mode: Mode) -> usize {
        run_chain(&self.inner.outbound, &mut message);

        let reply_handler = self.inner.replies.lock().remove(&message.address);
        if let Some(handler) = reply_handler {
            handler(self.receive(message));
            return 1;
        }

        let targets: Vec<Handler> = {
            let consumers = self.inner.consumers.read();
            match consumers.get(&message.address) {
                None => Vec::new(),
                Some(handlers) => match mode {
                    Mode::Publish => handlers.iter().map(|(_, h)| Arc::clone(h)).collect(),
                    Mode::PointToPoint => {
                        let i = self.inner.cursor.fetch_add(1, Ordering::Relaxed) % handlers.len();
                        vec![Arc::clone(&handlers[i].1)]
                    }
                },
            }
        };

        if targets.is_empty() {
            trace!(address = %message.address, "No consumer for message");
        }
        let count = targets.len();
        for handler in targets {
            handler(self.receive(message.clone()));
        }
        count
    }

    fn receive(&self, mut message: Message) -> Delivery {
        run_chain(&self.inner.inbound, &mut message);
        Delivery {
            message,
            bus: self.clone(),
        }
    }
}

impl EventBus for LocalBus {
    fn add_outbound_interceptor(&self, interceptor: Arc<dyn Interceptor>) -> InterceptorId {
        let id = InterceptorId(self.next_id());
        self.inner.outbound.write().push((id, interceptor));
        id
    }

    fn add_inbound_interceptor(&self, interceptor: Arc<dyn Interceptor>) -> InterceptorId {
        let id = InterceptorId(self.next_id());
        self.inner.inbound.write().push((id, interceptor));
        id
    }

    fn remove_interceptor(&self, id: InterceptorId) -> bool {
        let mut removed = false;
        for chain in [&self.inner.outbound, &self.inner.inbound] {
            let mut chain = chain.write();
            let before = chain.len();
            chain.retain(|(iid, _)| *iid != id);
            removed |= chain.len() != before;
        }
        removed
    }
}

fn prepare(mut message: Message, options: Option<TraceOptions>) -> Message {
    if let Some(options) = options {
        options.header().attach(&mut message.headers);
    }
    message
}

fn run_chain(chain: &Chain, message: &mut Message) {
    let interceptors: Vec<Arc<dyn Interceptor>> =
        chain.read().iter().map(|(_, i)| Arc::clone(i)).collect();
    for interceptor in interceptors {
        interceptor.intercept(message);
    }
}
