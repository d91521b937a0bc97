//! Bounded hand-off channel between bus threads and the trace writer
//!
//! Many producers (interceptors on bus dispatch threads), one consumer (the
//! writer). The channel is the only structure shared between them.
//!
//! ## Backpressure
//!
//! | Policy | Full channel | Producer cost |
//! |--------|--------------|---------------|
//! | [`Backpressure::DropNewest`] | new event dropped, counted | lock + push |
//! | [`Backpressure::Block`] | wait up to `timeout`, then drop | bounded wait |
//!
//! `DropNewest` is the default: tracing is best-effort and must never stall
//! delivery.
//!
//! ## Shutdown
//!
//! [`HandoffChannel::close`] stops accepting. Items already queued stay
//! receivable; [`HandoffChannel::recv_timeout`] reports [`Recv::Closed`] only
//! once the queue is empty.

use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// What a producer does when the channel is full
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backpressure {
    /// Drop the new item immediately
    DropNewest,
    /// Wait for space at most `timeout`, then drop the new item
    Block {
        /// Longest a producer may wait
        timeout: Duration,
    },
}

impl Default for Backpressure {
    fn default() -> Self {
        Backpressure::DropNewest
    }
}

/// Why a push did not enqueue; the item is handed back
#[derive(Debug)]
pub enum PushError<T> {
    /// Channel at capacity (after the bounded wait, in blocking mode)
    Full(T),
    /// Channel no longer accepts items
    Closed(T),
}

impl<T> PushError<T> {
    /// Recover the rejected item
    pub fn into_inner(self) -> T {
        match self {
            PushError::Full(t) | PushError::Closed(t) => t,
        }
    }
}

/// Outcome of a receive
#[derive(Debug, PartialEq, Eq)]
pub enum Recv<T> {
    /// Next item in enqueue order
    Item(T),
    /// Nothing arrived before the deadline
    Timeout,
    /// Closed and fully drained
    Closed,
}

/// Counters for channel monitoring
#[derive(Debug, Default)]
pub struct ChannelMetrics {
    /// Items successfully enqueued
    pub pushed: AtomicU64,
    /// Items dropped because the channel was full
    pub dropped: AtomicU64,
    /// Items refused because the channel was closed
    pub rejected: AtomicU64,
    /// Items handed to the consumer
    pub received: AtomicU64,
    /// Items discarded by [`HandoffChannel::discard`]
    pub discarded: AtomicU64,
}

struct Inner<T> {
    queue: VecDeque<T>,
    closed: bool,
}

/// Bounded multi-producer single-consumer queue
pub struct HandoffChannel<T> {
    inner: Mutex<Inner<T>>,
    not_empty: Condvar,
    not_full: Condvar,
    capacity: usize,
    policy: Backpressure,
    metrics: ChannelMetrics,
}

impl<T> HandoffChannel<T> {
    /// Create a channel holding at most `capacity` items (minimum 1)
    pub fn new(capacity: usize, policy: Backpressure) -> Self {
        let capacity = capacity.max(1);
        HandoffChannel {
            inner: Mutex::new(Inner {
                queue: VecDeque::with_capacity(capacity.min(4096)),
                closed: false,
            }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            capacity,
            policy,
            metrics: ChannelMetrics::default(),
        }
    }

    /// Enqueue `item` according to the backpressure policy
    ///
    /// Never waits longer than the policy allows.
    pub fn push(&self, item: T) -> Result<(), PushError<T>> {
        let mut inner = self.inner.lock();
        if inner.closed {
            self.metrics.rejected.fetch_add(1, Ordering::Relaxed);
            return Err(PushError::Closed(item));
        }

        if inner.queue.len() >= self.capacity {
            if let Backpressure::Block { timeout } = self.policy {
                let deadline = Instant::now() + timeout;
                while inner.queue.len() >= self.capacity && !inner.closed {
                    if self.not_full.wait_until(&mut inner, deadline).timed_out() {
                        break;
                    }
                }
                if inner.closed {
                    self.metrics.rejected.fetch_add(1, Ordering::Relaxed);
                    return Err(PushError::Closed(item));
                }
            }
            if inner.queue.len() >= self.capacity {
                self.metrics.dropped.fetch_add(1, Ordering::Relaxed);
                return Err(PushError::Full(item));
            }
        }

        inner.queue.push_back(item);
        drop(inner);
        self.metrics.pushed.fetch_add(1, Ordering::Relaxed);
        self.not_empty.notify_one();
        Ok(())
    }

    /// Wait up to `timeout` for the next item
    pub fn recv_timeout(&self, timeout: Duration) -> Recv<T> {
        let deadline = Instant::now() + timeout;
        let mut inner = self.inner.lock();
        loop {
            if let Some(item) = inner.queue.pop_front() {
                drop(inner);
                self.metrics.received.fetch_add(1, Ordering::Relaxed);
                self.not_full.notify_one();
                return Recv::Item(item);
            }
            if inner.closed {
                return Recv::Closed;
            }
            if self.not_empty.wait_until(&mut inner, deadline).timed_out() {
                // One last look: an item may have landed with the timeout.
                if let Some(item) = inner.queue.pop_front() {
                    drop(inner);
                    self.metrics.received.fetch_add(1, Ordering::Relaxed);
                    self.not_full.notify_one();
                    return Recv::Item(item);
                }
                return if inner.closed { Recv::Closed } else { Recv::Timeout };
            }
        }
    }

    /// Stop accepting items; returns how many are still queued
    pub fn close(&self) -> usize {
        let mut inner = self.inner.lock();
        inner.closed = true;
        let pending = inner.queue.len();
        drop(inner);
        self.not_empty.notify_all();
        self.not_full.notify_all();
        pending
    }

    /// Drop every queued item; returns how many were dropped
    pub fn discard(&self) -> usize {
        let mut inner = self.inner.lock();
        let n = inner.queue.len();
        inner.queue.clear();
        drop(inner);
        self.metrics.discarded.fetch_add(n as u64, Ordering::Relaxed);
        self.not_full.notify_all();
        n
    }

    /// Whether [`close`](Self::close) has been called
    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    /// Items currently queued
    pub fn len(&self) -> usize {
        self.inner.lock().queue.len()
    }

    /// Whether nothing is queued
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of queued items
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Backpressure policy
    pub fn policy(&self) -> Backpressure {
        self.policy
    }

    /// Channel counters
    pub fn metrics(&self) -> &ChannelMetrics {
        &self.metrics
    }
}
