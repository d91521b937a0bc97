//! Pipeline counters
//!
//! Writer-side and interceptor-side counters live here. Channel counters
//! (pushed, dropped, rejected) live on the channel itself and are merged
//! into a [`StatsSnapshot`] on read.

use crate::channel::ChannelMetrics;
use std::sync::atomic::{AtomicU64, Ordering};

/// Live counters shared by interceptors and the writer
#[derive(Debug, Default)]
pub struct PipelineStats {
    /// Captures that carried an unparsable causality header
    pub malformed_headers: AtomicU64,
    /// Records committed to the store
    pub persisted: AtomicU64,
    /// Records dropped after exhausting commit attempts
    pub failed: AtomicU64,
    /// Queued events discarded because the drain timed out
    pub lost: AtomicU64,
}

impl PipelineStats {
    /// Create zeroed counters
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn incr(counter: &AtomicU64) {
        Self::add(counter, 1);
    }

    pub(crate) fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    /// Point-in-time copy merged with channel counters
    pub fn snapshot(&self, channel: Option<&ChannelMetrics>) -> StatsSnapshot {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        StatsSnapshot {
            enqueued: channel.map_or(0, |m| load(&m.pushed)),
            dropped: channel.map_or(0, |m| load(&m.dropped)),
            rejected: channel.map_or(0, |m| load(&m.rejected)),
            malformed_headers: load(&self.malformed_headers),
            persisted: load(&self.persisted),
            failed: load(&self.failed),
            lost: load(&self.lost),
        }
    }
}

/// Point-in-time counter values
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Events accepted by the channel
    pub enqueued: u64,
    /// Events dropped on a full channel
    pub dropped: u64,
    /// Events refused after shutdown began
    pub rejected: u64,
    /// Captures with an unparsable causality header
    pub malformed_headers: u64,
    /// Records committed
    pub persisted: u64,
    /// Records dropped after failed commits
    pub failed: u64,
    /// Events discarded by a timed-out drain
    pub lost: u64,
}

impl StatsSnapshot {
    /// Events that will never reach the store
    pub fn total_lost(&self) -> u64 {
        self.dropped + self.rejected + self.failed + self.lost
    }
}
