//! Sync modes for the log store.
//!
//! Defines when committed batches are fsynced to disk.

/// When the log store fsyncs committed batches.
///
/// Every mode fsyncs on close, so a clean shutdown is always durable. The
/// modes differ in how much a crash can lose.
///
/// # Mode Comparison
///
/// | Mode | fsync | Crash Loss Window |
/// |------|-------|-------------------|
/// | OnClose | close only | Whole run |
/// | Batched | every N commits | Up to N commits |
/// | Strict | every commit | None |
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    /// fsync only when the store is closed.
    OnClose,

    /// fsync after every commit (slowest, no crash loss).
    Strict,

    /// fsync every `batch_size` commits.
    Batched {
        /// Maximum commits between fsyncs
        batch_size: usize,
    },
}

impl SyncMode {
    /// Check if this mode requires fsync on every commit.
    pub fn requires_immediate_fsync(&self) -> bool {
        matches!(self, SyncMode::Strict)
    }

    /// Whether a commit that brings the unsynced count to `pending` must fsync.
    pub fn should_sync(&self, pending: usize) -> bool {
        match self {
            SyncMode::OnClose => false,
            SyncMode::Strict => true,
            SyncMode::Batched { batch_size } => pending >= (*batch_size).max(1),
        }
    }

    /// Human-readable description of the mode.
    pub fn description(&self) -> &'static str {
        match self {
            SyncMode::OnClose => "fsync on close (fastest, run lost on crash)",
            SyncMode::Strict => "fsync every commit (safest, slowest)",
            SyncMode::Batched { .. } => "batched fsync (balanced speed/safety)",
        }
    }
}

impl Default for SyncMode {
    fn default() -> Self {
        SyncMode::Batched { batch_size: 256 }
    }
}
