//! Pipeline configuration
//!
//! Every field has a default, so an empty TOML document is a valid config.
//!
//! ```toml
//! output_dir = "/var/lib/app/bustrace"
//! channel_capacity = 10000
//! backpressure = "drop_newest"   # or "block"
//! block_timeout_ms = 2
//! poll_interval_ms = 1000
//! drain_timeout_ms = 30000
//! commit_attempts = 2
//! sync = "batched"               # "strict", "batched" or "on_close"
//! sync_batch_size = 256
//! ```

use crate::channel::Backpressure;
use bustrace_core::TraceError;
use bustrace_storage::SyncMode;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Full-channel behaviour as configured
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackpressurePolicy {
    /// Drop the new event and count it
    #[default]
    DropNewest,
    /// Wait up to `block_timeout_ms`, then drop
    Block,
}

/// Log store fsync policy as configured
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncPolicy {
    /// fsync every commit
    Strict,
    /// fsync every `sync_batch_size` commits
    #[default]
    Batched,
    /// fsync only on close
    OnClose,
}

/// Configuration of a trace pipeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TraceConfig {
    /// Parent directory of per-run trace directories
    pub output_dir: PathBuf,
    /// Hand-off channel bound
    pub channel_capacity: usize,
    /// Full-channel behaviour
    pub backpressure: BackpressurePolicy,
    /// Longest producer wait in `block` mode
    pub block_timeout_ms: u64,
    /// Writer receive timeout
    pub poll_interval_ms: u64,
    /// Total bound on [`stop`](crate::TracePipeline::stop) waiting for the writer
    ///
    /// Three quarters go to draining the channel. If that runs out the queue
    /// is discarded and the rest is left for the writer to finish its current
    /// commit and close the store. A writer still busy after that is detached.
    pub drain_timeout_ms: u64,
    /// Commit attempts per record
    pub commit_attempts: u32,
    /// Log store fsync policy
    pub sync: SyncPolicy,
    /// Commits between fsyncs in `batched` mode
    pub sync_batch_size: usize,
}

impl Default for TraceConfig {
    fn default() -> Self {
        TraceConfig {
            output_dir: PathBuf::from("./bustrace"),
            channel_capacity: 10_000,
            backpressure: BackpressurePolicy::DropNewest,
            block_timeout_ms: 2,
            poll_interval_ms: 1_000,
            drain_timeout_ms: 30_000,
            commit_attempts: 2,
            sync: SyncPolicy::Batched,
            sync_batch_size: 256,
        }
    }
}

impl TraceConfig {
    /// Default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse and validate TOML text
    pub fn from_toml_str(text: &str) -> Result<Self, TraceError> {
        let config: TraceConfig =
            toml::from_str(text).map_err(|e| TraceError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, TraceError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| TraceError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&text)
    }

    /// Reject settings the pipeline cannot run with
    pub fn validate(&self) -> Result<(), TraceError> {
        if self.channel_capacity == 0 {
            return Err(TraceError::Config("channel_capacity must be > 0".into()));
        }
        if self.commit_attempts == 0 {
            return Err(TraceError::Config("commit_attempts must be > 0".into()));
        }
        if self.sync_batch_size == 0 {
            return Err(TraceError::Config("sync_batch_size must be > 0".into()));
        }
        Ok(())
    }

    /// Set the output directory
    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    /// Set the channel capacity
    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity;
        self
    }

    /// Set the full-channel behaviour
    pub fn backpressure(mut self, policy: BackpressurePolicy) -> Self {
        self.backpressure = policy;
        self
    }

    /// Set the producer wait of `block` mode
    pub fn block_timeout(mut self, timeout: Duration) -> Self {
        self.block_timeout_ms = duration_ms(timeout);
        self
    }

    /// Set the writer receive timeout
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval_ms = duration_ms(interval);
        self
    }

    /// Set the drain bound
    pub fn drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout_ms = duration_ms(timeout);
        self
    }

    /// Set commit attempts per record
    pub fn commit_attempts(mut self, attempts: u32) -> Self {
        self.commit_attempts = attempts;
        self
    }

    /// Set the fsync policy
    pub fn sync(mut self, policy: SyncPolicy) -> Self {
        self.sync = policy;
        self
    }

    /// Set the commits between fsyncs in `batched` mode
    pub fn sync_batch_size(mut self, size: usize) -> Self {
        self.sync_batch_size = size;
        self
    }

    /// Channel policy derived from the config
    pub fn channel_policy(&self) -> Backpressure {
        match self.backpressure {
            BackpressurePolicy::DropNewest => Backpressure::DropNewest,
            BackpressurePolicy::Block => Backpressure::Block {
                timeout: Duration::from_millis(self.block_timeout_ms),
            },
        }
    }

    /// Log store sync mode derived from the config
    pub fn sync_mode(&self) -> SyncMode {
        match self.sync {
            SyncPolicy::Strict => SyncMode::Strict,
            SyncPolicy::Batched => SyncMode::Batched {
                batch_size: self.sync_batch_size,
            },
            SyncPolicy::OnClose => SyncMode::OnClose,
        }
    }

    /// Writer receive timeout
    pub fn poll_interval_duration(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Drain bound
    pub fn drain_timeout_duration(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }
}

fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
