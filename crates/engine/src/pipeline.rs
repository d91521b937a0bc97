//! Pipeline lifecycle
//!
//! A [`TracePipeline`] wires the pieces together: store, channel, writer and
//! interceptors. Each instance owns its own counters and thread; any number
//! of pipelines may coexist.
//!
//! ## States
//!
//! ```text
//! Stopped -> Starting -> Running -> Draining -> Stopped
//!               |
//!               +-> Stopped (store unavailable)
//! ```
//!
//! ## Start
//!
//! 1. Open the store (on the caller's thread, so a failure surfaces here)
//! 2. Spawn the writer
//! 3. Register the interceptors
//!
//! ## Stop
//!
//! 1. Close the channel: further captures are rejected and counted
//! 2. Wait for the writer to drain, at most `drain_timeout`
//! 3. On timeout discard what is left and count it as lost
//! 4. Unregister the interceptors and join the writer, which has closed the
//!    store

use crate::bus::EventBus;
use crate::channel::HandoffChannel;
use crate::config::TraceConfig;
use crate::interceptor::InterceptorPair;
use crate::stats::{PipelineStats, StatsSnapshot};
use crate::writer::{TraceWriter, WriterHandle};
use bustrace_core::{CaptureEvent, TraceError};
use bustrace_storage::{DurableStore, LogStore, StoreError};
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

/// Prefix of per-run trace directories
pub const RUN_DIR_PREFIX: &str = "bustrace-";

const MAX_RUN_DIR_SUFFIX: u32 = 1000;

/// Lifecycle state of a pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    /// Not capturing
    Stopped,
    /// Opening the store and spawning the writer
    Starting,
    /// Capturing
    Running,
    /// Channel closed, writer finishing
    Draining,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineState::Stopped => "stopped",
            PipelineState::Starting => "starting",
            PipelineState::Running => "running",
            PipelineState::Draining => "draining",
        };
        f.write_str(name)
    }
}

type StoreOpener = Box<dyn FnOnce() -> bustrace_storage::Result<Box<dyn DurableStore>> + Send>;

/// Where the writer persists to
pub enum StoreSource {
    /// A [`LogStore`] in a fresh directory under the configured `output_dir`
    RunDirectory,
    /// A [`LogStore`] in exactly this directory
    Directory(PathBuf),
    /// An already opened store
    Provided(Box<dyn DurableStore>),
    /// A store opened on start by this closure
    Opener(StoreOpener),
}

impl StoreSource {
    /// Wrap an opened store
    pub fn provided(store: impl DurableStore + 'static) -> Self {
        StoreSource::Provided(Box::new(store))
    }

    /// Wrap a store-opening closure
    pub fn opener<F>(open: F) -> Self
    where
        F: FnOnce() -> bustrace_storage::Result<Box<dyn DurableStore>> + Send + 'static,
    {
        StoreSource::Opener(Box::new(open))
    }
}

impl fmt::Debug for StoreSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreSource::RunDirectory => f.write_str("RunDirectory"),
            StoreSource::Directory(dir) => f.debug_tuple("Directory").field(dir).finish(),
            StoreSource::Provided(store) => f.debug_tuple("Provided").field(&store.name()).finish(),
            StoreSource::Opener(_) => f.write_str("Opener"),
        }
    }
}

/// Final counters of a pipeline run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Records committed
    pub persisted: u64,
    /// Captures dropped on a full channel
    pub dropped: u64,
    /// Captures refused after the channel closed
    pub rejected: u64,
    /// Records dropped after failed commits
    pub failed: u64,
    /// Events discarded by a timed-out drain
    pub lost: u64,
    /// Captures with an unparsable causality header
    pub malformed_headers: u64,
    /// Whether the drain hit its timeout
    pub timed_out: bool,
    /// Directory of the log store, when the pipeline opened one
    pub run_dir: Option<PathBuf>,
}

impl ShutdownReport {
    /// Captures that never reached the store
    pub fn total_lost(&self) -> u64 {
        self.dropped + self.rejected + self.failed + self.lost
    }

    fn from_stats(stats: StatsSnapshot, timed_out: bool, run_dir: Option<PathBuf>) -> Self {
        ShutdownReport {
            persisted: stats.persisted,
            dropped: stats.dropped,
            rejected: stats.rejected,
            failed: stats.failed,
            lost: stats.lost,
            malformed_headers: stats.malformed_headers,
            timed_out,
            run_dir,
        }
    }
}

struct Running {
    channel: Arc<HandoffChannel<CaptureEvent>>,
    stats: Arc<PipelineStats>,
    interceptors: InterceptorPair,
    writer: WriterHandle,
    run_dir: Option<PathBuf>,
}

/// Capture pipeline attached to one bus
pub struct TracePipeline {
    config: TraceConfig,
    state: PipelineState,
    running: Option<Running>,
}

impl TracePipeline {
    /// Create a stopped pipeline
    pub fn new(config: TraceConfig) -> Self {
        TracePipeline {
            config,
            state: PipelineState::Stopped,
            running: None,
        }
    }

    /// Configuration in use
    pub fn config(&self) -> &TraceConfig {
        &self.config
    }

    /// Current lifecycle state
    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Whether interceptors are capturing
    pub fn is_running(&self) -> bool {
        self.state == PipelineState::Running
    }

    /// Directory of the current run's log store, if any
    pub fn run_dir(&self) -> Option<&Path> {
        self.running.as_ref().and_then(|r| r.run_dir.as_deref())
    }

    /// Live counters; zero when stopped
    pub fn stats(&self) -> StatsSnapshot {
        match &self.running {
            Some(r) => r.stats.snapshot(Some(r.channel.metrics())),
            None => StatsSnapshot::default(),
        }
    }

    /// Open the store, spawn the writer and register the interceptors
    ///
    /// # Errors
    ///
    /// - [`TraceError::InvalidState`] unless stopped
    /// - [`TraceError::Config`] if the configuration is invalid
    /// - [`TraceError::StoreUnavailable`] if the store cannot be opened; the
    ///   pipeline stays stopped and the bus is untouched
    pub fn start(&mut self, bus: &dyn EventBus, source: StoreSource) -> Result<(), TraceError> {
        if self.state != PipelineState::Stopped {
            return Err(TraceError::InvalidState(format!(
                "cannot start a {} pipeline",
                self.state
            )));
        }
        self.config.validate()?;
        self.state = PipelineState::Starting;

        let (store, run_dir) = match self.open_store(source) {
            Ok(opened) => opened,
            Err(e) => {
                self.state = PipelineState::Stopped;
                error!(error = %e, "Trace store unavailable");
                return Err(e);
            }
        };
        let store_name = store.name();

        let channel = Arc::new(HandoffChannel::new(
            self.config.channel_capacity,
            self.config.channel_policy(),
        ));
        let stats = Arc::new(PipelineStats::new());
        let writer = TraceWriter::new(store, Arc::clone(&channel), Arc::clone(&stats))
            .poll_interval(self.config.poll_interval_duration())
            .commit_attempts(self.config.commit_attempts);
        let writer = match writer.spawn() {
            Ok(handle) => handle,
            Err(e) => {
                self.state = PipelineState::Stopped;
                error!(error = %e, "Failed to spawn trace writer");
                return Err(TraceError::InvalidState(format!("writer spawn failed: {}", e)));
            }
        };

        let mut interceptors = InterceptorPair::new(Arc::clone(&channel), Arc::clone(&stats));
        interceptors.register(bus);

        info!(
            store = store_name,
            capacity = self.config.channel_capacity,
            run_dir = ?run_dir,
            "Trace pipeline started"
        );
        self.running = Some(Running {
            channel,
            stats,
            interceptors,
            writer,
            run_dir,
        });
        self.state = PipelineState::Running;
        Ok(())
    }

    /// Stop accepting, drain, close the store and unregister
    ///
    /// # Errors
    ///
    /// [`TraceError::InvalidState`] unless running.
    pub fn stop(&mut self, bus: &dyn EventBus) -> Result<ShutdownReport, TraceError> {
        let mut running = match (self.state, self.running.take()) {
            (PipelineState::Running, Some(running)) => running,
            (state, running) => {
                self.running = running;
                return Err(TraceError::InvalidState(format!(
                    "cannot stop a {} pipeline",
                    state
                )));
            }
        };
        self.state = PipelineState::Draining;

        let pending = running.channel.close();
        info!(pending, "Draining trace channel");

        // One budget covers both waits: the drain, then a close window after
        // the discard for a writer still inside a commit.
        let drain_timeout = self.config.drain_timeout_duration();
        let deadline = Instant::now() + drain_timeout;
        let mut timed_out = false;
        if !running.writer.wait(drain_timeout - close_window(drain_timeout)) {
            timed_out = true;
            let lost = running.channel.discard();
            PipelineStats::add(&running.stats.lost, lost as u64);
            warn!(
                lost,
                timeout_ms = self.config.drain_timeout_ms,
                "Trace drain timed out, discarding queued events"
            );
            let left = deadline.saturating_duration_since(Instant::now());
            if !running.writer.wait(left) {
                warn!("Trace writer still busy, leaving it detached");
            }
        }

        running.interceptors.unregister(bus);
        if let Some(summary) = running.writer.join() {
            if let Some(e) = summary.close_error {
                warn!(error = %e, "Trace store reported an error on close");
            }
        }

        let stats = running.stats.snapshot(Some(running.channel.metrics()));
        let report = ShutdownReport::from_stats(stats, timed_out, running.run_dir);
        info!(
            persisted = report.persisted,
            dropped = report.dropped,
            failed = report.failed,
            lost = report.lost,
            "Trace pipeline stopped, {} records persisted",
            report.persisted
        );
        self.state = PipelineState::Stopped;
        Ok(report)
    }

    fn open_store(
        &self,
        source: StoreSource,
    ) -> Result<(Box<dyn DurableStore>, Option<PathBuf>), TraceError> {
        let sync = self.config.sync_mode();
        match source {
            StoreSource::RunDirectory => {
                let dir = create_run_dir(&self.config.output_dir).map_err(|e| {
                    TraceError::StoreUnavailable(format!(
                        "{}: {}",
                        self.config.output_dir.display(),
                        e
                    ))
                })?;
                let store = LogStore::open(&dir, sync).map_err(store_unavailable)?;
                Ok((Box::new(store), Some(dir)))
            }
            StoreSource::Directory(dir) => {
                let store = LogStore::open(&dir, sync).map_err(store_unavailable)?;
                Ok((Box::new(store), Some(dir)))
            }
            StoreSource::Provided(store) => Ok((store, None)),
            StoreSource::Opener(open) => Ok((open().map_err(store_unavailable)?, None)),
        }
    }
}

impl fmt::Debug for TracePipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TracePipeline")
            .field("state", &self.state)
            .field("run_dir", &self.run_dir())
            .finish()
    }
}

impl Drop for TracePipeline {
    fn drop(&mut self) {
        if let Some(running) = self.running.take() {
            // No bus handle here: the hooks stay registered but the closed
            // channel rejects their events. The detached writer still drains
            // and closes the store.
            running.channel.close();
            warn!("Trace pipeline dropped without stop");
        }
    }
}

fn store_unavailable(e: StoreError) -> TraceError {
    TraceError::StoreUnavailable(e.to_string())
}

/// Create `<parent>/bustrace-<UTC timestamp>[-N]`
pub fn create_run_dir(parent: &Path) -> io::Result<PathBuf> {
    fs::create_dir_all(parent)?;
    let base = format!(
        "{}{}",
        RUN_DIR_PREFIX,
        chrono::Utc::now().format("%Y%m%dT%H%M%S%.3fZ")
    );
    for n in 0..MAX_RUN_DIR_SUFFIX {
        let name = if n == 0 {
            base.clone()
        } else {
            format!("{}-{}", base, n)
        };
        let path = parent.join(name);
        match fs::create_dir(&path) {
            Ok(()) => return Ok(path),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(e),
        }
    }
    Err(io::Error::new(
        io::ErrorKind::AlreadyExists,
        format!("no free run directory for {}", base),
    ))
}

/// Share of the drain budget kept for the writer to close after a discard
fn close_window(drain_timeout: Duration) -> Duration {
    drain_timeout / 4
}
