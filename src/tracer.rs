//! Tracer entry point.
//!
//! [`BusTracer`] attaches a capture pipeline to a bus and detaches it again
//! on [`shutdown`](BusTracer::shutdown) (or drop).

use crate::error::Result;
use bustrace_engine::{
    BackpressurePolicy, EventBus, LocalBus, ShutdownReport, StatsSnapshot, StoreSource,
    SyncPolicy, TraceConfig, TracePipeline,
};
use bustrace_storage::DurableStore;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{error, warn};

/// Causal tracing attached to one bus.
///
/// # Example
///
/// ```ignore
/// use bustrace::prelude::*;
///
/// let bus = LocalBus::new();
/// let tracer = BusTracer::attach(bus.clone(), TraceConfig::default());
///
/// bus.consumer("greet", |d: Delivery| { d.reply("hi"); });
/// bus.request("greet", "hello", None, |_| {});
///
/// let report = tracer.shutdown()?;
/// println!("{} records persisted", report.persisted);
/// ```
///
/// # Attach Modes
///
/// | Method | Store unavailable |
/// |--------|-------------------|
/// | [`BusTracer::attach`] / [`BusTracerBuilder::attach`] | logged, tracer disabled, bus untouched |
/// | [`BusTracerBuilder::try_attach`] | returned as [`Error::StoreUnavailable`](crate::Error::StoreUnavailable) |
pub struct BusTracer<B: EventBus = LocalBus> {
    bus: B,
    pipeline: Option<TracePipeline>,
    disabled_reason: Option<String>,
}

impl BusTracer {
    /// Create a builder.
    pub fn builder() -> BusTracerBuilder {
        BusTracerBuilder::new()
    }
}

impl<B: EventBus> BusTracer<B> {
    /// Attach with `config`, writing to a fresh run directory under
    /// `config.output_dir`.
    ///
    /// Never fails: if the store cannot be opened the tracer is disabled and
    /// the bus keeps running untraced.
    pub fn attach(bus: B, config: TraceConfig) -> Self {
        BusTracerBuilder::new().config(config).attach(bus)
    }

    /// Whether messages are being captured.
    pub fn is_enabled(&self) -> bool {
        self.pipeline.as_ref().map_or(false, TracePipeline::is_running)
    }

    /// Why the tracer is disabled, if it is.
    pub fn disabled_reason(&self) -> Option<&str> {
        self.disabled_reason.as_deref()
    }

    /// The traced bus.
    pub fn bus(&self) -> &B {
        &self.bus
    }

    /// Directory of the current run's trace, if on disk.
    pub fn run_dir(&self) -> Option<&Path> {
        self.pipeline.as_ref().and_then(TracePipeline::run_dir)
    }

    /// Live counters.
    pub fn stats(&self) -> StatsSnapshot {
        self.pipeline
            .as_ref()
            .map(TracePipeline::stats)
            .unwrap_or_default()
    }

    /// Stop capturing, drain and close the store.
    ///
    /// A disabled tracer returns an empty report.
    pub fn shutdown(mut self) -> Result<ShutdownReport> {
        self.stop()
    }

    fn stop(&mut self) -> Result<ShutdownReport> {
        match self.pipeline.take() {
            Some(mut pipeline) if pipeline.is_running() => Ok(pipeline.stop(&self.bus)?),
            _ => Ok(ShutdownReport::default()),
        }
    }
}

impl<B: EventBus> Drop for BusTracer<B> {
    fn drop(&mut self) {
        if self.is_enabled() {
            warn!("Bus tracer dropped without shutdown, draining");
            if let Err(e) = self.stop() {
                error!(error = %e, "Trace shutdown failed");
            }
        }
    }
}

/// Builder for [`BusTracer`].
///
/// # Example
///
/// ```ignore
/// let tracer = BusTracer::builder()
///     .output_dir("/var/lib/app/traces")
///     .channel_capacity(50_000)
///     .block(Duration::from_millis(1))
///     .strict_sync()
///     .attach(bus.clone());
/// ```
pub struct BusTracerBuilder {
    config: TraceConfig,
    source: Option<StoreSource>,
}

impl BusTracerBuilder {
    /// Create a builder with default settings.
    pub fn new() -> Self {
        Self {
            config: TraceConfig::default(),
            source: None,
        }
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: TraceConfig) -> Self {
        self.config = config;
        self
    }

    /// Load the configuration from a TOML file.
    pub fn config_file(mut self, path: impl AsRef<Path>) -> Result<Self> {
        self.config = TraceConfig::from_file(path)?;
        Ok(self)
    }

    /// Parent directory of per-run trace directories.
    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config = self.config.output_dir(dir);
        self
    }

    /// Write the trace into exactly `dir` instead of a fresh run directory.
    pub fn directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.source = Some(StoreSource::Directory(dir.into()));
        self
    }

    /// Persist into an already opened store.
    pub fn store(mut self, store: impl DurableStore + 'static) -> Self {
        self.source = Some(StoreSource::provided(store));
        self
    }

    /// Hand-off channel bound.
    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.config = self.config.channel_capacity(capacity);
        self
    }

    /// Drop new captures when the channel is full (default).
    pub fn drop_newest(mut self) -> Self {
        self.config = self.config.backpressure(BackpressurePolicy::DropNewest);
        self
    }

    /// Wait at most `timeout` for channel space, then drop.
    pub fn block(mut self, timeout: Duration) -> Self {
        self.config = self
            .config
            .backpressure(BackpressurePolicy::Block)
            .block_timeout(timeout);
        self
    }

    /// Longest drain on shutdown.
    pub fn drain_timeout(mut self, timeout: Duration) -> Self {
        self.config = self.config.drain_timeout(timeout);
        self
    }

    /// Writer receive timeout.
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.config = self.config.poll_interval(interval);
        self
    }

    /// Commit attempts per record before it is dropped.
    pub fn commit_attempts(mut self, attempts: u32) -> Self {
        self.config = self.config.commit_attempts(attempts);
        self
    }

    /// fsync every commit.
    pub fn strict_sync(mut self) -> Self {
        self.config = self.config.sync(SyncPolicy::Strict);
        self
    }

    /// fsync every `batch_size` commits (default 256).
    pub fn batched_sync(mut self, batch_size: usize) -> Self {
        self.config = self
            .config
            .sync(SyncPolicy::Batched)
            .sync_batch_size(batch_size);
        self
    }

    /// fsync only on shutdown.
    pub fn sync_on_close(mut self) -> Self {
        self.config = self.config.sync(SyncPolicy::OnClose);
        self
    }

    /// Attach to `bus`, surfacing start errors.
    pub fn try_attach<B: EventBus>(self, bus: B) -> Result<BusTracer<B>> {
        let source = self.source.unwrap_or(StoreSource::RunDirectory);
        let mut pipeline = TracePipeline::new(self.config);
        pipeline.start(&bus, source)?;
        Ok(BusTracer {
            bus,
            pipeline: Some(pipeline),
            disabled_reason: None,
        })
    }

    /// Attach to `bus`; on failure log and return a disabled tracer.
    pub fn attach<B: EventBus>(self, bus: B) -> BusTracer<B> {
        let source = self.source.unwrap_or(StoreSource::RunDirectory);
        let mut pipeline = TracePipeline::new(self.config);
        match pipeline.start(&bus, source) {
            Ok(()) => BusTracer {
                bus,
                pipeline: Some(pipeline),
                disabled_reason: None,
            },
            Err(e) => {
                error!(error = %e, "Tracing disabled, bus continues untraced");
                BusTracer {
                    bus,
                    pipeline: None,
                    disabled_reason: Some(e.to_string()),
                }
            }
        }
    }
}

impl Default for BusTracerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
