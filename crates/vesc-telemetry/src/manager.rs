use crate::aggregator::StatusAggregator;
use crate::error::ManagerError;
use crate::metrics::TelemetryMetrics;
use crate::publisher::TelemetryPublisher;
use crate::simulator::{SimulatorConfig, VirtualSource};
use can_transport::{FrameSource, TransportError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};
use vesc_protocol::{decode_frame, DecodeError};

/// Lifecycle of the telemetry pipeline.
///
/// `Stopped → Starting → Running → Stopping → Stopped`, with
/// `Running → Faulted` when the frame source dies beyond repair. A restart
/// request (`start` while `Faulted`) is the only way out of `Faulted`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ManagerState {
    Stopped,
    Starting,
    Running,
    Stopping,
    Faulted,
}

/// Which frame source the manager opens, and how to reopen it after a
/// transport fault.
#[derive(Clone, Debug)]
pub enum SourceConfig {
    /// Physical CAN interface by name, e.g. "can0".
    Hardware { interface: String },
    /// In-process simulator.
    Virtual(SimulatorConfig),
}

impl SourceConfig {
    pub fn open(&self) -> Result<Box<dyn FrameSource>, TransportError> {
        match self {
            SourceConfig::Hardware { interface } => {
                #[cfg(all(target_os = "linux", feature = "socketcan"))]
                {
                    Ok(Box::new(can_transport::SocketCanSource::open(interface)?))
                }
                #[cfg(not(all(target_os = "linux", feature = "socketcan")))]
                {
                    let _ = interface;
                    Err(TransportError::Unsupported(
                        "hardware source requires the socketcan feature on linux",
                    ))
                }
            }
            SourceConfig::Virtual(config) => Ok(Box::new(VirtualSource::new(config.clone()))),
        }
    }

    fn describe(&self) -> &str {
        match self {
            SourceConfig::Hardware { interface } => interface,
            SourceConfig::Virtual(_) => "virtual",
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct ManagerConfig {
    /// Upper bound on one blocking receive; also bounds stop latency.
    pub recv_timeout: Duration,
    /// Reopen attempts after a fatal transport error before `Faulted`.
    pub max_reopen_attempts: u32,
    /// First reopen delay; doubles per attempt.
    pub reopen_base_delay: Duration,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            recv_timeout: Duration::from_millis(100),
            max_reopen_attempts: 5,
            reopen_base_delay: Duration::from_millis(100),
        }
    }
}

/// Owns the background receive loop: receive → decode → merge → publish.
///
/// The worker thread is the snapshot's only writer; consumers hang off the
/// [`TelemetryPublisher`] handle. Stop is cooperative — the loop rechecks a
/// flag after every bounded receive, so shutdown takes at most one receive
/// timeout plus one pipeline pass.
pub struct TelemetryManager {
    source: SourceConfig,
    config: ManagerConfig,
    publisher: TelemetryPublisher,
    metrics: TelemetryMetrics,
    state: Arc<Mutex<ManagerState>>,
    stop: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl TelemetryManager {
    pub fn new(source: SourceConfig) -> Result<Self, ManagerError> {
        Self::with_config(source, ManagerConfig::default())
    }

    pub fn with_config(source: SourceConfig, config: ManagerConfig) -> Result<Self, ManagerError> {
        let metrics = TelemetryMetrics::new().map_err(ManagerError::Metrics)?;
        Ok(Self {
            source,
            config,
            publisher: TelemetryPublisher::new(),
            metrics,
            state: Arc::new(Mutex::new(ManagerState::Stopped)),
            stop: Arc::new(AtomicBool::new(false)),
            worker: None,
        })
    }

    /// Shared handle for readers and subscribers.
    pub fn publisher(&self) -> TelemetryPublisher {
        self.publisher.clone()
    }

    pub fn metrics(&self) -> &TelemetryMetrics {
        &self.metrics
    }

    pub fn state(&self) -> ManagerState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Swap the frame source; only allowed while stopped.
    pub fn set_source(&mut self, source: SourceConfig) -> Result<(), ManagerError> {
        let state = self.state();
        if state != ManagerState::Stopped {
            return Err(ManagerError::InvalidState {
                op: "set_source",
                state,
            });
        }
        self.source = source;
        Ok(())
    }

    pub fn start(&mut self) -> Result<(), ManagerError> {
        let state = self.state();
        if !matches!(state, ManagerState::Stopped | ManagerState::Faulted) {
            return Err(ManagerError::InvalidState { op: "start", state });
        }
        // A faulted worker has already exited; reap it before restarting.
        if let Some(handle) = self.worker.take() {
            let _ = handle.join();
        }

        set_state(&self.state, ManagerState::Starting);
        let source = match self.source.open() {
            Ok(source) => source,
            Err(err) => {
                set_state(&self.state, ManagerState::Stopped);
                return Err(err.into());
            }
        };
        info!(source = self.source.describe(), "frame source opened");

        self.stop.store(false, Ordering::Relaxed);
        let ctx = WorkerCtx {
            source_config: self.source.clone(),
            config: self.config,
            publisher: self.publisher.clone(),
            metrics: self.metrics.clone(),
            state: Arc::clone(&self.state),
            stop: Arc::clone(&self.stop),
        };
        set_state(&self.state, ManagerState::Running);
        match thread::Builder::new()
            .name("telemetry-rx".into())
            .spawn(move || run_loop(source, &ctx))
        {
            Ok(handle) => {
                self.worker = Some(handle);
                Ok(())
            }
            Err(err) => {
                set_state(&self.state, ManagerState::Stopped);
                Err(ManagerError::Spawn(err.to_string()))
            }
        }
    }

    /// Request the loop to stop and wait for it. Idempotent when already
    /// stopped; from `Faulted` it just reaps the worker.
    pub fn stop(&mut self) -> Result<(), ManagerError> {
        let state = self.state();
        match state {
            ManagerState::Stopped => Ok(()),
            ManagerState::Running | ManagerState::Faulted => {
                set_state(&self.state, ManagerState::Stopping);
                self.stop.store(true, Ordering::Relaxed);
                let joined = match self.worker.take() {
                    Some(handle) => handle.join().is_ok(),
                    None => true,
                };
                set_state(&self.state, ManagerState::Stopped);
                if joined {
                    Ok(())
                } else {
                    Err(ManagerError::WorkerPanicked)
                }
            }
            _ => Err(ManagerError::InvalidState { op: "stop", state }),
        }
    }
}

impl Drop for TelemetryManager {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.worker.take() {
            let _ = handle.join();
        }
    }
}

struct WorkerCtx {
    source_config: SourceConfig,
    config: ManagerConfig,
    publisher: TelemetryPublisher,
    metrics: TelemetryMetrics,
    state: Arc<Mutex<ManagerState>>,
    stop: Arc<AtomicBool>,
}

fn set_state(state: &Mutex<ManagerState>, value: ManagerState) {
    *state.lock().unwrap_or_else(PoisonError::into_inner) = value;
}

fn run_loop(mut source: Box<dyn FrameSource>, ctx: &WorkerCtx) {
    let mut aggregator = StatusAggregator::new();
    loop {
        if ctx.stop.load(Ordering::Relaxed) {
            break;
        }
        match source.recv(ctx.config.recv_timeout) {
            Ok(frame) => {
                ctx.metrics.frames_received.inc();
                match decode_frame(&frame) {
                    Ok(fragment) => {
                        let changed = aggregator.merge(&fragment);
                        ctx.publisher.publish(*aggregator.snapshot(), &changed);
                        ctx.metrics.frames_published.inc();
                    }
                    Err(DecodeError::UnrecognizedId { id }) => {
                        ctx.metrics.unrecognized_frames.inc();
                        debug!("ignoring unrecognized frame id 0x{id:X}");
                    }
                    Err(DecodeError::Truncated { kind, len }) => {
                        ctx.metrics.truncated_frames.inc();
                        warn!(%kind, len, "ignoring truncated frame");
                    }
                }
            }
            Err(TransportError::Timeout) => {
                ctx.metrics.transport_timeouts.inc();
            }
            Err(err) => {
                warn!(error = %err, "frame source failed, trying to reopen");
                match reopen_with_backoff(ctx) {
                    Reopen::Reopened(new_source) => {
                        let _ = source.close();
                        source = new_source;
                    }
                    Reopen::StopRequested => break,
                    Reopen::Exhausted => {
                        let _ = source.close();
                        set_state(&ctx.state, ManagerState::Faulted);
                        error!(
                            attempts = ctx.config.max_reopen_attempts,
                            "frame source lost, telemetry faulted"
                        );
                        return;
                    }
                }
            }
        }
    }
    let _ = source.close();
    debug!("receive loop stopped");
}

enum Reopen {
    Reopened(Box<dyn FrameSource>),
    StopRequested,
    Exhausted,
}

fn reopen_with_backoff(ctx: &WorkerCtx) -> Reopen {
    for attempt in 1..=ctx.config.max_reopen_attempts {
        let delay = reopen_delay(attempt, ctx.config.reopen_base_delay);
        if sleep_interruptible(&ctx.stop, delay) {
            return Reopen::StopRequested;
        }
        ctx.metrics.source_reopens.inc();
        match ctx.source_config.open() {
            Ok(source) => {
                info!(attempt, "frame source reopened");
                return Reopen::Reopened(source);
            }
            Err(err) => warn!(attempt, error = %err, "reopen failed"),
        }
    }
    Reopen::Exhausted
}

/// Exponential backoff: base × 2^(attempt-1), saturating.
pub(crate) fn reopen_delay(attempt: u32, base: Duration) -> Duration {
    let factor = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
    base.saturating_mul(factor)
}

/// Sleep in short slices so a stop request cuts the backoff short.
/// Returns true when stop was requested.
fn sleep_interruptible(stop: &AtomicBool, total: Duration) -> bool {
    let slice = Duration::from_millis(50);
    let deadline = Instant::now() + total;
    loop {
        if stop.load(Ordering::Relaxed) {
            return true;
        }
        let now = Instant::now();
        if now >= deadline {
            return false;
        }
        thread::sleep((deadline - now).min(slice));
    }
}
