//! The profiler object: capture registry, snapshot publisher, and the
//! aggregation thread lifecycle.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::Mutex;

use crate::aggregate::Aggregator;
use crate::error::{Error, Result};
use crate::event::DisplayData;
use crate::ipc::server::IpcServer;
use crate::registry::ThreadRegistry;
use crate::scope;
use crate::snapshot::SnapshotPublisher;

/// Default time between snapshot publishes.
pub const DEFAULT_PUBLISH_INTERVAL: Duration = Duration::from_millis(1000);

/// Default window after which an entry with no fresh events is evicted.
pub const DEFAULT_STALENESS_THRESHOLD: Duration = Duration::from_secs(5);

/// Default pause between aggregation cycles.
pub const DEFAULT_CYCLE_INTERVAL: Duration = Duration::from_millis(2);

static NEXT_PROFILER_ID: AtomicU64 = AtomicU64::new(1);

struct Worker {
    running: Arc<AtomicBool>,
    thread: JoinHandle<()>,
}

/// Hierarchical frame profiler.
///
/// One instance owns the whole pipeline: per-thread ring buffers register
/// here, the background aggregation thread folds them into rolling
/// statistics, and readers query the published [`DisplayData`] snapshot.
/// Construct one at startup and pass it by reference to the threads being
/// instrumented; there is no hidden global instance.
pub struct Profiler {
    id: u64,
    enabled: AtomicBool,
    registry: Arc<ThreadRegistry>,
    publisher: Arc<SnapshotPublisher>,
    staleness: Duration,
    cycle_interval: Duration,
    worker: Mutex<Option<Worker>>,
}

impl Profiler {
    /// Create a profiler with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Start configuring a profiler.
    #[must_use]
    pub fn builder() -> ProfilerBuilder {
        ProfilerBuilder::default()
    }

    /// Start the background aggregation thread.
    pub fn start(&self) -> Result<()> {
        let mut worker = self.worker.lock();
        if worker.is_some() {
            return Err(Error::AlreadyRunning);
        }

        let running = Arc::new(AtomicBool::new(true));
        let aggregator = Aggregator::new(
            Arc::clone(&self.registry),
            Arc::clone(&self.publisher),
            self.staleness,
        );
        let cadence = self.cycle_interval;
        let thread = thread::Builder::new()
            .name("framescope-aggregator".into())
            .spawn({
                let running = Arc::clone(&running);
                move || aggregator.run(&running, cadence)
            })
            .map_err(Error::SpawnAggregator)?;

        *worker = Some(Worker { running, thread });
        tracing::info!("profiler aggregation thread started");
        Ok(())
    }

    /// Stop the aggregation thread and wait for it to finish its last cycle.
    pub fn stop(&self) -> Result<()> {
        let worker = self.worker.lock().take().ok_or(Error::NotRunning)?;
        worker.running.store(false, Ordering::Relaxed);
        worker
            .thread
            .join()
            .map_err(|_| Error::AggregatorPanicked)?;
        tracing::info!("profiler aggregation thread stopped");
        Ok(())
    }

    /// Whether the aggregation thread is currently running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.worker.lock().is_some()
    }

    /// Toggle capture. When disabled, scope guards become no-ops without
    /// removing the call sites.
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    /// Whether capture is enabled.
    #[inline]
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    /// Designate the calling thread as the render thread. Its events are
    /// aggregated into the render group, everything else into the other
    /// group.
    pub fn mark_render_thread(&self) {
        scope::mark_render_thread(self);
    }

    /// Latest published snapshot. Never blocks capture; may briefly contend
    /// with the once-per-interval publish copy.
    #[must_use]
    pub fn display_data(&self) -> DisplayData {
        self.publisher.latest()
    }

    /// Request that the next aggregation cycle publishes immediately,
    /// regardless of the publish interval.
    pub fn invalidate(&self) {
        self.publisher.invalidate();
    }

    /// Start a TCP server broadcasting published snapshots to dashboards.
    pub fn serve(&self, port: u16) -> Result<IpcServer> {
        IpcServer::start(port, Arc::clone(&self.publisher)).map_err(Error::Io)
    }

    pub(crate) fn instance_id(&self) -> u64 {
        self.id
    }

    pub(crate) fn registry(&self) -> &ThreadRegistry {
        &self.registry
    }
}

impl Default for Profiler {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Profiler {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

/// Builder for [`Profiler`].
#[derive(Debug, Clone)]
pub struct ProfilerBuilder {
    publish_interval: Duration,
    staleness: Duration,
    cycle_interval: Duration,
    enabled: bool,
}

impl Default for ProfilerBuilder {
    fn default() -> Self {
        Self {
            publish_interval: DEFAULT_PUBLISH_INTERVAL,
            staleness: DEFAULT_STALENESS_THRESHOLD,
            cycle_interval: DEFAULT_CYCLE_INTERVAL,
            enabled: true,
        }
    }
}

impl ProfilerBuilder {
    /// Minimum time between snapshot publishes.
    #[must_use]
    pub fn publish_interval(mut self, interval: Duration) -> Self {
        self.publish_interval = interval;
        self
    }

    /// Window after which entries with no fresh events are evicted.
    #[must_use]
    pub fn staleness_threshold(mut self, staleness: Duration) -> Self {
        self.staleness = staleness;
        self
    }

    /// Pause between aggregation cycles.
    #[must_use]
    pub fn cycle_interval(mut self, interval: Duration) -> Self {
        self.cycle_interval = interval;
        self
    }

    /// Whether capture starts enabled.
    #[must_use]
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Build the profiler. The aggregation thread is not started until
    /// [`Profiler::start`] is called.
    #[must_use]
    pub fn build(self) -> Profiler {
        Profiler {
            id: NEXT_PROFILER_ID.fetch_add(1, Ordering::Relaxed),
            enabled: AtomicBool::new(self.enabled),
            registry: Arc::new(ThreadRegistry::new()),
            publisher: Arc::new(SnapshotPublisher::new(self.publish_interval)),
            staleness: self.staleness,
            cycle_interval: self.cycle_interval,
            worker: Mutex::new(None),
        }
    }
}
