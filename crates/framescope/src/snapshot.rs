//! Throttled, double-buffered exchange of finished aggregation results.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::event::DisplayData;

/// Holds the latest published [`DisplayData`] for any reader thread.
///
/// The mutex is scoped only around the copy on publish and the clone on
/// read; the aggregation loop itself, and capture above it, never hold it.
pub(crate) struct SnapshotPublisher {
    data: Mutex<DisplayData>,
    forced: AtomicBool,
    last_publish: Mutex<Instant>,
    interval: Duration,
}

impl SnapshotPublisher {
    #[must_use]
    pub(crate) fn new(interval: Duration) -> Self {
        Self {
            data: Mutex::new(DisplayData::default()),
            forced: AtomicBool::new(false),
            // Start in the past so the first aggregation cycle publishes.
            last_publish: Mutex::new(
                Instant::now()
                    .checked_sub(interval)
                    .unwrap_or_else(Instant::now),
            ),
            interval,
        }
    }

    /// Whether the aggregation thread should publish this cycle: a forced
    /// update is pending or the publish interval has elapsed.
    #[must_use]
    pub(crate) fn should_update(&self, now: Instant) -> bool {
        self.forced.load(Ordering::Relaxed)
            || now.duration_since(*self.last_publish.lock()) >= self.interval
    }

    /// Reset the throttle after a successful publish.
    pub(crate) fn mark_updated(&self, now: Instant) {
        *self.last_publish.lock() = now;
        self.forced.store(false, Ordering::Relaxed);
    }

    /// Demand that the next aggregation cycle publishes regardless of the
    /// elapsed interval. Callable from any thread.
    pub(crate) fn invalidate(&self) {
        self.forced.store(true, Ordering::Relaxed);
    }

    /// Replace the published snapshot wholesale.
    pub(crate) fn publish(&self, data: DisplayData) {
        *self.data.lock() = data;
    }

    /// Copy of the latest published snapshot.
    #[must_use]
    pub(crate) fn latest(&self) -> DisplayData {
        self.data.lock().clone()
    }
}
