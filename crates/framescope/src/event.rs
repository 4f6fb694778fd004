//! Timing events and aggregated profile entries.

use std::collections::{BTreeSet, VecDeque};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::name::SectionName;

/// Number of aggregation-cycle samples retained per rolling window.
pub const ROLLING_WINDOW: usize = 360;

/// A single captured timing measurement.
///
/// Written once by the owning thread, read once by the aggregation thread,
/// never mutated after being queued.
#[derive(Debug, Clone, Copy)]
pub struct TimingEvent {
    /// Section that was measured.
    pub name: SectionName,
    /// Enclosing section at capture time, if any.
    pub parent: Option<SectionName>,
    /// Elapsed wall time in milliseconds.
    pub duration_ms: f64,
    /// Identifier of the producing thread.
    pub thread_id: u32,
    /// Scope-stack depth at capture time (0 = root).
    pub depth: u8,
    /// Whether the producing thread is the designated render thread.
    pub is_render_thread: bool,
}

impl TimingEvent {
    /// Placeholder value for unwritten ring buffer slots.
    #[must_use]
    pub(crate) const fn empty() -> Self {
        Self {
            name: SectionName::INVALID,
            parent: None,
            duration_ms: 0.0,
            thread_id: 0,
            depth: 0,
            is_render_thread: false,
        }
    }
}

/// One rolling-window sample: the totals folded in a single aggregation cycle.
#[derive(Debug, Clone, Copy)]
struct WindowSample {
    total: f64,
    self_time: f64,
    calls: u32,
}

fn now_instant() -> Instant {
    Instant::now()
}

/// Aggregated statistics for one scope, keyed externally by its full
/// hierarchical path (e.g. `"Render/Draw/DrawMesh"`).
///
/// Entries persist across aggregation cycles so that rolling statistics
/// survive frame-to-frame jitter; they are removed only by staleness
/// eviction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileEntry {
    /// Leaf scope name for display.
    pub display_name: String,
    /// Accumulated time in milliseconds for the current aggregation cycle.
    pub total_time: f64,
    /// Current-cycle time excluding direct children.
    pub self_time: f64,
    /// Number of calls folded in the current aggregation cycle.
    pub call_count: u32,
    /// Mean per-cycle total time over the rolling window.
    pub rolling_average_time: f64,
    /// Mean per-cycle self time over the rolling window.
    pub rolling_self_time: f64,
    /// Largest per-cycle total observed since the last one-second boundary.
    pub max_time_in_last_second: f64,
    /// Path of the enclosing scope; empty for roots.
    pub parent_path: String,
    /// Paths of directly nested scopes.
    pub child_paths: BTreeSet<String>,
    /// Nesting depth (0 = root).
    pub depth: u8,
    /// Share of the parent's rolling time, in percent.
    pub parent_percentage: f64,
    /// Share of the thread group's rolling total, in percent.
    pub total_percentage: f64,

    #[serde(skip)]
    window: VecDeque<WindowSample>,
    #[serde(skip)]
    window_time: f64,
    #[serde(skip)]
    window_self: f64,
    #[serde(skip)]
    window_calls: u64,
    #[serde(skip, default = "now_instant")]
    last_update: Instant,
    #[serde(skip, default = "now_instant")]
    second_start: Instant,
}

impl ProfileEntry {
    /// Create an entry for a scope first seen at `now`.
    #[must_use]
    pub(crate) fn new(display_name: &str, parent_path: String, depth: u8, now: Instant) -> Self {
        Self {
            display_name: display_name.to_string(),
            total_time: 0.0,
            self_time: 0.0,
            call_count: 0,
            rolling_average_time: 0.0,
            rolling_self_time: 0.0,
            max_time_in_last_second: 0.0,
            parent_path,
            child_paths: BTreeSet::new(),
            depth,
            parent_percentage: 0.0,
            total_percentage: 0.0,
            window: VecDeque::with_capacity(ROLLING_WINDOW),
            window_time: 0.0,
            window_self: 0.0,
            window_calls: 0,
            last_update: now,
            second_start: now,
        }
    }

    /// Create a placeholder for a parent path referenced before any of its
    /// own events folded. Display name, parent, and depth are derived from
    /// the path itself.
    #[must_use]
    pub(crate) fn from_path(path: &str, now: Instant) -> Self {
        let (parent_path, display_name) = match path.rsplit_once('/') {
            Some((parent, leaf)) => (parent.to_string(), leaf),
            None => (String::new(), path),
        };
        let depth = path.matches('/').count().min(usize::from(u8::MAX)) as u8;
        Self::new(display_name, parent_path, depth, now)
    }

    /// Reset the current-cycle accumulators.
    pub(crate) fn begin_cycle(&mut self) {
        self.total_time = 0.0;
        self.self_time = 0.0;
        self.call_count = 0;
    }

    /// Note that an event refreshed this entry at `now`.
    pub(crate) fn touch(&mut self, now: Instant) {
        self.last_update = now;
    }

    /// Fold the finished cycle's totals into the rolling window and refresh
    /// the derived statistics.
    pub(crate) fn push_sample(&mut self, now: Instant) {
        self.window.push_back(WindowSample {
            total: self.total_time,
            self_time: self.self_time,
            calls: self.call_count,
        });
        self.window_time += self.total_time;
        self.window_self += self.self_time;
        self.window_calls += u64::from(self.call_count);

        if self.window.len() > ROLLING_WINDOW {
            if let Some(old) = self.window.pop_front() {
                self.window_time -= old.total;
                self.window_self -= old.self_time;
                self.window_calls -= u64::from(old.calls);
            }
        }

        let samples = self.window.len() as f64;
        self.rolling_average_time = self.window_time / samples;
        self.rolling_self_time = self.window_self / samples;

        if now.duration_since(self.second_start) >= Duration::from_secs(1) {
            self.max_time_in_last_second = 0.0;
            self.second_start = now;
        }
        self.max_time_in_last_second = self.max_time_in_last_second.max(self.total_time);
    }

    /// Time this entry last received an event.
    #[must_use]
    pub(crate) fn last_update(&self) -> Instant {
        self.last_update
    }

    /// Number of samples currently held in the rolling window.
    #[must_use]
    pub fn window_len(&self) -> usize {
        self.window.len()
    }

    /// Sum of per-cycle times over the rolling window, in milliseconds.
    #[must_use]
    pub fn window_time_sum(&self) -> f64 {
        self.window_time
    }

    /// Sum of call counts over the rolling window.
    #[must_use]
    pub fn window_call_sum(&self) -> u64 {
        self.window_calls
    }
}

/// Published snapshot: two independent lists of `(path, entry)` pairs, in
/// display order (roots first, children nested beneath their parent).
///
/// Safe to read without blocking producers; replaced wholesale on each
/// publish cycle.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DisplayData {
    /// Entries attributed to the designated render thread.
    pub render_thread: Vec<(String, ProfileEntry)>,
    /// Entries from every other instrumented thread, combined.
    pub other_threads: Vec<(String, ProfileEntry)>,
}
