//! Background aggregation: drains every registered ring buffer and folds the
//! flat event streams into hierarchical per-group statistics.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::event::{DisplayData, ProfileEntry, TimingEvent, ROLLING_WINDOW};
use crate::name::SectionName;
use crate::registry::ThreadRegistry;
use crate::snapshot::SnapshotPublisher;

/// One logical thread group's entry table, keyed by full hierarchical path.
struct EntryTable {
    entries: HashMap<String, ProfileEntry>,
    /// Most recently folded path per section name, used to resolve a child
    /// event's parent name into a full path. Two scopes sharing a name under
    /// different parents resolve to whichever folded last.
    latest_path: HashMap<SectionName, String>,
    /// Paths that received events in the current cycle.
    touched: HashSet<String>,
    /// Rolling window of per-cycle group totals (sum of root entries).
    group_window: VecDeque<f64>,
    group_window_sum: f64,
    /// Mean per-cycle group total over the window.
    rolling_total: f64,
}

impl EntryTable {
    fn new() -> Self {
        Self {
            entries: HashMap::new(),
            latest_path: HashMap::new(),
            touched: HashSet::new(),
            group_window: VecDeque::with_capacity(ROLLING_WINDOW),
            group_window_sum: 0.0,
            rolling_total: 0.0,
        }
    }

    /// Reset current-cycle accumulators on every entry.
    fn begin_cycle(&mut self) {
        for entry in self.entries.values_mut() {
            entry.begin_cycle();
        }
        self.touched.clear();
    }

    /// Fold one event: resolve its full path, create or update the entry,
    /// and link it into its parent's child set.
    fn fold_event(&mut self, event: &TimingEvent, now: Instant) {
        let name = event.name.as_str();

        let (path, parent_path) = match event.parent {
            Some(parent) if event.depth > 0 => {
                match self.latest_path.get(&parent) {
                    Some(parent_path) => {
                        (format!("{parent_path}/{name}"), parent_path.clone())
                    }
                    // Parent never folded: classify as an implicit root
                    // rather than dropping or crashing.
                    None => (name.to_string(), String::new()),
                }
            }
            _ => (name.to_string(), String::new()),
        };

        self.latest_path.insert(event.name, path.clone());

        // Depth derives from the parent entry, so it stays parent + 1 even
        // when part of the ancestry resolved defensively.
        let mut depth = 0;
        if !parent_path.is_empty() {
            let parent_entry = self
                .entries
                .entry(parent_path.clone())
                .or_insert_with(|| ProfileEntry::from_path(&parent_path, now));
            parent_entry.child_paths.insert(path.clone());
            depth = parent_entry.depth.saturating_add(1);
        }

        let entry = self
            .entries
            .entry(path.clone())
            .or_insert_with(|| ProfileEntry::new(name, parent_path, depth, now));
        entry.total_time += event.duration_ms;
        entry.call_count += 1;
        entry.touch(now);

        self.touched.insert(path);
    }

    /// Second fold pass plus rolling statistics, run after every event of
    /// the cycle has been accumulated.
    ///
    /// Self time is total minus the sum of direct children's totals *within
    /// this cycle*; a child whose events land in a different cycle than its
    /// parent shifts that cycle's self-time attribution accordingly.
    fn finish_cycle(&mut self, now: Instant) {
        if self.touched.is_empty() {
            return;
        }

        let mut self_times = Vec::with_capacity(self.touched.len());
        for path in &self.touched {
            let Some(entry) = self.entries.get(path) else {
                continue;
            };
            let child_sum: f64 = entry
                .child_paths
                .iter()
                .filter_map(|child| self.entries.get(child))
                .map(|child| child.total_time)
                .sum();
            self_times.push((path.clone(), entry.total_time - child_sum));
        }
        for (path, self_time) in self_times {
            if let Some(entry) = self.entries.get_mut(&path) {
                entry.self_time = self_time;
                entry.push_sample(now);
            }
        }

        let cycle_total: f64 = self
            .entries
            .values()
            .filter(|entry| entry.depth == 0)
            .map(|entry| entry.total_time)
            .sum();
        self.group_window.push_back(cycle_total);
        self.group_window_sum += cycle_total;
        if self.group_window.len() > ROLLING_WINDOW {
            if let Some(old) = self.group_window.pop_front() {
                self.group_window_sum -= old;
            }
        }
        self.rolling_total = self.group_window_sum / self.group_window.len() as f64;
    }

    /// Remove entries that have not received an event within `staleness`,
    /// then drop child links that point at removed entries.
    fn evict(&mut self, now: Instant, staleness: Duration) {
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| now.duration_since(entry.last_update()) < staleness);
        if self.entries.len() == before {
            return;
        }

        let live: Vec<String> = self.entries.keys().cloned().collect();
        let live: HashSet<&str> = live.iter().map(String::as_str).collect();
        for entry in self.entries.values_mut() {
            entry.child_paths.retain(|child| live.contains(child.as_str()));
        }
    }

    /// Recompute each entry's share of its parent and of the group total,
    /// from the rolling averages.
    fn hierarchize(&mut self) {
        let rolling: HashMap<String, f64> = self
            .entries
            .iter()
            .map(|(path, entry)| (path.clone(), entry.rolling_average_time))
            .collect();
        let group_total = self.rolling_total;

        for entry in self.entries.values_mut() {
            // An entry whose parent has been evicted falls back to the
            // group total, like a root.
            let parent_reference = if entry.parent_path.is_empty() {
                group_total
            } else {
                rolling
                    .get(&entry.parent_path)
                    .copied()
                    .unwrap_or(group_total)
            };
            entry.parent_percentage = percentage(entry.rolling_average_time, parent_reference);
            entry.total_percentage = percentage(entry.rolling_average_time, group_total);
        }
    }

    /// Flatten the table into display order: roots sorted by rolling time,
    /// each followed depth-first by its children.
    fn display_list(&self) -> Vec<(String, ProfileEntry)> {
        let mut roots: Vec<&String> = self
            .entries
            .iter()
            .filter(|(_, entry)| {
                entry.parent_path.is_empty() || !self.entries.contains_key(&entry.parent_path)
            })
            .map(|(path, _)| path)
            .collect();
        self.sort_by_rolling(&mut roots);

        let mut out = Vec::with_capacity(self.entries.len());
        for root in roots {
            self.push_subtree(root, &mut out);
        }
        out
    }

    fn push_subtree(&self, path: &str, out: &mut Vec<(String, ProfileEntry)>) {
        let Some(entry) = self.entries.get(path) else {
            return;
        };
        out.push((path.to_string(), entry.clone()));

        let mut children: Vec<&String> = entry
            .child_paths
            .iter()
            .filter(|child| self.entries.contains_key(*child))
            .collect();
        self.sort_by_rolling(&mut children);
        for child in children {
            self.push_subtree(child, out);
        }
    }

    fn sort_by_rolling(&self, paths: &mut [&String]) {
        paths.sort_by(|a, b| {
            let ra = self.entries.get(*a).map_or(0.0, |e| e.rolling_average_time);
            let rb = self.entries.get(*b).map_or(0.0, |e| e.rolling_average_time);
            rb.partial_cmp(&ra).unwrap_or(std::cmp::Ordering::Equal)
        });
    }
}

fn percentage(value: f64, reference: f64) -> f64 {
    if reference > f64::EPSILON {
        value / reference * 100.0
    } else {
        0.0
    }
}

/// The aggregation state machine. Owned entirely by the background thread;
/// producers and snapshot readers never touch it.
pub(crate) struct Aggregator {
    registry: Arc<ThreadRegistry>,
    publisher: Arc<SnapshotPublisher>,
    staleness: Duration,
    render: EntryTable,
    other: EntryTable,
    scratch: Vec<TimingEvent>,
}

impl Aggregator {
    #[must_use]
    pub(crate) fn new(
        registry: Arc<ThreadRegistry>,
        publisher: Arc<SnapshotPublisher>,
        staleness: Duration,
    ) -> Self {
        Self {
            registry,
            publisher,
            staleness,
            render: EntryTable::new(),
            other: EntryTable::new(),
            scratch: Vec::new(),
        }
    }

    /// Aggregation thread main loop, at a fixed cadence independent of the
    /// frame rate.
    pub(crate) fn run(mut self, running: &AtomicBool, cadence: Duration) {
        tracing::debug!("aggregation loop started");
        while running.load(Ordering::Relaxed) {
            self.cycle(Instant::now());
            thread::sleep(cadence);
        }
        // One more drain so events captured just before stop still land.
        self.cycle(Instant::now());
        tracing::debug!("aggregation loop stopped");
    }

    /// One aggregation cycle: drain, fold, roll, evict, hierarchize, and,
    /// when the publisher says so, publish.
    pub(crate) fn cycle(&mut self, now: Instant) {
        self.render.begin_cycle();
        self.other.begin_cycle();

        self.scratch.clear();
        for buffer in self.registry.snapshot() {
            buffer.drain_into(&mut self.scratch);
        }
        self.registry.prune_dead();

        // Shallower scopes fold first so a parent registers its path before
        // its children resolve against it. The sort is stable, preserving
        // each thread's submission order within a depth.
        let mut events = std::mem::take(&mut self.scratch);
        events.sort_by_key(|event| event.depth);
        for event in &events {
            let table = if event.is_render_thread {
                &mut self.render
            } else {
                &mut self.other
            };
            table.fold_event(event, now);
        }
        events.clear();
        self.scratch = events;

        self.render.finish_cycle(now);
        self.other.finish_cycle(now);

        self.render.evict(now, self.staleness);
        self.other.evict(now, self.staleness);

        self.render.hierarchize();
        self.other.hierarchize();

        if self.publisher.should_update(now) {
            self.publisher.publish(DisplayData {
                render_thread: self.render.display_list(),
                other_threads: self.other.display_list(),
            });
            self.publisher.mark_updated(now);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ring::ThreadRingBuffer;
    use approx::assert_relative_eq;

    const STALENESS: Duration = Duration::from_secs(5);

    fn harness() -> (Arc<ThreadRegistry>, Arc<SnapshotPublisher>, Aggregator) {
        let registry = Arc::new(ThreadRegistry::new());
        let publisher = Arc::new(SnapshotPublisher::new(Duration::from_millis(1000)));
        let aggregator = Aggregator::new(Arc::clone(&registry), Arc::clone(&publisher), STALENESS);
        (registry, publisher, aggregator)
    }

    fn event(
        name: &'static str,
        parent: Option<&'static str>,
        duration_ms: f64,
        depth: u8,
        render: bool,
    ) -> TimingEvent {
        TimingEvent {
            name: SectionName::intern(name),
            parent: parent.map(SectionName::intern),
            duration_ms,
            thread_id: 1,
            depth,
            is_render_thread: render,
        }
    }

    fn entry<'d>(data: &'d DisplayData, path: &str) -> &'d ProfileEntry {
        data.render_thread
            .iter()
            .find(|(p, _)| p == path)
            .map(|(_, e)| e)
            .unwrap_or_else(|| panic!("missing entry {path}"))
    }

    #[test]
    fn folds_nested_events_into_totals_and_self_times() {
        let (registry, publisher, mut aggregator) = harness();
        let buffer = Arc::new(ThreadRingBuffer::new(1));
        registry.register(Arc::clone(&buffer));

        // Child exits before its parent, so it sits first in the stream.
        buffer.push(event("Draw", Some("Render"), 3.0, 1, true));
        buffer.push(event("Render", None, 5.0, 0, true));

        publisher.invalidate();
        aggregator.cycle(Instant::now());
        let data = publisher.latest();

        let render = entry(&data, "Render");
        assert_relative_eq!(render.total_time, 5.0, epsilon = 1e-9);
        assert_relative_eq!(render.self_time, 2.0, epsilon = 1e-9);
        assert_eq!(render.call_count, 1);
        assert_eq!(render.depth, 0);
        assert!(render.child_paths.contains("Render/Draw"));

        let draw = entry(&data, "Render/Draw");
        assert_relative_eq!(draw.total_time, 3.0, epsilon = 1e-9);
        assert_relative_eq!(draw.self_time, 3.0, epsilon = 1e-9);
        assert_eq!(draw.parent_path, "Render");
        assert_eq!(draw.depth, 1);
        assert_relative_eq!(draw.parent_percentage, 60.0, epsilon = 1e-9);
    }

    #[test]
    fn sibling_after_nested_child_keeps_hierarchy() {
        let (registry, publisher, mut aggregator) = harness();
        let buffer = Arc::new(ThreadRingBuffer::new(1));
        registry.register(Arc::clone(&buffer));

        // A { B {} } then A-sibling C at root.
        buffer.push(event("B", Some("A"), 2.0, 1, true));
        buffer.push(event("A", None, 6.0, 0, true));
        buffer.push(event("C", None, 1.0, 0, true));

        publisher.invalidate();
        aggregator.cycle(Instant::now());
        let data = publisher.latest();

        let a = entry(&data, "A");
        let b = entry(&data, "A/B");
        assert_eq!(b.parent_path, "A");
        assert_eq!(b.depth, a.depth + 1);
        assert_relative_eq!(a.self_time, a.total_time - b.total_time, epsilon = 1e-9);

        let c = entry(&data, "C");
        assert_eq!(c.depth, 0);
        assert!(c.parent_path.is_empty());
    }

    #[test]
    fn missing_parent_becomes_implicit_root() {
        let (registry, publisher, mut aggregator) = harness();
        let buffer = Arc::new(ThreadRingBuffer::new(1));
        registry.register(Arc::clone(&buffer));

        // Parent named "Ghost" has never folded an event of its own.
        buffer.push(event("Orphan", Some("Ghost"), 2.0, 3, true));

        publisher.invalidate();
        aggregator.cycle(Instant::now());
        let data = publisher.latest();

        let orphan = entry(&data, "Orphan");
        assert_eq!(orphan.depth, 0);
        assert!(orphan.parent_path.is_empty());
    }

    #[test]
    fn groups_split_by_render_thread_flag() {
        let (registry, publisher, mut aggregator) = harness();
        let buffer = Arc::new(ThreadRingBuffer::new(1));
        registry.register(Arc::clone(&buffer));

        buffer.push(event("Render", None, 5.0, 0, true));
        buffer.push(event("Logic", None, 2.0, 0, false));

        publisher.invalidate();
        aggregator.cycle(Instant::now());
        let data = publisher.latest();

        assert!(data.render_thread.iter().any(|(p, _)| p == "Render"));
        assert!(data.render_thread.iter().all(|(p, _)| p != "Logic"));
        assert!(data.other_threads.iter().any(|(p, _)| p == "Logic"));
    }

    #[test]
    fn stale_entries_are_evicted_from_next_snapshot() {
        let (registry, publisher, mut aggregator) = harness();
        let buffer = Arc::new(ThreadRingBuffer::new(1));
        registry.register(Arc::clone(&buffer));

        let start = Instant::now();
        buffer.push(event("OneShot", None, 1.0, 0, true));
        publisher.invalidate();
        aggregator.cycle(start);
        assert!(!publisher.latest().render_thread.is_empty());

        publisher.invalidate();
        aggregator.cycle(start + STALENESS + Duration::from_millis(1));
        assert!(publisher.latest().render_thread.is_empty());
    }

    #[test]
    fn rolling_average_converges_and_window_stays_bounded() {
        let (registry, publisher, mut aggregator) = harness();
        let buffer = Arc::new(ThreadRingBuffer::new(1));
        registry.register(Arc::clone(&buffer));

        let start = Instant::now();
        for i in 0..(ROLLING_WINDOW + 50) {
            buffer.push(event("Steady", None, 7.5, 0, true));
            aggregator.cycle(start + Duration::from_millis(i as u64 * 2));
        }

        publisher.invalidate();
        aggregator.cycle(start + Duration::from_secs(3));
        let data = publisher.latest();
        let steady = entry(&data, "Steady");

        assert!(steady.window_len() <= ROLLING_WINDOW);
        assert_relative_eq!(steady.rolling_average_time, 7.5, epsilon = 1e-6);
        assert_relative_eq!(steady.total_percentage, 100.0, epsilon = 1e-6);
    }

    #[test]
    fn percentages_are_normalized_and_zero_safe() {
        let (registry, publisher, mut aggregator) = harness();
        let buffer = Arc::new(ThreadRingBuffer::new(1));
        registry.register(Arc::clone(&buffer));

        buffer.push(event("Child", Some("Parent"), 4.0, 1, true));
        buffer.push(event("Parent", None, 10.0, 0, true));
        buffer.push(event("ZeroChild", Some("Zero"), 0.0, 1, true));
        buffer.push(event("Zero", None, 0.0, 0, true));

        publisher.invalidate();
        aggregator.cycle(Instant::now());
        let data = publisher.latest();

        let child = entry(&data, "Parent/Child");
        assert!(child.parent_percentage >= 0.0 && child.parent_percentage <= 100.0);
        assert_relative_eq!(child.parent_percentage, 40.0, epsilon = 1e-9);

        // Zero-time parent: percentage degrades to 0 instead of dividing.
        let zero_child = entry(&data, "Zero/ZeroChild");
        assert_relative_eq!(zero_child.parent_percentage, 0.0, epsilon = 1e-9);
    }

    #[test]
    fn display_list_orders_children_after_parents() {
        let (registry, publisher, mut aggregator) = harness();
        let buffer = Arc::new(ThreadRingBuffer::new(1));
        registry.register(Arc::clone(&buffer));

        buffer.push(event("Mesh", Some("Draw"), 1.0, 2, true));
        buffer.push(event("Draw", Some("Frame"), 2.0, 1, true));
        buffer.push(event("Frame", None, 8.0, 0, true));

        publisher.invalidate();
        aggregator.cycle(Instant::now());
        let data = publisher.latest();

        let paths: Vec<&str> = data.render_thread.iter().map(|(p, _)| p.as_str()).collect();
        let frame = paths.iter().position(|p| *p == "Frame");
        let draw = paths.iter().position(|p| *p == "Frame/Draw");
        let mesh = paths.iter().position(|p| *p == "Frame/Draw/Mesh");
        assert!(frame < draw && draw < mesh);
    }

    #[test]
    fn publish_respects_throttle_until_invalidated() {
        let (registry, publisher, mut aggregator) = harness();
        let buffer = Arc::new(ThreadRingBuffer::new(1));
        registry.register(Arc::clone(&buffer));

        let start = Instant::now();
        buffer.push(event("First", None, 1.0, 0, true));
        publisher.invalidate();
        aggregator.cycle(start);
        assert_eq!(publisher.latest().render_thread.len(), 1);

        // Within the interval and no invalidation: the snapshot is untouched
        // even though new data folded.
        buffer.push(event("Second", None, 1.0, 0, true));
        aggregator.cycle(start + Duration::from_millis(10));
        assert_eq!(publisher.latest().render_thread.len(), 1);

        publisher.invalidate();
        buffer.push(event("Third", None, 1.0, 0, true));
        aggregator.cycle(start + Duration::from_millis(20));
        assert_eq!(publisher.latest().render_thread.len(), 3);
    }
}
