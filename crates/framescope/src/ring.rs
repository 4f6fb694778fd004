//! Lock-free single-producer single-consumer ring buffer, one per
//! instrumented thread.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crate::event::TimingEvent;

/// Capacity of each per-thread ring buffer (must be a power of 2).
pub(crate) const RING_CAPACITY: usize = 4096;

const INDEX_MASK: usize = RING_CAPACITY - 1;

/// SPSC ring buffer of timing events.
///
/// The write index is advanced only by the owning thread, the read index only
/// by the aggregation thread; both grow without bound and are masked on slot
/// access. A full buffer is never an error: the producer keeps writing and
/// the drain skips slots it has been lapped past, so sustained overload loses
/// the oldest unread events instead of blocking the instrumented code.
pub(crate) struct ThreadRingBuffer {
    events: UnsafeCell<[TimingEvent; RING_CAPACITY]>,
    /// Advanced only by the owning thread.
    write: AtomicUsize,
    /// Advanced only by the draining aggregation thread.
    read: AtomicUsize,
    /// Cleared when the owning thread exits; the buffer is still drained
    /// until empty before the registry drops it.
    alive: AtomicBool,
    /// Set when the owning thread is designated the render thread.
    render_thread: AtomicBool,
    thread_id: u32,
}

// SAFETY: slot access is coordinated through the acquire/release pairing on
// `write` and `read`; a slot in `[read, write)` is written before the index
// advance that exposes it and is not rewritten until the producer has wrapped
// a full capacity past it.
unsafe impl Sync for ThreadRingBuffer {}
unsafe impl Send for ThreadRingBuffer {}

impl ThreadRingBuffer {
    #[must_use]
    pub(crate) fn new(thread_id: u32) -> Self {
        Self {
            events: UnsafeCell::new([TimingEvent::empty(); RING_CAPACITY]),
            write: AtomicUsize::new(0),
            read: AtomicUsize::new(0),
            alive: AtomicBool::new(true),
            render_thread: AtomicBool::new(false),
            thread_id,
        }
    }

    /// Push an event. Owning thread only.
    ///
    /// Never fails and never blocks; wrapping past the reader overwrites the
    /// oldest unread event.
    #[inline]
    pub(crate) fn push(&self, event: TimingEvent) {
        let write = self.write.load(Ordering::Relaxed);

        // SAFETY: only the owning thread writes slots, and the release store
        // below publishes the slot contents before the new index is visible.
        unsafe {
            (*self.events.get())[write & INDEX_MASK] = event;
        }

        self.write.store(write.wrapping_add(1), Ordering::Release);
    }

    /// Drain every unread event into `out`. Aggregation thread only.
    ///
    /// The write index is snapshotted once, so a producer submitting during
    /// the drain is picked up next cycle rather than extending this one. If
    /// the producer has lapped the reader, the read index first skips to the
    /// oldest slot that still holds an unread event.
    pub(crate) fn drain_into(&self, out: &mut Vec<TimingEvent>) {
        let write = self.write.load(Ordering::Acquire);
        let mut read = self.read.load(Ordering::Relaxed);

        if write.wrapping_sub(read) > RING_CAPACITY {
            read = write.wrapping_sub(RING_CAPACITY);
        }

        while read != write {
            // SAFETY: `read` is within `[write - capacity, write)`, so the
            // slot was published by the producer's release store and will not
            // be rewritten until the producer wraps capacity past it.
            let event = unsafe { (*self.events.get())[read & INDEX_MASK] };
            out.push(event);
            read = read.wrapping_add(1);
        }

        self.read.store(read, Ordering::Release);
    }

    /// Number of unread events, clamped to capacity.
    #[must_use]
    pub(crate) fn len(&self) -> usize {
        let write = self.write.load(Ordering::Acquire);
        let read = self.read.load(Ordering::Acquire);
        write.wrapping_sub(read).min(RING_CAPACITY)
    }

    #[must_use]
    pub(crate) fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub(crate) fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    pub(crate) fn set_alive(&self, alive: bool) {
        self.alive.store(alive, Ordering::Release);
    }

    pub(crate) fn mark_render_thread(&self) {
        self.render_thread.store(true, Ordering::Release);
    }

    #[must_use]
    pub(crate) fn is_render_thread(&self) -> bool {
        self.render_thread.load(Ordering::Acquire)
    }

    #[must_use]
    pub(crate) fn thread_id(&self) -> u32 {
        self.thread_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::name::SectionName;
    use std::sync::Arc;

    fn event(duration_ms: f64) -> TimingEvent {
        TimingEvent {
            name: SectionName::intern("ring_test"),
            parent: None,
            duration_ms,
            thread_id: 1,
            depth: 0,
            is_render_thread: false,
        }
    }

    #[test]
    fn push_drain_preserves_order() {
        let buffer = ThreadRingBuffer::new(1);
        for i in 0..100 {
            buffer.push(event(f64::from(i)));
        }
        assert_eq!(buffer.len(), 100);

        let mut out = Vec::new();
        buffer.drain_into(&mut out);

        assert_eq!(out.len(), 100);
        for (i, ev) in out.iter().enumerate() {
            assert!((ev.duration_ms - i as f64).abs() < f64::EPSILON);
        }
        assert!(buffer.is_empty());
    }

    #[test]
    fn overflow_drops_oldest_only() {
        let buffer = ThreadRingBuffer::new(1);
        let total = RING_CAPACITY + 128;
        for i in 0..total {
            buffer.push(event(i as f64));
        }

        let mut out = Vec::new();
        buffer.drain_into(&mut out);

        // The newest RING_CAPACITY events survive, still in order.
        assert_eq!(out.len(), RING_CAPACITY);
        let first = (total - RING_CAPACITY) as f64;
        for (i, ev) in out.iter().enumerate() {
            assert!((ev.duration_ms - (first + i as f64)).abs() < f64::EPSILON);
        }
    }

    #[test]
    fn concurrent_producer_consumer_sees_each_event_once() {
        // Stays under capacity so a stalled reader can never be lapped and
        // exactly-once delivery is guaranteed.
        let buffer = Arc::new(ThreadRingBuffer::new(1));
        let total = 4_000u32;

        let producer = {
            let buffer = Arc::clone(&buffer);
            std::thread::spawn(move || {
                for i in 0..total {
                    buffer.push(event(f64::from(i)));
                    if i % 64 == 0 {
                        std::thread::yield_now();
                    }
                }
            })
        };

        let mut seen = Vec::new();
        while seen.len() < total as usize {
            let mut out = Vec::new();
            buffer.drain_into(&mut out);
            seen.extend(out);
            std::thread::yield_now();
        }
        producer.join().expect("producer thread panicked");

        assert_eq!(seen.len(), total as usize);
        for (i, ev) in seen.iter().enumerate() {
            assert!((ev.duration_ms - i as f64).abs() < f64::EPSILON);
        }
    }

    #[test]
    fn drain_snapshots_write_index_once() {
        let buffer = ThreadRingBuffer::new(1);
        buffer.push(event(1.0));
        buffer.push(event(2.0));

        let mut out = Vec::new();
        buffer.drain_into(&mut out);
        assert_eq!(out.len(), 2);

        buffer.push(event(3.0));
        let mut next = Vec::new();
        buffer.drain_into(&mut next);
        assert_eq!(next.len(), 1);
        assert!((next[0].duration_ms - 3.0).abs() < f64::EPSILON);
    }
}
