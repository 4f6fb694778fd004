//! Scoped capture guards and per-thread capture state.

use std::cell::RefCell;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::event::TimingEvent;
use crate::name::SectionName;
use crate::profiler::Profiler;
use crate::ring::ThreadRingBuffer;

/// Pre-reserved scope-stack depth; deeper nesting works but reallocates.
const SCOPE_STACK_RESERVE: usize = 64;

static NEXT_THREAD_ID: AtomicU32 = AtomicU32::new(1);

/// Per-thread capture state for one profiler instance: the thread's ring
/// buffer and the scope-name stack used to derive parent/depth at capture
/// time. Touched only by the owning thread.
struct ProfilerThreadState {
    profiler_id: u64,
    buffer: Arc<ThreadRingBuffer>,
    stack: Vec<SectionName>,
}

struct ThreadSlot {
    thread_id: u32,
    states: Vec<ProfilerThreadState>,
}

impl ThreadSlot {
    fn new() -> Self {
        Self {
            thread_id: NEXT_THREAD_ID.fetch_add(1, Ordering::Relaxed),
            states: Vec::new(),
        }
    }

    /// State for `profiler`, creating and registering the thread's ring
    /// buffer on first use. Linear scan: a process has one profiler in
    /// practice.
    fn state_for(&mut self, profiler: &Profiler) -> &mut ProfilerThreadState {
        let id = profiler.instance_id();
        if let Some(index) = self.states.iter().position(|s| s.profiler_id == id) {
            return &mut self.states[index];
        }

        let buffer = Arc::new(ThreadRingBuffer::new(self.thread_id));
        profiler.registry().register(Arc::clone(&buffer));
        self.states.push(ProfilerThreadState {
            profiler_id: id,
            buffer,
            stack: Vec::with_capacity(SCOPE_STACK_RESERVE),
        });
        let index = self.states.len() - 1;
        &mut self.states[index]
    }
}

impl Drop for ThreadSlot {
    fn drop(&mut self) {
        // Thread exit: mark buffers dead so the aggregator drains what is
        // left and the registry can reclaim them.
        for state in &self.states {
            state.buffer.set_alive(false);
        }
    }
}

thread_local! {
    static SLOT: RefCell<ThreadSlot> = RefCell::new(ThreadSlot::new());
}

/// Designate the calling thread as the render thread for `profiler`.
pub(crate) fn mark_render_thread(profiler: &Profiler) {
    let _ = SLOT.try_with(|slot| {
        slot.borrow_mut().state_for(profiler).buffer.mark_render_thread();
    });
}

/// RAII capture guard for one named scope.
///
/// Construction records a start timestamp and pushes the name onto the
/// calling thread's scope stack. Dropping, on any exit path, pops the stack
/// and submits exactly one [`TimingEvent`] into the thread's ring buffer.
/// Submission takes no locks and performs no allocation.
///
/// Guards follow stack discipline: keep them as locals so lifetimes nest.
/// Storing guards and dropping them out of creation order skews parent
/// attribution and is not supported.
pub struct ScopedTimer<'p> {
    profiler: &'p Profiler,
    name: SectionName,
    parent: Option<SectionName>,
    depth: u8,
    start: Instant,
    active: bool,
}

impl<'p> ScopedTimer<'p> {
    /// Begin measuring the named scope.
    ///
    /// If the profiler is disabled the guard is inert: nothing is pushed
    /// and drop submits nothing.
    #[inline]
    #[must_use]
    pub fn new(profiler: &'p Profiler, name: SectionName) -> Self {
        let mut parent = None;
        let mut depth = 0;
        let mut active = false;

        if profiler.is_enabled() {
            // try_with: a guard constructed during thread teardown stays
            // inert instead of panicking.
            active = SLOT
                .try_with(|slot| {
                    let mut slot = slot.borrow_mut();
                    let state = slot.state_for(profiler);
                    parent = state.stack.last().copied();
                    depth = state.stack.len().min(usize::from(u8::MAX)) as u8;
                    state.stack.push(name);
                })
                .is_ok();
        }

        Self {
            profiler,
            name,
            parent,
            depth,
            start: Instant::now(),
            active,
        }
    }
}

impl Drop for ScopedTimer<'_> {
    #[inline]
    fn drop(&mut self) {
        if !self.active {
            return;
        }
        let duration_ms = self.start.elapsed().as_secs_f64() * 1000.0;

        let _ = SLOT.try_with(|slot| {
            let mut slot = slot.borrow_mut();
            let state = slot.state_for(self.profiler);
            state.stack.pop();
            state.buffer.push(TimingEvent {
                name: self.name,
                parent: self.parent,
                duration_ms,
                thread_id: state.buffer.thread_id(),
                depth: self.depth,
                is_render_thread: state.buffer.is_render_thread(),
            });
        });
    }
}
