//! Process-scoped registry of per-thread ring buffers.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::ring::ThreadRingBuffer;

/// Append-mostly list of live ring buffers, owned by the profiler and shared
/// with the aggregation thread.
///
/// Registration happens once per thread lifetime, so a short lock is
/// acceptable here; the capture hot path never touches the registry.
pub(crate) struct ThreadRegistry {
    buffers: Mutex<Vec<Arc<ThreadRingBuffer>>>,
}

impl ThreadRegistry {
    #[must_use]
    pub(crate) fn new() -> Self {
        Self {
            buffers: Mutex::new(Vec::new()),
        }
    }

    /// Add a newly created thread buffer.
    pub(crate) fn register(&self, buffer: Arc<ThreadRingBuffer>) {
        tracing::debug!(thread_id = buffer.thread_id(), "registering thread buffer");
        self.buffers.lock().push(buffer);
    }

    /// Stable snapshot of the current buffer list for one drain cycle.
    #[must_use]
    pub(crate) fn snapshot(&self) -> Vec<Arc<ThreadRingBuffer>> {
        self.buffers.lock().clone()
    }

    /// Drop buffers whose owning thread has exited and which hold no
    /// undrained events.
    pub(crate) fn prune_dead(&self) {
        self.buffers
            .lock()
            .retain(|buffer| buffer.is_alive() || !buffer.is_empty());
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.buffers.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::TimingEvent;

    #[test]
    fn snapshot_is_stable_across_registration() {
        let registry = ThreadRegistry::new();
        registry.register(Arc::new(ThreadRingBuffer::new(1)));

        let snapshot = registry.snapshot();
        registry.register(Arc::new(ThreadRingBuffer::new(2)));

        assert_eq!(snapshot.len(), 1);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn prune_keeps_dead_buffers_until_drained() {
        let registry = ThreadRegistry::new();
        let buffer = Arc::new(ThreadRingBuffer::new(1));
        registry.register(Arc::clone(&buffer));

        buffer.push(TimingEvent::empty());
        buffer.set_alive(false);

        registry.prune_dead();
        assert_eq!(registry.len(), 1);

        let mut out = Vec::new();
        buffer.drain_into(&mut out);
        registry.prune_dead();
        assert_eq!(registry.len(), 0);
    }
}
