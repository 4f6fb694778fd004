//! Capture macro.

/// Measure the enclosing scope under the given name.
///
/// Expands to a [`ScopedTimer`](crate::ScopedTimer) bound to the rest of the
/// scope; the timing event is submitted when the scope exits, on any exit
/// path. The name handle is cached per call site, so the steady-state entry
/// cost is one atomic load.
///
/// When the `profiling` feature is disabled, this macro expands to nothing.
///
/// # Examples
///
/// ```
/// use framescope::{profile_scope, Profiler};
///
/// fn render_frame(profiler: &Profiler) {
///     profile_scope!(profiler, "Frame");
///     // ... frame work, nested scopes attach beneath "Frame"
/// } // event submitted here
/// ```
#[cfg(feature = "profiling")]
#[macro_export]
macro_rules! profile_scope {
    ($profiler:expr, $name:literal) => {
        let _framescope_guard =
            $crate::ScopedTimer::new($profiler, $crate::section_name!($name));
    };
}

#[cfg(not(feature = "profiling"))]
#[macro_export]
macro_rules! profile_scope {
    ($profiler:expr, $name:literal) => {};
}

#[cfg(all(test, feature = "profiling"))]
mod tests {
    use crate::Profiler;

    #[test]
    fn macro_expands_to_a_guard() {
        let profiler = Profiler::new();
        {
            profile_scope!(&profiler, "macro_scope");
            std::thread::sleep(std::time::Duration::from_millis(1));
        }

        let mut events = Vec::new();
        for buffer in profiler.registry().snapshot() {
            buffer.drain_into(&mut events);
        }
        assert_eq!(events.len(), 1);
        assert!(events[0].duration_ms > 0.0);
    }
}
