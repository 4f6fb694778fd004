//! Interned section names.
//!
//! Section names come from string literals at instrumentation sites. Instead
//! of carrying `&'static str` through every event, call sites register the
//! name once and pass around a small copyable handle. Identity comparison is
//! then a `u32` compare, independent of where the literal was defined.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};

/// Sentinel stored in call-site caches before the first registration.
const UNREGISTERED: u32 = u32::MAX;

/// Registered names, indexed by handle. Append-only.
static NAMES: Mutex<Vec<&'static str>> = Mutex::new(Vec::new());

/// Stable handle for a registered section name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SectionName(u32);

impl SectionName {
    /// Handle that resolves to no registered name. Used for never-read
    /// ring buffer slots.
    pub(crate) const INVALID: Self = Self(UNREGISTERED);

    /// Register `name`, returning the existing handle if it was seen before.
    ///
    /// Takes a short lock; instrumentation sites should go through
    /// [`section_name!`](crate::section_name) instead, which caches the
    /// handle and only lands here once per call site.
    #[must_use]
    pub fn intern(name: &'static str) -> Self {
        let mut names = NAMES.lock();
        if let Some(id) = names.iter().position(|n| *n == name) {
            return Self(id as u32);
        }
        let id = names.len() as u32;
        names.push(name);
        Self(id)
    }

    /// Cached registration for the `section_name!` macro.
    ///
    /// The first call interns the name and stores the handle in `slot`;
    /// every later call is a single relaxed load.
    #[inline]
    #[must_use]
    pub fn cached(slot: &AtomicU32, name: &'static str) -> Self {
        let id = slot.load(Ordering::Relaxed);
        if id != UNREGISTERED {
            return Self(id);
        }
        let interned = Self::intern(name);
        slot.store(interned.0, Ordering::Relaxed);
        interned
    }

    /// Resolve the handle back to its registered string.
    ///
    /// An unregistered handle resolves to `"?"` rather than failing.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        NAMES.lock().get(self.0 as usize).copied().unwrap_or("?")
    }
}

/// Register a section name once and reuse the handle on every pass.
///
/// Expands to a per-call-site cache, so the steady-state cost is one relaxed
/// atomic load.
///
/// # Examples
///
/// ```
/// let name = framescope::section_name!("Render");
/// assert_eq!(name.as_str(), "Render");
/// ```
#[macro_export]
macro_rules! section_name {
    ($name:literal) => {{
        static CACHED: ::std::sync::atomic::AtomicU32 =
            ::std::sync::atomic::AtomicU32::new(u32::MAX);
        $crate::SectionName::cached(&CACHED, $name)
    }};
}
