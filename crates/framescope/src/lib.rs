//! Lock-free hierarchical frame profiler.
//!
//! Instruments a real-time rendering pipeline (a render thread plus any
//! number of worker threads) with nested timing scopes, without adding
//! latency to the measured code. The capture hot path writes into a
//! per-thread SPSC ring buffer with no locks and no allocation; a background
//! aggregation thread reconstructs the call hierarchy, maintains rolling
//! statistics, and publishes a throttled snapshot for display.
//!
//! # Usage
//!
//! Create a [`Profiler`] at startup and start the aggregation thread:
//!
//! ```no_run
//! use framescope::{profile_scope, Profiler};
//!
//! let profiler = Profiler::new();
//! profiler.start().expect("aggregation thread");
//! ```
//!
//! Instrument code with nested scopes; the render thread marks itself once
//! so its cost is aggregated separately from worker noise:
//!
//! ```no_run
//! # use framescope::{profile_scope, Profiler};
//! # let profiler = Profiler::new();
//! profiler.mark_render_thread();
//! loop {
//!     profile_scope!(&profiler, "Frame");
//!     {
//!         profile_scope!(&profiler, "Update");
//!         // ... simulation
//!     }
//!     {
//!         profile_scope!(&profiler, "Render");
//!         // ... draw calls
//!     }
//! }
//! ```
//!
//! Any thread may read the latest published snapshot:
//!
//! ```no_run
//! # let profiler = framescope::Profiler::new();
//! let data = profiler.display_data();
//! for (path, entry) in &data.render_thread {
//!     println!("{path}: {:.2} ms", entry.rolling_average_time);
//! }
//! ```

mod aggregate;
mod error;
mod event;
pub mod ipc;
mod macros;
mod name;
mod profiler;
mod registry;
mod ring;
mod scope;
mod snapshot;

// Re-export public API
pub use error::{Error, Result};
pub use event::{DisplayData, ProfileEntry, TimingEvent, ROLLING_WINDOW};
pub use name::SectionName;
pub use profiler::{
    Profiler, ProfilerBuilder, DEFAULT_CYCLE_INTERVAL, DEFAULT_PUBLISH_INTERVAL,
    DEFAULT_STALENESS_THRESHOLD,
};
pub use scope::ScopedTimer;

// Re-export the snapshot server and protocol types for hosts and dashboards
pub use ipc::protocol::{ClientMessage, ServerMessage, PROTOCOL_VERSION};
pub use ipc::server::IpcServer;
