//! Error types for the profiler's narrow fallible surface.

use thiserror::Error;

/// Errors from profiler lifecycle operations.
///
/// Capture and aggregation themselves are infallible by design; only
/// starting/stopping the aggregation thread and binding the snapshot server
/// can fail.
#[derive(Error, Debug)]
pub enum Error {
    /// The aggregation thread is already running.
    #[error("aggregation thread is already running")]
    AlreadyRunning,

    /// The aggregation thread is not running.
    #[error("aggregation thread is not running")]
    NotRunning,

    /// Spawning the aggregation thread failed.
    #[error("failed to spawn aggregation thread: {0}")]
    SpawnAggregator(#[source] std::io::Error),

    /// The aggregation thread panicked before it could be joined.
    #[error("aggregation thread panicked")]
    AggregatorPanicked,

    /// I/O error from the snapshot server.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
