//! Dynamic reachability and pathfinding for a mutable colony tile map.
//!
//! The world layer pushes tile edits into a [`pathfinding::Navigator`], which keeps
//! a walkability grid, a navigation graph and a region index consistent, and serves
//! path requests from a worker pool without blocking the simulation tick.

pub mod config;
pub mod fixed_math;
pub mod pathfinding;
pub mod profiling;
pub mod structures;

// ============================================================================
// Profiling Macros
// ============================================================================

/// Conditionally log messages based on tick interval when perf_stats feature is enabled.
///
/// Logs every 100 ticks. `$tick` is any expression with a `.0: u64` field.
/// When the perf_stats feature is disabled this compiles to nothing and the
/// arguments are never evaluated.
///
/// # Example
/// ```ignore
/// profile_log!(tick, "{} requests pending", navigator.pending_request_count());
/// ```
#[macro_export]
#[cfg(feature = "perf_stats")]
macro_rules! profile_log {
    ($tick:expr, $($arg:tt)*) => {
        if $tick.0 % 100 == 0 {
            ::tracing::info!($($arg)*);
        }
    };
}

#[macro_export]
#[cfg(not(feature = "perf_stats"))]
macro_rules! profile_log {
    ($tick:expr, $($arg:tt)*) => {};
}
