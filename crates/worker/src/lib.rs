//! Structured task execution for keel scopes.
//!
//! Every scope owns a [`TaskGroup`]; work spawned outside any scope goes
//! through [`spawn_detached`]. Both report panics and cancellation through
//! a [`TaskHandle`] instead of unwinding into the caller.

/// Task groups, handles, and task failures.
pub mod group;
/// Id-attributed join set.
pub mod join_set;
/// Panic payload helpers.
pub mod panic;
/// Runtime construction.
pub mod runtime;
/// Ambient runtime handle and detached spawning.
pub mod spawn;
/// Cancellation tokens and id clocks.
pub mod token;

pub use group::{BoxError, TaskError, TaskFailures, TaskGroup, TaskHandle};
pub use join_set::TaskSet;
pub use runtime::{RuntimeFlavor, build_runtime};
pub use spawn::{runtime_handle, spawn_detached};
pub use token::{CancelToken, IdClock, WaitForCancellationFutureOwned};
