//! # Tick Scheduling
//!
//! Building blocks of the tick cycle:
//!
//! - [`Phase`]: the `Idle -> Ticking -> Applying -> Idle` state machine
//! - [`CommandBuffer`]: creates and destroys deferred to the safe point
//! - [`WorkerPool`]: persistent threads running update work units
//! - [`TickStats`]: what a tick did and how long it took
//!
//! The cycle itself is driven by [`Database`](crate::Database).

mod pending;
mod phase;
mod pool;
mod stats;

pub use pending::{CommandBuffer, PendingMutation};
pub use phase::{Phase, PhaseCell};
pub use pool::WorkerPool;
pub use stats::{ApplyCounts, TickStats};
