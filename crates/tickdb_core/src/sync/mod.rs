//! # Synchronization Primitives
//!
//! The two leaf primitives everything else composes.
//!
//! ```text
//! ReentrantLock:  owner thread + hold counter, bounded wait
//!                 guards: safe-apply phase, index publish, shutdown flush
//!
//! DirtyBits:      one bit per slot in independent AtomicU64 words
//!                 set by workers without locking during a tick,
//!                 drained by the buffer swap at end of frame
//! ```

mod dirty;
mod reentrant;

pub use dirty::DirtyBits;
pub use reentrant::{ReentrantGuard, ReentrantLock};
