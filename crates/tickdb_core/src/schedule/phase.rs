//! Scheduler phase.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

/// Where the database is in its tick cycle.
///
/// ```text
/// Idle --update_tick--> Ticking --workers joined--> Applying --end_frame--> Idle
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Phase {
    /// Between frames. Structural mutations apply immediately.
    Idle = 0,
    /// Update callbacks running on the worker pool.
    Ticking = 1,
    /// Queued creates and destroys being applied, or awaiting `end_frame`.
    Applying = 2,
}

impl Phase {
    const fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Ticking,
            2 => Self::Applying,
            _ => Self::Idle,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Ticking => "ticking",
            Self::Applying => "applying",
        };
        f.write_str(name)
    }
}

/// Atomically readable [`Phase`].
///
/// Transitions are made by the thread holding the structural lock; any
/// thread may read.
#[derive(Debug)]
pub struct PhaseCell(AtomicU8);

impl Default for PhaseCell {
    fn default() -> Self {
        Self(AtomicU8::new(Phase::Idle as u8))
    }
}

impl PhaseCell {
    /// Current phase.
    #[inline]
    #[must_use]
    pub fn get(&self) -> Phase {
        Phase::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Moves to `phase`.
    #[inline]
    pub fn set(&self, phase: Phase) {
        self.0.store(phase as u8, Ordering::Release);
    }

    /// Moves from `from` to `to`.
    ///
    /// # Panics
    ///
    /// Panics if the current phase is not `from`.
    pub fn transition(&self, from: Phase, to: Phase, operation: &str) {
        let current = self.get();
        assert!(
            current == from,
            "{operation} requires phase {from} but the database is {current}"
        );
        self.set(to);
    }
}
