//! Per-tick timing and counts.

/// What one `update_tick` did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TickStats {
    /// Frame the tick read from.
    pub frame: u64,
    /// Objects whose update callback ran.
    pub updated: usize,
    /// Work units dispatched to the pool.
    pub work_units: usize,
    /// Creates materialized in the apply phase.
    pub creates: usize,
    /// Destroys finalized in the apply phase.
    pub destroys: usize,
    /// Time spent in update callbacks, microseconds.
    pub update_us: u64,
    /// Time spent applying structural mutations, microseconds.
    pub apply_us: u64,
}

/// Creates and destroys applied in one drain.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ApplyCounts {
    /// Creates materialized.
    pub creates: usize,
    /// Destroys finalized.
    pub destroys: usize,
}

impl ApplyCounts {
    /// True if nothing was applied.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.creates == 0 && self.destroys == 0
    }
}

impl std::ops::AddAssign for ApplyCounts {
    fn add_assign(&mut self, rhs: Self) {
        self.creates += rhs.creates;
        self.destroys += rhs.destroys;
    }
}
