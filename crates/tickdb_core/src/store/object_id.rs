//! Object identifiers.

use bytemuck::{Pod, Zeroable};
use std::fmt;

/// Opaque handle to a stored object.
///
/// Layout: slot index in the low 32 bits, slot generation in the high 32.
/// The generation is bumped every time a slot is freed, so an identifier
/// kept across a destroy never resolves to the slot's next occupant.
///
/// Identifiers are plain data and may be embedded in records.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Pod, Zeroable)]
#[repr(transparent)]
pub struct ObjectId(u64);

impl ObjectId {
    /// The "no object" sentinel. Never refers to a live object.
    pub const NONE: Self = Self(u64::MAX);

    /// Creates an identifier from slot index and generation.
    #[inline]
    #[must_use]
    pub const fn new(index: u32, generation: u32) -> Self {
        Self((index as u64) | ((generation as u64) << 32))
    }

    /// Slot index.
    #[inline]
    #[must_use]
    pub const fn index(self) -> u32 {
        self.0 as u32
    }

    /// Slot generation.
    #[inline]
    #[must_use]
    pub const fn generation(self) -> u32 {
        (self.0 >> 32) as u32
    }

    /// True for [`ObjectId::NONE`].
    #[inline]
    #[must_use]
    pub const fn is_none(self) -> bool {
        self.0 == u64::MAX
    }

    /// True for anything except [`ObjectId::NONE`].
    #[inline]
    #[must_use]
    pub const fn is_some(self) -> bool {
        !self.is_none()
    }

    /// Raw 64-bit value, as written to snapshot files.
    #[inline]
    #[must_use]
    pub const fn to_raw(self) -> u64 {
        self.0
    }

    /// Rebuilds an identifier from its raw value.
    #[inline]
    #[must_use]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }
}

impl Default for ObjectId {
    fn default() -> Self {
        Self::NONE
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_none() {
            write!(f, "ObjectId(NONE)")
        } else {
            write!(f, "ObjectId({}v{})", self.index(), self.generation())
        }
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_none() {
            write!(f, "none")
        } else {
            write!(f, "{}v{}", self.index(), self.generation())
        }
    }
}
