//! The handle callbacks use to reach the database.

use super::shared::Shared;
use crate::index::Index;
use crate::store::{ObjectId, Record};

/// Database access from inside update and lifecycle callbacks.
///
/// - `read_committed` and index lookups see the last completed frame.
/// - `write` targets the working buffer and becomes visible after
///   `end_frame`.
/// - `create` and `destroy` are queued and applied at the next safe point.
///   `create` returns the new identifier immediately.
#[derive(Clone, Copy)]
pub struct TickContext<'a> {
    shared: &'a Shared,
}

impl<'a> TickContext<'a> {
    pub(crate) fn new(shared: &'a Shared) -> Self {
        Self { shared }
    }

    /// Frame whose committed state this tick reads.
    #[must_use]
    pub fn frame(&self) -> u64 {
        self.shared.frame()
    }

    /// Queues creation of an object.
    ///
    /// The identifier and its slot index are reserved immediately; the slot
    /// is filled in the apply phase.
    ///
    /// # Panics
    ///
    /// Panics if `R` is not registered or its slot ceiling is reached.
    pub fn create<R: Record>(&self, record: R) -> ObjectId {
        self.shared.create(record)
    }

    /// Queues destruction of an object.
    pub fn destroy<R: Record>(&self, id: ObjectId) {
        self.shared.destroy::<R>(id);
    }

    /// Writes the working copy. Returns `false` if `id` is not live.
    #[must_use = "a false return means the object no longer exists"]
    pub fn write<R: Record>(&self, id: ObjectId, record: R) -> bool {
        self.shared.write(id, record)
    }

    /// Reads the committed copy.
    #[must_use]
    pub fn read_committed<R: Record>(&self, id: ObjectId) -> Option<R> {
        self.shared.read_committed(id)
    }

    /// First object under `key`, or [`ObjectId::NONE`].
    #[must_use]
    pub fn find_by_idx<I: Index>(&self, key: &I::Key) -> ObjectId {
        self.shared.find_by_idx::<I>(key)
    }

    /// Visits every object under `key`.
    pub fn foreach_by_idx<I: Index>(&self, key: &I::Key, visit: impl FnMut(ObjectId)) {
        self.shared.foreach_by_idx::<I>(key, visit);
    }
}
