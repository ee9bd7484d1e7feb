//! # Command Buffer
//!
//! Structural mutations issued while a tick is running are recorded here and
//! applied in order at the next safe point.

use crate::store::ObjectId;
use parking_lot::Mutex;

/// A queued structural mutation for records of type `R`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum PendingMutation<R> {
    /// Materialize the reserved slot `id` with `record`.
    Create {
        /// Reserved identifier.
        id: ObjectId,
        /// Initial record.
        record: R,
    },
    /// Retire `id`.
    Destroy {
        /// Object to retire.
        id: ObjectId,
    },
}

/// Append-only, multi-producer queue of pending mutations.
#[derive(Debug)]
pub struct CommandBuffer<R> {
    queue: Mutex<Vec<PendingMutation<R>>>,
}

impl<R> Default for CommandBuffer<R> {
    fn default() -> Self {
        Self {
            queue: Mutex::new(Vec::new()),
        }
    }
}

impl<R> CommandBuffer<R> {
    /// Appends a mutation.
    pub fn push(&self, mutation: PendingMutation<R>) {
        self.queue.lock().push(mutation);
    }

    /// Takes every queued mutation in submission order.
    #[must_use]
    pub fn drain(&self) -> Vec<PendingMutation<R>> {
        std::mem::take(&mut *self.queue.lock())
    }

    /// Number of queued mutations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    /// True if nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }
}
