//! # Object Store
//!
//! Typed, double-buffered slot storage.
//!
//! ## Buffers
//!
//! Every object has two copies of its record:
//!
//! - **committed**: the state as of the last completed frame. All reads see
//!   this copy, so every update callback in a tick observes the same world.
//! - **working**: where writes land during the tick.
//!
//! The buffer swap at end of frame flips the roles in O(1) and copies
//! forward only the slots written during the frame.

mod object_id;
mod record;
mod table;

pub use object_id::ObjectId;
pub use record::Record;
pub use table::{ObjectTable, StoreStats};
