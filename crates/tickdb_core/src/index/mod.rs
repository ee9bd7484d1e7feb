//! # Index Engine
//!
//! Secondary lookups over the committed snapshot.
//!
//! ## Model
//!
//! - An index is a marker type implementing [`Index`]: it names the record
//!   type it covers and a pure key extractor.
//! - Every index is rebuilt from scratch at each end of frame, after the
//!   buffer swap. There is no incremental maintenance.
//! - The full set of tables is published with one atomic pointer swap.
//!   Lookups that started before the swap finish against the old set.
//!
//! ```rust,ignore
//! struct UnitByLocation;
//!
//! impl Index for UnitByLocation {
//!     type Record = Unit;
//!     type Key = [i32; 2];
//!
//!     fn extract(_id: ObjectId, unit: &Unit) -> [i32; 2] {
//!         unit.location
//!     }
//! }
//! ```

mod engine;
mod table;

pub use engine::{IndexEngine, IndexSnapshot, IndexSource, IndexStats};
pub use table::{BuiltIndex, IndexTable};
pub(crate) use table::{IndexBuilder, TypedIndex};

use crate::store::{ObjectId, Record};
use std::hash::Hash;

/// A declared secondary index over one record type.
pub trait Index: Send + Sync + 'static {
    /// Record type this index covers.
    type Record: Record;

    /// Lookup key.
    type Key: Clone + Eq + Hash + Send + Sync + 'static;

    /// Computes the key for one object. Must be pure.
    fn extract(id: ObjectId, record: &Self::Record) -> Self::Key;
}
