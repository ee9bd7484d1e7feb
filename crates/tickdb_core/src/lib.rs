//! # TICKDB Core
//!
//! In-memory transactional object store for fixed-timestep simulations.
//! Many worker threads update many objects concurrently; each tick every
//! object reads one consistent snapshot of the world, and all writes land
//! at once when the frame ends.
//!
//! ## Architecture Rules
//!
//! 1. **Snapshot reads** - `read_committed` and index lookups only ever see
//!    the last completed frame
//! 2. **Deferred structure** - creates and destroys issued during a tick are
//!    applied at a safe point, never under a live iteration
//! 3. **Stable identifiers** - slots never move; generations make stale
//!    identifiers detectable
//! 4. **Whole rebuilds** - indices are recomputed from scratch every frame
//!    and published with one pointer swap
//!
//! ## Example
//!
//! ```rust,ignore
//! use tickdb_core::{Database, DatabaseConfig, Registry, TypeDescriptor};
//!
//! let mut registry = Registry::new();
//! registry.register(TypeDescriptor::<Unit>::new().with_index::<UnitByLocation>())?;
//!
//! let db = Database::open(DatabaseConfig::ephemeral("data/scratch"), registry)?;
//! let unit = db.create(Unit::default());
//! db.update_tick()?;
//! db.end_frame()?;
//! db.graceful_shutdown()?;
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod config;
pub mod db;
pub mod error;
pub mod index;
pub mod schedule;
pub mod store;
pub mod sync;

pub use config::{DatabaseConfig, StorageConfig};
pub use db::{Database, Registry, TickContext, TypeDescriptor};
pub use error::{ConfigError, DatabaseError, DatabaseResult};
pub use index::{Index, IndexStats};
pub use schedule::{Phase, TickStats};
pub use store::{ObjectId, Record, StoreStats};
pub use sync::{DirtyBits, ReentrantLock};

pub use tickdb_persist::FlushReport;
