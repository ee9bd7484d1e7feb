//! # TICKDB Persistence
//!
//! Whole-store snapshot files for restart and crash recovery of a single
//! simulation process.
//!
//! ## Design Principles
//!
//! 1. **One file per record type** - named after the type's persistence key
//! 2. **Atomic replace** - temp file, fsync, rename
//! 3. **Whole-file or nothing** - CRC32 over the full file, no partial loads
//! 4. **Type-agnostic** - records are opaque byte strings of a fixed size
//!
//! ## Example
//!
//! ```rust,ignore
//! use tickdb_persist::{StorageDir, TypeImage};
//!
//! let dir = StorageDir::open("data/world", true)?;
//! dir.store("units", &image)?;
//! let image = dir.load("units", 24)?;
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod format;
pub mod storage;

pub use error::{PersistError, PersistResult};
pub use format::{FreeSlot, LiveRecord, TypeImage, SNAPSHOT_MAGIC};
pub use storage::{FlushReport, StorageDir};
