//! # Database
//!
//! The facade over stores, indices and the tick cycle, plus the types
//! used to register record types with it.

mod context;
mod database;
mod descriptor;
mod entry;
mod registry;
mod shared;

pub use context::TickContext;
pub use database::Database;
pub use descriptor::{LifecycleFn, TypeDescriptor, UpdateFn};
pub use registry::Registry;
