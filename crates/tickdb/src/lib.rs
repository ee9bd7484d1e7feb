//! # TICKDB
//!
//! Sample simulation over the tick-synchronized object database.
//!
//! ## Modules
//!
//! - `simulation`: spawner and unit record types, their indices and update
//!   callbacks
//! - `frame_loop`: fixed-rate driver with per-frame statistics
//! - `demo`: configuration and seeding for the `tickdb_demo` binary

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]

pub mod demo;
pub mod frame_loop;
pub mod simulation;

pub use tickdb_core as db;

pub use demo::{seed_spawners, DemoConfig};
pub use frame_loop::{FrameLoop, FrameStats, FrameStatsAccumulator, LoopConfig};
pub use simulation::{register_simulation, Location, Spawner, SpawnerByLocation, Unit, UnitByLocation};
