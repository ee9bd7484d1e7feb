//! # Spawner Simulation
//!
//! Two record types exercising every part of the database:
//!
//! - a [`Spawner`] walks across the grid by `delta` each tick and drops a
//!   [`Unit`] where it stood
//! - a [`Unit`] counts its `ttl` down and destroys itself at zero
//!
//! Both are indexed by location.

use bytemuck::{Pod, Zeroable};
use tickdb_core::{DatabaseResult, Index, ObjectId, Record, Registry, TickContext, TypeDescriptor};
use tracing::trace;

/// Grid position.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Pod, Zeroable)]
#[repr(C)]
pub struct Location {
    /// Column.
    pub x: i32,
    /// Row.
    pub y: i32,
}

impl Location {
    /// Creates a location.
    #[inline]
    #[must_use]
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// This location moved by `delta`.
    #[inline]
    #[must_use]
    pub const fn offset(self, delta: Self) -> Self {
        Self {
            x: self.x.wrapping_add(delta.x),
            y: self.y.wrapping_add(delta.y),
        }
    }
}

/// Moves every tick and leaves a unit behind.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct Spawner {
    /// Where the next unit appears.
    pub location: Location,
    /// Step applied after each spawn.
    pub delta: Location,
    /// Units spawned so far.
    pub spawned_count: u32,
    /// Initial `ttl` of spawned units.
    pub unit_ttl: u32,
}

impl Spawner {
    /// A spawner that has not spawned anything yet.
    #[must_use]
    pub const fn new(location: Location, delta: Location, unit_ttl: u32) -> Self {
        Self {
            location,
            delta,
            spawned_count: 0,
            unit_ttl,
        }
    }
}

impl Record for Spawner {
    const TYPE_ID: u16 = 1;
    const PERSIST_KEY: &'static str = "spawners";
}

/// Stationary object that expires after `ttl` ticks.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct Unit {
    /// Where the unit was spawned.
    pub location: Location,
    /// Ticks left before the unit destroys itself.
    pub ttl: u32,
    _pad: u32,
    /// Spawner that created the unit, or [`ObjectId::NONE`].
    pub spawner: ObjectId,
}

impl Unit {
    /// Creates a unit.
    #[must_use]
    pub const fn new(location: Location, ttl: u32, spawner: ObjectId) -> Self {
        Self {
            location,
            ttl,
            _pad: 0,
            spawner,
        }
    }
}

impl Record for Unit {
    const TYPE_ID: u16 = 2;
    const PERSIST_KEY: &'static str = "units";
}

/// Spawners by current location.
pub struct SpawnerByLocation;

impl Index for SpawnerByLocation {
    type Record = Spawner;
    type Key = Location;

    fn extract(_id: ObjectId, spawner: &Spawner) -> Location {
        spawner.location
    }
}

/// Units by spawn location.
pub struct UnitByLocation;

impl Index for UnitByLocation {
    type Record = Unit;
    type Key = Location;

    fn extract(_id: ObjectId, unit: &Unit) -> Location {
        unit.location
    }
}

fn update_spawner(id: ObjectId, ctx: &TickContext<'_>) {
    let Some(mut spawner) = ctx.read_committed::<Spawner>(id) else {
        return;
    };

    let unit = ctx.create(Unit::new(spawner.location, spawner.unit_ttl, id));
    trace!(spawner = %id, %unit, x = spawner.location.x, y = spawner.location.y, "Unit spawned");

    spawner.location = spawner.location.offset(spawner.delta);
    spawner.spawned_count += 1;
    let _ = ctx.write(id, spawner);
}

fn update_unit(id: ObjectId, ctx: &TickContext<'_>) {
    let Some(mut unit) = ctx.read_committed::<Unit>(id) else {
        return;
    };

    if unit.ttl == 0 {
        ctx.destroy::<Unit>(id);
    } else {
        unit.ttl -= 1;
        let _ = ctx.write(id, unit);
    }
}

/// Registers both record types, their update callbacks and indices.
///
/// # Errors
///
/// Fails if either type tag or persistence key is already taken.
pub fn register_simulation(registry: &mut Registry) -> DatabaseResult<()> {
    registry.register(
        TypeDescriptor::<Spawner>::new()
            .on_update(update_spawner)
            .with_index::<SpawnerByLocation>(),
    )?;
    registry.register(
        TypeDescriptor::<Unit>::new()
            .on_update(update_unit)
            .with_index::<UnitByLocation>(),
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_location_offset() {
        let moved = Location::new(10, 10).offset(Location::new(1, -2));
        assert_eq!(moved, Location::new(11, 8));
        assert_eq!(Location::new(i32::MAX, 0).offset(Location::new(1, 0)).x, i32::MIN);
    }

    #[test]
    fn test_record_layouts() {
        assert_eq!(Spawner::record_size(), 24);
        assert_eq!(Unit::record_size(), 24);
    }

    #[test]
    fn test_register_twice_fails() {
        let mut registry = Registry::new();
        register_simulation(&mut registry).unwrap();
        assert_eq!(registry.len(), 2);
        assert!(register_simulation(&mut registry).is_err());
    }

    #[test]
    fn test_indices_extract_location() {
        let unit = Unit::new(Location::new(3, 4), 1, ObjectId::NONE);
        assert_eq!(UnitByLocation::extract(ObjectId::new(0, 0), &unit), Location::new(3, 4));

        let spawner = Spawner::new(Location::new(5, 6), Location::new(1, 1), 1);
        assert_eq!(
            SpawnerByLocation::extract(ObjectId::new(0, 0), &spawner),
            Location::new(5, 6)
        );
    }
}
