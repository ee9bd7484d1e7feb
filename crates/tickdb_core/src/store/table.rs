//! # Object Table
//!
//! Storage for every object of one record type.
//!
//! ## Layout
//!
//! ```text
//! segments:  [seg 0: slot 0..S] [seg 1: slot S..2S] ...   (never relocated)
//! slot:      state | generation | buffer[0] | buffer[1]
//!                                   ^            ^
//!                            committed = 0    working = 1   (flips each frame)
//! ```
//!
//! ## Concurrency
//!
//! - Record access takes the table lock shared, then the slot buffer's own
//!   lock. Workers on different objects never block each other.
//! - Slot state, generations and segment growth change only under the table
//!   lock held exclusively, which happens only in the safe-apply phase and at
//!   the buffer swap.
//! - The free list has its own mutex so creations issued during a tick can
//!   reserve an identifier immediately.

use super::{ObjectId, Record};
use crate::error::{DatabaseError, DatabaseResult};
use crate::sync::DirtyBits;
use parking_lot::{Mutex, RwLock};
use tickdb_persist::{FreeSlot, LiveRecord, TypeImage};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum SlotState {
    Free,
    Live,
}

struct Slot<R> {
    state: SlotState,
    generation: u32,
    buffers: [RwLock<R>; 2],
}

impl<R: Record> Slot<R> {
    fn vacant() -> Self {
        Self {
            state: SlotState::Free,
            generation: 0,
            buffers: [RwLock::new(R::zeroed()), RwLock::new(R::zeroed())],
        }
    }

    #[inline]
    fn holds(&self, id: ObjectId) -> bool {
        self.state == SlotState::Live && self.generation == id.generation()
    }

    fn fill(&mut self, record: R) {
        for buffer in &mut self.buffers {
            *buffer.get_mut() = record;
        }
    }
}

struct Slots<R> {
    segments: Vec<Box<[Slot<R>]>>,
    segment_size: usize,
    committed: usize,
    committed_frame: u64,
    live: usize,
    dirty: DirtyBits,
}

impl<R: Record> Slots<R> {
    fn capacity(&self) -> usize {
        self.segments.len() * self.segment_size
    }

    #[inline]
    fn working(&self) -> usize {
        self.committed ^ 1
    }

    #[inline]
    fn get(&self, index: usize) -> Option<&Slot<R>> {
        self.segments
            .get(index / self.segment_size)
            .and_then(|seg| seg.get(index % self.segment_size))
    }

    fn slot_mut(&mut self, index: usize) -> &mut Slot<R> {
        let segment_size = self.segment_size;
        match self.segments.get_mut(index / segment_size) {
            Some(seg) => &mut seg[index % segment_size],
            None => panic!("Slot index {index} beyond table capacity"),
        }
    }

    fn ensure_capacity(&mut self, len: usize) {
        while self.capacity() < len {
            let segment: Box<[Slot<R>]> = (0..self.segment_size).map(|_| Slot::vacant()).collect();
            self.segments.push(segment);
        }
        self.dirty.grow(self.capacity());
    }

    fn iter(&self) -> impl Iterator<Item = (usize, &Slot<R>)> + '_ {
        self.segments.iter().flat_map(|seg| seg.iter()).enumerate()
    }
}

#[derive(Debug, Default)]
struct FreeList {
    /// Reusable indices; popped from the back.
    indices: Vec<u32>,
    /// One past the highest index ever handed out.
    high_water: u32,
}

/// Occupancy figures for one table.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StoreStats {
    /// Live objects.
    pub live: usize,
    /// Slots waiting on the free list.
    pub free: usize,
    /// Slots ever handed out (live + free + reserved).
    pub slots: usize,
    /// Allocated slot capacity across all segments.
    pub capacity: usize,
    /// Slots written since the last buffer swap.
    pub dirty: usize,
    /// Allocated segments.
    pub segments: usize,
    /// Frame the committed buffer belongs to.
    pub committed_frame: u64,
}

/// Double-buffered slot storage for one record type.
pub struct ObjectTable<R: Record> {
    slots: RwLock<Slots<R>>,
    free: Mutex<FreeList>,
    max_slots: Option<u32>,
}

impl<R: Record> ObjectTable<R> {
    /// Creates an empty table.
    ///
    /// # Arguments
    ///
    /// * `segment_size` - Slots per segment
    /// * `max_slots` - Hard ceiling on slots, `None` for unbounded
    ///
    /// # Panics
    ///
    /// Panics if `segment_size` is zero.
    #[must_use]
    pub fn new(segment_size: usize, max_slots: Option<u32>) -> Self {
        assert!(segment_size > 0, "Segment size must be non-zero");
        Self {
            slots: RwLock::new(Slots {
                segments: Vec::new(),
                segment_size,
                committed: 0,
                committed_frame: 0,
                live: 0,
                dirty: DirtyBits::default(),
            }),
            free: Mutex::new(FreeList::default()),
            max_slots,
        }
    }

    /// Reserves a slot and returns the identifier its object will carry.
    ///
    /// The object does not exist until [`install`](Self::install) runs.
    /// Returns `None` when the slot ceiling is reached.
    pub fn reserve(&self) -> Option<ObjectId> {
        let mut free = self.free.lock();

        let index = match free.indices.pop() {
            Some(index) => index,
            None => {
                let ceiling = self.max_slots.unwrap_or(u32::MAX).min(u32::MAX - 1);
                if free.high_water >= ceiling {
                    return None;
                }
                free.high_water += 1;
                free.high_water - 1
            }
        };

        let generation = self
            .slots
            .read_recursive()
            .get(index as usize)
            .map_or(0, |slot| slot.generation);
        Some(ObjectId::new(index, generation))
    }

    /// Materializes a reserved object, writing `record` to both buffers.
    ///
    /// # Panics
    ///
    /// Panics if `id` is not an outstanding reservation.
    pub fn install(&self, id: ObjectId, record: R) {
        let mut guard = self.slots.write();
        let slots = &mut *guard;
        let index = id.index() as usize;
        slots.ensure_capacity(index + 1);

        let slot = slots.slot_mut(index);
        assert!(
            slot.state == SlotState::Free && slot.generation == id.generation(),
            "Slot {index} does not match reservation {id}"
        );
        slot.state = SlotState::Live;
        slot.fill(record);
        slots.live += 1;
    }

    /// Retires a live object and returns its latest record.
    ///
    /// The slot's generation is bumped; the index is not reusable until
    /// [`release`](Self::release) hands it back. Returns `None` if `id` is
    /// not live.
    pub fn remove(&self, id: ObjectId) -> Option<R> {
        let mut guard = self.slots.write();
        let slots = &mut *guard;
        let working = slots.working();
        let index = id.index() as usize;

        let slot = slots.segments.get_mut(index / slots.segment_size).and_then(|seg| {
            seg.get_mut(index % slots.segment_size).filter(|slot| slot.holds(id))
        })?;
        let record = *slot.buffers[working].get_mut();
        slot.state = SlotState::Free;
        slot.generation = slot.generation.wrapping_add(1);
        slot.fill(R::zeroed());

        slots.dirty.clear(index);
        slots.live -= 1;
        Some(record)
    }

    /// Returns a removed slot's index to the free list.
    pub fn release(&self, index: u32) {
        self.free.lock().indices.push(index);
    }

    /// Writes the working copy of a live object.
    ///
    /// Returns `false` if `id` is not live.
    #[inline]
    pub fn write(&self, id: ObjectId, record: R) -> bool {
        let slots = self.slots.read_recursive();
        let index = id.index() as usize;
        match slots.get(index) {
            Some(slot) if slot.holds(id) => {
                *slot.buffers[slots.working()].write() = record;
                slots.dirty.mark(index);
                true
            }
            _ => false,
        }
    }

    /// Reads the committed copy of a live object.
    #[inline]
    #[must_use]
    pub fn read_committed(&self, id: ObjectId) -> Option<R> {
        let slots = self.slots.read_recursive();
        slots
            .get(id.index() as usize)
            .filter(|slot| slot.holds(id))
            .map(|slot| *slot.buffers[slots.committed].read())
    }

    /// True if `id` refers to a live object.
    #[must_use]
    pub fn is_live(&self, id: ObjectId) -> bool {
        let slots = self.slots.read_recursive();
        slots.get(id.index() as usize).is_some_and(|slot| slot.holds(id))
    }

    /// Identifiers of all live objects in slot order.
    #[must_use]
    pub fn live_ids(&self) -> Vec<ObjectId> {
        let slots = self.slots.read_recursive();
        let mut ids = Vec::with_capacity(slots.live);
        for (index, slot) in slots.iter() {
            if slot.state == SlotState::Live {
                ids.push(ObjectId::new(index as u32, slot.generation));
            }
        }
        ids
    }

    /// Identifiers written since the last buffer swap, in slot order.
    #[must_use]
    pub fn dirty_ids(&self) -> Vec<ObjectId> {
        let slots = self.slots.read_recursive();
        slots
            .dirty
            .iter_set()
            .filter_map(|index| {
                slots
                    .get(index)
                    .filter(|slot| slot.state == SlotState::Live)
                    .map(|slot| ObjectId::new(index as u32, slot.generation))
            })
            .collect()
    }

    /// Visits every live object's committed copy in slot order.
    ///
    /// The table is read-locked for the duration; `f` must not call back
    /// into structural operations on this table.
    pub fn for_each_committed(&self, mut f: impl FnMut(ObjectId, &R)) {
        let slots = self.slots.read_recursive();
        for (index, slot) in slots.iter() {
            if slot.state == SlotState::Live {
                let record = slot.buffers[slots.committed].read();
                f(ObjectId::new(index as u32, slot.generation), &record);
            }
        }
    }

    /// Flips committed and working buffers and re-syncs the new working copy.
    ///
    /// After the flip the new working buffer holds values from two frames
    /// ago for every slot written this frame; those slots are copied forward
    /// from the new committed buffer. Returns the number of slots synced.
    pub fn swap(&self, frame: u64) -> usize {
        let mut guard = self.slots.write();
        let slots = &mut *guard;
        slots.committed ^= 1;
        slots.committed_frame = frame;

        let committed = slots.committed;
        let mut synced = 0;
        for index in slots.dirty.take() {
            let slot = slots.slot_mut(index);
            if slot.state == SlotState::Live {
                let value = *slot.buffers[committed].get_mut();
                *slot.buffers[committed ^ 1].get_mut() = value;
                synced += 1;
            }
        }
        synced
    }

    /// Frame the committed buffer belongs to.
    #[must_use]
    pub fn committed_frame(&self) -> u64 {
        self.slots.read_recursive().committed_frame
    }

    /// Captures the committed buffer as a snapshot image.
    #[must_use]
    pub fn to_image(&self) -> TypeImage {
        let high_water = self.free.lock().high_water;
        let slots = self.slots.read_recursive();

        let mut image = TypeImage::new(R::record_size());
        image.slot_count = high_water;
        for index in 0..high_water {
            match slots.get(index as usize) {
                Some(slot) if slot.state == SlotState::Live => {
                    let record = slot.buffers[slots.committed].read();
                    image.live.push(LiveRecord {
                        id: ObjectId::new(index, slot.generation).to_raw(),
                        bytes: bytemuck::bytes_of(&*record).to_vec(),
                    });
                }
                Some(slot) => image.free.push(FreeSlot {
                    index,
                    generation: slot.generation,
                }),
                // Reserved but never materialized.
                None => image.free.push(FreeSlot {
                    index,
                    generation: 0,
                }),
            }
        }
        image
    }

    /// Rebuilds an empty table from a snapshot image.
    ///
    /// Live objects keep their identifiers; free slots keep their
    /// generations. Returns the restored identifiers in image order.
    ///
    /// # Errors
    ///
    /// [`DatabaseError::InconsistentSnapshot`] if the table is not empty or
    /// the image does not describe each slot exactly once.
    pub fn restore(&self, image: &TypeImage) -> DatabaseResult<Vec<ObjectId>> {
        let inconsistent = |reason: String| DatabaseError::InconsistentSnapshot {
            key: R::PERSIST_KEY.to_string(),
            reason,
        };

        if self.free.lock().high_water != 0 {
            return Err(inconsistent("store already holds objects".to_string()));
        }
        if self.max_slots.is_some_and(|max| image.slot_count > max) {
            return Err(inconsistent(format!(
                "{} slots exceed the configured ceiling",
                image.slot_count
            )));
        }

        let slot_count = image.slot_count as usize;
        let record_size = std::mem::size_of::<R>();
        let mut seen = vec![false; slot_count];
        let mut claim = |index: usize| -> DatabaseResult<()> {
            match seen.get_mut(index) {
                Some(flag) if !*flag => {
                    *flag = true;
                    Ok(())
                }
                Some(_) => Err(inconsistent(format!("slot {index} listed twice"))),
                None => Err(inconsistent(format!("slot {index} out of range"))),
            }
        };

        let mut guard = self.slots.write();
        let slots = &mut *guard;
        slots.ensure_capacity(slot_count);

        let mut restored = Vec::with_capacity(image.live.len());
        for entry in &image.live {
            let id = ObjectId::from_raw(entry.id);
            let index = id.index() as usize;
            claim(index)?;
            if entry.bytes.len() != record_size {
                return Err(inconsistent(format!("record {id} has {} bytes", entry.bytes.len())));
            }

            let record: R = bytemuck::pod_read_unaligned(&entry.bytes);
            let slot = slots.slot_mut(index);
            slot.state = SlotState::Live;
            slot.generation = id.generation();
            slot.fill(record);
            slots.live += 1;
            restored.push(id);
        }

        let mut free_indices = Vec::with_capacity(image.free.len());
        for entry in &image.free {
            claim(entry.index as usize)?;
            let slot = slots.slot_mut(entry.index as usize);
            slot.state = SlotState::Free;
            slot.generation = entry.generation;
            free_indices.push(entry.index);
        }
        slots.dirty.clear_all();
        drop(guard);

        // Lowest index pops first.
        free_indices.sort_unstable_by(|a, b| b.cmp(a));
        let mut free = self.free.lock();
        free.indices = free_indices;
        free.high_water = image.slot_count;

        Ok(restored)
    }

    /// Replaces both buffers of a live object.
    ///
    /// Only valid while no tick is reading the committed buffer. Returns
    /// `false` if `id` is not live.
    pub fn overwrite(&self, id: ObjectId, record: R) -> bool {
        let mut guard = self.slots.write();
        let slots = &mut *guard;
        let index = id.index() as usize;
        if !slots.get(index).is_some_and(|slot| slot.holds(id)) {
            return false;
        }
        slots.slot_mut(index).fill(record);
        slots.dirty.clear(index);
        true
    }

    /// Number of live objects.
    #[must_use]
    pub fn live_count(&self) -> usize {
        self.slots.read_recursive().live
    }

    /// Number of slots ever handed out.
    #[must_use]
    pub fn slot_count(&self) -> usize {
        self.free.lock().high_water as usize
    }

    /// Number of slots waiting on the free list.
    #[must_use]
    pub fn free_count(&self) -> usize {
        self.free.lock().indices.len()
    }

    /// Current occupancy figures.
    #[must_use]
    pub fn stats(&self) -> StoreStats {
        let (free, high_water) = {
            let list = self.free.lock();
            (list.indices.len(), list.high_water)
        };
        let slots = self.slots.read_recursive();
        StoreStats {
            live: slots.live,
            free,
            slots: high_water as usize,
            capacity: slots.capacity(),
            dirty: slots.dirty.count(),
            segments: slots.segments.len(),
            committed_frame: slots.committed_frame,
        }
    }
}
