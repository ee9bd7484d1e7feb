//! Type-erased per-type state.
//!
//! The database holds one [`TypeEntry`] per registered record type behind
//! the object-safe [`ErasedType`] trait, so the tick cycle can drive every
//! type uniformly. Typed access goes through `as_any` and a downcast.

use super::{TickContext, TypeDescriptor};
use crate::error::DatabaseResult;
use crate::index::{BuiltIndex, IndexSource};
use crate::schedule::{ApplyCounts, CommandBuffer, PendingMutation};
use crate::store::{ObjectId, ObjectTable, Record};
use std::any::Any;
use std::collections::HashSet;
use tickdb_persist::TypeImage;

/// Uniform view of one registered record type.
pub(crate) trait ErasedType: Send + Sync {
    fn type_tag(&self) -> u16;
    fn type_name(&self) -> &'static str;
    fn persist_key(&self) -> &'static str;
    fn record_size(&self) -> u32;
    fn as_any(&self) -> &dyn Any;
    fn as_index_source(&self) -> &dyn IndexSource;

    fn has_update(&self) -> bool;
    fn live_ids(&self) -> Vec<ObjectId>;
    fn run_update(&self, ids: &[ObjectId], ctx: &TickContext<'_>);

    /// Applies this type's queued mutations once. `retired` collects
    /// identifiers destroyed earlier in the same apply phase.
    fn apply_pending(&self, ctx: &TickContext<'_>, retired: &mut HashSet<ObjectId>)
        -> ApplyCounts;
    fn pending_len(&self) -> usize;

    fn swap_buffers(&self, frame: u64) -> usize;
    fn to_image(&self) -> TypeImage;
    fn restore(&self, image: &TypeImage, ctx: &TickContext<'_>) -> DatabaseResult<usize>;
}

/// Descriptor, storage and command buffer of one record type.
pub(crate) struct TypeEntry<R: Record> {
    pub(crate) descriptor: TypeDescriptor<R>,
    pub(crate) table: ObjectTable<R>,
    pub(crate) pending: CommandBuffer<R>,
}

impl<R: Record> TypeEntry<R> {
    pub(crate) fn new(descriptor: TypeDescriptor<R>, table: ObjectTable<R>) -> Self {
        Self {
            descriptor,
            table,
            pending: CommandBuffer::default(),
        }
    }

    fn finalize_destroy(&self, id: ObjectId, ctx: &TickContext<'_>) {
        let Some(mut record) = self.table.remove(id) else {
            panic!(
                "Destroy of {id} ({}) which is not live: identifier used after its object was destroyed",
                std::any::type_name::<R>()
            );
        };
        self.descriptor.retire(id, &mut record, ctx);
        self.table.release(id.index());
    }
}

impl<R: Record> ErasedType for TypeEntry<R> {
    fn type_tag(&self) -> u16 {
        R::TYPE_ID
    }

    fn type_name(&self) -> &'static str {
        std::any::type_name::<R>()
    }

    fn persist_key(&self) -> &'static str {
        R::PERSIST_KEY
    }

    fn record_size(&self) -> u32 {
        R::record_size()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_index_source(&self) -> &dyn IndexSource {
        self
    }

    fn has_update(&self) -> bool {
        self.descriptor.has_update()
    }

    fn live_ids(&self) -> Vec<ObjectId> {
        self.table.live_ids()
    }

    fn run_update(&self, ids: &[ObjectId], ctx: &TickContext<'_>) {
        if let Some(update) = &self.descriptor.on_update {
            for &id in ids {
                update(id, ctx);
            }
        }
    }

    fn apply_pending(
        &self,
        ctx: &TickContext<'_>,
        retired: &mut HashSet<ObjectId>,
    ) -> ApplyCounts {
        let mut counts = ApplyCounts::default();
        for mutation in self.pending.drain() {
            match mutation {
                PendingMutation::Create { id, mut record } => {
                    self.descriptor.materialize(id, &mut record, ctx);
                    self.table.install(id, record);
                    counts.creates += 1;
                }
                PendingMutation::Destroy { id } => {
                    if retired.insert(id) {
                        self.finalize_destroy(id, ctx);
                        counts.destroys += 1;
                    }
                }
            }
        }
        counts
    }

    fn pending_len(&self) -> usize {
        self.pending.len()
    }

    fn swap_buffers(&self, frame: u64) -> usize {
        self.table.swap(frame)
    }

    fn to_image(&self) -> TypeImage {
        self.table.to_image()
    }

    fn restore(&self, image: &TypeImage, ctx: &TickContext<'_>) -> DatabaseResult<usize> {
        let ids = self.table.restore(image)?;
        for &id in &ids {
            if let Some(mut record) = self.table.read_committed(id) {
                self.descriptor.materialize(id, &mut record, ctx);
                self.table.overwrite(id, record);
            }
        }
        Ok(ids.len())
    }
}

impl<R: Record> IndexSource for TypeEntry<R> {
    fn source_name(&self) -> &'static str {
        std::any::type_name::<R>()
    }

    fn committed_frame(&self) -> u64 {
        self.table.committed_frame()
    }

    fn build_indices(&self, out: &mut Vec<BuiltIndex>) {
        if self.descriptor.indices.is_empty() {
            return;
        }

        let mut records = Vec::with_capacity(self.table.live_count());
        self.table.for_each_committed(|id, record| records.push((id, *record)));
        for builder in &self.descriptor.indices {
            out.push(builder.build(&records));
        }
    }
}
