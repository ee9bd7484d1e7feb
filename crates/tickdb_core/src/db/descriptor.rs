//! Per-type registration: callbacks and declared indices.

use super::TickContext;
use crate::index::{Index, IndexBuilder, TypedIndex};
use crate::store::{ObjectId, Record};
use std::any::TypeId;

/// Update callback, run once per live object per tick on a worker.
pub type UpdateFn = Box<dyn Fn(ObjectId, &TickContext<'_>) + Send + Sync>;

/// Lifecycle callback, run in the apply phase on the object's record.
pub type LifecycleFn<R> = Box<dyn Fn(ObjectId, &mut R, &TickContext<'_>) + Send + Sync>;

/// Everything the database needs to know about one record type.
///
/// Every callback is optional; an absent callback is a no-op.
///
/// ```rust,ignore
/// let units = TypeDescriptor::<Unit>::new()
///     .on_update(|id, ctx| { /* ... */ })
///     .on_freed(|id, unit, _ctx| tracing::trace!(%id, ttl = unit.ttl, "unit freed"))
///     .with_index::<UnitByLocation>();
/// ```
pub struct TypeDescriptor<R: Record> {
    pub(crate) on_update: Option<UpdateFn>,
    on_allocated: Option<LifecycleFn<R>>,
    on_spun_up: Option<LifecycleFn<R>>,
    on_spun_down: Option<LifecycleFn<R>>,
    on_freed: Option<LifecycleFn<R>>,
    pub(crate) indices: Vec<Box<dyn IndexBuilder<R>>>,
    index_types: Vec<TypeId>,
}

impl<R: Record> Default for TypeDescriptor<R> {
    fn default() -> Self {
        Self {
            on_update: None,
            on_allocated: None,
            on_spun_up: None,
            on_spun_down: None,
            on_freed: None,
            indices: Vec::new(),
            index_types: Vec::new(),
        }
    }
}

impl<R: Record> TypeDescriptor<R> {
    /// Descriptor with no callbacks and no indices.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the per-tick update callback.
    #[must_use]
    pub fn on_update(
        mut self,
        f: impl Fn(ObjectId, &TickContext<'_>) + Send + Sync + 'static,
    ) -> Self {
        self.on_update = Some(Box::new(f));
        self
    }

    /// Runs when a slot is materialized, before `on_spun_up`.
    #[must_use]
    pub fn on_allocated(
        mut self,
        f: impl Fn(ObjectId, &mut R, &TickContext<'_>) + Send + Sync + 'static,
    ) -> Self {
        self.on_allocated = Some(Box::new(f));
        self
    }

    /// Runs when an object becomes live, including after a reload.
    #[must_use]
    pub fn on_spun_up(
        mut self,
        f: impl Fn(ObjectId, &mut R, &TickContext<'_>) + Send + Sync + 'static,
    ) -> Self {
        self.on_spun_up = Some(Box::new(f));
        self
    }

    /// Runs when a destroy is finalized, before `on_freed`.
    #[must_use]
    pub fn on_spun_down(
        mut self,
        f: impl Fn(ObjectId, &mut R, &TickContext<'_>) + Send + Sync + 'static,
    ) -> Self {
        self.on_spun_down = Some(Box::new(f));
        self
    }

    /// Runs last on destroy, before the slot returns to the free list.
    #[must_use]
    pub fn on_freed(
        mut self,
        f: impl Fn(ObjectId, &mut R, &TickContext<'_>) + Send + Sync + 'static,
    ) -> Self {
        self.on_freed = Some(Box::new(f));
        self
    }

    /// Declares index `I` on this type.
    ///
    /// # Panics
    ///
    /// Panics if `I` is already declared.
    #[must_use]
    pub fn with_index<I: Index<Record = R>>(mut self) -> Self {
        let index_type = TypeId::of::<I>();
        assert!(
            !self.index_types.contains(&index_type),
            "Index {} declared twice",
            std::any::type_name::<I>()
        );
        self.index_types.push(index_type);
        self.indices.push(Box::new(TypedIndex::<I>::new()));
        self
    }

    /// Type tag.
    #[must_use]
    pub fn type_id(&self) -> u16 {
        R::TYPE_ID
    }

    /// Snapshot file stem.
    #[must_use]
    pub fn persist_key(&self) -> &'static str {
        R::PERSIST_KEY
    }

    /// Record size in bytes.
    #[must_use]
    pub fn record_size(&self) -> u32 {
        R::record_size()
    }

    /// Number of declared indices.
    #[must_use]
    pub fn index_count(&self) -> usize {
        self.indices.len()
    }

    /// True if an update callback is set.
    #[must_use]
    pub fn has_update(&self) -> bool {
        self.on_update.is_some()
    }

    pub(crate) fn materialize(&self, id: ObjectId, record: &mut R, ctx: &TickContext<'_>) {
        if let Some(f) = &self.on_allocated {
            f(id, record, ctx);
        }
        if let Some(f) = &self.on_spun_up {
            f(id, record, ctx);
        }
    }

    pub(crate) fn retire(&self, id: ObjectId, record: &mut R, ctx: &TickContext<'_>) {
        if let Some(f) = &self.on_spun_down {
            f(id, record, ctx);
        }
        if let Some(f) = &self.on_freed {
            f(id, record, ctx);
        }
    }
}
