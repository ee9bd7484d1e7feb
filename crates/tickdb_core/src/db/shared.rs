//! State shared between the orchestrating thread and the workers.

use super::entry::{ErasedType, TypeEntry};
use super::TickContext;
use crate::error::{DatabaseError, DatabaseResult};
use crate::index::{Index, IndexEngine, IndexStats};
use crate::schedule::{ApplyCounts, PendingMutation, Phase, PhaseCell};
use crate::store::{ObjectId, Record};
use crate::sync::{ReentrantGuard, ReentrantLock};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tickdb_persist::TypeImage;
use tracing::{debug, trace, warn};

pub(crate) struct Shared {
    pub(crate) types: Vec<Box<dyn ErasedType>>,
    by_tag: HashMap<u16, usize>,
    pub(crate) indices: IndexEngine,
    pub(crate) lock: ReentrantLock,
    pub(crate) phase: PhaseCell,
    frame: AtomicU64,
    pub(crate) shutting_down: AtomicBool,
    pub(crate) lock_timeout: Duration,
}

impl Shared {
    pub(crate) fn new(types: Vec<Box<dyn ErasedType>>, lock_timeout: Duration) -> Self {
        let by_tag = types
            .iter()
            .enumerate()
            .map(|(i, t)| (t.type_tag(), i))
            .collect();
        Self {
            types,
            by_tag,
            indices: IndexEngine::new(),
            lock: ReentrantLock::new(),
            phase: PhaseCell::default(),
            frame: AtomicU64::new(0),
            shutting_down: AtomicBool::new(false),
            lock_timeout,
        }
    }

    /// Takes the structural lock or reports which operation timed out.
    pub(crate) fn lock_for(&self, operation: &'static str) -> DatabaseResult<ReentrantGuard<'_>> {
        self.lock.try_lock_for(self.lock_timeout).ok_or_else(|| {
            let timeout_ms = u64::try_from(self.lock_timeout.as_millis()).unwrap_or(u64::MAX);
            warn!(operation, timeout_ms, "Structural lock timed out");
            DatabaseError::LockTimeout {
                operation,
                timeout_ms,
            }
        })
    }

    pub(crate) fn entry<R: Record>(&self) -> &TypeEntry<R> {
        let Some(&index) = self.by_tag.get(&R::TYPE_ID) else {
            panic!("Record type {} is not registered", std::any::type_name::<R>());
        };
        match self.types[index].as_any().downcast_ref::<TypeEntry<R>>() {
            Some(entry) => entry,
            None => panic!(
                "Type id {} is registered as {}, not {}",
                R::TYPE_ID,
                self.types[index].type_name(),
                std::any::type_name::<R>()
            ),
        }
    }

    #[inline]
    pub(crate) fn frame(&self) -> u64 {
        self.frame.load(Ordering::Acquire)
    }

    pub(crate) fn set_frame(&self, frame: u64) {
        self.frame.store(frame, Ordering::Release);
    }

    pub(crate) fn create<R: Record>(&self, record: R) -> ObjectId {
        let entry = self.entry::<R>();
        let Some(id) = entry.table.reserve() else {
            panic!(
                "Capacity exhausted for {}: slot ceiling reached",
                std::any::type_name::<R>()
            );
        };
        trace!(%id, record = std::any::type_name::<R>(), "Create queued");
        entry.pending.push(PendingMutation::Create { id, record });
        self.apply_if_idle();
        id
    }

    pub(crate) fn destroy<R: Record>(&self, id: ObjectId) {
        trace!(%id, record = std::any::type_name::<R>(), "Destroy queued");
        self.entry::<R>().pending.push(PendingMutation::Destroy { id });
        self.apply_if_idle();
    }

    #[inline]
    pub(crate) fn write<R: Record>(&self, id: ObjectId, record: R) -> bool {
        self.entry::<R>().table.write(id, record)
    }

    #[inline]
    pub(crate) fn read_committed<R: Record>(&self, id: ObjectId) -> Option<R> {
        self.entry::<R>().table.read_committed(id)
    }

    pub(crate) fn find_by_idx<I: Index>(&self, key: &I::Key) -> ObjectId {
        self.indices.find_first::<I>(key)
    }

    pub(crate) fn foreach_by_idx<I: Index>(&self, key: &I::Key, visit: impl FnMut(ObjectId)) {
        self.indices.for_each_match::<I>(key, visit);
    }

    /// Outside a tick nothing iterates the stores, so structural mutations
    /// apply right away on the calling thread.
    fn apply_if_idle(&self) {
        if self.phase.get() != Phase::Idle {
            return;
        }
        let Some(_guard) = self.lock.try_lock_for(self.lock_timeout) else {
            warn!("Structural lock busy, mutation deferred to the next apply phase");
            return;
        };
        if self.phase.get() != Phase::Idle {
            return;
        }

        self.phase.set(Phase::Applying);
        let counts = self.apply_pending();
        self.phase.set(Phase::Idle);
        debug!(creates = counts.creates, destroys = counts.destroys, "Applied mutations outside a tick");
    }

    /// Drains every command buffer until all are empty. Lifecycle callbacks
    /// may queue more work; it is applied in the same pass.
    pub(crate) fn apply_pending(&self) -> ApplyCounts {
        debug_assert!(self.lock.is_held_by_current_thread());

        let ctx = TickContext::new(self);
        let mut retired: Vec<HashSet<ObjectId>> = vec![HashSet::new(); self.types.len()];
        let mut total = ApplyCounts::default();
        while self.types.iter().any(|t| t.pending_len() > 0) {
            for (entry, retired) in self.types.iter().zip(retired.iter_mut()) {
                total += entry.apply_pending(&ctx, retired);
            }
        }
        total
    }

    /// Restores every type that has an image, then publishes indices for
    /// the current frame.
    pub(crate) fn restore(&self, images: Vec<Option<TypeImage>>) -> DatabaseResult<usize> {
        let _guard = self.lock_for("open")?;
        self.phase.transition(Phase::Idle, Phase::Applying, "open");

        let ctx = TickContext::new(self);
        let mut restored = 0;
        for (entry, image) in self.types.iter().zip(images) {
            if let Some(image) = image {
                restored += entry.restore(&image, &ctx)?;
            }
        }
        self.apply_pending();
        self.rebuild_indices(self.frame())?;

        self.phase.set(Phase::Idle);
        Ok(restored)
    }

    pub(crate) fn rebuild_indices(&self, frame: u64) -> DatabaseResult<IndexStats> {
        let _guard = self.lock_for("index rebuild")?;
        Ok(self
            .indices
            .rebuild(&self.lock, frame, self.types.iter().map(|t| t.as_index_source())))
    }
}
