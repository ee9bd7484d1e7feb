//! Rebuild and publish of the index table set.

use super::{BuiltIndex, Index, IndexTable};
use crate::store::ObjectId;
use crate::sync::ReentrantLock;
use arc_swap::ArcSwap;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// Something whose committed snapshot feeds the index rebuild.
pub trait IndexSource {
    /// Name for diagnostics.
    fn source_name(&self) -> &'static str;

    /// Frame the source's committed buffer belongs to.
    fn committed_frame(&self) -> u64;

    /// Builds every index declared on this source into `out`.
    fn build_indices(&self, out: &mut Vec<BuiltIndex>);
}

/// Figures for one published snapshot.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct IndexStats {
    /// Frame the snapshot was built from.
    pub frame: u64,
    /// Index tables.
    pub tables: usize,
    /// Distinct keys over all tables.
    pub keys: usize,
    /// Indexed objects over all tables.
    pub entries: usize,
}

/// An immutable set of index tables built from one committed frame.
pub struct IndexSnapshot {
    tables: HashMap<TypeId, Arc<dyn Any + Send + Sync>>,
    stats: IndexStats,
}

impl IndexSnapshot {
    fn from_built(frame: u64, built: Vec<BuiltIndex>) -> Self {
        let mut stats = IndexStats {
            frame,
            ..IndexStats::default()
        };
        let mut tables = HashMap::with_capacity(built.len());
        for index in built {
            stats.tables += 1;
            stats.keys += index.keys;
            stats.entries += index.entries;
            let previous = tables.insert(index.index_type, index.table);
            assert!(previous.is_none(), "Index {} built twice in one rebuild", index.name);
        }
        Self { tables, stats }
    }

    /// Frame the snapshot was built from.
    #[must_use]
    pub fn frame(&self) -> u64 {
        self.stats.frame
    }

    /// Snapshot figures.
    #[must_use]
    pub fn stats(&self) -> IndexStats {
        self.stats
    }

    /// The table for index `I`.
    ///
    /// # Panics
    ///
    /// Panics if `I` was not declared on any registered type.
    #[must_use]
    pub fn table<I: Index>(&self) -> &IndexTable<I::Key> {
        self.tables
            .get(&TypeId::of::<I>())
            .and_then(|table| table.downcast_ref::<IndexTable<I::Key>>())
            .unwrap_or_else(|| panic!("Index {} is not registered", std::any::type_name::<I>()))
    }
}

/// Owner of the published index snapshot.
pub struct IndexEngine {
    published: ArcSwap<IndexSnapshot>,
}

impl Default for IndexEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl IndexEngine {
    /// Creates an engine with an empty snapshot at frame 0.
    #[must_use]
    pub fn new() -> Self {
        Self {
            published: ArcSwap::from_pointee(IndexSnapshot::from_built(0, Vec::new())),
        }
    }

    /// Rebuilds every index from the sources' committed buffers and
    /// publishes the result.
    ///
    /// # Panics
    ///
    /// Panics if the caller does not hold `lock`, or if any source's
    /// committed buffer is not at `frame`.
    pub fn rebuild<'a>(
        &self,
        lock: &ReentrantLock,
        frame: u64,
        sources: impl IntoIterator<Item = &'a dyn IndexSource>,
    ) -> IndexStats {
        assert!(
            lock.is_held_by_current_thread(),
            "Index rebuild outside the publish step: structural lock not held"
        );

        let start = Instant::now();
        let mut built = Vec::new();
        for source in sources {
            let committed = source.committed_frame();
            assert_eq!(
                committed,
                frame,
                "Index rebuild for frame {frame} against {} committed at frame {committed}",
                source.source_name()
            );
            source.build_indices(&mut built);
        }

        let snapshot = IndexSnapshot::from_built(frame, built);
        let stats = snapshot.stats();
        self.published.store(Arc::new(snapshot));

        debug!(
            frame,
            tables = stats.tables,
            keys = stats.keys,
            entries = stats.entries,
            elapsed_us = start.elapsed().as_micros() as u64,
            "Published index snapshot"
        );
        stats
    }

    /// The currently published snapshot.
    #[must_use]
    pub fn snapshot(&self) -> Arc<IndexSnapshot> {
        self.published.load_full()
    }

    /// First object under `key` in slot order, or [`ObjectId::NONE`].
    #[must_use]
    pub fn find_first<I: Index>(&self, key: &I::Key) -> ObjectId {
        self.published.load().table::<I>().first(key)
    }

    /// Visits every object under `key`, all from one snapshot.
    pub fn for_each_match<I: Index>(&self, key: &I::Key, mut visit: impl FnMut(ObjectId)) {
        let snapshot = self.snapshot();
        for &id in snapshot.table::<I>().matches(key) {
            visit(id);
        }
    }

    /// Figures of the published snapshot.
    #[must_use]
    pub fn stats(&self) -> IndexStats {
        self.published.load().stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{IndexBuilder, TypedIndex};
    use crate::store::Record;
    use bytemuck::{Pod, Zeroable};
    use std::time::Duration;

    #[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
    #[repr(C)]
    struct Sample {
        bucket: u32,
    }

    impl Record for Sample {
        const TYPE_ID: u16 = 1;
        const PERSIST_KEY: &'static str = "samples";
    }

    struct ByBucket;

    impl Index for ByBucket {
        type Record = Sample;
        type Key = u32;

        fn extract(_id: ObjectId, record: &Sample) -> u32 {
            record.bucket
        }
    }

    struct Unregistered;

    impl Index for Unregistered {
        type Record = Sample;
        type Key = u32;

        fn extract(_id: ObjectId, _record: &Sample) -> u32 {
            0
        }
    }

    struct FixedSource {
        frame: u64,
        records: Vec<(ObjectId, Sample)>,
    }

    impl IndexSource for FixedSource {
        fn source_name(&self) -> &'static str {
            "fixed"
        }

        fn committed_frame(&self) -> u64 {
            self.frame
        }

        fn build_indices(&self, out: &mut Vec<BuiltIndex>) {
            out.push(TypedIndex::<ByBucket>::new().build(&self.records));
        }
    }

    fn source(frame: u64, buckets: &[u32]) -> FixedSource {
        FixedSource {
            frame,
            records: buckets
                .iter()
                .enumerate()
                .map(|(i, &bucket)| (ObjectId::new(i as u32, 0), Sample { bucket }))
                .collect(),
        }
    }

    #[test]
    fn test_rebuild_and_lookup() {
        let engine = IndexEngine::new();
        let lock = ReentrantLock::new();
        let _guard = lock.try_lock_for(Duration::ZERO).unwrap();

        let src = source(1, &[7, 3, 7]);
        let stats = engine.rebuild(&lock, 1, [&src as &dyn IndexSource]);
        assert_eq!(stats.tables, 1);
        assert_eq!(stats.keys, 2);
        assert_eq!(stats.entries, 3);

        assert_eq!(engine.find_first::<ByBucket>(&7), ObjectId::new(0, 0));
        assert!(engine.find_first::<ByBucket>(&99).is_none());

        let mut seen = Vec::new();
        engine.for_each_match::<ByBucket>(&7, |id| seen.push(id));
        assert_eq!(seen, vec![ObjectId::new(0, 0), ObjectId::new(2, 0)]);
    }

    #[test]
    fn test_held_snapshot_survives_publish() {
        let engine = IndexEngine::new();
        let lock = ReentrantLock::new();
        let _guard = lock.try_lock_for(Duration::ZERO).unwrap();

        engine.rebuild(&lock, 1, [&source(1, &[1]) as &dyn IndexSource]);
        let old = engine.snapshot();

        engine.rebuild(&lock, 2, [&source(2, &[2]) as &dyn IndexSource]);
        assert_eq!(old.frame(), 1);
        assert_eq!(old.table::<ByBucket>().first(&1), ObjectId::new(0, 0));
        assert!(engine.find_first::<ByBucket>(&1).is_none());
        assert_eq!(engine.stats().frame, 2);
    }

    #[test]
    #[should_panic(expected = "structural lock not held")]
    fn test_rebuild_requires_lock() {
        let engine = IndexEngine::new();
        let lock = ReentrantLock::new();
        engine.rebuild(&lock, 1, [&source(1, &[1]) as &dyn IndexSource]);
    }

    #[test]
    #[should_panic(expected = "committed at frame 1")]
    fn test_rebuild_against_stale_frame_panics() {
        let engine = IndexEngine::new();
        let lock = ReentrantLock::new();
        let _guard = lock.try_lock_for(Duration::ZERO).unwrap();
        engine.rebuild(&lock, 2, [&source(1, &[1]) as &dyn IndexSource]);
    }

    #[test]
    #[should_panic(expected = "is not registered")]
    fn test_unregistered_index_panics() {
        let engine = IndexEngine::new();
        let _ = engine.find_first::<Unregistered>(&0);
    }
}
