//! End-to-end behaviour of the database facade.

use bytemuck::{Pod, Zeroable};
use parking_lot::Mutex;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tickdb_core::{
    Database, DatabaseConfig, DatabaseError, Index, ObjectId, Phase, Record, Registry,
    TypeDescriptor,
};
use tickdb_persist::PersistError;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
struct Counter {
    value: u64,
    bucket: u32,
    _pad: u32,
}

impl Counter {
    fn new(bucket: u32) -> Self {
        Self {
            bucket,
            ..Self::default()
        }
    }
}

impl Record for Counter {
    const TYPE_ID: u16 = 1;
    const PERSIST_KEY: &'static str = "counters";
}

struct CounterByBucket;

impl Index for CounterByBucket {
    type Record = Counter;
    type Key = u32;

    fn extract(_id: ObjectId, counter: &Counter) -> u32 {
        counter.bucket
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
struct Watcher {
    target: ObjectId,
    seen: u64,
}

impl Record for Watcher {
    const TYPE_ID: u16 = 2;
    const PERSIST_KEY: &'static str = "watchers";
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
struct Mortal {
    ttl: u32,
    destroys_per_tick: u32,
}

impl Record for Mortal {
    const TYPE_ID: u16 = 3;
    const PERSIST_KEY: &'static str = "mortals";
}

#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
#[repr(C)]
struct Unregistered {
    _value: u32,
}

impl Record for Unregistered {
    const TYPE_ID: u16 = 99;
    const PERSIST_KEY: &'static str = "unregistered";
}

#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
#[repr(C)]
struct WideCounter {
    _value: u64,
    _extra: u64,
    _more: u64,
}

impl Record for WideCounter {
    const TYPE_ID: u16 = 1;
    const PERSIST_KEY: &'static str = "counters";
}

fn counter_descriptor() -> TypeDescriptor<Counter> {
    TypeDescriptor::<Counter>::new()
        .on_update(|id, ctx| {
            if let Some(mut counter) = ctx.read_committed::<Counter>(id) {
                counter.value += 1;
                assert!(ctx.write(id, counter));
            }
        })
        .with_index::<CounterByBucket>()
}

fn registry() -> Registry {
    let mut registry = Registry::new();
    registry.register(counter_descriptor()).unwrap();
    registry
        .register(TypeDescriptor::<Watcher>::new().on_update(|id, ctx| {
            if let Some(mut watcher) = ctx.read_committed::<Watcher>(id) {
                if let Some(target) = ctx.read_committed::<Counter>(watcher.target) {
                    watcher.seen = target.value;
                    assert!(ctx.write(id, watcher));
                }
            }
        }))
        .unwrap();
    registry
        .register(TypeDescriptor::<Mortal>::new().on_update(|id, ctx| {
            if let Some(mut mortal) = ctx.read_committed::<Mortal>(id) {
                if mortal.ttl == 0 {
                    for _ in 0..mortal.destroys_per_tick.max(1) {
                        ctx.destroy::<Mortal>(id);
                    }
                } else {
                    mortal.ttl -= 1;
                    assert!(ctx.write(id, mortal));
                }
            }
        }))
        .unwrap();
    registry
}

fn config(dir: &Path, wipe: bool) -> DatabaseConfig {
    let mut config = DatabaseConfig::ephemeral(dir);
    config.storage.wipe = wipe;
    config
}

fn open(dir: &Path, wipe: bool) -> Database {
    Database::open(config(dir, wipe), registry()).unwrap()
}

fn run_frame(db: &Database) {
    db.update_tick().unwrap();
    db.end_frame().unwrap();
}

#[test]
fn test_idle_create_is_immediately_readable() {
    let tmp = tempfile::tempdir().unwrap();
    let db = open(tmp.path(), true);

    let id = db.create(Counter::new(1));
    assert!(db.is_live::<Counter>(id));
    assert_eq!(db.read_committed::<Counter>(id), Some(Counter::new(1)));
    assert_eq!(db.phase(), Phase::Idle);
}

#[test]
fn test_open_reports_configuration() {
    let tmp = tempfile::tempdir().unwrap();
    let db = open(tmp.path(), true);

    assert_eq!(db.workers(), 2);
    assert_eq!(db.storage_path(), tmp.path());
    assert_eq!(db.config(), &config(tmp.path(), true));
}

#[test]
fn test_write_visible_after_end_frame() {
    let tmp = tempfile::tempdir().unwrap();
    let db = open(tmp.path(), true);
    let id = db.create(Counter::new(1));

    assert!(db.write(id, Counter { value: 7, ..Counter::new(1) }));
    assert_eq!(db.read_committed::<Counter>(id).unwrap().value, 0);
    assert_eq!(db.dirty_ids::<Counter>(), vec![id]);

    db.update_tick().unwrap();
    db.end_frame().unwrap();
    // Tick incremented from the committed 0, overwriting the manual write.
    assert_eq!(db.read_committed::<Counter>(id).unwrap().value, 1);
}

#[test]
fn test_every_object_updated_once_per_tick() {
    let tmp = tempfile::tempdir().unwrap();
    let db = open(tmp.path(), true);
    let ids: Vec<_> = (0..100).map(|i| db.create(Counter::new(i))).collect();

    let stats = db.update_tick().unwrap();
    assert_eq!(stats.updated, 100);
    assert_eq!(stats.work_units, 7);
    assert_eq!(stats.frame, 0);
    assert_eq!(db.phase(), Phase::Applying);

    assert_eq!(db.end_frame().unwrap(), 1);
    run_frame(&db);

    for id in ids {
        assert_eq!(db.read_committed::<Counter>(id).unwrap().value, 2);
    }
    assert_eq!(db.frame(), 2);
}

#[test]
fn test_reads_see_previous_frame() {
    let tmp = tempfile::tempdir().unwrap();
    let db = open(tmp.path(), true);
    let counter = db.create(Counter::new(0));
    let watcher = db.create(Watcher {
        target: counter,
        seen: u64::MAX,
    });

    run_frame(&db);
    assert_eq!(db.read_committed::<Counter>(counter).unwrap().value, 1);
    assert_eq!(db.read_committed::<Watcher>(watcher).unwrap().seen, 0);

    run_frame(&db);
    assert_eq!(db.read_committed::<Counter>(counter).unwrap().value, 2);
    assert_eq!(db.read_committed::<Watcher>(watcher).unwrap().seen, 1);
}

#[test]
fn test_unwritten_objects_keep_state_across_swaps() {
    let tmp = tempfile::tempdir().unwrap();
    let db = open(tmp.path(), true);
    let mortal = db.create(Mortal {
        ttl: 1,
        destroys_per_tick: 1,
    });

    run_frame(&db);
    assert_eq!(db.read_committed::<Mortal>(mortal).unwrap().ttl, 0);

    // Nothing writes the watcher, so its record must survive every swap.
    let watcher = db.create(Watcher {
        target: ObjectId::NONE,
        seen: 42,
    });
    for _ in 0..3 {
        run_frame(&db);
        assert_eq!(db.read_committed::<Watcher>(watcher).unwrap().seen, 42);
    }
}

#[test]
fn test_destroy_during_tick_is_deferred_and_deduplicated() {
    let tmp = tempfile::tempdir().unwrap();
    let db = open(tmp.path(), true);
    let mortal = db.create(Mortal {
        ttl: 0,
        destroys_per_tick: 3,
    });

    let stats = db.update_tick().unwrap();
    assert_eq!(stats.destroys, 1);
    db.end_frame().unwrap();

    assert_eq!(db.read_committed::<Mortal>(mortal), None);
    assert!(!db.write(mortal, Mortal::default()));
    assert_eq!(db.store_stats::<Mortal>().live, 0);
}

#[test]
fn test_create_during_tick_returns_id_before_materializing() {
    let tmp = tempfile::tempdir().unwrap();
    let created = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&created);

    let mut registry = Registry::new();
    registry
        .register(TypeDescriptor::<Watcher>::new().on_update(move |_id, ctx| {
            let id = ctx.create(Counter::new(5));
            assert!(ctx.read_committed::<Counter>(id).is_none());
            sink.lock().push(id);
        }))
        .unwrap();
    registry.register(TypeDescriptor::<Counter>::new()).unwrap();

    let db = Database::open(config(tmp.path(), true), registry).unwrap();
    db.create(Watcher::default());

    let stats = db.update_tick().unwrap();
    assert_eq!(stats.creates, 1);
    let id = created.lock()[0];
    assert_eq!(db.read_committed::<Counter>(id), Some(Counter::new(5)));
    db.end_frame().unwrap();
}

#[test]
fn test_index_queries_during_tick_see_previous_frame() {
    let tmp = tempfile::tempdir().unwrap();
    let observed = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&observed);

    let mut registry = Registry::new();
    registry
        .register(
            TypeDescriptor::<Counter>::new()
                .on_update(move |id, ctx| {
                    let Some(mut counter) = ctx.read_committed::<Counter>(id) else {
                        return;
                    };
                    let old = counter.bucket;
                    counter.bucket += 1;
                    assert!(ctx.write(id, counter));

                    let mut under_old = Vec::new();
                    ctx.foreach_by_idx::<CounterByBucket>(&old, |found| under_old.push(found));
                    sink.lock().push((
                        id,
                        ctx.find_by_idx::<CounterByBucket>(&old),
                        under_old,
                        ctx.read_committed::<Counter>(id).map(|c| c.bucket),
                    ));
                })
                .with_index::<CounterByBucket>(),
        )
        .unwrap();

    let db = Database::open(config(tmp.path(), true), registry).unwrap();
    let ids: Vec<ObjectId> = (0..4).map(|i| db.create(Counter::new(i * 100))).collect();
    run_frame(&db);
    observed.lock().clear();

    db.update_tick().unwrap();
    {
        let mut seen = observed.lock().clone();
        seen.sort_by_key(|(id, ..)| *id);
        assert_eq!(seen.len(), ids.len());
        for (id, found, under_old, committed) in seen {
            let bucket = db.read_committed::<Counter>(id).unwrap().bucket;
            assert_eq!(found, id);
            assert_eq!(under_old, vec![id]);
            assert_eq!(committed, Some(bucket));
        }
    }

    for (i, &id) in (0u32..).zip(&ids) {
        assert_eq!(db.find_by_idx::<CounterByBucket>(&(i * 100 + 1)), ObjectId::NONE);
        assert_eq!(db.find_by_idx::<CounterByBucket>(&(i * 100)), id);
    }
    db.end_frame().unwrap();

    for (i, &id) in (0u32..).zip(&ids) {
        assert!(db.find_by_idx::<CounterByBucket>(&(i * 100)).is_none());
        assert_eq!(db.find_by_idx::<CounterByBucket>(&(i * 100 + 1)), id);
        assert_eq!(db.read_committed::<Counter>(id).unwrap().bucket, i * 100 + 1);
    }
}

#[test]
fn test_freed_slot_gets_new_generation() {
    let tmp = tempfile::tempdir().unwrap();
    let db = open(tmp.path(), true);

    let first = db.create(Counter::new(0));
    db.destroy::<Counter>(first);
    let second = db.create(Counter::new(0));

    assert_eq!(first.index(), second.index());
    assert_ne!(first, second);
    assert_eq!(db.read_committed::<Counter>(first), None);
    assert!(db.read_committed::<Counter>(second).is_some());
}

#[test]
fn test_index_lookups_follow_frames() {
    let tmp = tempfile::tempdir().unwrap();
    let db = open(tmp.path(), true);
    let a = db.create(Counter::new(4));
    let b = db.create(Counter::new(4));
    let c = db.create(Counter::new(9));

    // Not indexed until the frame boundary.
    assert!(db.find_by_idx::<CounterByBucket>(&4).is_none());

    run_frame(&db);
    assert_eq!(db.find_by_idx::<CounterByBucket>(&4), a);
    assert_eq!(db.find_by_idx::<CounterByBucket>(&9), c);
    assert!(db.find_by_idx::<CounterByBucket>(&5).is_none());

    let mut matches = Vec::new();
    db.foreach_by_idx::<CounterByBucket>(&4, |id| matches.push(id));
    assert_eq!(matches, vec![a, b]);

    let stats = db.index_stats();
    assert_eq!(stats.frame, 1);
    assert_eq!(stats.entries, 3);
    assert_eq!(stats.keys, 2);
}

#[test]
fn test_lifecycle_callback_order() {
    let tmp = tempfile::tempdir().unwrap();
    let log = Arc::new(Mutex::new(Vec::new()));

    let (l1, l2, l3, l4) = (
        Arc::clone(&log),
        Arc::clone(&log),
        Arc::clone(&log),
        Arc::clone(&log),
    );
    let mut registry = Registry::new();
    registry
        .register(
            TypeDescriptor::<Counter>::new()
                .on_allocated(move |_, counter, _| {
                    counter.value = 100;
                    l1.lock().push("allocated");
                })
                .on_spun_up(move |_, _, _| l2.lock().push("spun_up"))
                .on_spun_down(move |_, _, _| l3.lock().push("spun_down"))
                .on_freed(move |_, _, _| l4.lock().push("freed")),
        )
        .unwrap();

    let db = Database::open(config(tmp.path(), true), registry).unwrap();
    let id = db.create(Counter::new(0));
    assert_eq!(db.read_committed::<Counter>(id).unwrap().value, 100);
    db.destroy::<Counter>(id);

    assert_eq!(*log.lock(), vec!["allocated", "spun_up", "spun_down", "freed"]);
}

#[test]
fn test_lifecycle_callbacks_can_queue_mutations() {
    let tmp = tempfile::tempdir().unwrap();
    let mut registry = Registry::new();
    registry
        .register(TypeDescriptor::<Mortal>::new().on_freed(|_, _, ctx| {
            ctx.create(Counter::new(77));
        }))
        .unwrap();
    registry.register(TypeDescriptor::<Counter>::new()).unwrap();

    let db = Database::open(config(tmp.path(), true), registry).unwrap();
    let mortal = db.create(Mortal::default());
    db.destroy::<Mortal>(mortal);

    let counters = db.live_ids::<Counter>();
    assert_eq!(counters.len(), 1);
    assert_eq!(db.read_committed::<Counter>(counters[0]).unwrap().bucket, 77);
}

#[test]
fn test_shutdown_and_reload_preserves_ids() {
    let tmp = tempfile::tempdir().unwrap();
    let (kept, destroyed, values) = {
        let db = open(tmp.path(), true);
        let ids: Vec<_> = (0..5).map(|i| db.create(Counter::new(i))).collect();
        run_frame(&db);
        db.destroy::<Counter>(ids[2]);

        let report = db.graceful_shutdown().unwrap();
        let counters = report.iter().find(|r| r.key == "counters").unwrap();
        assert_eq!(counters.records, 4);

        let kept: Vec<_> = ids.iter().copied().filter(|&id| id != ids[2]).collect();
        let values: Vec<_> = kept
            .iter()
            .map(|&id| db.read_committed::<Counter>(id).unwrap())
            .collect();
        (kept, ids[2], values)
    };

    let spun_up = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&spun_up);
    let mut registry = Registry::new();
    registry
        .register(counter_descriptor().on_spun_up(move |_, _, _| {
            counter.fetch_add(1, Ordering::SeqCst);
        }))
        .unwrap();

    let db = Database::open(config(tmp.path(), false), registry).unwrap();
    assert_eq!(spun_up.load(Ordering::SeqCst), 4);
    assert_eq!(db.live_ids::<Counter>(), kept);
    for (id, value) in kept.iter().zip(&values) {
        assert_eq!(db.read_committed::<Counter>(*id).as_ref(), Some(value));
    }

    // Indices are available straight after open.
    assert_eq!(db.find_by_idx::<CounterByBucket>(&0), kept[0]);

    let reused = db.create(Counter::new(0));
    assert_eq!(reused.index(), destroyed.index());
    assert_ne!(reused, destroyed);
}

#[test]
fn test_shutdown_refuses_ticks_and_is_idempotent() {
    let tmp = tempfile::tempdir().unwrap();
    let db = open(tmp.path(), true);
    db.create(Counter::new(0));

    let first = db.graceful_shutdown().unwrap();
    let second = db.graceful_shutdown().unwrap();
    assert_eq!(first, second);

    assert!(matches!(db.update_tick(), Err(DatabaseError::ShuttingDown)));
}

#[test]
fn test_wipe_discards_snapshots() {
    let tmp = tempfile::tempdir().unwrap();
    {
        let db = open(tmp.path(), true);
        db.create(Counter::new(0));
        db.graceful_shutdown().unwrap();
    }
    assert!(tmp.path().join("counters.tdb").exists());

    let db = open(tmp.path(), true);
    assert!(db.live_ids::<Counter>().is_empty());
    assert!(!tmp.path().join("counters.tdb").exists());
}

#[test]
fn test_delete_files_is_idempotent() {
    let tmp = tempfile::tempdir().unwrap();
    let db = open(tmp.path(), true);
    assert_eq!(db.delete_files().unwrap(), 0);

    db.graceful_shutdown().unwrap();
    assert_eq!(db.delete_files().unwrap(), 3);
    assert_eq!(db.delete_files().unwrap(), 0);
}

#[test]
fn test_missing_directory_without_create() {
    let tmp = tempfile::tempdir().unwrap();
    let mut config = config(&tmp.path().join("absent"), false);
    config.storage.create_if_absent = false;

    let result = Database::open(config, registry());
    assert!(matches!(
        result,
        Err(DatabaseError::Persist(PersistError::MissingDirectory(_)))
    ));
}

#[test]
fn test_record_size_mismatch_fails_open() {
    let tmp = tempfile::tempdir().unwrap();
    {
        let db = open(tmp.path(), true);
        db.create(Counter::new(0));
        db.graceful_shutdown().unwrap();
    }

    let mut registry = Registry::new();
    registry.register(TypeDescriptor::<WideCounter>::new()).unwrap();
    let result = Database::open(config(tmp.path(), false), registry);
    assert!(matches!(
        result,
        Err(DatabaseError::Persist(PersistError::RecordSizeMismatch { .. }))
    ));
}

#[test]
fn test_worker_panic_reaches_caller() {
    let tmp = tempfile::tempdir().unwrap();
    let mut registry = Registry::new();
    registry
        .register(TypeDescriptor::<Counter>::new().on_update(|_, _| panic!("update exploded")))
        .unwrap();
    let db = Database::open(config(tmp.path(), true), registry).unwrap();
    db.create(Counter::new(0));

    let result = panic::catch_unwind(AssertUnwindSafe(|| db.update_tick()));
    assert!(result.is_err());
}

#[test]
#[should_panic(expected = "which is not live")]
fn test_destroy_of_stale_id_panics() {
    let tmp = tempfile::tempdir().unwrap();
    let db = open(tmp.path(), true);
    let id = db.create(Counter::new(0));
    db.destroy::<Counter>(id);
    db.destroy::<Counter>(id);
}

#[test]
#[should_panic(expected = "end_frame called without a completed update_tick")]
fn test_end_frame_without_tick_panics() {
    let tmp = tempfile::tempdir().unwrap();
    let db = open(tmp.path(), true);
    let _ = db.end_frame();
}

#[test]
#[should_panic(expected = "update_tick requires phase idle")]
fn test_tick_without_end_frame_panics() {
    let tmp = tempfile::tempdir().unwrap();
    let db = open(tmp.path(), true);
    db.update_tick().unwrap();
    let _ = db.update_tick();
}

#[test]
#[should_panic(expected = "Capacity exhausted")]
fn test_capacity_ceiling_panics() {
    let tmp = tempfile::tempdir().unwrap();
    let mut config = config(tmp.path(), true);
    config.max_objects_per_type = Some(2);
    let db = Database::open(config, registry()).unwrap();
    for _ in 0..3 {
        db.create(Counter::new(0));
    }
}

#[test]
#[should_panic(expected = "is not registered")]
fn test_unregistered_type_panics() {
    let tmp = tempfile::tempdir().unwrap();
    let db = open(tmp.path(), true);
    db.create(Unregistered::default());
}
