//! # Database Facade
//!
//! Owns the stores, the worker pool and the storage directory, and drives
//! the tick cycle.
//!
//! ## Frame Cycle
//!
//! ```text
//! loop {
//!     db.update_tick()?;   // Idle -> Ticking -> Applying
//!     db.end_frame()?;     // swap buffers, rebuild indices, Applying -> Idle
//! }
//! db.graceful_shutdown()?;
//! ```

use super::shared::Shared;
use super::{Registry, TickContext};
use crate::config::DatabaseConfig;
use crate::error::{DatabaseError, DatabaseResult};
use crate::index::{Index, IndexStats};
use crate::schedule::{Phase, TickStats, WorkerPool};
use crate::store::{ObjectId, Record, StoreStats};
use parking_lot::Mutex;
use std::panic;
use std::path::Path;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;
use tickdb_persist::{FlushReport, StorageDir};
use tracing::{debug, error, info, warn};

/// A tick-synchronized object database.
pub struct Database {
    shared: Arc<Shared>,
    pool: WorkerPool,
    storage: StorageDir,
    config: DatabaseConfig,
    shutdown_report: Mutex<Option<Vec<FlushReport>>>,
}

impl Database {
    /// Opens a database over the configured storage directory.
    ///
    /// With `storage.wipe` set, existing snapshots of every registered type
    /// are deleted. Otherwise each type's snapshot is loaded whole, objects
    /// come back under their previous identifiers, and `on_allocated` and
    /// `on_spun_up` run for each of them.
    ///
    /// # Errors
    ///
    /// Invalid configuration, a missing directory without
    /// `create_if_absent`, unreadable or corrupt snapshots, or a failure to
    /// spawn worker threads.
    pub fn open(config: DatabaseConfig, registry: Registry) -> DatabaseResult<Self> {
        config.validate()?;
        let storage = StorageDir::open(&config.storage.directory, config.storage.create_if_absent)?;
        debug!(keys = ?registry.persist_keys(), "Opening storage");
        let types = registry.instantiate(&config);

        let mut images = Vec::with_capacity(types.len());
        for entry in &types {
            if config.storage.wipe {
                storage.delete(entry.persist_key())?;
                images.push(None);
            } else {
                images.push(storage.load(entry.persist_key(), entry.record_size())?);
            }
        }

        let shared = Arc::new(Shared::new(types, config.lock_timeout()));
        let restored = shared.restore(images)?;
        let pool = WorkerPool::new(config.workers).map_err(DatabaseError::WorkerSpawn)?;

        info!(
            path = %storage.root().display(),
            types = shared.types.len(),
            restored,
            workers = pool.threads(),
            wiped = config.storage.wipe,
            "Database opened"
        );

        Ok(Self {
            shared,
            pool,
            storage,
            config,
            shutdown_report: Mutex::new(None),
        })
    }

    /// Runs every update callback once and applies the structural
    /// mutations they queued.
    ///
    /// Callbacks see the committed state of the last completed frame. The
    /// tick's writes become visible after [`end_frame`](Self::end_frame).
    ///
    /// # Errors
    ///
    /// [`DatabaseError::ShuttingDown`] once graceful shutdown has begun,
    /// [`DatabaseError::LockTimeout`] if the structural lock stays busy.
    ///
    /// # Panics
    ///
    /// Panics if the previous tick has not been ended, if an update
    /// callback panicked, or if a queued destroy names a non-live object.
    pub fn update_tick(&self) -> DatabaseResult<TickStats> {
        let shared = &self.shared;
        {
            let _guard = shared.lock_for("update_tick")?;
            if shared.shutting_down.load(Ordering::Acquire) {
                return Err(DatabaseError::ShuttingDown);
            }
            shared.phase.transition(Phase::Idle, Phase::Ticking, "update_tick");
        }

        let mut stats = TickStats {
            frame: shared.frame(),
            ..TickStats::default()
        };

        let update_start = Instant::now();
        let mut jobs = Vec::new();
        for (type_index, entry) in shared.types.iter().enumerate() {
            if !entry.has_update() {
                continue;
            }
            let ids = entry.live_ids();
            stats.updated += ids.len();
            for chunk in ids.chunks(self.config.work_unit_size) {
                let worker_shared = Arc::clone(&self.shared);
                let unit = chunk.to_vec();
                jobs.push(move || {
                    let ctx = TickContext::new(&worker_shared);
                    worker_shared.types[type_index].run_update(&unit, &ctx);
                });
            }
        }
        stats.work_units = jobs.len();

        let results = self.pool.scatter(jobs);
        stats.update_us = elapsed_us(update_start);
        if let Some(payload) = results.into_iter().find_map(Result::err) {
            error!(frame = stats.frame, "Update callback panicked");
            panic::resume_unwind(payload);
        }

        shared.phase.transition(Phase::Ticking, Phase::Applying, "update_tick");
        let apply_start = Instant::now();
        let counts = {
            let _guard = shared.lock_for("update_tick")?;
            shared.apply_pending()
        };
        stats.creates = counts.creates;
        stats.destroys = counts.destroys;
        stats.apply_us = elapsed_us(apply_start);

        debug!(
            frame = stats.frame,
            updated = stats.updated,
            work_units = stats.work_units,
            creates = stats.creates,
            destroys = stats.destroys,
            update_us = stats.update_us,
            apply_us = stats.apply_us,
            "Tick complete"
        );
        Ok(stats)
    }

    /// Publishes the tick: swaps buffers, rebuilds indices and advances the
    /// frame counter. Returns the new frame number.
    ///
    /// # Errors
    ///
    /// [`DatabaseError::LockTimeout`] if the structural lock stays busy.
    ///
    /// # Panics
    ///
    /// Panics if no [`update_tick`](Self::update_tick) preceded this call.
    pub fn end_frame(&self) -> DatabaseResult<u64> {
        let shared = &self.shared;
        let _guard = shared.lock_for("end_frame")?;

        let phase = shared.phase.get();
        assert!(
            phase == Phase::Applying,
            "end_frame called without a completed update_tick (database is {phase})"
        );

        let late = shared.apply_pending();
        let next = shared.frame() + 1;
        let synced: usize = shared.types.iter().map(|t| t.swap_buffers(next)).sum();
        shared.set_frame(next);
        let index_stats = shared.rebuild_indices(next)?;
        shared.phase.set(Phase::Idle);

        debug!(
            frame = next,
            synced,
            late_creates = late.creates,
            late_destroys = late.destroys,
            index_entries = index_stats.entries,
            "Frame ended"
        );
        Ok(next)
    }

    /// Stops accepting ticks and writes every type's committed state to
    /// disk. Later calls return the first call's report.
    ///
    /// # Errors
    ///
    /// [`DatabaseError::LockTimeout`] or any storage failure. On failure
    /// nothing is recorded and the call may be retried.
    pub fn graceful_shutdown(&self) -> DatabaseResult<Vec<FlushReport>> {
        let mut report = self.shutdown_report.lock();
        if let Some(done) = report.as_ref() {
            debug!("Graceful shutdown already complete");
            return Ok(done.clone());
        }

        let shared = &self.shared;
        let _guard = shared.lock_for("graceful_shutdown")?;
        shared.shutting_down.store(true, Ordering::Release);

        let phase = shared.phase.get();
        if phase != Phase::Idle {
            warn!(%phase, "Shutting down mid-frame, the open tick is not persisted");
        }

        let mut flushed = Vec::with_capacity(shared.types.len());
        for entry in &shared.types {
            flushed.push(self.storage.store(entry.persist_key(), &entry.to_image())?);
        }

        info!(
            types = flushed.len(),
            records = flushed.iter().map(|r| r.records).sum::<usize>(),
            bytes = flushed.iter().map(|r| r.bytes).sum::<usize>(),
            frame = shared.frame(),
            "Graceful shutdown complete"
        );
        *report = Some(flushed.clone());
        Ok(flushed)
    }

    /// Removes every registered type's snapshot file. Returns how many
    /// existed.
    ///
    /// # Errors
    ///
    /// I/O failures other than a file being absent.
    pub fn delete_files(&self) -> DatabaseResult<usize> {
        let mut deleted = 0;
        for entry in &self.shared.types {
            if self.storage.delete(entry.persist_key())? {
                deleted += 1;
            }
        }
        Ok(deleted)
    }

    /// Creates an object and returns its identifier.
    ///
    /// Between frames the object exists on return. During a tick it is
    /// materialized in the apply phase.
    ///
    /// # Panics
    ///
    /// Panics if `R` is not registered or its slot ceiling is reached.
    pub fn create<R: Record>(&self, record: R) -> ObjectId {
        self.shared.create(record)
    }

    /// Destroys an object.
    ///
    /// # Panics
    ///
    /// Panics when the destroy is applied if `id` is not live.
    pub fn destroy<R: Record>(&self, id: ObjectId) {
        self.shared.destroy::<R>(id);
    }

    /// Writes the working copy. Returns `false` if `id` is not live.
    #[must_use = "a false return means the object no longer exists"]
    pub fn write<R: Record>(&self, id: ObjectId, record: R) -> bool {
        self.shared.write(id, record)
    }

    /// Reads the committed copy.
    #[must_use]
    pub fn read_committed<R: Record>(&self, id: ObjectId) -> Option<R> {
        self.shared.read_committed(id)
    }

    /// First object under `key`, or [`ObjectId::NONE`].
    #[must_use]
    pub fn find_by_idx<I: Index>(&self, key: &I::Key) -> ObjectId {
        self.shared.find_by_idx::<I>(key)
    }

    /// Visits every object under `key`, all from one snapshot.
    pub fn foreach_by_idx<I: Index>(&self, key: &I::Key, visit: impl FnMut(ObjectId)) {
        self.shared.foreach_by_idx::<I>(key, visit);
    }

    /// Frames completed since open.
    #[must_use]
    pub fn frame(&self) -> u64 {
        self.shared.frame()
    }

    /// Current scheduler phase.
    #[must_use]
    pub fn phase(&self) -> Phase {
        self.shared.phase.get()
    }

    /// True if `id` is a live `R`.
    #[must_use]
    pub fn is_live<R: Record>(&self, id: ObjectId) -> bool {
        self.shared.entry::<R>().table.is_live(id)
    }

    /// Live `R` identifiers in slot order, as of this call.
    #[must_use]
    pub fn live_ids<R: Record>(&self) -> Vec<ObjectId> {
        self.shared.entry::<R>().table.live_ids()
    }

    /// `R` objects written since the last `end_frame`.
    #[must_use]
    pub fn dirty_ids<R: Record>(&self) -> Vec<ObjectId> {
        self.shared.entry::<R>().table.dirty_ids()
    }

    /// Occupancy of the `R` store.
    #[must_use]
    pub fn store_stats<R: Record>(&self) -> StoreStats {
        self.shared.entry::<R>().table.stats()
    }

    /// Figures of the published index snapshot.
    #[must_use]
    pub fn index_stats(&self) -> IndexStats {
        self.shared.indices.stats()
    }

    /// Worker threads.
    #[must_use]
    pub fn workers(&self) -> usize {
        self.pool.threads()
    }

    /// Configuration the database was opened with.
    #[must_use]
    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    /// Storage directory.
    #[must_use]
    pub fn storage_path(&self) -> &Path {
        self.storage.root()
    }
}

impl Drop for Database {
    fn drop(&mut self) {
        if self.shutdown_report.get_mut().is_none() {
            debug!(frame = self.shared.frame(), "Database dropped without graceful shutdown");
        }
    }
}

fn elapsed_us(since: Instant) -> u64 {
    u64::try_from(since.elapsed().as_micros()).unwrap_or(u64::MAX)
}
