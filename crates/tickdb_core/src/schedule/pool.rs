//! # Worker Pool
//!
//! Fixed set of persistent threads fed from one job channel.
//!
//! ```text
//! orchestrator --jobs--> [crossbeam channel] --> worker 0..N
//!      ^                                            |
//!      +-------------- completion channel ----------+
//! ```
//!
//! [`WorkerPool::scatter`] is the tick barrier: it returns only after every
//! job it submitted has finished. A panicking job does not take its worker
//! down; the payload is handed back to the caller.

use crossbeam_channel::{Receiver, Sender};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::thread::{self, JoinHandle};
use tracing::{debug, warn};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Persistent worker threads.
pub struct WorkerPool {
    sender: Option<Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawns `threads` workers named `tickdb-worker-<n>`.
    ///
    /// # Errors
    ///
    /// The OS error if a thread cannot be spawned.
    ///
    /// # Panics
    ///
    /// Panics if `threads` is zero.
    pub fn new(threads: usize) -> std::io::Result<Self> {
        assert!(threads > 0, "Worker pool needs at least one thread");

        let (sender, receiver) = crossbeam_channel::unbounded::<Job>();
        let mut workers = Vec::with_capacity(threads);
        for n in 0..threads {
            let receiver = receiver.clone();
            let handle = thread::Builder::new()
                .name(format!("tickdb-worker-{n}"))
                .spawn(move || worker_loop(&receiver))?;
            workers.push(handle);
        }

        debug!(threads, "Worker pool started");
        Ok(Self {
            sender: Some(sender),
            workers,
        })
    }

    /// Number of worker threads.
    #[must_use]
    pub fn threads(&self) -> usize {
        self.workers.len()
    }

    /// Runs every job on the pool and waits for all of them.
    ///
    /// Results come back in submission order. A job that panicked yields
    /// `Err` with its payload.
    pub fn scatter<T, F>(&self, jobs: Vec<F>) -> Vec<thread::Result<T>>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        let count = jobs.len();
        let (done_tx, done_rx) = crossbeam_channel::bounded(count);

        for (slot, job) in jobs.into_iter().enumerate() {
            let done_tx = done_tx.clone();
            let wrapped: Job = Box::new(move || {
                let result = panic::catch_unwind(AssertUnwindSafe(job));
                let _ = done_tx.send((slot, result));
            });
            self.submit(wrapped);
        }
        drop(done_tx);

        let mut results: Vec<Option<thread::Result<T>>> = (0..count).map(|_| None).collect();
        for (slot, result) in done_rx.iter().take(count) {
            results[slot] = Some(result);
        }

        results
            .into_iter()
            .map(|r| {
                r.unwrap_or_else(|| {
                    let payload: Box<dyn Any + Send> =
                        Box::new("worker pool shut down before job completed");
                    Err(payload)
                })
            })
            .collect()
    }

    fn submit(&self, job: Job) {
        let delivered = self
            .sender
            .as_ref()
            .is_some_and(|sender| sender.send(job).is_ok());
        if !delivered {
            warn!("Worker pool is closed, job dropped");
        }
    }
}

fn worker_loop(jobs: &Receiver<Job>) {
    while let Ok(job) = jobs.recv() {
        job();
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        // Closing the channel ends every worker loop.
        self.sender.take();
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_scatter_runs_everything() {
        let pool = WorkerPool::new(3).unwrap();
        let counter = Arc::new(AtomicUsize::new(0));

        let jobs: Vec<_> = (0..50)
            .map(|i| {
                let counter = Arc::clone(&counter);
                move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                    i * 2
                }
            })
            .collect();

        let results = pool.scatter(jobs);
        assert_eq!(counter.load(Ordering::SeqCst), 50);
        let values: Vec<usize> = results.into_iter().map(Result::unwrap).collect();
        assert_eq!(values, (0..50).map(|i| i * 2).collect::<Vec<_>>());
    }

    #[test]
    fn test_uses_multiple_threads() {
        let pool = WorkerPool::new(4).unwrap();
        let jobs: Vec<_> = (0..64)
            .map(|_| {
                || {
                    thread::sleep(std::time::Duration::from_millis(1));
                    thread::current().name().map(str::to_string)
                }
            })
            .collect();

        let names: HashSet<_> = pool.scatter(jobs).into_iter().map(Result::unwrap).collect();
        assert!(names.len() > 1);
        assert!(names.iter().all(|n| n.as_deref().is_some_and(|n| n.starts_with("tickdb-worker-"))));
    }

    #[test]
    fn test_panic_is_returned() {
        let pool = WorkerPool::new(2).unwrap();
        let results = pool.scatter(vec![
            Box::new(|| 1) as Box<dyn FnOnce() -> i32 + Send>,
            Box::new(|| -> i32 { panic!("boom") }),
            Box::new(|| 3),
        ]);

        assert_eq!(*results[0].as_ref().unwrap(), 1);
        assert!(results[1].is_err());
        assert_eq!(*results[2].as_ref().unwrap(), 3);

        // Worker survived the panic.
        let again = pool.scatter(vec![|| 7]);
        assert_eq!(*again[0].as_ref().unwrap(), 7);
    }

    #[test]
    fn test_empty_scatter() {
        let pool = WorkerPool::new(1).unwrap();
        let results: Vec<thread::Result<()>> = pool.scatter(Vec::<fn()>::new());
        assert!(results.is_empty());
    }
}
