//! # Reentrant Timeout Lock
//!
//! A lock the owning thread may take again without deadlocking, with a
//! bounded wait for everyone else.
//!
//! ## Semantics
//!
//! - Free lock: caller becomes the owner, hold count 1.
//! - Owner re-acquires: hold count increments, returns immediately.
//! - Other thread: waits until the lock is free or the timeout elapses.
//!   A zero timeout tries exactly once.
//! - Release by a thread that does not hold the lock is fatal.

use parking_lot::{Condvar, Mutex};
use std::marker::PhantomData;
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};

#[derive(Debug, Default)]
struct LockState {
    owner: Option<ThreadId>,
    holds: u32,
}

/// Reentrant mutual exclusion with timeout.
#[derive(Debug, Default)]
pub struct ReentrantLock {
    state: Mutex<LockState>,
    released: Condvar,
}

impl ReentrantLock {
    /// Creates an unlocked lock.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquires the lock, waiting at most `timeout`.
    ///
    /// Returns `false` if another thread still holds the lock when the
    /// timeout elapses. Every `true` must be paired with one [`release`].
    ///
    /// [`release`]: Self::release
    #[must_use]
    pub fn acquire(&self, timeout: Duration) -> bool {
        let me = thread::current().id();
        let deadline = Instant::now().checked_add(timeout);
        let mut state = self.state.lock();

        loop {
            match state.owner {
                None => {
                    state.owner = Some(me);
                    state.holds = 1;
                    return true;
                }
                Some(owner) if owner == me => {
                    state.holds += 1;
                    return true;
                }
                Some(_) => {}
            }

            match deadline {
                Some(deadline) => {
                    if Instant::now() >= deadline {
                        return false;
                    }
                    self.released.wait_until(&mut state, deadline);
                }
                None => self.released.wait(&mut state),
            }
        }
    }

    /// Releases one hold.
    ///
    /// # Panics
    ///
    /// Panics if the calling thread does not hold the lock.
    pub fn release(&self) {
        let me = thread::current().id();
        let mut state = self.state.lock();

        assert!(
            state.owner == Some(me),
            "ReentrantLock released by a thread that does not hold it"
        );

        state.holds -= 1;
        if state.holds == 0 {
            state.owner = None;
            drop(state);
            self.released.notify_one();
        }
    }

    /// Acquires the lock and returns a guard that releases it on drop.
    #[must_use]
    pub fn try_lock_for(&self, timeout: Duration) -> Option<ReentrantGuard<'_>> {
        self.acquire(timeout).then(|| ReentrantGuard {
            lock: self,
            _not_send: PhantomData,
        })
    }

    /// True if the calling thread currently holds the lock.
    #[must_use]
    pub fn is_held_by_current_thread(&self) -> bool {
        self.state.lock().owner == Some(thread::current().id())
    }

    /// Number of outstanding holds (0 when unlocked).
    #[must_use]
    pub fn hold_count(&self) -> u32 {
        self.state.lock().holds
    }
}

/// RAII hold on a [`ReentrantLock`].
///
/// Not `Send`: the hold belongs to the thread that took it.
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct ReentrantGuard<'a> {
    lock: &'a ReentrantLock,
    _not_send: PhantomData<*const ()>,
}

impl Drop for ReentrantGuard<'_> {
    fn drop(&mut self) {
        self.lock.release();
    }
}
