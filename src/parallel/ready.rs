//! Readiness latch
//!
//! Counts workers that have finished their setup hook and lets the pool block
//! until all of them have.

use std::sync::{Condvar, Mutex, MutexGuard};

#[derive(Debug, Default)]
struct LatchState {
    ready: usize,
    failures: Vec<(usize, String)>,
}

/// Counting latch released once `expected` workers have signalled
#[derive(Debug, Default)]
pub(crate) struct ReadyLatch {
    state: Mutex<LatchState>,
    cond: Condvar,
}

impl ReadyLatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock latch state with poison recovery
    fn lock_state(&self) -> MutexGuard<'_, LatchState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                tracing::warn!("worker thread panicked while holding readiness latch, recovering");
                poisoned.into_inner()
            }
        }
    }

    pub fn signal_ready(&self) {
        let mut state = self.lock_state();
        state.ready += 1;
        self.cond.notify_all();
    }

    pub fn signal_failed(&self, worker_id: usize, message: String) {
        let mut state = self.lock_state();
        state.ready += 1;
        state.failures.push((worker_id, message));
        self.cond.notify_all();
    }

    /// Block until `expected` workers signalled; returns the first setup failure
    pub fn wait(&self, expected: usize) -> Option<(usize, String)> {
        let mut state = self.lock_state();
        while state.ready < expected {
            state = match self.cond.wait(state) {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
        }
        state.failures.first().cloned()
    }

    pub fn ready_count(&self) -> usize {
        self.lock_state().ready
    }
}

/// Signals the latch exactly once, on drop if nothing was signalled earlier
///
/// Dropping during a panic in `setup` counts as a failed setup, so the
/// barrier never waits on a worker that is already gone.
pub(crate) struct ReadyGuard<'a> {
    latch: &'a ReadyLatch,
    worker_id: usize,
    signalled: bool,
}

impl<'a> ReadyGuard<'a> {
    pub fn new(latch: &'a ReadyLatch, worker_id: usize) -> Self {
        Self {
            latch,
            worker_id,
            signalled: false,
        }
    }

    pub fn ready(mut self) {
        self.signalled = true;
        self.latch.signal_ready();
    }

    pub fn failed(mut self, message: String) {
        self.signalled = true;
        self.latch.signal_failed(self.worker_id, message);
    }
}

impl Drop for ReadyGuard<'_> {
    fn drop(&mut self) {
        if !self.signalled {
            self.latch
                .signal_failed(self.worker_id, "setup panicked".to_string());
        }
    }
}
