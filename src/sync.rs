//! Defines [`FileLock`] --- the per-file readers-writer lock with
//! bounded wait.

use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

use crate::error::{Error, Result};

/// How long a lock acquisition is willing to wait.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum LockWait {
    /// Wait indefinitely.
    Block,
    /// Fail fast with [`Error::WouldBlock`] if the lock is contended.
    Immediate,
    /// Wait up to a wall-clock deadline, then fail with
    /// [`Error::WouldBlock`].
    Bounded(Duration),
}

impl Default for LockWait {
    fn default() -> Self {
        LockWait::Block
    }
}

#[derive(Debug, Default)]
struct LockState {
    readers: usize,
    writer: bool,
}

/// Non-fair readers-writer lock serving multiple readers or at most
/// one writer.
///
/// The lock is intentionally non-fair: a steady stream of readers can
/// starve a writer. Callers are expected to bound their holds with
/// [`LockWait::Bounded`] in latency-sensitive paths.
#[derive(Debug, Default)]
pub struct FileLock {
    state: Mutex<LockState>,
    changed: Condvar,
}

impl FileLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire shared access, waiting until no writer is held.
    pub fn acquire_read(&self, wait: LockWait) -> Result<()> {
        let mut state = self.state.lock().expect("lock mutex poisoned");
        state = self.wait_until(state, wait, |state| !state.writer)?;
        state.readers += 1;
        Ok(())
    }

    /// Acquire exclusive access, waiting until no reader and no writer
    /// is held.
    pub fn acquire_write(&self, wait: LockWait) -> Result<()> {
        let mut state = self.state.lock().expect("lock mutex poisoned");
        state = self.wait_until(state, wait, |state| !state.writer && state.readers == 0)?;
        state.writer = true;
        Ok(())
    }

    /// Drop a shared hold, waking waiters when the last reader leaves.
    pub fn release_read(&self) {
        let mut state = self.state.lock().expect("lock mutex poisoned");
        debug_assert!(state.readers > 0, "release_read without a read hold");
        state.readers = state.readers.saturating_sub(1);
        if state.readers == 0 {
            self.changed.notify_all();
        }
    }

    /// Drop the exclusive hold and wake waiters.
    pub fn release_write(&self) {
        let mut state = self.state.lock().expect("lock mutex poisoned");
        debug_assert!(state.writer, "release_write without a write hold");
        state.writer = false;
        self.changed.notify_all();
    }

    /// Snapshot query: does any hold exist right now?
    pub fn is_locked(&self) -> bool {
        let state = self.state.lock().expect("lock mutex poisoned");
        state.writer || state.readers > 0
    }

    fn wait_until<'a>(
        &self,
        mut state: std::sync::MutexGuard<'a, LockState>,
        wait: LockWait,
        ready: impl Fn(&LockState) -> bool,
    ) -> Result<std::sync::MutexGuard<'a, LockState>> {
        match wait {
            LockWait::Block => {
                while !ready(&state) {
                    state = self.changed.wait(state).expect("lock mutex poisoned");
                }
                Ok(state)
            }
            LockWait::Immediate => {
                if ready(&state) {
                    Ok(state)
                } else {
                    Err(Error::would_block("lock is held"))
                }
            }
            LockWait::Bounded(timeout) => {
                let deadline = Instant::now() + timeout;
                while !ready(&state) {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(Error::would_block("timed out waiting for lock"));
                    }
                    let (next, _timed_out) = self
                        .changed
                        .wait_timeout(state, deadline - now)
                        .expect("lock mutex poisoned");
                    state = next;
                }
                Ok(state)
            }
        }
    }
}
