//! Bounded-wait exclusive lock.
//!
//! Submissions and document numbering each hold a process-wide lock. Waiting
//! is bounded: a caller that cannot acquire the lock in time gets a
//! [`LockTimeout`] instead of queueing forever. The guard releases the lock
//! on drop, so every exit path (including `?` and panics) unlocks.

use std::time::Duration;

use parking_lot::{Mutex, MutexGuard};
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{name} lock not acquired within {waited:?}; please retry")]
pub struct LockTimeout {
    pub name: &'static str,
    pub waited: Duration,
}

#[derive(Debug)]
pub struct BoundedLock {
    name: &'static str,
    wait: Duration,
    inner: Mutex<()>,
}

impl BoundedLock {
    pub fn new(name: &'static str, wait: Duration) -> Self {
        Self {
            name,
            wait,
            inner: Mutex::new(()),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn wait(&self) -> Duration {
        self.wait
    }

    /// Acquire with the configured wait.
    pub fn acquire(&self) -> Result<LockGuard<'_>, LockTimeout> {
        self.acquire_within(self.wait)
    }

    pub fn acquire_within(&self, wait: Duration) -> Result<LockGuard<'_>, LockTimeout> {
        match self.inner.try_lock_for(wait) {
            Some(guard) => Ok(LockGuard { _guard: guard }),
            None => {
                warn!(lock = self.name, ?wait, "lock wait timed out");
                Err(LockTimeout {
                    name: self.name,
                    waited: wait,
                })
            }
        }
    }
}

/// Holds a [`BoundedLock`] until dropped.
#[derive(Debug)]
pub struct LockGuard<'a> {
    _guard: MutexGuard<'a, ()>,
}
