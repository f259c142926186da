//! Single-slot, last-write-wins handoff between a session thread and its
//! consumer.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Shared `Option<T>`: [`publish`](Self::publish) overwrites, [`take`](Self::take)
/// empties. Clones share the same slot.
#[derive(Debug)]
pub struct LatestSlot<T> {
    inner: Arc<Mutex<Option<T>>>,
}

impl<T> Clone for LatestSlot<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Default for LatestSlot<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> LatestSlot<T> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(None)),
        }
    }

    // A panicking producer cannot leave a half-written `Option`.
    fn lock(&self) -> MutexGuard<'_, Option<T>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store `value`, returning the unread value it replaced.
    pub fn publish(&self, value: T) -> Option<T> {
        self.lock().replace(value)
    }

    /// Remove and return the latest value.
    pub fn take(&self) -> Option<T> {
        self.lock().take()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_none()
    }
}

impl<T: Clone> LatestSlot<T> {
    /// Copy of the latest value, leaving it in place.
    pub fn peek(&self) -> Option<T> {
        self.lock().clone()
    }
}
