//! Helpers for observing disposal in tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::Destroyer;

/// Records the labels of [`Tracked`] values in the order they are dropped.
#[derive(Debug, Default)]
pub struct DropLog {
    entries: Mutex<Vec<&'static str>>,
}

impl DropLog {
    /// Create an empty log.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Create a value that appends `label` to this log when dropped.
    #[must_use]
    pub fn track(self: &Arc<Self>, label: &'static str) -> Tracked {
        Tracked {
            label,
            log: Arc::clone(self),
        }
    }

    /// Labels dropped so far, oldest first.
    #[must_use]
    pub fn entries(&self) -> Vec<&'static str> {
        self.entries.lock().clone()
    }

    /// How many times `label` has been dropped.
    #[must_use]
    pub fn count(&self, label: &str) -> usize {
        self.entries.lock().iter().filter(|e| **e == label).count()
    }
}

/// A value that reports its own drop to a [`DropLog`].
#[derive(Debug)]
pub struct Tracked {
    label: &'static str,
    log: Arc<DropLog>,
}

impl Tracked {
    /// The label this value records on drop.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        self.label
    }
}

impl Drop for Tracked {
    fn drop(&mut self) {
        self.log.entries.lock().push(self.label);
    }
}

/// A boxing destroyer that counts its invocations.
#[derive(Debug, Clone, Default)]
pub struct CountingDeleter {
    calls: Arc<AtomicUsize>,
}

impl CountingDeleter {
    /// Create a deleter with a fresh counter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The shared invocation counter.
    #[must_use]
    pub fn calls(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }
}

impl<T> Destroyer<T> for CountingDeleter {
    unsafe fn destroy(self, ptr: *mut T) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        // SAFETY: the caller handed over a pointer from `Box::into_raw`.
        drop(unsafe { Box::from_raw(ptr) });
    }
}
