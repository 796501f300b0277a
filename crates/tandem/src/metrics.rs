//! Process-wide control block statistics.

use std::sync::atomic::{AtomicUsize, Ordering};

/// Process-level cumulative control block statistics.
///
/// Counters are only touched on the allocation, disposal, deallocation and
/// failed-upgrade paths. Cloning or dropping a handle that is not the last
/// one never updates them.
///
/// # Example
///
/// ```
/// use tandem::{global_metrics, SharedPtr};
///
/// let before = global_metrics().blocks_allocated();
/// let ptr = SharedPtr::new(7);
/// assert!(global_metrics().blocks_allocated() > before);
/// drop(ptr);
/// ```
#[derive(Debug)]
pub struct GlobalMetrics {
    blocks_allocated: AtomicUsize,
    values_disposed: AtomicUsize,
    blocks_freed: AtomicUsize,
    lock_failures: AtomicUsize,
}

impl Default for GlobalMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl GlobalMetrics {
    /// Create a new `GlobalMetrics` with all counters initialized to zero.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            blocks_allocated: AtomicUsize::new(0),
            values_disposed: AtomicUsize::new(0),
            blocks_freed: AtomicUsize::new(0),
            lock_failures: AtomicUsize::new(0),
        }
    }

    /// Total control blocks allocated since process start.
    #[must_use]
    pub fn blocks_allocated(&self) -> usize {
        self.blocks_allocated.load(Ordering::Relaxed)
    }

    /// Total managed values handed to their destroyer.
    ///
    /// Blocks owning a null pointer are freed without a disposal, so this
    /// can lag `blocks_freed`.
    #[must_use]
    pub fn values_disposed(&self) -> usize {
        self.values_disposed.load(Ordering::Relaxed)
    }

    /// Total control blocks deallocated.
    #[must_use]
    pub fn blocks_freed(&self) -> usize {
        self.blocks_freed.load(Ordering::Relaxed)
    }

    /// Total `WeakPtr` upgrades that found the value already gone.
    #[must_use]
    pub fn lock_failures(&self) -> usize {
        self.lock_failures.load(Ordering::Relaxed)
    }

    /// Blocks currently allocated (allocated minus freed).
    ///
    /// Only a snapshot: other threads may allocate or free concurrently.
    #[must_use]
    pub fn live_blocks(&self) -> usize {
        self.blocks_allocated().saturating_sub(self.blocks_freed())
    }
}

#[allow(clippy::redundant_pub_crate)]
impl GlobalMetrics {
    pub(crate) fn record_allocation(&self) {
        self.blocks_allocated.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_disposal(&self) {
        self.values_disposed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_free(&self) {
        self.blocks_freed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_lock_failure(&self) {
        self.lock_failures.fetch_add(1, Ordering::Relaxed);
    }
}

static GLOBAL_METRICS: GlobalMetrics = GlobalMetrics::new();

/// Get the process-wide control block statistics.
#[must_use]
pub fn global_metrics() -> &'static GlobalMetrics {
    &GLOBAL_METRICS
}
