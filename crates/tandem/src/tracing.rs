//! Control block lifecycle tracing.
//!
//! When the `tracing` feature is enabled, this module emits structured
//! events for allocation, disposal and deallocation of control blocks.
//! Without the feature every hook compiles down to nothing.

#[cfg(feature = "tracing")]
pub mod internal {
    use std::sync::atomic::{AtomicU64, Ordering};

    use tracing::Level;

    /// Stable identifier for a control block.
    ///
    /// Assigned once at allocation and carried in every event concerning
    /// the block, so its whole lifecycle can be correlated in the logs.
    /// Monotonically increasing, starting at 1.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct BlockId(pub u64);

    static NEXT_BLOCK_ID: AtomicU64 = AtomicU64::new(1);

    /// Generate the next unique block ID.
    pub fn next_block_id() -> BlockId {
        BlockId(NEXT_BLOCK_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// A block was allocated with the given layout.
    pub fn log_block_allocated(id: BlockId, layout: &'static str) {
        tracing::event!(Level::TRACE, block = id.0, layout, "block_allocated");
    }

    /// The managed value of a block was handed to its destroyer.
    pub fn log_value_disposed(id: BlockId) {
        tracing::event!(Level::TRACE, block = id.0, "value_disposed");
    }

    /// The block allocation itself was released.
    pub fn log_block_freed(id: BlockId) {
        tracing::event!(Level::TRACE, block = id.0, "block_freed");
    }

    /// A weak pointer failed to upgrade because its value is gone.
    pub fn log_lock_failed(id: BlockId) {
        tracing::debug!(block = id.0, "lock_failed");
    }
}

#[cfg(not(feature = "tracing"))]
pub mod internal {
    /// Stub type when tracing is disabled.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct BlockId(pub u64);

    /// Stub function when tracing is disabled.
    #[inline]
    pub const fn next_block_id() -> BlockId {
        BlockId(0)
    }

    #[inline]
    pub const fn log_block_allocated(_id: BlockId, _layout: &'static str) {}

    #[inline]
    pub const fn log_value_disposed(_id: BlockId) {}

    #[inline]
    pub const fn log_block_freed(_id: BlockId) {}

    #[inline]
    pub const fn log_lock_failed(_id: BlockId) {}
}

pub use internal::BlockId;
