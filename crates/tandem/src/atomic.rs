//! Atomic primitives used by the control block.
//!
//! Under `--cfg loom` these resolve to loom's model-checked types so the
//! counter protocol can be explored exhaustively.

#[cfg(loom)]
pub use loom::sync::atomic::{fence, AtomicUsize, Ordering};

#[cfg(not(loom))]
pub use std::sync::atomic::{fence, AtomicUsize, Ordering};
