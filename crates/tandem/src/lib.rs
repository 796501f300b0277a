//! Shared-ownership smart pointers over an explicit control block.
//!
//! `tandem` provides [`SharedPtr<T>`], an atomically reference-counted owning
//! pointer, and [`WeakPtr<T>`], a non-owning observer that can be upgraded
//! while the value is alive. Both point at one heap-allocated control block
//! holding the value pointer, its destroyer, and the strong and weak counts.
//!
//! # Lifecycle
//!
//! - A `WeakPtr` reports [`expired`](WeakPtr::expired) from the moment the
//!   last `SharedPtr` goes, and [`lock`](WeakPtr::lock) then yields an empty
//!   pointer. The value is unreachable from then on.
//! - The value is disposed of exactly once, and the control block freed
//!   right after it, when the last handle of either kind goes.
//!
//! # Quick Start
//!
//! ```
//! use tandem::{make_shared, SharedPtr, WeakPtr};
//!
//! let a = make_shared(42);
//! let b = a.clone();
//! assert_eq!(b.use_count(), 2);
//!
//! drop(a);
//! assert_eq!(*b, 42);
//!
//! let w = WeakPtr::from(&b);
//! drop(b);
//! assert!(w.expired());
//! assert!(w.lock().is_empty());
//! ```
//!
//! # Custom destroyers
//!
//! ```
//! use tandem::SharedPtr;
//!
//! let raw = Box::into_raw(Box::new([1, 2, 3]));
//! // SAFETY: `raw` comes from `Box::into_raw` and is not owned elsewhere.
//! let ptr = unsafe {
//!     SharedPtr::from_raw_with_deleter(raw, |p: *mut [i32; 3]| {
//!         drop(unsafe { Box::from_raw(p) });
//!     })
//! };
//! assert_eq!(ptr[1], 2);
//! ```
//!
//! # Cycles
//!
//! A cycle of `SharedPtr`s keeps itself alive forever. Use `WeakPtr` for
//! back-references so the cycle's values expire with their last external
//! owner. A weak back-reference still holds its target's block, so reset it
//! (or drop the structure holding it) to dispose of the target.
//!
//! # Thread Safety
//!
//! Both handle types are `Send + Sync` when `T: Send + Sync`. Only the
//! counts are synchronized; the value's own state is not.

#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

mod atomic;
mod control;
mod error;
mod metrics;
mod ptr;
mod tracing;
mod weak;

// Re-export public API
pub use control::{DefaultDelete, Destroyer};
pub use error::ExpiredError;
pub use metrics::{global_metrics, GlobalMetrics};
pub use ptr::{make_shared, SharedPtr};
pub use weak::WeakPtr;

#[cfg(any(test, feature = "test-util"))]
#[doc(hidden)]
pub mod test_util;
