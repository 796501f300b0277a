//! The shared control block behind `SharedPtr<T>` and `WeakPtr<T>`.
//!
//! A block owns the managed value pointer, the destroyer for it, and two
//! atomic counters. Strong handles collectively hold one extra weak
//! reference, released when the last strong handle goes. That turns
//! "both counts reached zero" into a single zero crossing of `weak`, so
//! exactly one thread ever disposes the value and frees the block.

use std::cell::UnsafeCell;
use std::mem::{ManuallyDrop, MaybeUninit};
use std::ptr::{self, NonNull};

use crossbeam::utils::Backoff;

use crate::atomic::{fence, AtomicUsize, Ordering};
use crate::metrics::global_metrics;
use crate::tracing::internal::{
    log_block_allocated, log_block_freed, log_lock_failed, log_value_disposed, next_block_id,
};
use crate::tracing::BlockId;

/// Counts above this abort the process, like `std::sync::Arc`.
const MAX_REFCOUNT: usize = isize::MAX as usize;

// ============================================================================
// Destroyer - how a managed value is disposed
// ============================================================================

/// A capability that disposes of a managed value.
///
/// Every closure `FnOnce(*mut T)` is a destroyer. It is invoked at most once
/// per control block, once the last `SharedPtr` and the last `WeakPtr`
/// sharing it are gone, and never for a null pointer.
///
/// # Examples
///
/// ```
/// use tandem::SharedPtr;
///
/// let raw = Box::into_raw(Box::new(5_u32));
/// // SAFETY: `raw` comes from `Box::into_raw` and is owned by nobody else.
/// let ptr = unsafe {
///     SharedPtr::from_raw_with_deleter(raw, |p: *mut u32| drop(unsafe { Box::from_raw(p) }))
/// };
/// assert_eq!(*ptr, 5);
/// ```
pub trait Destroyer<T> {
    /// Dispose of the value behind `ptr`.
    ///
    /// # Safety
    ///
    /// `ptr` is non-null and is the pointer whose ownership was handed to
    /// the control block together with this destroyer. Nothing accesses
    /// the value afterwards.
    unsafe fn destroy(self, ptr: *mut T);
}

impl<T, F: FnOnce(*mut T)> Destroyer<T> for F {
    unsafe fn destroy(self, ptr: *mut T) {
        self(ptr);
    }
}

/// The default destroyer: reclaims a pointer produced by `Box::into_raw`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DefaultDelete;

impl<T> Destroyer<T> for DefaultDelete {
    unsafe fn destroy(self, ptr: *mut T) {
        // SAFETY: the caller handed over a pointer from `Box::into_raw`.
        drop(unsafe { Box::from_raw(ptr) });
    }
}

// ============================================================================
// ControlBlock<T> - the shared header
// ============================================================================

/// Shared bookkeeping for one managed value.
///
/// This is the common `#[repr(C)]` prefix of every block layout; the
/// layout-specific parts (value storage, the destroyer) follow it in the
/// same allocation and are reached through `drop_fn` and `dealloc_fn`.
#[repr(C)]
pub struct ControlBlock<T> {
    /// Number of live `SharedPtr`s.
    strong: AtomicUsize,
    /// Number of live `WeakPtr`s, plus one while `strong > 0`.
    weak: AtomicUsize,
    /// The managed value. Null for a block built around a null pointer
    /// and after disposal.
    value: UnsafeCell<*mut T>,
    /// Type-erased disposal of the value. Returns whether a value was
    /// actually disposed.
    drop_fn: unsafe fn(NonNull<Self>) -> bool,
    /// Type-erased deallocation of the whole block.
    dealloc_fn: unsafe fn(NonNull<Self>),
    id: BlockId,
}

impl<T> ControlBlock<T> {
    fn header(
        value: *mut T,
        drop_fn: unsafe fn(NonNull<Self>) -> bool,
        dealloc_fn: unsafe fn(NonNull<Self>),
    ) -> Self {
        Self {
            strong: AtomicUsize::new(1),
            weak: AtomicUsize::new(1),
            value: UnsafeCell::new(value),
            drop_fn,
            dealloc_fn,
            id: next_block_id(),
        }
    }

    /// Allocate a block taking ownership of `value`, disposed through
    /// `destroyer`. The block starts with one strong reference.
    ///
    /// # Safety
    ///
    /// `value` is null or valid to pass to `destroyer` once no handle of
    /// either kind remains, and nothing else disposes of it.
    pub unsafe fn allocate_raw<D: Destroyer<T>>(value: *mut T, destroyer: D) -> NonNull<Self> {
        let block = Box::into_raw(Box::new(RawBlock {
            header: Self::header(value, RawBlock::<T, D>::drop_fn, RawBlock::<T, D>::dealloc_fn),
            destroyer: UnsafeCell::new(ManuallyDrop::new(destroyer)),
        }));
        // SAFETY: `Box::into_raw` never returns null.
        let block = unsafe { NonNull::new_unchecked(block) }.cast::<Self>();
        Self::record_allocation(block, "raw");
        block
    }

    /// Allocate a block storing `value` inline, next to the counters.
    /// The block starts with one strong reference.
    pub fn allocate_inline(value: T) -> NonNull<Self> {
        let block = Box::into_raw(Box::new(InlineBlock {
            header: Self::header(
                ptr::null_mut(),
                InlineBlock::<T>::drop_fn,
                InlineBlock::<T>::dealloc_fn,
            ),
            storage: UnsafeCell::new(MaybeUninit::new(value)),
        }));
        // SAFETY: `block` is a fresh, exclusively owned allocation. The value
        // pointer is set after boxing so it stays valid for the block's life.
        unsafe {
            *(*block).header.value.get() = (*block).storage.get().cast::<T>();
        }
        // SAFETY: `Box::into_raw` never returns null.
        let block = unsafe { NonNull::new_unchecked(block) }.cast::<Self>();
        Self::record_allocation(block, "inline");
        block
    }

    fn record_allocation(block: NonNull<Self>, layout: &'static str) {
        global_metrics().record_allocation();
        // SAFETY: the block was just allocated.
        log_block_allocated(unsafe { block.as_ref() }.id(), layout);
    }

    /// Register one more strong reference.
    ///
    /// Only valid while the caller already holds a strong reference.
    pub fn add_strong(&self) {
        let old = self.strong.fetch_add(1, Ordering::Relaxed);
        debug_assert_ne!(old, 0, "add_strong on an expired block");
        if old > MAX_REFCOUNT {
            std::process::abort();
        }
    }

    /// Register one more weak reference.
    ///
    /// Only valid while the caller holds any reference to the block.
    pub fn add_weak(&self) {
        let old = self.weak.fetch_add(1, Ordering::Relaxed);
        debug_assert_ne!(old, 0, "add_weak on a freed block");
        if old > MAX_REFCOUNT {
            std::process::abort();
        }
    }

    /// Register a strong reference unless the value is already gone.
    ///
    /// The zero check and the increment are a single compare-exchange, so
    /// a value whose last strong reference is being released can never be
    /// resurrected. A failed attempt leaves every counter untouched.
    pub fn try_add_strong(&self) -> bool {
        let backoff = Backoff::new();
        let mut count = self.strong.load(Ordering::Relaxed);
        loop {
            if count == 0 {
                global_metrics().record_lock_failure();
                log_lock_failed(self.id());
                return false;
            }
            if count > MAX_REFCOUNT {
                std::process::abort();
            }
            match self.strong.compare_exchange_weak(
                count,
                count + 1,
                Ordering::Acquire,
                Ordering::Relaxed,
            ) {
                Ok(_) => return true,
                Err(actual) => {
                    count = actual;
                    backoff.spin();
                }
            }
        }
    }

    /// Drop one strong reference. The thread releasing the last one gives
    /// up the implicit weak reference, after which no new strong reference
    /// can be obtained.
    ///
    /// Returns `true` if this call disposed the value and freed the block.
    ///
    /// # Safety
    ///
    /// `this` is a live block and the caller owns one strong reference,
    /// which it gives up. The block must not be touched afterwards through
    /// that reference.
    pub unsafe fn release_strong(this: NonNull<Self>) -> bool {
        // SAFETY: the caller's strong reference keeps the block allocated.
        let block = unsafe { this.as_ref() };
        let old = block.strong.fetch_sub(1, Ordering::Release);
        debug_assert_ne!(old, 0, "strong count underflow");
        if old != 1 {
            return false;
        }
        fence(Ordering::Acquire);

        // SAFETY: the implicit weak reference held by the strong handles.
        unsafe { Self::release_weak(this) }
    }

    /// Drop one weak reference. The thread releasing the last one disposes
    /// of the value and frees the block.
    ///
    /// Returns `true` if this call disposed the value and freed the block.
    ///
    /// # Safety
    ///
    /// `this` is a live block and the caller owns one weak reference, which
    /// it gives up.
    pub unsafe fn release_weak(this: NonNull<Self>) -> bool {
        // SAFETY: the caller's weak reference keeps the block allocated.
        let old = unsafe { this.as_ref() }.weak.fetch_sub(1, Ordering::Release);
        debug_assert_ne!(old, 0, "weak count underflow");
        if old != 1 {
            return false;
        }
        // Synchronize with every earlier release so disposal happens-after
        // all accesses through other handles.
        fence(Ordering::Acquire);

        // SAFETY: no reference of any kind remains, and the strong count
        // stays at zero, so this thread alone disposes and frees.
        unsafe {
            Self::dispose(this);
            let id = this.as_ref().id();
            (this.as_ref().dealloc_fn)(this);
            global_metrics().record_free();
            log_block_freed(id);
        }
        true
    }

    /// Run the destroyer on the value, exactly once.
    unsafe fn dispose(this: NonNull<Self>) {
        // SAFETY: called once, by the thread that saw weak reach zero.
        unsafe {
            let block = this.as_ref();
            if (block.drop_fn)(this) {
                global_metrics().record_disposal();
                log_value_disposed(block.id());
            }
            *block.value.get() = ptr::null_mut();
        }
    }

    /// The managed value pointer, null if none or already disposed.
    ///
    /// Only meaningful to dereference while a strong reference is held.
    pub fn value(&self) -> *mut T {
        // SAFETY: the field is only written at construction and during
        // disposal, when no strong reference (and hence no reader) exists.
        unsafe { *self.value.get() }
    }

    /// Current number of strong references.
    pub fn strong_count(&self) -> usize {
        self.strong.load(Ordering::Acquire)
    }

    /// Current number of weak references, excluding the implicit one held
    /// by the strong handles.
    ///
    /// Racy by nature: use for diagnostics only.
    pub fn weak_count(&self) -> usize {
        let weak = self.weak.load(Ordering::Acquire);
        if self.strong.load(Ordering::Acquire) == 0 {
            weak
        } else {
            weak.saturating_sub(1)
        }
    }

    /// Identifier used in trace events.
    pub const fn id(&self) -> BlockId {
        self.id
    }
}

// ============================================================================
// Block layouts
// ============================================================================

/// Layout for a value allocated elsewhere and handed over with a destroyer.
#[repr(C)]
struct RawBlock<T, D> {
    header: ControlBlock<T>,
    destroyer: UnsafeCell<ManuallyDrop<D>>,
}

impl<T, D: Destroyer<T>> RawBlock<T, D> {
    unsafe fn drop_fn(block: NonNull<ControlBlock<T>>) -> bool {
        let block = block.cast::<Self>();
        // SAFETY: `block` was allocated as `RawBlock<T, D>` and this runs
        // once, so the destroyer is still present.
        unsafe {
            let value = *block.as_ref().header.value.get();
            let destroyer = ManuallyDrop::take(&mut *block.as_ref().destroyer.get());
            if value.is_null() {
                drop(destroyer);
                false
            } else {
                destroyer.destroy(value);
                true
            }
        }
    }

    unsafe fn dealloc_fn(block: NonNull<ControlBlock<T>>) {
        // SAFETY: the block came from `Box::into_raw` as a `RawBlock<T, D>`.
        // The destroyer sits in `ManuallyDrop` and was already consumed.
        drop(unsafe { Box::from_raw(block.cast::<Self>().as_ptr()) });
    }
}

/// Layout for a value stored in the same allocation as its counters.
#[repr(C)]
struct InlineBlock<T> {
    header: ControlBlock<T>,
    storage: UnsafeCell<MaybeUninit<T>>,
}

impl<T> InlineBlock<T> {
    unsafe fn drop_fn(block: NonNull<ControlBlock<T>>) -> bool {
        let block = block.cast::<Self>();
        // SAFETY: the storage was initialized at allocation and this runs
        // once.
        unsafe {
            ptr::drop_in_place((*block.as_ref().storage.get()).as_mut_ptr());
        }
        true
    }

    unsafe fn dealloc_fn(block: NonNull<ControlBlock<T>>) {
        // SAFETY: the block came from `Box::into_raw` as an `InlineBlock<T>`.
        // `MaybeUninit` does not drop the already disposed value again.
        drop(unsafe { Box::from_raw(block.cast::<Self>().as_ptr()) });
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;
    use crate::test_util::{CountingDeleter, DropLog};

    #[test]
    fn test_new_block_counts() {
        let block = ControlBlock::allocate_inline(5_i32);
        let header = unsafe { block.as_ref() };
        assert_eq!(header.strong_count(), 1);
        assert_eq!(header.weak_count(), 0);
        assert_eq!(unsafe { *header.value() }, 5);
        assert!(unsafe { ControlBlock::release_strong(block) });
    }

    #[test]
    fn test_weak_keeps_value_until_released() {
        let log = DropLog::new();
        let block = ControlBlock::allocate_inline(log.track("value"));
        unsafe {
            block.as_ref().add_weak();
            assert_eq!(block.as_ref().weak_count(), 1);

            assert!(!ControlBlock::release_strong(block));
            assert!(log.entries().is_empty());
            assert_eq!(block.as_ref().strong_count(), 0);
            assert_eq!(block.as_ref().weak_count(), 1);
            assert!(!block.as_ref().try_add_strong());
            assert_eq!(block.as_ref().strong_count(), 0);

            assert!(ControlBlock::release_weak(block));
        }
        assert_eq!(log.entries(), vec!["value"]);
    }

    #[test]
    fn test_raw_block_invokes_destroyer_once() {
        let deleter = CountingDeleter::new();
        let calls = deleter.calls();
        let raw = Box::into_raw(Box::new(String::from("raw")));
        let block = unsafe { ControlBlock::allocate_raw(raw, deleter) };
        unsafe {
            block.as_ref().add_strong();
            block.as_ref().add_weak();
            assert!(!ControlBlock::release_strong(block));
            assert_eq!(calls.load(Ordering::SeqCst), 0);
            assert!(!ControlBlock::release_strong(block));
            assert_eq!(calls.load(Ordering::SeqCst), 0);
            assert!(ControlBlock::release_weak(block));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_null_value_skips_destroyer() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        let block = unsafe {
            ControlBlock::allocate_raw(ptr::null_mut::<u8>(), move |_p: *mut u8| {
                seen.fetch_add(1, Ordering::SeqCst);
            })
        };
        assert!(unsafe { block.as_ref() }.value().is_null());
        assert!(unsafe { ControlBlock::release_strong(block) });
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        // The closure itself, and the Arc it captured, are dropped.
        assert_eq!(Arc::strong_count(&calls), 1);
    }

    #[test]
    fn test_try_add_strong_live() {
        let block = ControlBlock::allocate_inline(());
        unsafe {
            assert!(block.as_ref().try_add_strong());
            assert_eq!(block.as_ref().strong_count(), 2);
            assert!(!ControlBlock::release_strong(block));
            assert!(ControlBlock::release_strong(block));
        }
    }

    #[test]
    fn test_block_ids_are_stable() {
        let block = ControlBlock::allocate_inline(1_u8);
        let id = unsafe { block.as_ref() }.id();
        assert_eq!(unsafe { block.as_ref() }.id(), id);
        unsafe { ControlBlock::release_strong(block) };
    }
}
