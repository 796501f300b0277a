//! The `WeakPtr<T>` observer.

use std::fmt;
use std::mem;
use std::ptr::NonNull;

use crate::control::ControlBlock;
use crate::ptr::SharedPtr;

/// A weak reference to a value managed by [`SharedPtr`].
///
/// `WeakPtr<T>` does not keep the value reachable: once the last
/// `SharedPtr` is gone it is [`expired`](Self::expired). It does keep the
/// control block, and the value's storage, until it is dropped; the value is
/// disposed of when the last handle of either kind goes. Use
/// [`lock`](Self::lock) or [`upgrade`](Self::upgrade) to get a
/// `SharedPtr<T>` while a strong owner still exists.
///
/// Back-references in shared structures should be `WeakPtr`s: a cycle of
/// `SharedPtr`s is never disposed.
///
/// # Examples
///
/// ```
/// use tandem::{SharedPtr, WeakPtr};
///
/// let strong = SharedPtr::new(42);
/// let weak = WeakPtr::from(&strong);
/// assert_eq!(*weak.lock(), 42);
///
/// drop(strong);
/// assert!(weak.expired());
/// assert!(weak.lock().is_empty());
/// ```
pub struct WeakPtr<T> {
    /// Points to the block even after the last strong owner is gone.
    block: Option<NonNull<ControlBlock<T>>>,
}

impl<T> WeakPtr<T> {
    /// Create an empty `WeakPtr` that observes nothing.
    #[must_use]
    pub const fn new() -> Self {
        Self { block: None }
    }

    fn control(&self) -> Option<&ControlBlock<T>> {
        // SAFETY: our weak reference keeps the block allocated.
        self.block.map(|block| unsafe { &*block.as_ptr() })
    }

    /// `true` iff there is no block or no `SharedPtr` shares it any more.
    #[must_use]
    pub fn expired(&self) -> bool {
        self.control().is_none_or(|control| control.strong_count() == 0)
    }

    /// Attempt to obtain a [`SharedPtr`] to the value.
    ///
    /// Returns an empty pointer once no strong owner remains; in that case no count
    /// is modified.
    #[must_use]
    pub fn lock(&self) -> SharedPtr<T> {
        self.upgrade().unwrap_or_default()
    }

    /// Attempt to obtain a [`SharedPtr`] to the value.
    ///
    /// Returns `None` once no strong owner remains.
    ///
    /// # Examples
    ///
    /// ```
    /// use tandem::SharedPtr;
    ///
    /// let strong = SharedPtr::new(1);
    /// let weak = SharedPtr::downgrade(&strong);
    /// assert!(weak.upgrade().is_some());
    /// ```
    #[must_use]
    pub fn upgrade(&self) -> Option<SharedPtr<T>> {
        let block = self.block?;
        // SAFETY: our weak reference keeps the block allocated.
        if unsafe { block.as_ref() }.try_add_strong() {
            Some(SharedPtr::from_block(block))
        } else {
            None
        }
    }

    /// Number of `SharedPtr`s sharing the observed block, 0 if expired or
    /// empty.
    #[must_use]
    pub fn strong_count(&self) -> usize {
        self.control().map_or(0, ControlBlock::strong_count)
    }

    /// Number of `WeakPtr`s observing the block, 0 if empty.
    #[must_use]
    pub fn weak_count(&self) -> usize {
        self.control().map_or(0, ControlBlock::weak_count)
    }

    /// Observe `shared`'s block instead of the current one.
    ///
    /// A no-op when already observing that block.
    pub fn assign(&mut self, shared: &SharedPtr<T>) {
        if self.block == shared.block() {
            return;
        }
        let mut fresh = Self::from(shared);
        self.swap(&mut fresh);
        drop(fresh);
    }

    /// Release the weak reference, leaving this pointer empty.
    ///
    /// Releasing the last reference of either kind disposes of the value
    /// and frees the block.
    pub fn reset(&mut self) {
        drop(self.take());
    }

    /// Exchange the blocks of two weak pointers. No count changes.
    pub fn swap(&mut self, other: &mut Self) {
        mem::swap(&mut self.block, &mut other.block);
    }

    /// Move out of this pointer, leaving it empty. No count changes.
    #[must_use]
    pub fn take(&mut self) -> Self {
        Self {
            block: self.block.take(),
        }
    }

    /// Returns `true` if both observe the same block (or are both empty).
    #[must_use]
    pub fn ptr_eq(this: &Self, other: &Self) -> bool {
        this.block == other.block
    }
}

impl<T> From<&SharedPtr<T>> for WeakPtr<T> {
    fn from(shared: &SharedPtr<T>) -> Self {
        let block = shared.block();
        if let Some(block) = block {
            // SAFETY: `shared`'s strong reference keeps the block allocated.
            unsafe { block.as_ref() }.add_weak();
        }
        Self { block }
    }
}

impl<T> Clone for WeakPtr<T> {
    fn clone(&self) -> Self {
        if let Some(control) = self.control() {
            control.add_weak();
        }
        Self { block: self.block }
    }

    fn clone_from(&mut self, source: &Self) {
        if Self::ptr_eq(self, source) {
            return;
        }
        let mut fresh = source.clone();
        self.swap(&mut fresh);
        drop(fresh);
    }
}

impl<T> Drop for WeakPtr<T> {
    fn drop(&mut self) {
        if let Some(block) = self.block.take() {
            // SAFETY: we own one weak reference and give it up here.
            unsafe {
                ControlBlock::release_weak(block);
            }
        }
    }
}

impl<T> Default for WeakPtr<T> {
    /// Constructs an empty `WeakPtr` (always expired).
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for WeakPtr<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(WeakPtr)")
    }
}

// ============================================================================
// Send + Sync trait implementations
// ============================================================================

// SAFETY: a `WeakPtr` can become a `SharedPtr`, so it needs the same bounds.
#[allow(clippy::non_send_fields_in_send_ty)]
unsafe impl<T: Send + Sync> Send for WeakPtr<T> {}
// SAFETY: as above.
#[allow(clippy::non_send_fields_in_send_ty)]
unsafe impl<T: Send + Sync> Sync for WeakPtr<T> {}
