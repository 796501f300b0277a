//! The `SharedPtr<T>` owning pointer.
//!
//! This module provides the primary user-facing type for shared ownership.

use std::fmt;
use std::marker::PhantomData;
use std::mem;
use std::ops::{Deref, Index};
use std::ptr::{self, NonNull};

use crate::control::{ControlBlock, DefaultDelete, Destroyer};
use crate::error::ExpiredError;
use crate::weak::WeakPtr;

/// An atomically reference-counted owning pointer to a `T`.
///
/// Any number of `SharedPtr`s may share one control block. The managed
/// value is disposed of exactly once, after the last of them and the last
/// [`WeakPtr`] sharing the block are gone. Once no `SharedPtr` remains the
/// value can no longer be reached, even while `WeakPtr`s keep it allocated.
///
/// A `SharedPtr` is either *empty* (no control block) or bound to a block.
/// A block may own a null pointer (see [`SharedPtr::from_raw`]); such a
/// pointer counts as a use but [`is_some`](Self::is_some) is `false`.
///
/// # Thread Safety
///
/// `SharedPtr<T>` implements `Send` and `Sync` when `T: Send + Sync`. Only
/// the reference counts are synchronized; the value's own interior state is
/// its own business.
///
/// # Panics
///
/// Dereferencing a pointer that owns no value panics. Use
/// [`as_ref`](Self::as_ref) for fallible access or
/// [`get_unchecked`](Self::get_unchecked) to skip the check.
///
/// # Examples
///
/// ```
/// use tandem::SharedPtr;
///
/// let a = SharedPtr::new(42);
/// let b = a.clone();
/// assert_eq!(a.use_count(), 2);
/// assert_eq!(*b, 42);
/// ```
pub struct SharedPtr<T> {
    block: Option<NonNull<ControlBlock<T>>>,
    /// The pointer owns a `T` for drop-check purposes.
    _marker: PhantomData<T>,
}

/// Allocate `value` together with its control block in one allocation.
///
/// Equivalent to [`SharedPtr::new`].
///
/// # Examples
///
/// ```
/// use tandem::make_shared;
///
/// let ptr = make_shared(String::from("hello"));
/// assert_eq!(ptr.len(), 5);
/// ```
pub fn make_shared<T>(value: T) -> SharedPtr<T> {
    SharedPtr::new(value)
}

impl<T> SharedPtr<T> {
    /// Create an empty pointer that owns nothing.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            block: None,
            _marker: PhantomData,
        }
    }

    /// Allocate `value` and its control block in a single allocation.
    pub fn new(value: T) -> Self {
        Self::from_block(ControlBlock::allocate_inline(value))
    }

    /// Allocate a value built by `init` together with its control block.
    ///
    /// This is the constructor-forwarding form of [`make_shared`]: whatever
    /// arguments `T`'s constructor needs are captured by the closure.
    ///
    /// ```
    /// use tandem::SharedPtr;
    ///
    /// let ptr = SharedPtr::new_with(|| vec![0_u8; 16]);
    /// assert_eq!(ptr.len(), 16);
    /// ```
    pub fn new_with<F: FnOnce() -> T>(init: F) -> Self {
        Self::new(init())
    }

    /// Allocate a control block around `T::default()`.
    #[must_use]
    pub fn new_default() -> Self
    where
        T: Default,
    {
        Self::new(T::default())
    }

    /// Take ownership of a boxed value.
    pub fn from_box(value: Box<T>) -> Self {
        // SAFETY: the pointer comes straight from `Box::into_raw`.
        unsafe { Self::from_raw(Box::into_raw(value)) }
    }

    /// Take ownership of a raw pointer, disposed of with [`DefaultDelete`].
    ///
    /// `ptr` may be null: the result then holds a control block and counts
    /// as a use, but [`is_some`](Self::is_some) reports `false`.
    ///
    /// # Safety
    ///
    /// `ptr` is null or was produced by `Box::into_raw`, and nothing else
    /// owns it.
    pub unsafe fn from_raw(ptr: *mut T) -> Self {
        // SAFETY: forwarded from the caller.
        unsafe { Self::from_raw_with_deleter(ptr, DefaultDelete) }
    }

    /// Take ownership of a raw pointer, disposed of with `deleter`.
    ///
    /// The deleter is invoked once, when the last `SharedPtr` or `WeakPtr`
    /// sharing the new block goes away, and never for a null `ptr`.
    ///
    /// # Safety
    ///
    /// `ptr` is null or valid to hand to `deleter`, and nothing else
    /// disposes of it.
    pub unsafe fn from_raw_with_deleter<D: Destroyer<T>>(ptr: *mut T, deleter: D) -> Self {
        // SAFETY: forwarded from the caller.
        Self::from_block(unsafe { ControlBlock::allocate_raw(ptr, deleter) })
    }

    /// Wrap a block whose strong reference the caller hands over.
    #[allow(clippy::redundant_pub_crate)]
    pub(crate) const fn from_block(block: NonNull<ControlBlock<T>>) -> Self {
        Self {
            block: Some(block),
            _marker: PhantomData,
        }
    }

    #[allow(clippy::redundant_pub_crate)]
    pub(crate) const fn block(&self) -> Option<NonNull<ControlBlock<T>>> {
        self.block
    }

    fn control(&self) -> Option<&ControlBlock<T>> {
        // SAFETY: our strong reference keeps the block allocated.
        self.block.map(|block| unsafe { &*block.as_ptr() })
    }

    /// The managed value pointer, or null if empty.
    #[must_use]
    pub fn get(&self) -> *mut T {
        self.control().map_or(ptr::null_mut(), ControlBlock::value)
    }

    /// Borrow the managed value, if any.
    #[must_use]
    #[allow(clippy::should_implement_trait)]
    pub fn as_ref(&self) -> Option<&T> {
        // SAFETY: a non-null value stays alive while we hold a strong
        // reference.
        unsafe { self.get().as_ref() }
    }

    /// Borrow the managed value without checking that there is one.
    ///
    /// # Safety
    ///
    /// The pointer must own a non-null value ([`is_some`](Self::is_some)).
    #[must_use]
    pub unsafe fn get_unchecked(&self) -> &T {
        debug_assert!(self.is_some(), "get_unchecked on an empty SharedPtr");
        // SAFETY: the caller guarantees a block with a live value.
        unsafe { &*self.block.unwrap_unchecked().as_ref().value() }
    }

    /// Number of `SharedPtr`s sharing this block, 0 if empty.
    #[must_use]
    pub fn use_count(&self) -> usize {
        self.control().map_or(0, ControlBlock::strong_count)
    }

    /// Number of `WeakPtr`s observing this block, 0 if empty.
    #[must_use]
    pub fn weak_count(&self) -> usize {
        self.control().map_or(0, ControlBlock::weak_count)
    }

    /// `true` iff the pointer owns a non-null value.
    #[must_use]
    pub fn is_some(&self) -> bool {
        !self.get().is_null()
    }

    /// `true` iff the pointer owns no value (empty, or bound to a null
    /// pointer).
    #[must_use]
    pub fn is_null(&self) -> bool {
        self.get().is_null()
    }

    /// `true` iff no control block is held.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.block.is_none()
    }

    /// Create a [`WeakPtr`] observing this pointer's block.
    ///
    /// Downgrading an empty pointer yields an empty `WeakPtr`.
    #[must_use]
    pub fn downgrade(this: &Self) -> WeakPtr<T> {
        WeakPtr::from(this)
    }

    /// Returns `true` if both pointers share the same control block (or
    /// are both empty).
    #[must_use]
    pub fn ptr_eq(this: &Self, other: &Self) -> bool {
        this.block == other.block
    }

    /// Exchange the blocks of two pointers. No count changes.
    pub fn swap(&mut self, other: &mut Self) {
        mem::swap(&mut self.block, &mut other.block);
    }

    /// Move out of this pointer, leaving it empty. No count changes.
    #[must_use]
    pub fn take(&mut self) -> Self {
        Self {
            block: self.block.take(),
            _marker: PhantomData,
        }
    }

    /// Release ownership, leaving the pointer empty.
    pub fn reset(&mut self) {
        drop(self.take());
    }

    /// Release ownership and take ownership of `ptr` instead.
    ///
    /// Resetting to the pointer already owned is a no-op.
    ///
    /// # Safety
    ///
    /// Same contract as [`from_raw`](Self::from_raw), unless `ptr` is the
    /// value this pointer already owns.
    pub unsafe fn reset_raw(&mut self, ptr: *mut T) {
        // SAFETY: forwarded from the caller.
        unsafe { self.reset_raw_with_deleter(ptr, DefaultDelete) };
    }

    /// Release ownership and take ownership of `ptr`, disposed of with
    /// `deleter`.
    ///
    /// Resetting to the pointer already returned by [`get`](Self::get) is a
    /// no-op and drops `deleter` unused. That includes passing null to an
    /// empty pointer or to one owning null.
    ///
    /// # Safety
    ///
    /// Same contract as [`from_raw_with_deleter`](Self::from_raw_with_deleter),
    /// unless `ptr` is the value this pointer already owns.
    pub unsafe fn reset_raw_with_deleter<D: Destroyer<T>>(&mut self, ptr: *mut T, deleter: D) {
        if ptr == self.get() {
            return;
        }
        // SAFETY: forwarded from the caller.
        let mut fresh = unsafe { Self::from_raw_with_deleter(ptr, deleter) };
        self.swap(&mut fresh);
        drop(fresh);
    }

    /// Release ownership and take ownership of a boxed value.
    pub fn reset_box(&mut self, value: Box<T>) {
        let mut fresh = Self::from_box(value);
        self.swap(&mut fresh);
        drop(fresh);
    }

    /// Release ownership and manage `value` in a fresh inline block.
    pub fn reset_value(&mut self, value: T) {
        let mut fresh = Self::new(value);
        self.swap(&mut fresh);
        drop(fresh);
    }

    /// Share `other`'s block, releasing the current one.
    ///
    /// A no-op when both already share a block.
    pub fn assign(&mut self, other: &Self) {
        if Self::ptr_eq(self, other) {
            return;
        }
        let mut fresh = other.clone();
        self.swap(&mut fresh);
        drop(fresh);
    }

    /// Move `other`'s block into this pointer, releasing the current one.
    /// `other` is left empty.
    pub fn assign_from(&mut self, other: &mut Self) {
        let mut fresh = other.take();
        self.swap(&mut fresh);
        drop(fresh);
    }
}

impl<T> Deref for SharedPtr<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        match self.as_ref() {
            Some(value) => value,
            None => deref_empty(),
        }
    }
}

#[cold]
#[track_caller]
fn deref_empty() -> ! {
    panic!("dereferenced a SharedPtr that owns no value")
}

impl<T: Index<I>, I> Index<I> for SharedPtr<T> {
    type Output = T::Output;

    fn index(&self, index: I) -> &Self::Output {
        &(**self)[index]
    }
}

impl<T> Clone for SharedPtr<T> {
    fn clone(&self) -> Self {
        if let Some(control) = self.control() {
            control.add_strong();
        }
        Self {
            block: self.block,
            _marker: PhantomData,
        }
    }

    fn clone_from(&mut self, source: &Self) {
        self.assign(source);
    }
}

impl<T> Drop for SharedPtr<T> {
    fn drop(&mut self) {
        if let Some(block) = self.block.take() {
            // SAFETY: we own one strong reference and give it up here.
            unsafe {
                ControlBlock::release_strong(block);
            }
        }
    }
}

impl<T> Default for SharedPtr<T> {
    /// An empty pointer.
    fn default() -> Self {
        Self::empty()
    }
}

impl<T> TryFrom<&WeakPtr<T>> for SharedPtr<T> {
    type Error = ExpiredError;

    fn try_from(weak: &WeakPtr<T>) -> Result<Self, Self::Error> {
        weak.upgrade().ok_or(ExpiredError)
    }
}

impl<T> From<T> for SharedPtr<T> {
    fn from(value: T) -> Self {
        Self::new(value)
    }
}

impl<T> From<Box<T>> for SharedPtr<T> {
    fn from(value: Box<T>) -> Self {
        Self::from_box(value)
    }
}

impl<T: PartialEq> PartialEq for SharedPtr<T> {
    fn eq(&self, other: &Self) -> bool {
        self.as_ref() == other.as_ref()
    }
}

impl<T: Eq> Eq for SharedPtr<T> {}

impl<T: PartialOrd> PartialOrd for SharedPtr<T> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        self.as_ref().partial_cmp(&other.as_ref())
    }
}

impl<T: Ord> Ord for SharedPtr<T> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.as_ref().cmp(&other.as_ref())
    }
}

impl<T: std::hash::Hash> std::hash::Hash for SharedPtr<T> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.as_ref().hash(state);
    }
}

impl<T: fmt::Debug> fmt::Debug for SharedPtr<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.as_ref() {
            Some(value) => f.debug_tuple("SharedPtr").field(value).finish(),
            None => write!(f, "SharedPtr(<null>)"),
        }
    }
}

impl<T: fmt::Display> fmt::Display for SharedPtr<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.as_ref() {
            Some(value) => fmt::Display::fmt(value, f),
            None => f.write_str("<null>"),
        }
    }
}

impl<T> fmt::Pointer for SharedPtr<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Pointer::fmt(&self.get(), f)
    }
}

// ============================================================================
// Send + Sync trait implementations
// ============================================================================

// SAFETY: counts are atomic; the value is shared across threads, hence
// both bounds.
#[allow(clippy::non_send_fields_in_send_ty)]
unsafe impl<T: Send + Sync> Send for SharedPtr<T> {}
// SAFETY: as above.
#[allow(clippy::non_send_fields_in_send_ty)]
unsafe impl<T: Send + Sync> Sync for SharedPtr<T> {}
