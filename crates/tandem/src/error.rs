//! Error types.

use thiserror::Error;

/// Returned when converting an expired [`WeakPtr`](crate::WeakPtr) into a
/// [`SharedPtr`](crate::SharedPtr) through `TryFrom`.
///
/// [`WeakPtr::lock`](crate::WeakPtr::lock) never produces this error; it
/// yields an empty pointer instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("weak pointer has expired")]
pub struct ExpiredError;
