//! Error handling for the pool facade.
//!
//! The deque itself only ever reports success or "nothing to yield"
//! (`Option::None`); `PoolError` exists for the handful of outcomes that
//! are genuinely exceptional at the facade boundary rather than a normal
//! empty/lost-race result (§7, §11 of the design).

use core::fmt;

/// Result type for pool-facade operations.
pub type PoolResult<T> = Result<T, PoolError>;

/// Errors reported by the pool facade.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolError {
    /// `remove` was asked to cancel an item that was not present.
    NotFound,
    /// `push`/`pop`/`remove` was invoked from a thread other than the
    /// pool's recorded owner. Only checked in debug builds; in release
    /// builds this is the documented programming-error UB surface (§7)
    /// and is not defended against. `push`/`pop` can only panic on
    /// mismatch (`debug_assert!`) since their signatures are infallible;
    /// `remove` already returns a `Result` and surfaces this variant
    /// directly instead of panicking.
    WrongOwner,
}

impl fmt::Display for PoolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PoolError::NotFound => write!(f, "work item not found in pool"),
            PoolError::WrongOwner => write!(f, "operation invoked by a non-owner thread"),
        }
    }
}
