//! The pool facade: the uniform operation table the runtime binds to.
//!
//! `Pool` is the "flat operation table" of §4.3 expressed as a Rust
//! trait rather than a literal struct of function pointers — a trait
//! object (`&dyn Pool`) is exactly that table, and lets the runtime hold
//! a deque-backed pool interchangeably with whatever other pool kinds it
//! defines, without us reaching for an unidiomatic C-style vtable struct.

use crate::deque::Deque;
use crate::errors::{PoolError, PoolResult};
use crate::item::{PoolId, WorkItem};
use core::ptr::NonNull;
use portable_atomic::{AtomicU64, Ordering};

/// Identifies the single worker thread permitted to call `push`, `pop`,
/// and `remove` on a given pool. The embedding runtime chooses the
/// representation (CPU index, OS thread id, ...); this crate only ever
/// compares it for equality.
pub type OwnerTag = u64;

/// The concurrency discipline a pool implementation exposes. This crate
/// only ever produces `Spmc`, but the tag travels with the trait object
/// so a runtime mixing several pool kinds can dispatch on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    /// Single producer (the owner), multiple consumers (any thief).
    Spmc,
}

/// Configuration consumed by [`DequePool::init`].
#[derive(Debug, Clone, Copy)]
pub struct PoolConfig {
    /// Initial backing-array capacity; must be a power of two. Defaults
    /// to 256 per §3.
    pub initial_capacity: usize,
    /// The worker thread allowed to push/pop/remove on this pool.
    pub owner: OwnerTag,
}

impl PoolConfig {
    pub fn new(owner: OwnerTag) -> Self {
        Self {
            initial_capacity: 256,
            owner,
        }
    }

    pub fn with_initial_capacity(mut self, capacity: usize) -> Self {
        self.initial_capacity = capacity;
        self
    }
}

/// The uniform pool operation table a scheduling runtime binds to.
///
/// `push`, `pop`, and `remove` may only be called by the pool's owner
/// (§5); `steal` may be called by any thread. Non-owner calls to the
/// owner-only operations are a programming error (§7) and are only
/// caught in debug builds via `debug_assert!`.
pub trait Pool {
    /// The concurrency discipline this pool implements.
    fn access_mode(&self) -> AccessMode;

    /// Advisory live-item count (§4.2.5). Never use for correctness.
    fn size(&self) -> u64;

    /// Owner-only: enqueue `item`. Never fails; allocation failure during
    /// growth is fatal (§11).
    fn push(&self, caller: OwnerTag, item: NonNull<WorkItem>);

    /// Owner-only: dequeue the most recently pushed item (LIFO).
    fn pop(&self, caller: OwnerTag) -> Option<NonNull<WorkItem>>;

    /// Any thread: steal the oldest live item (FIFO).
    fn steal(&self) -> Option<NonNull<WorkItem>>;

    /// Owner-only: cancel a specific queued item.
    fn remove(&self, caller: OwnerTag, item: NonNull<WorkItem>) -> PoolResult<()>;
}

static NEXT_POOL_ID: AtomicU64 = AtomicU64::new(1);

/// The work-stealing-deque-backed pool implementation.
pub struct DequePool {
    id: PoolId,
    owner: OwnerTag,
    deque: Deque,
}

impl DequePool {
    /// Create a new, empty pool. Corresponds to §4.3's `init(config)`.
    pub fn init(config: PoolConfig) -> Self {
        let id = PoolId::new(NEXT_POOL_ID.fetch_add(1, Ordering::Relaxed))
            .expect("pool id counter must never produce zero");
        Self {
            id,
            owner: config.owner,
            deque: Deque::with_capacity(config.initial_capacity),
        }
    }

    /// This pool's identity, used as work items' back-reference.
    pub fn id(&self) -> PoolId {
        self.id
    }

    /// Test-only: reach the backing `Deque` directly, e.g. to force its
    /// indices near wraparound without performing 2^64 real pushes.
    #[cfg(any(test, feature = "test-hooks"))]
    pub fn deque_for_test(&self) -> &Deque {
        &self.deque
    }
}

impl Pool for DequePool {
    fn access_mode(&self) -> AccessMode {
        AccessMode::Spmc
    }

    fn size(&self) -> u64 {
        self.deque.size()
    }

    fn push(&self, caller: OwnerTag, item: NonNull<WorkItem>) {
        debug_assert_eq!(
            caller, self.owner,
            "push called by a thread other than the pool's owner"
        );
        unsafe {
            item.as_ref().set_pool(Some(self.id));
        }
        self.deque.push(item);
    }

    fn pop(&self, caller: OwnerTag) -> Option<NonNull<WorkItem>> {
        debug_assert_eq!(
            caller, self.owner,
            "pop called by a thread other than the pool's owner"
        );
        let item = self.deque.pop()?;
        unsafe {
            item.as_ref().set_pool(None);
        }
        Some(item)
    }

    fn steal(&self) -> Option<NonNull<WorkItem>> {
        let item = self.deque.steal()?;
        unsafe {
            item.as_ref().set_pool(None);
        }
        Some(item)
    }

    fn remove(&self, caller: OwnerTag, item: NonNull<WorkItem>) -> PoolResult<()> {
        // Unlike `push`/`pop`, `remove` already returns a `Result`, so the
        // owner check surfaces as a genuine `Err(PoolError::WrongOwner)`
        // here instead of only panicking via `debug_assert!`. This is
        // still debug-only (§7): release builds skip the check entirely
        // rather than pay for it on every call.
        #[cfg(debug_assertions)]
        if caller != self.owner {
            return Err(PoolError::WrongOwner);
        }
        if self.deque.remove(item) {
            unsafe {
                item.as_ref().set_pool(None);
            }
            Ok(())
        } else {
            Err(PoolError::NotFound)
        }
    }
}

// `DequePool` itself does not own the items it references (§3), so it is
// `Send + Sync` on the same basis as `Deque`.
unsafe impl Send for DequePool {}
unsafe impl Sync for DequePool {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::WorkItem;
    extern crate std;
    use std::boxed::Box;

    const OWNER: OwnerTag = 1;

    fn leaked_item() -> NonNull<WorkItem> {
        static DUMMY: () = ();
        let handle = NonNull::from(&DUMMY).cast();
        let boxed = Box::new(WorkItem::from_thread(handle));
        NonNull::new(Box::into_raw(boxed)).unwrap()
    }

    #[test]
    fn push_sets_pool_back_reference() {
        let pool = DequePool::init(PoolConfig::new(OWNER));
        let item = leaked_item();
        assert!(!unsafe { item.as_ref().in_pool() });
        pool.push(OWNER, item);
        assert!(unsafe { item.as_ref().in_pool() });
        assert_eq!(unsafe { item.as_ref().pool() }, Some(pool.id()));
    }

    #[test]
    fn pop_clears_pool_back_reference() {
        let pool = DequePool::init(PoolConfig::new(OWNER));
        let item = leaked_item();
        pool.push(OWNER, item);
        let popped = pool.pop(OWNER).unwrap();
        assert_eq!(popped, item);
        assert!(!unsafe { item.as_ref().in_pool() });
    }

    #[test]
    fn steal_clears_pool_back_reference() {
        let pool = DequePool::init(PoolConfig::new(OWNER));
        let item = leaked_item();
        pool.push(OWNER, item);
        let stolen = pool.steal().unwrap();
        assert_eq!(stolen, item);
        assert!(!unsafe { item.as_ref().in_pool() });
    }

    #[test]
    fn remove_not_found_reports_error() {
        let pool = DequePool::init(PoolConfig::new(OWNER));
        let item = leaked_item();
        assert_eq!(pool.remove(OWNER, item), Err(PoolError::NotFound));
    }

    #[cfg(debug_assertions)]
    #[test]
    fn remove_from_non_owner_reports_wrong_owner() {
        const OTHER: OwnerTag = OWNER + 1;
        let pool = DequePool::init(PoolConfig::new(OWNER));
        let item = leaked_item();
        pool.push(OWNER, item);
        assert_eq!(pool.remove(OTHER, item), Err(PoolError::WrongOwner));
    }

    #[test]
    fn access_mode_is_spmc() {
        let pool = DequePool::init(PoolConfig::new(OWNER));
        assert_eq!(pool.access_mode(), AccessMode::Spmc);
    }

    #[test]
    fn size_tracks_push_and_pop() {
        let pool = DequePool::init(PoolConfig::new(OWNER));
        assert_eq!(pool.size(), 0);
        pool.push(OWNER, leaked_item());
        pool.push(OWNER, leaked_item());
        assert_eq!(pool.size(), 2);
        pool.pop(OWNER);
        assert_eq!(pool.size(), 1);
    }
}
