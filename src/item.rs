//! The work item: a tagged, non-owning handle to a schedulable object.
//!
//! A `WorkItem` is never allocated or freed by this crate. It is meant to
//! live inline inside the runtime's thread or task object (the way
//! `ThreadInner` embeds its own bookkeeping fields elsewhere in this
//! crate's sibling modules), and the deque only ever stores a raw pointer
//! to it. `from_thread`/`from_task` initialize a slot the caller already
//! owns; `release` merely forgets the caller's pointer.

use core::ptr::NonNull;
use portable_atomic::{AtomicPtr, AtomicU64, Ordering};

/// Discriminant for the two kinds of schedulable object a work item can
/// reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemKind {
    /// A long-running, preemptible thread.
    Thread,
    /// A short-running, run-to-completion task.
    Task,
}

/// Opaque handle to a thread-like object. The pointee's layout is the
/// runtime's concern; this crate never dereferences it.
pub type ThreadHandle = NonNull<()>;

/// Opaque handle to a task-like object.
pub type TaskHandle = NonNull<()>;

/// A pool's identity, used as the work item's back-reference (invariant 7
/// of the deque state). `None` means "not currently in any pool."
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PoolId(core::num::NonZeroU64);

impl PoolId {
    pub fn new(raw: u64) -> Option<Self> {
        core::num::NonZeroU64::new(raw).map(Self)
    }

    pub fn get(self) -> u64 {
        self.0.get()
    }

    fn to_atomic_repr(opt: Option<Self>) -> u64 {
        opt.map(|p| p.0.get()).unwrap_or(0)
    }

    fn from_atomic_repr(raw: u64) -> Option<Self> {
        core::num::NonZeroU64::new(raw).map(Self)
    }
}

/// A reference to a schedulable object plus the bookkeeping the deque
/// (or any other pool implementation) needs around it.
///
/// Intended usage is `#[repr(C)]`-embedding inside the runtime's own
/// thread/task struct; this crate only ever touches it through
/// `*mut WorkItem`.
pub struct WorkItem {
    kind: ItemKind,
    thread: Option<ThreadHandle>,
    task: Option<TaskHandle>,
    pool: AtomicU64,
    /// Intrusive linkage, unused by the work-stealing deque but preserved
    /// so the same `WorkItem` type works with other pool implementations
    /// (e.g. an FIFO list-based pool) without a second struct definition.
    pub prev: AtomicPtr<WorkItem>,
    pub next: AtomicPtr<WorkItem>,
}

impl WorkItem {
    /// Initialize `slot` in place as a thread-kind work item. Linkage is
    /// zeroed and the pool back-reference starts as "not in any pool."
    pub fn from_thread(handle: ThreadHandle) -> Self {
        Self {
            kind: ItemKind::Thread,
            thread: Some(handle),
            task: None,
            pool: AtomicU64::new(0),
            prev: AtomicPtr::new(core::ptr::null_mut()),
            next: AtomicPtr::new(core::ptr::null_mut()),
        }
    }

    /// Initialize `slot` in place as a task-kind work item.
    pub fn from_task(handle: TaskHandle) -> Self {
        Self {
            kind: ItemKind::Task,
            thread: None,
            task: Some(handle),
            pool: AtomicU64::new(0),
            prev: AtomicPtr::new(core::ptr::null_mut()),
            next: AtomicPtr::new(core::ptr::null_mut()),
        }
    }

    /// The discriminant for this item.
    pub fn kind(&self) -> ItemKind {
        self.kind
    }

    /// The thread handle, if this item wraps a thread; `None` otherwise.
    pub fn as_thread(&self) -> Option<ThreadHandle> {
        match self.kind {
            ItemKind::Thread => self.thread,
            ItemKind::Task => None,
        }
    }

    /// The task handle, if this item wraps a task; `None` otherwise.
    pub fn as_task(&self) -> Option<TaskHandle> {
        match self.kind {
            ItemKind::Task => self.task,
            ItemKind::Thread => None,
        }
    }

    /// Whether the back-reference currently names a pool.
    pub fn in_pool(&self) -> bool {
        self.pool.load(Ordering::Acquire) != 0
    }

    /// The pool currently holding this item, if any.
    pub fn pool(&self) -> Option<PoolId> {
        PoolId::from_atomic_repr(self.pool.load(Ordering::Acquire))
    }

    /// Set the back-reference. Called by the pool facade's `push` when it
    /// accepts the item (see DESIGN.md for why this lives at the facade
    /// layer rather than inside the deque itself).
    pub(crate) fn set_pool(&self, pool: Option<PoolId>) {
        self.pool
            .store(PoolId::to_atomic_repr(pool), Ordering::Release);
    }

    /// Zero the caller's reference to this item. Does not free the item
    /// itself — ownership was never the deque's.
    pub fn release(item_slot: &mut Option<NonNull<WorkItem>>) {
        *item_slot = None;
    }
}

unsafe impl Send for WorkItem {}
unsafe impl Sync for WorkItem {}

#[cfg(test)]
mod tests {
    use super::*;

    fn dummy_handle() -> NonNull<()> {
        static TAG: u8 = 0;
        NonNull::from(&TAG).cast()
    }

    #[test]
    fn from_thread_sets_kind_and_handle() {
        let item = WorkItem::from_thread(dummy_handle());
        assert_eq!(item.kind(), ItemKind::Thread);
        assert!(item.as_thread().is_some());
        assert!(item.as_task().is_none());
        assert!(!item.in_pool());
    }

    #[test]
    fn from_task_sets_kind_and_handle() {
        let item = WorkItem::from_task(dummy_handle());
        assert_eq!(item.kind(), ItemKind::Task);
        assert!(item.as_task().is_some());
        assert!(item.as_thread().is_none());
    }

    #[test]
    fn pool_back_reference_round_trips() {
        let item = WorkItem::from_thread(dummy_handle());
        assert!(!item.in_pool());
        let pid = PoolId::new(7).unwrap();
        item.set_pool(Some(pid));
        assert!(item.in_pool());
        assert_eq!(item.pool(), Some(pid));
        item.set_pool(None);
        assert!(!item.in_pool());
    }

    #[test]
    fn release_clears_caller_slot() {
        let item = WorkItem::from_thread(dummy_handle());
        let mut slot = Some(NonNull::from(&item));
        WorkItem::release(&mut slot);
        assert!(slot.is_none());
    }
}
