//! The circular-buffer deque state: push/pop/steal/remove and growth.
//!
//! This is a fairly direct port of the Argobots `deque` pool (see
//! DESIGN.md) rather than a lock-free Chase-Lev deque: the owner's fast
//! paths are lock-free single-atomic-RMW operations, but steals, grows,
//! wraparound collapses, and contended owner paths all serialize through
//! `TicketLock`. Do not replace the tombstone-on-remove design with
//! shifting compaction; see §9 of the design notes this crate carries
//! forward (`SPEC_FULL.md`) for why that trade-off is intentional.

use crate::item::WorkItem;
use crate::lock::TicketLock;
use core::ptr::NonNull;
use core::sync::atomic::Ordering as CoreOrdering;
use portable_atomic::{AtomicPtr, AtomicU64, AtomicUsize, Ordering};

extern crate alloc;
use alloc::alloc::{alloc_zeroed, dealloc, handle_alloc_error, Layout};

const INITIAL_CAPACITY: usize = 256;

/// Cap on how many consecutive tombstones a single `pop`/`steal` call will
/// skip before giving up for that call (open question (c) in
/// `SPEC_FULL.md`: the original algorithm can spin forever on a
/// tombstone-saturated deque; in practice tombstone density is bounded by
/// how often `remove` is used, but an explicit cap keeps that an
/// engineering observation rather than a correctness dependency).
const MAX_TOMBSTONE_RETRIES: u32 = 1024;

/// The work-stealing circular buffer.
///
/// `Deque` is `Send + Sync`: the owner and any number of thieves are
/// expected to hold `&Deque` concurrently from different threads. Nothing
/// here enforces that only one thread ever calls `push`/`pop`/`remove` —
/// that discipline is the caller's responsibility (§5 of the design).
pub struct Deque {
    array: AtomicPtr<AtomicPtr<WorkItem>>,
    array_len: AtomicUsize,
    mask: AtomicUsize,
    head: AtomicU64,
    tail: AtomicU64,
    foreign_lock: TicketLock,
}

impl Deque {
    /// Create an empty deque with the given initial capacity (must be a
    /// power of two; §3 specifies 256 as the default).
    pub fn with_capacity(initial_capacity: usize) -> Self {
        assert!(
            initial_capacity.is_power_of_two() && initial_capacity > 0,
            "deque capacity must be a nonzero power of two"
        );
        let array = alloc_slots(initial_capacity);
        Self {
            array: AtomicPtr::new(array),
            array_len: AtomicUsize::new(initial_capacity),
            mask: AtomicUsize::new(initial_capacity - 1),
            head: AtomicU64::new(0),
            tail: AtomicU64::new(0),
            foreign_lock: TicketLock::new(),
        }
    }

    /// Advisory count of live items. May be stale or momentarily overshoot
    /// by one during a speculative steal/pop; never use this for
    /// correctness (§4.2.5).
    pub fn size(&self) -> u64 {
        let tail = self.tail.load(Ordering::Relaxed);
        let head = self.head.load(Ordering::Relaxed);
        tail.saturating_sub(head)
    }

    /// Owner-only: push `item` onto the tail. Never fails for the caller;
    /// an allocation failure during grow aborts the process the same way
    /// `Vec`'s allocator failure does (§11).
    pub fn push(&self, item: NonNull<WorkItem>) {
        let mut tail = self.tail.load(Ordering::Relaxed);

        // Wrap guard: collapse both indices into the current ring window
        // before they'd overflow their integer type.
        if tail == u64::MAX {
            let _guard = self.foreign_lock.lock();
            if self.tail.load(Ordering::Relaxed) == u64::MAX {
                let mask = self.mask.load(Ordering::Relaxed) as u64;
                let head = self.head.load(Ordering::Relaxed);
                self.head.store(head & mask, Ordering::Relaxed);
                self.tail.store(self.tail.load(Ordering::Relaxed) & mask, Ordering::Relaxed);
            }
            tail = self.tail.load(Ordering::Relaxed);
        }

        let mask = self.mask.load(Ordering::Relaxed) as u64;
        let head = self.head.load(Ordering::Relaxed);

        if tail < head + mask {
            // Fast path: at least two free slots, no contention possible.
            let slot = self.slot_ptr(tail & mask);
            unsafe {
                (*slot).store(item.as_ptr(), Ordering::Release);
            }
            self.tail.store(tail + 1, Ordering::Release);
            return;
        }

        // Slow path: close to full, must contend with foreign steals.
        // `tail` stays the value snapshotted above unless `grow` below
        // rebases it — the owner is single-threaded, so nothing else can
        // move it out from under us in the meantime.
        let _guard = self.foreign_lock.lock();
        let head = self.head.load(Ordering::Relaxed);
        let mask = self.mask.load(Ordering::Relaxed) as u64;
        let count = self.tail.load(Ordering::Relaxed) - head;

        if count >= mask {
            tail = self.grow(head, count);
        }

        let mask = self.mask.load(Ordering::Relaxed) as u64;
        let slot = self.slot_ptr(tail & mask);
        unsafe {
            (*slot).store(item.as_ptr(), Ordering::Release);
        }
        self.tail.store(tail + 1, Ordering::Release);
    }

    /// Owner-only: pop the most recently pushed item (LIFO), or `None` if
    /// the deque is empty or a racing steal won the last element.
    pub fn pop(&self) -> Option<NonNull<WorkItem>> {
        let mut retries = 0u32;
        loop {
            let tail = self.tail.load(Ordering::Relaxed);
            let head = self.head.load(Ordering::Relaxed);
            if head >= tail {
                return None;
            }

            let new_tail = tail - 1;
            // Speculative decrement with a full fence: this is the
            // linearization point against a concurrent steal's own
            // speculative head advance (see the design notes on why this
            // must not be weakened to a release-only store).
            self.tail.store(new_tail, Ordering::SeqCst);
            core::sync::atomic::fence(CoreOrdering::SeqCst);

            let head = self.head.load(Ordering::SeqCst);

            if head <= new_tail {
                // Uncontended: no steal can have taken this slot.
                let mask = self.mask.load(Ordering::Relaxed) as u64;
                let slot = self.slot_ptr(new_tail & mask);
                let raw = unsafe { (*slot).swap(core::ptr::null_mut(), Ordering::AcqRel) };
                match NonNull::new(raw) {
                    Some(item) => return Some(item),
                    None => {
                        // Tombstone: keep scanning toward the head.
                        retries += 1;
                        if retries >= MAX_TOMBSTONE_RETRIES {
                            log::trace!("pop: tombstone retry cap reached, giving up for this call");
                            return None;
                        }
                        continue;
                    }
                }
            }

            // Contended with a steal for the single remaining element.
            let _guard = self.foreign_lock.lock();
            let head = self.head.load(Ordering::Relaxed);
            if head <= new_tail {
                let mask = self.mask.load(Ordering::Relaxed) as u64;
                let slot = self.slot_ptr(new_tail & mask);
                let raw = unsafe { (*slot).swap(core::ptr::null_mut(), Ordering::AcqRel) };
                match NonNull::new(raw) {
                    Some(item) => return Some(item),
                    None => {
                        retries += 1;
                        if retries >= MAX_TOMBSTONE_RETRIES {
                            log::trace!("pop: tombstone retry cap reached, giving up for this call");
                            return None;
                        }
                        continue;
                    }
                }
            } else {
                // The stealer won the race; restore the tail.
                self.tail.store(new_tail + 1, Ordering::Relaxed);
                return None;
            }
        }
    }

    /// Any thread: steal the oldest live item (FIFO from the thief's
    /// perspective), or `None` if nothing is currently available to steal.
    pub fn steal(&self) -> Option<NonNull<WorkItem>> {
        let mut retries = 0u32;
        loop {
            let head = self.head.load(Ordering::Relaxed);
            let tail = self.tail.load(Ordering::Relaxed);
            if head >= tail {
                return None;
            }

            let _guard = self.foreign_lock.lock();
            let head = self.head.load(Ordering::Relaxed);
            // Speculative advance with a full fence, paired with the fence
            // in `pop`.
            self.head.store(head + 1, Ordering::SeqCst);
            core::sync::atomic::fence(CoreOrdering::SeqCst);

            let tail = self.tail.load(Ordering::SeqCst);

            if head < tail {
                let mask = self.mask.load(Ordering::Relaxed) as u64;
                let slot = self.slot_ptr(head & mask);
                let raw = unsafe { (*slot).swap(core::ptr::null_mut(), Ordering::AcqRel) };
                match NonNull::new(raw) {
                    Some(item) => return Some(item),
                    None => {
                        // Tombstone: the slot we claimed had already been
                        // removed. Drop the lock and retry from the top;
                        // `head` has already moved past it for everyone.
                        drop(_guard);
                        retries += 1;
                        if retries >= MAX_TOMBSTONE_RETRIES {
                            log::trace!(
                                "steal: tombstone retry cap reached, giving up for this call"
                            );
                            return None;
                        }
                        continue;
                    }
                }
            } else {
                // Lost the race (deque emptied under us); restore head.
                self.head.store(head, Ordering::Relaxed);
                return None;
            }
        }
    }

    /// Owner-only: remove a specific item wherever it lives in the deque.
    /// Returns `true` if the item was present and removed.
    pub fn remove(&self, item: NonNull<WorkItem>) -> bool {
        let tail = self.tail.load(Ordering::Relaxed);
        let head = self.head.load(Ordering::Relaxed);
        if head >= tail {
            return false;
        }
        let mask = self.mask.load(Ordering::Relaxed) as u64;

        // Tail fast path: delegate to pop, which already handles the
        // steal race for the last/most-recent slot.
        let tail_slot = self.slot_ptr((tail - 1) & mask);
        if unsafe { (*tail_slot).load(Ordering::Acquire) } == item.as_ptr() {
            return self.pop().is_some();
        }

        if tail < 2 {
            return false;
        }

        let mut i = tail - 2;
        loop {
            if i < head {
                return false;
            }
            let mask = self.mask.load(Ordering::Relaxed) as u64;
            let slot = self.slot_ptr(i & mask);
            if unsafe { (*slot).load(Ordering::Acquire) } == item.as_ptr() {
                let _guard = self.foreign_lock.lock();
                let current = unsafe { (*slot).load(Ordering::Acquire) };
                if current.is_null() {
                    // A stealer or the owner's pop already took it.
                    return false;
                }
                unsafe {
                    (*slot).store(core::ptr::null_mut(), Ordering::Release);
                }

                let tail_now = self.tail.load(Ordering::Relaxed);
                let head_now = self.head.load(Ordering::Relaxed);
                if i == tail_now {
                    self.tail.store(tail_now - 1, Ordering::Relaxed);
                } else if i == head_now {
                    self.head.store(head_now + 1, Ordering::Relaxed);
                }
                return true;
            }
            if i == 0 {
                return false;
            }
            i -= 1;
        }
    }

    /// Double the backing array's capacity, copying the live window into
    /// the new layout starting at index 0. Must be called with
    /// `foreign_lock` held. Returns the new tail value (`count`), which
    /// the caller uses to place the item that triggered the grow.
    fn grow(&self, head: u64, count: u64) -> u64 {
        let old_len = self.array_len.load(Ordering::Relaxed);
        let old_mask = self.mask.load(Ordering::Relaxed) as u64;
        let old_array = self.array.load(Ordering::Relaxed);

        let new_len = old_len << 1;
        let new_array = alloc_slots(new_len);

        // Copy the full old physical array (not just the live count): this
        // preserves invariant 5 (NULL outside the live range) for free,
        // since everything outside the old live window was already NULL.
        for i in 0..old_len as u64 {
            let src_idx = (i + head) & old_mask;
            let src_slot = unsafe { old_array.add(src_idx as usize) };
            let value = unsafe { (*src_slot).load(Ordering::Relaxed) };
            let dst_slot = unsafe { new_array.add(i as usize) };
            unsafe {
                (*dst_slot).store(value, Ordering::Relaxed);
            }
        }

        self.array.store(new_array, Ordering::Release);
        self.head.store(0, Ordering::Release);
        self.tail.store(count, Ordering::Release);
        self.mask.store((new_len - 1) as usize, Ordering::Release);
        self.array_len.store(new_len, Ordering::Release);

        log::debug!("deque grow: {} -> {} slots", old_len, new_len);

        let old_layout = Layout::array::<AtomicPtr<WorkItem>>(old_len)
            .expect("layout for previous deque capacity must be valid");
        unsafe {
            dealloc(old_array as *mut u8, old_layout);
        }

        count
    }

    #[inline]
    fn slot_ptr(&self, idx: u64) -> *const AtomicPtr<WorkItem> {
        let base = self.array.load(Ordering::Acquire);
        unsafe { base.add(idx as usize) }
    }

    /// Test-only: force head/tail near their maximum to exercise the
    /// wraparound guard without waiting for 2^64 real pushes.
    #[cfg(any(test, feature = "test-hooks"))]
    pub fn force_indices_for_test(&self, head: u64, tail: u64) {
        self.head.store(head, Ordering::SeqCst);
        self.tail.store(tail, Ordering::SeqCst);
    }

    #[cfg(any(test, feature = "test-hooks"))]
    pub fn capacity_for_test(&self) -> usize {
        self.array_len.load(Ordering::Relaxed)
    }

    #[cfg(any(test, feature = "test-hooks"))]
    pub fn indices_for_test(&self) -> (u64, u64) {
        (
            self.head.load(Ordering::Relaxed),
            self.tail.load(Ordering::Relaxed),
        )
    }
}

fn alloc_slots(len: usize) -> *mut AtomicPtr<WorkItem> {
    let layout =
        Layout::array::<AtomicPtr<WorkItem>>(len).expect("deque capacity layout overflow");
    // SAFETY: a zeroed `AtomicPtr<T>` is a null pointer, which is our
    // tombstone/empty-slot sentinel, so zero-initialization is valid.
    let raw = unsafe { alloc_zeroed(layout) } as *mut AtomicPtr<WorkItem>;
    if raw.is_null() {
        handle_alloc_error(layout);
    }
    raw
}

impl Drop for Deque {
    fn drop(&mut self) {
        let len = self.array_len.load(Ordering::Relaxed);
        let array = self.array.load(Ordering::Relaxed);
        let layout = Layout::array::<AtomicPtr<WorkItem>>(len)
            .expect("layout for deque capacity must be valid");
        unsafe {
            dealloc(array as *mut u8, layout);
        }
    }
}

unsafe impl Send for Deque {}
unsafe impl Sync for Deque {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::WorkItem;
    extern crate std;
    use std::boxed::Box;
    use std::vec::Vec;

    fn leaked_item() -> NonNull<WorkItem> {
        static DUMMY: () = ();
        let handle = NonNull::from(&DUMMY).cast();
        let boxed = Box::new(WorkItem::from_task(handle));
        NonNull::new(Box::into_raw(boxed)).unwrap()
    }

    #[test]
    fn new_deque_is_empty() {
        let deque = Deque::with_capacity(INITIAL_CAPACITY);
        assert_eq!(deque.size(), 0);
        assert!(deque.pop().is_none());
        assert!(deque.steal().is_none());
    }

    #[test]
    fn push_then_pop_lifo() {
        let deque = Deque::with_capacity(INITIAL_CAPACITY);
        let items: Vec<_> = (0..10).map(|_| leaked_item()).collect();
        for item in &items {
            deque.push(*item);
        }
        for item in items.iter().rev() {
            assert_eq!(deque.pop(), Some(*item));
        }
        assert!(deque.pop().is_none());
    }

    #[test]
    fn push_then_steal_fifo() {
        let deque = Deque::with_capacity(INITIAL_CAPACITY);
        let items: Vec<_> = (0..10).map(|_| leaked_item()).collect();
        for item in &items {
            deque.push(*item);
        }
        for item in items.iter() {
            assert_eq!(deque.steal(), Some(*item));
        }
        assert!(deque.steal().is_none());
    }

    #[test]
    fn grow_preserves_order() {
        let deque = Deque::with_capacity(256);
        let items: Vec<_> = (0..257).map(|_| leaked_item()).collect();
        for item in &items {
            deque.push(*item);
        }
        assert!(deque.capacity_for_test() >= 512);
        for item in items.iter().rev() {
            assert_eq!(deque.pop(), Some(*item));
        }
        assert!(deque.pop().is_none());
    }

    #[test]
    fn remove_tail_is_equivalent_to_pop() {
        let deque = Deque::with_capacity(INITIAL_CAPACITY);
        let a = leaked_item();
        let b = leaked_item();
        deque.push(a);
        deque.push(b);
        assert!(deque.remove(b));
        assert_eq!(deque.pop(), Some(a));
    }

    #[test]
    fn remove_mid_deque_leaves_tombstone() {
        let deque = Deque::with_capacity(INITIAL_CAPACITY);
        let items: Vec<_> = (0..5).map(|_| leaked_item()).collect();
        for item in &items {
            deque.push(*item);
        }
        // Remove C (index 2).
        assert!(deque.remove(items[2]));
        assert!(!deque.remove(items[2])); // already gone

        assert_eq!(deque.steal(), Some(items[0]));
        assert_eq!(deque.steal(), Some(items[1]));
        assert_eq!(deque.steal(), Some(items[3]));
        assert_eq!(deque.steal(), Some(items[4]));
        assert!(deque.steal().is_none());
    }

    #[test]
    fn remove_head_edge_advances_head() {
        let deque = Deque::with_capacity(INITIAL_CAPACITY);
        let a = leaked_item();
        let b = leaked_item();
        let c = leaked_item();
        deque.push(a);
        deque.push(b);
        deque.push(c);

        assert!(deque.remove(a));
        assert_eq!(deque.steal(), Some(b));
        assert_eq!(deque.steal(), Some(c));
    }

    #[test]
    fn remove_not_found_on_empty() {
        let deque = Deque::with_capacity(INITIAL_CAPACITY);
        let item = leaked_item();
        assert!(!deque.remove(item));
    }

    #[test]
    fn wraparound_collapses_indices() {
        let deque = Deque::with_capacity(INITIAL_CAPACITY);
        // Force head/tail to the brink of overflow while the deque is
        // still empty. A pre-pushed item would physically land at the
        // slot its index implied at push time, which stays fixed even
        // after we overwrite head/tail here — so unless the forced
        // values are congruent (mod capacity) with that slot, a later
        // pop would look for the item at the wrong place. Forcing the
        // collapse on an empty deque sidesteps that and tests exactly
        // what scenario 3 asks for: the item pushed after the collapse
        // round-trips.
        deque.force_indices_for_test(u64::MAX, u64::MAX);
        let b = leaked_item();
        deque.push(b);

        let (head, tail) = deque.indices_for_test();
        assert!(tail <= deque.capacity_for_test() as u64);
        assert_eq!(tail - head, 1);

        assert_eq!(deque.pop(), Some(b));
        assert!(deque.pop().is_none());
    }
}
