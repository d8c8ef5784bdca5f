//! The foreign-operation lock.
//!
//! Steals, grows, wraparound collapses, and the contended arm of owner
//! pop/remove all serialize through this lock. It is a ticket lock rather
//! than a generic blocking mutex: foreign operations are expected to be
//! brief (an index bump and at most a slot read), so a fair spinlock avoids
//! both the overhead of a futex-backed mutex and the starvation a naive
//! test-and-set spinlock permits under contention from many thieves.

use portable_atomic::{AtomicU32, Ordering};

/// A fair spinlock: waiters are served in the order they arrived.
pub struct TicketLock {
    next_ticket: AtomicU32,
    now_serving: AtomicU32,
}

/// RAII guard releasing the lock on drop.
pub struct TicketLockGuard<'a> {
    lock: &'a TicketLock,
}

impl TicketLock {
    pub const fn new() -> Self {
        Self {
            next_ticket: AtomicU32::new(0),
            now_serving: AtomicU32::new(0),
        }
    }

    /// Spin until this call holds the lock.
    pub fn lock(&self) -> TicketLockGuard<'_> {
        let my_ticket = self.next_ticket.fetch_add(1, Ordering::Relaxed);
        while self.now_serving.load(Ordering::Acquire) != my_ticket {
            core::hint::spin_loop();
        }
        TicketLockGuard { lock: self }
    }
}

impl Default for TicketLock {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for TicketLockGuard<'_> {
    fn drop(&mut self) {
        self.lock.now_serving.fetch_add(1, Ordering::Release);
    }
}

unsafe impl Send for TicketLock {}
unsafe impl Sync for TicketLock {}
