#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]
#![forbid(unreachable_pub)]

//! A work-stealing deque pool for user-level threading runtimes.
//!
//! This crate implements the single data structure a work-stealing
//! scheduler needs to balance load across workers: one owner thread
//! pushes and pops at the tail of a circular buffer, while any number of
//! foreign ("thief") threads steal from the head. Everything around it —
//! the scheduler loop, worker threads, the objects a [`WorkItem`]
//! ultimately refers to — is left to the embedding runtime.
//!
//! # Quick start
//!
//! ```
//! use core::ptr::NonNull;
//! use wsdeque_pool::{DequePool, Pool, PoolConfig, WorkItem};
//!
//! const OWNER: u64 = 0;
//! let pool = DequePool::init(PoolConfig::new(OWNER));
//!
//! static PLACEHOLDER: () = ();
//! let handle = NonNull::from(&PLACEHOLDER).cast();
//! let mut item = WorkItem::from_task(handle);
//! let item_ref = NonNull::from(&mut item);
//!
//! pool.push(OWNER, item_ref);
//! assert_eq!(pool.size(), 1);
//! assert_eq!(pool.pop(OWNER), Some(item_ref));
//! ```
//!
//! # Module layout
//!
//! - [`item`] — the tagged, non-owning work-item handle (§4.1 of the
//!   design).
//! - [`deque`] — the circular buffer, indices, and foreign lock
//!   coordination protocol (§4.2): this is the bulk of the crate.
//! - [`pool`] — the uniform operation table the scheduler binds to
//!   (§4.3).
//! - [`lock`] — the ticket-lock foreign lock primitive.
//! - [`errors`] — the facade's error taxonomy.

pub mod deque;
pub mod errors;
pub mod item;
pub mod lock;
pub mod pool;

#[cfg(test)]
extern crate std;

extern crate alloc;

pub use deque::Deque;
pub use errors::{PoolError, PoolResult};
pub use item::{ItemKind, PoolId, TaskHandle, ThreadHandle, WorkItem};
pub use lock::TicketLock;
pub use pool::{AccessMode, DequePool, OwnerTag, Pool, PoolConfig};
