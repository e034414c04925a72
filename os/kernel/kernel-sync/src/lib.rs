//! # Kernel synchronization primitives
//!
//! Boot-stage primitives that work before any scheduler exists:
//!
//! * [`Latch`]: a one-shot flag a core raises exactly once and others poll.
//! * [`SpinLock`]: a test-and-test-and-set lock for shared allocator state.
//! * [`SyncOnceCell`]: write-once storage for boot-time singletons.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

mod latch;
mod spin_lock;
mod sync_once_cell;

pub use latch::{Latch, SpinTimeout};
pub use spin_lock::{SpinLock, SpinLockGuard};
pub use sync_once_cell::SyncOnceCell;
