//! # Per-Process VDSO Page
//!
//! Every process may carry one private, user-readable page at
//! [`VDSO_ADDR`](kernel_info::vdso::VDSO_ADDR) holding a magic word and its
//! process id, so user space can learn its pid without a system call.
//!
//! Three operations cover the page's life:
//!
//! | Operation                            | Allocates | Writes          |
//! |--------------------------------------|-----------|-----------------|
//! | [`VdsoManager::setup`]               | yes       | magic and pid   |
//! | [`VdsoManager::copy_on_fork`]        | yes       | copy, then pid  |
//! | [`VdsoManager::refresh`]             | no        | pid only        |
//!
//! The page is freed with the rest of the address space
//! ([`AddressSpace::teardown`](kernel_vmem::AddressSpace::teardown)).
//!
//! Every fresh page is held as an [`OwnedFrame`](kernel_alloc::OwnedFrame)
//! until the mapping has been installed, so a failed mapping gives it back to
//! the allocator.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

mod error;
mod manager;

pub use error::VdsoError;
pub use manager::{ForkCopy, Refresh, VdsoManager, VdsoProcess};
