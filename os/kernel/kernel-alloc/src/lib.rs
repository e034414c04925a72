//! # Physical Memory for the Kernel
//!
//! ```text
//! ┌──────────────────────────────┐
//! │  OwnedFrame (scoped frame)   │  frees on drop unless released
//! └──────────────┬───────────────┘
//!                │
//! ┌──────────────▼───────────────┐      ┌──────────────────────────┐
//! │  BitmapFrameAlloc            │      │  HhdmPhysMapper          │
//! │  one bit per 4 KiB frame     │      │  pa → HHDM_BASE + pa     │
//! └──────────────────────────────┘      └──────────────────────────┘
//! ```
//!
//! Both halves plug into the [`FrameAlloc`](kernel_vmem::FrameAlloc) and
//! [`PhysMapper`](kernel_vmem::PhysMapper) seams of `kernel-vmem`. The kernel
//! keeps a single allocator behind a [`SpinLock`](kernel_sync::SpinLock) and
//! hands out [`LockedFrameAlloc`] views of it to every core.
//!
//! With the `test-utils` feature the [`testing`] module provides fake physical
//! memory and instrumented allocators so the rest of the kernel can be
//! exercised on the host.

#![cfg_attr(not(any(test, doctest, feature = "test-utils")), no_std)]
#![allow(unsafe_code)]

pub mod frame_alloc;
mod owned_frame;
pub mod phys_mapper;
#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use frame_alloc::{BitmapFrameAlloc, LockedFrameAlloc};
pub use owned_frame::OwnedFrame;
pub use phys_mapper::HhdmPhysMapper;
