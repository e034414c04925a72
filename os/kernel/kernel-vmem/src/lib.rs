//! # Virtual Memory Support
//!
//! The page-table primitive used by the rest of the kernel: build an address
//! space, install or look up single 4 KiB mappings, and tear it down again.
//!
//! ## x86-64 Virtual Address → Physical Address Walk
//!
//! ```text
//! | 47‒39 | 38‒30 | 29‒21 | 20‒12 | 11‒0   |
//! |  PML4 |  PDPT |   PD  |   PT  | Offset |
//! ```
//!
//! Each level is a 4 KiB table of 512 entries of type [`PageEntryBits`]. Only
//! the PT level holds leaves here; a `PS` bit found on the way down is
//! reported as [`MapError::HugePage`] instead of being walked through.
//!
//! ## Collaborators
//!
//! * [`FrameAlloc`] hands out and takes back physical 4 KiB frames.
//! * [`PhysMapper`] makes a physical frame addressable by the running code
//!   (the HHDM in the kernel, a heap buffer in tests).
//!
//! Neither is implemented here, so the same code runs on bare metal and under
//! the host test harness.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code, clippy::inline_always)]

pub mod address_space;
mod error;
mod page_entry_bits;
mod page_table;

pub use crate::address_space::{AddressSpace, RootPage};
pub use crate::error::MapError;
pub use crate::page_entry_bits::PageEntryBits;
pub use crate::page_table::{ENTRIES, PageTable, TableIndices, USER_HALF_ENTRIES};

use kernel_memory_addresses::{PhysicalAddress, PhysicalPage, Size4K};

/// Size of one frame in bytes.
pub const FRAME_SIZE: usize = 4096;

/// Source of physical 4 KiB frames.
///
/// Allocation may fail under memory pressure; callers must handle `None`.
pub trait FrameAlloc {
    /// Allocate one frame. Contents are unspecified.
    fn alloc_4k(&mut self) -> Option<PhysicalPage<Size4K>>;

    /// Return a frame obtained from [`alloc_4k`](Self::alloc_4k).
    fn free_4k(&mut self, frame: PhysicalPage<Size4K>);

    /// Allocate `count` physically contiguous frames, returning the lowest.
    ///
    /// The default only succeeds for `count == 1`.
    fn alloc_contiguous_4k(&mut self, count: usize) -> Option<PhysicalPage<Size4K>> {
        if count == 1 { self.alloc_4k() } else { None }
    }

    /// Return a run obtained from [`alloc_contiguous_4k`](Self::alloc_contiguous_4k).
    fn free_contiguous_4k(&mut self, first: PhysicalPage<Size4K>, count: usize) {
        for i in 0..count as u64 {
            if let Some(frame) = first.checked_step(i) {
                self.free_4k(frame);
            }
        }
    }
}

impl<A: FrameAlloc + ?Sized> FrameAlloc for &mut A {
    fn alloc_4k(&mut self) -> Option<PhysicalPage<Size4K>> {
        (**self).alloc_4k()
    }

    fn free_4k(&mut self, frame: PhysicalPage<Size4K>) {
        (**self).free_4k(frame);
    }

    fn alloc_contiguous_4k(&mut self, count: usize) -> Option<PhysicalPage<Size4K>> {
        (**self).alloc_contiguous_4k(count)
    }

    fn free_contiguous_4k(&mut self, first: PhysicalPage<Size4K>, count: usize) {
        (**self).free_contiguous_4k(first, count);
    }
}

/// Makes physical memory addressable.
pub trait PhysMapper {
    /// Reference a `T` living at physical address `at`.
    ///
    /// # Safety
    /// - `at` must be mapped by this mapper, suitably aligned for `T`, and the
    ///   bytes there must be a valid `T`.
    /// - The caller must not create overlapping live references.
    unsafe fn phys_to_mut<'a, T>(&self, at: PhysicalAddress) -> &'a mut T;

    /// The bytes of one frame.
    ///
    /// # Safety
    /// Same as [`phys_to_mut`](Self::phys_to_mut); typically the caller owns
    /// the frame exclusively.
    #[inline]
    unsafe fn frame_bytes<'a>(&self, frame: PhysicalPage<Size4K>) -> &'a mut [u8; FRAME_SIZE] {
        unsafe { self.phys_to_mut(frame.base()) }
    }

    /// A frame viewed as a page table.
    ///
    /// # Safety
    /// Same as [`phys_to_mut`](Self::phys_to_mut).
    #[inline]
    unsafe fn table_mut<'a>(&self, frame: PhysicalPage<Size4K>) -> &'a mut PageTable {
        unsafe { self.phys_to_mut(frame.base()) }
    }
}

impl<M: PhysMapper + ?Sized> PhysMapper for &M {
    unsafe fn phys_to_mut<'a, T>(&self, at: PhysicalAddress) -> &'a mut T {
        unsafe { (**self).phys_to_mut(at) }
    }
}
