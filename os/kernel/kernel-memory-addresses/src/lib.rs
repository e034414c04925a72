//! # Virtual and Physical Memory Address Types
//!
//! Strongly typed wrappers for raw memory addresses and page bases used by the
//! page-table primitive, the physical allocator, the SMP trampoline and the
//! VDSO page manager.
//!
//! ## Overview
//!
//! | Concept | Description |
//! |----------|-------------|
//! | [`MemoryAddress`] | A raw 64-bit address, either physical or virtual. |
//! | [`MemoryPage<S>`] | A page-aligned base address of a page of size `S`. |
//! | [`MemoryAddressOffset<S>`] | An offset within a page of size `S`. |
//! | [`VirtualAddress`] / [`VirtualPage<S>`] | Page-table translated memory. |
//! | [`PhysicalAddress`] / [`PhysicalPage<S>`] | Physical memory or MMIO regions. |
//! | [`DirectMap`] | The only sanctioned conversion between the two kinds. |
//!
//! Virtual and physical addresses never mix implicitly: there is no `From`
//! between them. Code that needs the kernel-visible alias of a physical frame
//! goes through [`DirectMap::to_virtual`], which refuses addresses outside the
//! mapped window instead of silently producing a wild pointer.
//!
//! ```rust
//! # use kernel_memory_addresses::*;
//! let map = DirectMap::new(VirtualAddress::new(0xFFFF_8880_0000_0000), 0x1_0000_0000);
//! let pa = PhysicalAddress::new(0x7000);
//! let va = map.to_virtual(pa).unwrap();
//! assert_eq!(va.as_u64(), 0xFFFF_8880_0000_7000);
//! assert_eq!(map.to_physical(va).unwrap(), pa);
//! assert!(map.to_virtual(PhysicalAddress::new(0x1_0000_0000)).is_err());
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code, clippy::inline_always)]

mod direct_map;
mod error;
mod memory_address;
mod memory_address_offset;
mod memory_page;
mod page_size;
mod physical_address;
mod virtual_address;

pub use direct_map::DirectMap;
pub use error::AddressError;
pub use memory_address::MemoryAddress;
pub use memory_address_offset::MemoryAddressOffset;
pub use memory_page::MemoryPage;
pub use page_size::{PageSize, Size1G, Size2M, Size4K};
pub use physical_address::{PhysicalAddress, PhysicalPage};
pub use virtual_address::{VirtualAddress, VirtualPage};
