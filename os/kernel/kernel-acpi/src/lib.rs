//! # ACPI Core Discovery
//!
//! Just enough ACPI to answer one question at boot: which processors exist,
//! and what are their local APIC ids?
//!
//! ```text
//! RSDP (firmware hands us its physical address)
//!   ↓
//! XSDT (64-bit entries) or RSDT (32-bit entries)
//!   ↓
//! "APIC" table (MADT)
//!   ↓
//! Processor Local APIC (type 0) / Processor Local x2APIC (type 9) entries
//! ```
//!
//! Firmware tables are treated as untrusted input. Every table is
//! length-checked and checksummed before it is walked, and every entry is
//! bounds-checked against its table, so a malformed table yields an
//! [`AcpiError`] instead of an out-of-bounds read.
//!
//! Physical memory is reached through [`PhysMapRo`], which the kernel
//! implements on top of its direct map and tests implement over byte buffers.
//!
//! ```rust
//! use kernel_acpi::madt::{Madt, MadtEntry};
//!
//! let mut table = Vec::new();
//! table.extend_from_slice(b"APIC");
//! table.extend_from_slice(&52u32.to_le_bytes()); // length
//! table.extend_from_slice(&[3, 0]); // revision, checksum
//! table.extend_from_slice(&[0; 26]); // OEM and creator fields
//! table.extend_from_slice(&0xFEE0_0000u32.to_le_bytes()); // local APIC address
//! table.extend_from_slice(&0u32.to_le_bytes()); // flags
//! table.extend_from_slice(&[0, 8, 0, 0, 1, 0, 0, 0]); // cpu0, APIC id 0, enabled
//! kernel_acpi::seal_table(&mut table);
//!
//! let madt = Madt::parse(&table).unwrap();
//! let first = madt.entries().next().unwrap().unwrap();
//! assert_eq!(first, MadtEntry::LocalApic { processor_uid: 0, apic_id: 0, flags: 1 });
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

mod error;
pub mod madt;
pub mod rsdp;
pub mod sdt;

pub use error::AcpiError;
pub use madt::{ApicIds, Madt, MadtEntry, cpus_from_rsdp, discover_cpus};
pub use rsdp::AcpiRoots;
pub use sdt::{Signature, SdtHeader, find_table};

/// Map a physical region and return a *read-only* byte slice for its contents.
/// You provide the implementation (identity map, HHDM, etc.).
pub trait PhysMapRo {
    /// `None` if any part of the region cannot be reached. Table addresses
    /// come from firmware, so this is an ordinary outcome.
    ///
    /// # Safety
    /// The implementor must ensure a returned slice is valid for `len` bytes.
    unsafe fn map_ro<'a>(&self, paddr: u64, len: usize) -> Option<&'a [u8]>;
}

/// [`PhysMapRo::map_ro`], with an unreachable region reported as an error.
///
/// # Safety
/// As for [`PhysMapRo::map_ro`].
unsafe fn map_checked<'a, M: PhysMapRo + ?Sized>(
    map: &M,
    paddr: u64,
    len: usize,
) -> Result<&'a [u8], AcpiError> {
    unsafe { map.map_ro(paddr, len) }.ok_or(AcpiError::Unmapped { paddr, len })
}

fn sum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0, |a, &b| a.wrapping_add(b))
}

#[inline]
fn read_u32(bytes: &[u8], at: usize) -> Option<u32> {
    Some(u32::from_le_bytes(bytes.get(at..at + 4)?.try_into().ok()?))
}

#[inline]
fn read_u64(bytes: &[u8], at: usize) -> Option<u64> {
    Some(u64::from_le_bytes(bytes.get(at..at + 8)?.try_into().ok()?))
}

/// Fix up byte 9 (the header checksum) so the whole table sums to zero.
#[doc(hidden)]
pub fn seal_table(table: &mut [u8]) {
    if table.len() > 9 {
        table[9] = 0;
        table[9] = 0u8.wrapping_sub(sum(table));
    }
}
