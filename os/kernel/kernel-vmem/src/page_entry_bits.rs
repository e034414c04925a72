use bitfield_struct::bitfield;
use kernel_memory_addresses::{PhysicalAddress, PhysicalPage, Size4K};

/// A single 64-bit x86-64 page-table entry in raw bitfield form.
///
/// The common superset of PML4E, PDPTE, PDE and PTE fields.
///
/// | Bits      | Name              | Meaning |
/// |-----------|-------------------|----------|
/// | 0         | `P` (present)     | Valid entry if set |
/// | 1         | `RW`              | Writable if set |
/// | 2         | `US`              | User-mode accessible if set |
/// | 3         | `PWT`             | Write-through caching |
/// | 4         | `PCD`             | Disable caching |
/// | 5         | `A`               | Accessed |
/// | 6         | `D`               | Dirty (leaf only) |
/// | 7         | `PS`              | Large page flag (PAT in a PTE) |
/// | 8         | `G`               | Global (leaf only) |
/// | 9–11      | OS avail low      | Reserved for OS use |
/// | 12–51     | `addr`            | Physical frame bits [51:12] |
/// | 52–58     | OS avail high     | Reserved for OS use |
/// | 59–62     | `PKU` / OS use    | Protection key or OS use |
/// | 63        | `NX`              | Execute disable |
///
/// ```rust
/// # use kernel_memory_addresses::*;
/// # use kernel_vmem::PageEntryBits;
/// let frame = PhysicalPage::<Size4K>::containing(PhysicalAddress::new(0x12_3000));
/// let e = PageEntryBits::user_read_only().with_frame(frame);
/// assert!(e.present() && e.user_access() && !e.writable());
/// assert_eq!(e.frame(), frame);
/// ```
#[bitfield(u64)]
#[derive(PartialEq, Eq)]
pub struct PageEntryBits {
    /// Present (P, bit 0).
    pub present: bool,

    /// Writable (RW, bit 1).
    pub writable: bool,

    /// User/Supervisor (US, bit 2).
    pub user_access: bool,

    /// Page Write-Through (PWT, bit 3).
    pub write_through: bool,

    /// Page Cache Disable (PCD, bit 4).
    pub cache_disabled: bool,

    /// Accessed (A, bit 5), set by the CPU.
    pub accessed: bool,

    /// Dirty (D, bit 6), set by the CPU on first write to a leaf.
    pub dirty: bool,

    /// Page Size (PS, bit 7). A set bit in a PDPTE or PDE makes it a 1 GiB or
    /// 2 MiB leaf.
    pub large_page: bool,

    /// Global (G, bit 8), leaf only.
    pub global_translation: bool,

    /// OS-available (bits 9..=11).
    #[bits(3)]
    pub os_available_low: u8,

    /// Physical address bits [51:12].
    #[bits(40)]
    phys_addr_bits_51_12: u64,

    /// OS-available (bits 52..=58).
    #[bits(7)]
    pub os_available_high: u8,

    /// Protection Key (PKU, bits 59..=62).
    #[bits(4)]
    pub protection_key: u8,

    /// No-Execute (NX, bit 63). Requires `EFER.NXE`.
    pub no_execute: bool,
}

impl PageEntryBits {
    /// Mask of everything but the frame address: the entry's protection and
    /// status flags.
    pub const FLAGS_MASK: u64 = !(((1u64 << 40) - 1) << 12);

    #[inline]
    #[must_use]
    pub const fn physical_address(&self) -> PhysicalAddress {
        PhysicalAddress::new(self.phys_addr_bits_51_12() << 12)
    }

    #[inline]
    #[must_use]
    pub const fn frame(&self) -> PhysicalPage<Size4K> {
        PhysicalPage::containing(self.physical_address())
    }

    #[inline]
    #[must_use]
    pub const fn with_frame(self, frame: PhysicalPage<Size4K>) -> Self {
        self.with_phys_addr_bits_51_12(frame.frame_number())
    }

    /// The flag bits of this entry with the address cleared.
    #[inline]
    #[must_use]
    pub const fn flags(&self) -> Self {
        Self::from_bits(self.into_bits() & Self::FLAGS_MASK)
    }

    /// Link to a next-level table: present and writable, user-accessible if
    /// anything below is.
    #[inline]
    #[must_use]
    pub const fn table_link(user: bool) -> Self {
        Self::new()
            .with_present(true)
            .with_writable(true)
            .with_user_access(user)
    }

    /// Kernel read/write data.
    #[inline]
    #[must_use]
    pub const fn kernel_rw() -> Self {
        Self::new().with_present(true).with_writable(true)
    }

    /// User-readable, non-writable, present.
    #[inline]
    #[must_use]
    pub const fn user_read_only() -> Self {
        Self::new().with_present(true).with_user_access(true)
    }

    /// User read/write data.
    #[inline]
    #[must_use]
    pub const fn user_rw() -> Self {
        Self::user_read_only().with_writable(true)
    }
}
