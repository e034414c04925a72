use crate::PageEntryBits;
use kernel_memory_addresses::VirtualAddress;

/// Entries per table at every level.
pub const ENTRIES: usize = 512;

/// PML4 entries covering the lower (user) half of the address space.
pub const USER_HALF_ENTRIES: usize = ENTRIES / 2;

/// One 4 KiB page table at any level.
#[repr(C, align(4096))]
pub struct PageTable {
    entries: [PageEntryBits; ENTRIES],
}

impl PageTable {
    #[inline]
    #[must_use]
    pub fn get(&self, index: usize) -> PageEntryBits {
        self.entries[index]
    }

    #[inline]
    pub fn set(&mut self, index: usize, entry: PageEntryBits) {
        self.entries[index] = entry;
    }

    #[inline]
    pub fn zero(&mut self) {
        self.entries.fill(PageEntryBits::new());
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.iter().all(|e| !e.present())
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, PageEntryBits)> + '_ {
        self.entries.iter().copied().enumerate()
    }
}

/// Per-level table indices of a virtual address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableIndices {
    pub pml4: usize,
    pub pdpt: usize,
    pub pd: usize,
    pub pt: usize,
}

impl TableIndices {
    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn of(va: VirtualAddress) -> Self {
        let v = va.as_u64();
        Self {
            pml4: ((v >> 39) & 0x1FF) as usize,
            pdpt: ((v >> 30) & 0x1FF) as usize,
            pd: ((v >> 21) & 0x1FF) as usize,
            pt: ((v >> 12) & 0x1FF) as usize,
        }
    }

    /// Indices from the root down to the PT.
    #[inline]
    #[must_use]
    pub const fn path(&self) -> [usize; 4] {
        [self.pml4, self.pdpt, self.pd, self.pt]
    }
}

const _: () = assert!(size_of::<PageTable>() == 4096);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vdso_address_indices() {
        // 0x4000_0000 = 1 GiB: PDPT slot 1, everything else 0.
        let ix = TableIndices::of(VirtualAddress::new(0x4000_0000));
        assert_eq!(ix.path(), [0, 1, 0, 0]);
    }

    #[test]
    fn higher_half_indices() {
        let ix = TableIndices::of(VirtualAddress::new(0xFFFF_8880_0000_7000));
        assert_eq!(ix.pml4, 273);
        assert_eq!(ix.pt, 7);
    }
}
