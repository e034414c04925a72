#[cfg(all(feature = "asm", target_arch = "x86_64"))]
use crate::{LoadRegisterUnsafe, StoreRegisterUnsafe};
use bitfield_struct::bitfield;
use kernel_memory_addresses::{PhysicalAddress, PhysicalPage, Size4K};

/// CR3: Page-Map Level-4 Base Register (IA-32e, PCID disabled).
///
/// Holds the physical base address of the PML4 table and cache-control flags
/// for PML4 walks. Assumes standard 4 KiB alignment and no PCID (CR4.PCIDE = 0).
#[bitfield(u64)]
pub struct Cr3 {
    /// Bits 0–2: Reserved (must be 0).
    #[bits(3)]
    pub reserved0: u8,

    /// Bit 3: PWT: Page-level Write-Through for PML4.
    ///
    /// Controls write-through vs write-back caching when accessing the PML4
    /// via CR3.
    pub pwt: bool,

    /// Bit 4: PCD: Page-level Cache Disable for PML4.
    ///
    /// When set, disables caching for PML4 accesses.
    pub pcd: bool,

    /// Bits 5–11: Reserved (must be 0 when written).
    #[bits(7)]
    pub reserved1: u8,

    /// Bits 12–51: PML4 physical base >> 12.
    ///
    /// These bits store the physical base address of the PML4 table, shifted
    /// right by 12 (4 KiB alignment). To get the full physical address:
    /// `pml4_base_phys = pml4_base_4k << 12`.
    #[bits(40)]
    pml4_base_4k: u64,

    /// Bits 52–63: Reserved.
    #[bits(12)]
    pub reserved2: u16,
}

impl Cr3 {
    /// CR3 value selecting the PML4 in `root`, write-back cached.
    #[must_use]
    pub fn from_root(root: PhysicalPage<Size4K>) -> Self {
        Self::new().with_pml4_base_4k(root.frame_number())
    }

    /// The PML4 frame this value selects.
    #[must_use]
    pub fn root(&self) -> PhysicalPage<Size4K> {
        PhysicalPage::containing(PhysicalAddress::new(self.pml4_base_4k() << 12))
    }
}

#[cfg(all(feature = "asm", target_arch = "x86_64"))]
impl LoadRegisterUnsafe for Cr3 {
    unsafe fn load_unsafe() -> Self {
        let mut cr3: u64;
        unsafe {
            core::arch::asm!("mov {}, cr3", out(reg) cr3, options(nomem, nostack, preserves_flags));
        }
        Self::from_bits(cr3)
    }
}

#[cfg(all(feature = "asm", target_arch = "x86_64"))]
impl StoreRegisterUnsafe for Cr3 {
    unsafe fn store_unsafe(self) {
        let cr3 = self.into_bits();
        unsafe {
            core::arch::asm!("mov cr3, {}", in(reg) cr3, options(nostack, preserves_flags));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_round_trips() {
        let root = PhysicalPage::containing(PhysicalAddress::new(0x0012_3000));
        let cr3 = Cr3::from_root(root);
        assert_eq!(cr3.into_bits(), 0x0012_3000);
        assert_eq!(cr3.root(), root);
        assert!(!cr3.pwt() && !cr3.pcd());
    }
}
