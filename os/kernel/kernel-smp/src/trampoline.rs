//! The shared low-memory region an application processor starts in.

use crate::SmpError;
use kernel_info::smp::{FOOTER_SIZE, TRAMPOLINE_MAX_CODE, TRAMPOLINE_PHYS, footer};
use kernel_memory_addresses::{PhysicalAddress, VirtualAddress};
use kernel_vmem::PhysMapper;

/// What an application processor needs to know when it leaves the stub.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApBootParameters {
    /// Initial kernel stack pointer, used once long mode is reached.
    pub stack_top: VirtualAddress,
    /// Where the stub jumps after enabling paging. Must be below 4 GiB.
    pub entry: PhysicalAddress,
    /// Top of the temporary stack used inside the stub.
    pub stack_reserve: u32,
    /// Page-table root loaded before paging is enabled. Must be below 4 GiB.
    pub page_table_root: PhysicalAddress,
}

/// Checked view of the trampoline: the parameter footer followed by the stub.
///
/// ```text
/// region[0..24]    footer (TRAMPOLINE_PHYS - 24 .. TRAMPOLINE_PHYS)
/// region[24..]     entry stub (TRAMPOLINE_PHYS ..)
/// ```
pub struct Trampoline<'a> {
    region: &'a mut [u8],
}

impl<'a> Trampoline<'a> {
    /// Bytes covered by a full trampoline view.
    pub const REGION_SIZE: usize = FOOTER_SIZE + TRAMPOLINE_MAX_CODE;

    /// Wrap `region`, which must start [`FOOTER_SIZE`] bytes below the stub.
    ///
    /// # Errors
    /// [`SmpError::RegionTooSmall`] if the region cannot hold the footer.
    pub fn new(region: &'a mut [u8]) -> Result<Self, SmpError> {
        if region.len() < FOOTER_SIZE {
            return Err(SmpError::RegionTooSmall(region.len()));
        }
        Ok(Self { region })
    }

    /// The trampoline at [`TRAMPOLINE_PHYS`] as seen through `mapper`.
    ///
    /// # Safety
    /// The low physical pages around [`TRAMPOLINE_PHYS`] must be reserved for
    /// the trampoline and mapped by `mapper`. Only one view may exist.
    pub unsafe fn at_physical<M: PhysMapper>(mapper: &M) -> Self {
        let start = PhysicalAddress::new(TRAMPOLINE_PHYS - FOOTER_SIZE as u64);
        let region: &'a mut [u8; FOOTER_SIZE + TRAMPOLINE_MAX_CODE] = unsafe { mapper.phys_to_mut(start) };
        Self { region }
    }

    /// Physical address the stub is executed from.
    #[must_use]
    pub const fn entry_point() -> PhysicalAddress {
        PhysicalAddress::new(TRAMPOLINE_PHYS)
    }

    /// Copy the entry stub into place.
    ///
    /// # Errors
    /// [`SmpError::StubTooLarge`] if `code` does not fit.
    pub fn install(&mut self, code: &[u8]) -> Result<(), SmpError> {
        let max = self.region.len() - FOOTER_SIZE;
        if code.len() > max {
            return Err(SmpError::StubTooLarge {
                len: code.len(),
                max,
            });
        }
        self.region[FOOTER_SIZE..FOOTER_SIZE + code.len()].copy_from_slice(code);
        Ok(())
    }

    /// The installed stub bytes (the whole code area).
    #[must_use]
    pub fn code(&self) -> &[u8] {
        &self.region[FOOTER_SIZE..]
    }

    /// Write the footer for the next core.
    ///
    /// # Errors
    /// [`SmpError::Above4G`] if the entry or the page-table root cannot be
    /// expressed in 32 bits.
    pub fn write_parameters(&mut self, params: &ApBootParameters) -> Result<(), SmpError> {
        let entry = params
            .entry
            .as_u32()
            .ok_or(SmpError::Above4G(params.entry))?;
        let root = params.page_table_root;
        let root = u64::from(root.as_u32().ok_or(SmpError::Above4G(root))?);

        self.put(footer::PAGE_TABLE_ROOT, &root.to_le_bytes());
        self.put(footer::STACK_TOP, &params.stack_top.as_u64().to_le_bytes());
        self.put(footer::ENTRY, &entry.to_le_bytes());
        self.put(footer::STACK_RESERVE, &params.stack_reserve.to_le_bytes());
        Ok(())
    }

    /// Decode the footer as the stub would see it.
    #[must_use]
    pub fn read_parameters(&self) -> ApBootParameters {
        ApBootParameters {
            stack_top: VirtualAddress::new(u64::from_le_bytes(self.get(footer::STACK_TOP))),
            entry: PhysicalAddress::new(u64::from(u32::from_le_bytes(self.get(footer::ENTRY)))),
            stack_reserve: u32::from_le_bytes(self.get(footer::STACK_RESERVE)),
            page_table_root: PhysicalAddress::new(u64::from_le_bytes(
                self.get(footer::PAGE_TABLE_ROOT),
            )),
        }
    }

    /// Write `bytes` at `below` bytes under the stub.
    fn put(&mut self, below: usize, bytes: &[u8]) {
        let at = FOOTER_SIZE - below;
        self.region[at..at + bytes.len()].copy_from_slice(bytes);
    }

    fn get<const N: usize>(&self, below: usize) -> [u8; N] {
        let at = FOOTER_SIZE - below;
        let mut out = [0; N];
        out.copy_from_slice(&self.region[at..at + N]);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kernel_info::smp::AP_STACK_RESERVE;

    fn params() -> ApBootParameters {
        ApBootParameters {
            stack_top: VirtualAddress::new(0xFFFF_8880_0020_8000),
            entry: PhysicalAddress::new(0x0010_4a20),
            stack_reserve: AP_STACK_RESERVE,
            page_table_root: PhysicalAddress::new(0x0009_F000),
        }
    }

    #[test]
    fn footer_layout_matches_the_stub() {
        let mut mem = vec![0u8; Trampoline::REGION_SIZE];
        let mut t = Trampoline::new(&mut mem).unwrap();
        t.write_parameters(&params()).unwrap();
        assert_eq!(t.read_parameters(), params());

        // TRAMPOLINE_PHYS - 24: root, -16: stack, -8: entry, -4: reserve
        assert_eq!(mem[0..8], 0x0009_F000u64.to_le_bytes());
        assert_eq!(mem[8..16], 0xFFFF_8880_0020_8000u64.to_le_bytes());
        assert_eq!(mem[16..20], 0x0010_4a20u32.to_le_bytes());
        assert_eq!(mem[20..24], 0x8000u32.to_le_bytes());
    }

    #[test]
    fn parameters_are_rewritten_per_core() {
        let mut mem = vec![0u8; Trampoline::REGION_SIZE];
        let mut t = Trampoline::new(&mut mem).unwrap();
        t.write_parameters(&params()).unwrap();
        let next = ApBootParameters {
            stack_top: VirtualAddress::new(0xFFFF_8880_0031_0000),
            ..params()
        };
        t.write_parameters(&next).unwrap();
        assert_eq!(t.read_parameters(), next);
    }

    #[test]
    fn install_checks_the_size() {
        let mut mem = vec![0u8; FOOTER_SIZE + 16];
        let mut t = Trampoline::new(&mut mem).unwrap();
        t.install(&[0x90; 16]).unwrap();
        assert_eq!(t.code(), [0x90; 16]);
        assert_eq!(
            t.install(&[0x90; 17]),
            Err(SmpError::StubTooLarge { len: 17, max: 16 })
        );
    }

    #[test]
    fn high_addresses_are_rejected() {
        let mut mem = vec![0u8; Trampoline::REGION_SIZE];
        let mut t = Trampoline::new(&mut mem).unwrap();
        let high = PhysicalAddress::new(0x1_0000_0000);
        assert_eq!(
            t.write_parameters(&ApBootParameters {
                entry: high,
                ..params()
            }),
            Err(SmpError::Above4G(high))
        );
        assert_eq!(
            t.write_parameters(&ApBootParameters {
                page_table_root: high,
                ..params()
            }),
            Err(SmpError::Above4G(high))
        );
    }

    #[test]
    fn region_must_hold_the_footer() {
        let mut mem = [0u8; 8];
        assert!(matches!(
            Trampoline::new(&mut mem),
            Err(SmpError::RegionTooSmall(8))
        ));
    }
}
