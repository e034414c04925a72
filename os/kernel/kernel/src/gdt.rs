//! # Global Descriptor Table (GDT)
//!
//! In long mode segmentation is mostly inert: base and limit are ignored and
//! paging provides protection. What remains is the privilege level of each
//! segment and the 64-bit flag on code segments.
//!
//! | Index | Selector | Descriptor                     |
//! |-------|----------|--------------------------------|
//! | 0     | `0x00`   | null                           |
//! | 1     | `0x08`   | kernel code (64-bit, DPL 0)    |
//! | 2     | `0x10`   | kernel data (DPL 0)            |
//! | 3     | `0x1b`   | user data (DPL 3)              |
//! | 4     | `0x23`   | user code (64-bit, DPL 3)      |
//!
//! Kernel data follows kernel code and user data precedes user code, which
//! is what `SYSCALL`/`SYSRET` derive SS from. All cores load the same table.

use bitfield_struct::bitfield;

pub const KERNEL_CS: u16 = selector(1, 0);
pub const KERNEL_DS: u16 = selector(2, 0);
pub const USER_DS: u16 = selector(3, 3);
pub const USER_CS: u16 = selector(4, 3);

const fn selector(index: u16, rpl: u16) -> u16 {
    (index << 3) | rpl
}

/// A code or data segment descriptor.
#[bitfield(u64)]
#[derive(PartialEq, Eq)]
pub struct SegmentDescriptor {
    /// Bits 0–15: limit, ignored in long mode.
    pub limit_lo: u16,
    /// Bits 16–39: base, ignored in long mode.
    #[bits(24)]
    pub base_lo: u32,
    /// Bit 40: accessed.
    pub accessed: bool,
    /// Bit 41: readable (code) or writable (data).
    pub read_write: bool,
    /// Bit 42: conforming (code) or expand-down (data).
    pub conforming: bool,
    /// Bit 43: executable.
    pub executable: bool,
    /// Bit 44: code/data rather than system descriptor.
    pub code_or_data: bool,
    /// Bits 45–46: privilege level.
    #[bits(2)]
    pub dpl: u8,
    /// Bit 47: present.
    pub present: bool,
    /// Bits 48–51: limit, ignored in long mode.
    #[bits(4)]
    pub limit_hi: u8,
    /// Bit 52: available to software.
    pub available: bool,
    /// Bit 53: 64-bit code segment.
    pub long_mode: bool,
    /// Bit 54: default operand size; must be clear when `long_mode` is set.
    pub default_32: bool,
    /// Bit 55: granularity.
    pub granularity: bool,
    /// Bits 56–63: base, ignored in long mode.
    pub base_hi: u8,
}

impl SegmentDescriptor {
    #[must_use]
    pub const fn code(dpl: u8) -> Self {
        Self::new()
            .with_read_write(true)
            .with_executable(true)
            .with_code_or_data(true)
            .with_dpl(dpl)
            .with_present(true)
            .with_long_mode(true)
    }

    #[must_use]
    pub const fn data(dpl: u8) -> Self {
        Self::new()
            .with_read_write(true)
            .with_code_or_data(true)
            .with_dpl(dpl)
            .with_present(true)
    }
}

#[repr(C, align(16))]
#[derive(Debug)]
pub struct Gdt {
    entries: [SegmentDescriptor; 5],
}

impl Gdt {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: [
                SegmentDescriptor::new(),
                SegmentDescriptor::code(0),
                SegmentDescriptor::data(0),
                SegmentDescriptor::data(3),
                SegmentDescriptor::code(3),
            ],
        }
    }

    /// The descriptor a selector refers to.
    #[must_use]
    pub const fn get(&self, selector: u16) -> Option<SegmentDescriptor> {
        let index = (selector >> 3) as usize;
        if index < self.entries.len() {
            Some(self.entries[index])
        } else {
            None
        }
    }

    /// Load this table and reload every segment register.
    ///
    /// # Safety
    /// The table must stay mapped for as long as any core uses it.
    #[cfg(all(feature = "bare-metal", target_arch = "x86_64"))]
    pub unsafe fn load(&'static self) {
        #[repr(C, packed)]
        struct Pointer {
            limit: u16,
            base: u64,
        }

        #[allow(clippy::cast_possible_truncation)]
        let pointer = Pointer {
            limit: (size_of::<Self>() - 1) as u16,
            base: core::ptr::from_ref(self) as u64,
        };

        unsafe {
            core::arch::asm!(
                "lgdt [{ptr}]",
                // Far return into the new code segment.
                "push {cs}",
                "lea {tmp}, [rip + 2f]",
                "push {tmp}",
                "retfq",
                "2:",
                "mov ds, {ds:x}",
                "mov es, {ds:x}",
                "mov ss, {ds:x}",
                "xor {tmp:e}, {tmp:e}",
                "mov fs, {tmp:x}",
                "mov gs, {tmp:x}",
                ptr = in(reg) &raw const pointer,
                cs = in(reg) u64::from(KERNEL_CS),
                ds = in(reg) KERNEL_DS,
                tmp = lateout(reg) _,
                options(preserves_flags)
            );
        }
    }
}

impl Default for Gdt {
    fn default() -> Self {
        Self::new()
    }
}

/// The table every core loads.
pub static GDT: Gdt = Gdt::new();

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selectors_match_layout() {
        assert_eq!(KERNEL_CS, 0x08);
        assert_eq!(KERNEL_DS, 0x10);
        assert_eq!(USER_DS, 0x1b);
        assert_eq!(USER_CS, 0x23);
    }

    #[test]
    fn descriptor_encodings() {
        assert_eq!(SegmentDescriptor::code(0).into_bits(), 0x0020_9A00_0000_0000);
        assert_eq!(SegmentDescriptor::data(0).into_bits(), 0x0000_9200_0000_0000);
        assert_eq!(SegmentDescriptor::data(3).into_bits(), 0x0000_F200_0000_0000);
        assert_eq!(SegmentDescriptor::code(3).into_bits(), 0x0020_FA00_0000_0000);
    }

    #[test]
    fn selectors_resolve_to_matching_privilege() {
        let gdt = Gdt::new();
        let kcode = gdt.get(KERNEL_CS).unwrap();
        assert!(kcode.executable() && kcode.long_mode() && !kcode.default_32());
        assert_eq!(kcode.dpl(), 0);

        let ucode = gdt.get(USER_CS).unwrap();
        assert_eq!(ucode.dpl(), 3);
        assert!(ucode.executable());

        assert!(!gdt.get(USER_DS).unwrap().executable());
        assert_eq!(gdt.get(0x28), None);
    }
}
