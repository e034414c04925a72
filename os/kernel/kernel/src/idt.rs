//! # Interrupt Descriptor Table (IDT)
//!
//! One table of 256 interrupt gates, built once by the bootstrap processor
//! and loaded by every core with `lidt`. Vectors without a dedicated handler
//! point at a common stub that reports the vector and halts the core.

use crate::gdt::KERNEL_CS;
use bitfield_struct::bitfield;

/// Number of vectors.
pub const VECTORS: usize = 256;

/// Gate type and privilege.
#[bitfield(u16)]
#[derive(PartialEq, Eq)]
pub struct GateAttributes {
    /// Bits 0–2: interrupt stack table slot, 0 for none.
    #[bits(3)]
    pub ist: u8,
    #[bits(5)]
    __: u8,
    /// Bits 8–11: `0xE` interrupt gate, `0xF` trap gate.
    #[bits(4)]
    pub gate_type: u8,
    #[bits(1)]
    __: u8,
    /// Bits 13–14: lowest privilege allowed to raise this vector with `int`.
    #[bits(2)]
    pub dpl: u8,
    /// Bit 15: present.
    pub present: bool,
}

impl GateAttributes {
    #[must_use]
    pub const fn interrupt_gate() -> Self {
        Self::new().with_gate_type(0xE).with_present(true)
    }
}

/// A 16-byte long-mode gate descriptor.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdtEntry {
    offset_lo: u16,
    selector: u16,
    attributes: GateAttributes,
    offset_mid: u16,
    offset_hi: u32,
    reserved: u32,
}

const _: () = assert!(size_of::<IdtEntry>() == 16);

impl IdtEntry {
    pub const MISSING: Self = Self {
        offset_lo: 0,
        selector: 0,
        attributes: GateAttributes::new(),
        offset_mid: 0,
        offset_hi: 0,
        reserved: 0,
    };

    /// Kernel-mode interrupt gate to `handler`.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn interrupt(handler: u64) -> Self {
        Self {
            offset_lo: handler as u16,
            selector: KERNEL_CS,
            attributes: GateAttributes::interrupt_gate(),
            offset_mid: (handler >> 16) as u16,
            offset_hi: (handler >> 32) as u32,
            reserved: 0,
        }
    }

    #[must_use]
    pub const fn handler(&self) -> u64 {
        (self.offset_hi as u64) << 32 | (self.offset_mid as u64) << 16 | self.offset_lo as u64
    }

    #[must_use]
    pub const fn is_present(&self) -> bool {
        self.attributes.present()
    }
}

#[repr(C, align(16))]
#[derive(Debug, Clone)]
pub struct Idt {
    entries: [IdtEntry; VECTORS],
}

impl Idt {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: [IdtEntry::MISSING; VECTORS],
        }
    }

    /// Route every vector to `handler`.
    #[must_use]
    pub const fn uniform(handler: u64) -> Self {
        Self {
            entries: [IdtEntry::interrupt(handler); VECTORS],
        }
    }

    pub const fn set(&mut self, vector: u8, entry: IdtEntry) {
        self.entries[vector as usize] = entry;
    }

    #[must_use]
    pub const fn get(&self, vector: u8) -> &IdtEntry {
        &self.entries[vector as usize]
    }

    /// Load this table on the calling core.
    ///
    /// # Safety
    /// The table must stay mapped and unchanged while any core uses it.
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
                "lidt [{}]",
                in(reg) &raw const pointer,
                options(readonly, nostack, preserves_flags)
            );
        }
    }
}

impl Default for Idt {
    fn default() -> Self {
        Self::new()
    }
}
