//! # Model-Specific Registers (MSR)
//!
//! Raw `RDMSR`/`WRMSR` access plus typed views of the x2APIC registers used
//! during processor start-up.
//!
//! In x2APIC mode the local APIC is programmed entirely through MSRs in the
//! `0x800..0x8FF` range instead of a memory-mapped page. The interrupt
//! command register becomes a single 64-bit MSR ([`X2APIC_ICR`]) so an IPI
//! is one `WRMSR` with no delivery-status polling.
//!
//! The `SYSCALL` set-up registers ([`IA32_EFER`], [`IA32_STAR`],
//! [`IA32_LSTAR`], [`IA32_FMASK`]) are programmed once per core.
//!
//! ## References
//! - Intel SDM Vol. 3, §11.12 "Extended XAPIC (x2APIC)"
//! - Intel SDM Vol. 3, §9.4.4 "MP Initialization Example"

mod apic_base;
mod icr;
mod syscall;

pub use apic_base::Ia32ApicBase;
pub use icr::{DeliveryMode, Icr, Level, TriggerMode};
pub use syscall::{Efer, IA32_EFER, IA32_FMASK, IA32_LSTAR, IA32_STAR, Ia32Star};

/// `IA32_APIC_BASE`: global enable and x2APIC mode switch.
pub const IA32_APIC_BASE: Msr = Msr::new(0x1B);

/// x2APIC local APIC ID.
pub const X2APIC_ID: Msr = Msr::new(0x802);

/// x2APIC spurious interrupt vector register.
pub const X2APIC_SVR: Msr = Msr::new(0x80F);

/// x2APIC interrupt command register.
pub const X2APIC_ICR: Msr = Msr::new(0x830);

/// Identifies a **Model-Specific Register (MSR)** by its architectural index.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Msr(u32);

impl Msr {
    #[inline(always)]
    #[allow(clippy::inline_always)]
    #[must_use]
    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    #[inline(always)]
    #[allow(clippy::inline_always)]
    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Write a 64-bit value to this MSR.
    ///
    /// # Safety
    /// - Executes the privileged `WRMSR` instruction; only valid at **CPL=0**.
    /// - The MSR must exist and be writable on the current CPU, otherwise the
    ///   instruction raises **#GP(0)**.
    /// - The value must be legal for the register.
    #[cfg(all(feature = "asm", target_arch = "x86_64"))]
    #[inline]
    #[allow(clippy::cast_possible_truncation)]
    pub unsafe fn store_raw(self, val: u64) {
        let lo = (val & 0xFFFF_FFFF) as u32;
        let hi = (val >> 32) as u32;
        unsafe {
            core::arch::asm!(
                "wrmsr",
                in("ecx") self.0,
                in("eax") lo,
                in("edx") hi,
                options(nostack, preserves_flags)
            );
        }
    }

    /// Read the 64-bit value of this MSR.
    ///
    /// # Safety
    /// Same requirements as [`Msr::store_raw`], for `RDMSR`.
    #[cfg(all(feature = "asm", target_arch = "x86_64"))]
    #[inline]
    #[must_use]
    pub unsafe fn load_raw(self) -> u64 {
        let lo: u32;
        let hi: u32;
        unsafe {
            core::arch::asm!(
                "rdmsr",
                in("ecx") self.0,
                out("eax") lo,
                out("edx") hi,
                options(nomem, nostack, preserves_flags)
            );
        }
        (u64::from(hi) << 32) | u64::from(lo)
    }
}
