use crate::msr::Msr;
use bitfield_struct::bitfield;

/// `IA32_EFER`: long mode and `SYSCALL` enables.
pub const IA32_EFER: Msr = Msr::new(0xC000_0080);

/// `IA32_STAR`: segment selector bases for `SYSCALL`/`SYSRET`.
pub const IA32_STAR: Msr = Msr::new(0xC000_0081);

/// `IA32_LSTAR`: 64-bit `SYSCALL` entry point.
pub const IA32_LSTAR: Msr = Msr::new(0xC000_0082);

/// `IA32_FMASK`: `RFLAGS` bits cleared on `SYSCALL`.
pub const IA32_FMASK: Msr = Msr::new(0xC000_0084);

/// The `EFER` bits the kernel cares about.
#[bitfield(u64)]
pub struct Efer {
    /// Bit 0: `SYSCALL`/`SYSRET` enable.
    pub sce: bool,

    #[bits(7)]
    __: u8,

    /// Bit 8: long mode enable.
    pub lme: bool,

    #[bits(1)]
    __: u8,

    /// Bit 10: long mode active (read only).
    pub lma: bool,

    /// Bit 11: no-execute enable.
    pub nxe: bool,

    #[bits(52)]
    __: u64,
}

/// `IA32_STAR` for a 64-bit kernel.
///
/// ```rust
/// # use kernel_registers::msr::Ia32Star;
/// // kernel code 0x08, user data 0x1b, user code 0x23
/// let star = Ia32Star::for_selectors(0x08, 0x23);
/// assert_eq!(star.syscall_cs(), 0x08);
/// assert_eq!(star.sysret_base(), 0x10);
/// ```
#[bitfield(u64)]
pub struct Ia32Star {
    /// Bits 0–31: compatibility-mode target, unused.
    #[bits(32)]
    __: u32,

    /// Bits 32–47: `SYSCALL` loads CS from here and SS from here + 8.
    pub syscall_cs: u16,

    /// Bits 48–63: `SYSRET` loads SS from here + 8 and CS from here + 16.
    pub sysret_base: u16,
}

impl Ia32Star {
    /// Selector bases for a GDT laid out as kernel code, kernel data, user
    /// data, user code.
    #[must_use]
    pub const fn for_selectors(kernel_cs: u16, user_cs: u16) -> Self {
        let user_ss_index = (user_cs >> 3) - 1;
        Self::new()
            .with_syscall_cs(kernel_cs & !0b11)
            .with_sysret_base((user_ss_index << 3) - 8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn efer_bits() {
        let efer = Efer::new().with_sce(true).with_lme(true).with_nxe(true);
        assert_eq!(efer.into_bits(), 0x901);
        assert!(Efer::from_bits(0x500).lma());
    }

    #[test]
    fn sysret_selectors_land_on_user_segments() {
        let star = Ia32Star::for_selectors(0x08, 0x23);
        let base = star.sysret_base();
        assert_eq!((base + 8) | 3, 0x1b);
        assert_eq!((base + 16) | 3, 0x23);
        assert_eq!(star.into_bits(), 0x0010_0008_0000_0000);
    }
}
