//! # `SYSCALL` Entry
//!
//! Every core programs the same four MSRs: `EFER.SCE` to enable the
//! instruction, `STAR` with the selector bases from [`crate::gdt`], `LSTAR`
//! with the entry point, and `FMASK` with the flags cleared on entry.
//!
//! No system calls are implemented yet; the entry point answers every
//! number with [`ENOSYS`]. User space learns its pid from the VDSO page.

use crate::gdt::{KERNEL_CS, USER_CS};
use kernel_registers::msr::Ia32Star;
pub use stdlib::syscall_abi::ENOSYS;

/// `RFLAGS` cleared on entry: TF, IF, DF, AC.
pub const FMASK: u64 = (1 << 8) | (1 << 9) | (1 << 10) | (1 << 18);

/// The `STAR` value matching the kernel GDT.
#[must_use]
pub const fn star() -> Ia32Star {
    Ia32Star::for_selectors(KERNEL_CS, USER_CS)
}

/// Program the `SYSCALL` MSRs of the calling core.
///
/// # Safety
/// Ring 0, after the kernel GDT is loaded.
#[cfg(all(feature = "bare-metal", target_arch = "x86_64"))]
pub unsafe fn init() {
    use kernel_registers::msr::{Efer, IA32_EFER, IA32_FMASK, IA32_LSTAR, IA32_STAR};

    unsafe {
        let efer = Efer::from_bits(IA32_EFER.load_raw()).with_sce(true);
        IA32_EFER.store_raw(efer.into_bits());
        IA32_STAR.store_raw(star().into_bits());
        IA32_LSTAR.store_raw(syscall_entry as usize as u64);
        IA32_FMASK.store_raw(FMASK);
    }
}

/// Return straight to user space with [`ENOSYS`].
///
/// `SYSCALL` left the user `RIP` in `RCX` and `RFLAGS` in `R11`, both of which
/// `SYSRETQ` restores. The user stack is never touched.
#[cfg(all(feature = "bare-metal", target_arch = "x86_64"))]
#[unsafe(naked)]
unsafe extern "C" fn syscall_entry() {
    core::arch::naked_asm!(
        "mov rax, {enosys}",
        "sysretq",
        enosys = const ENOSYS,
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn star_uses_gdt_selectors() {
        let star = star();
        assert_eq!(star.syscall_cs(), KERNEL_CS);
        assert_eq!((star.sysret_base() + 16) | 3, USER_CS);
    }

    #[test]
    fn interrupts_are_masked_on_entry() {
        assert_ne!(FMASK & (1 << 9), 0);
    }
}
