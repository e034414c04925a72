//! Raw `SYSCALL` wrappers.

use crate::syscall_abi::Sysno;

/// Issue a system call without arguments.
#[inline]
#[must_use]
pub fn syscall0(sysno: Sysno) -> i64 {
    let ret: i64;
    // SAFETY: `SYSCALL` only clobbers RCX and R11 besides the return value.
    unsafe {
        core::arch::asm!(
            "syscall",
            inlateout("rax") sysno as u64 => ret,
            lateout("rcx") _,
            lateout("r11") _,
            options(nostack)
        );
    }
    ret
}

/// The `getpid` system call.
#[inline]
#[must_use]
pub fn sys_getpid() -> i64 {
    syscall0(Sysno::GetPid)
}
