//! Process identity.

use kernel_info::process::Pid;
use kernel_info::vdso::VdsoData;

/// Pick the pid from `vdso` if there is one, else from `syscall`.
///
/// A negative system call result is an error code and yields `None`.
///
/// A process that knows it has no VDSO page skips the read entirely:
///
/// ```rust
/// # use kernel_info::process::Pid;
/// # use stdlib::process::getpid_with;
/// # let sys_getpid = || 3;
/// assert_eq!(getpid_with(None, sys_getpid), Some(Pid::new(3)));
/// ```
pub fn getpid_with(vdso: Option<VdsoData>, syscall: impl FnOnce() -> i64) -> Option<Pid> {
    if let Some(data) = vdso {
        return Some(data.pid());
    }
    let ret = syscall();
    if ret < 0 {
        return None;
    }
    i32::try_from(ret).ok().map(Pid::new)
}

/// The calling process's pid, from the VDSO page with the system call as
/// fallback.
///
/// The fallback only covers a page at `VDSO_ADDR` that does not carry the
/// VDSO magic. A missing page cannot be detected from user space: reading it
/// faults. A process started without a VDSO page must call
/// [`getpid_with`]`(None, sys_getpid)` instead.
///
/// # Safety
/// As [`crate::vdso::read`].
#[cfg(all(feature = "syscall", target_arch = "x86_64"))]
#[must_use]
pub unsafe fn getpid() -> Option<Pid> {
    // SAFETY: forwarded to the caller.
    let vdso = unsafe { crate::vdso::read() };
    getpid_with(vdso, crate::syscall::sys_getpid)
}
