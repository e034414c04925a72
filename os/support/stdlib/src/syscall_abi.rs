/// System call numbers, passed in `RAX`.
#[repr(u64)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sysno {
    GetPid = 11,
}

/// Returned by the kernel for a system call it does not implement.
pub const ENOSYS: i64 = -38;
