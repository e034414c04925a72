//! # User-Space Support
//!
//! What a user program needs to learn its own identity:
//!
//! * [`vdso`] decodes the kernel-provided page at `VDSO_ADDR`.
//! * [`process::getpid`] answers from that page when it is there and
//!   falls back to the `getpid` system call otherwise.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

pub mod process;
pub mod syscall_abi;
pub mod vdso;

#[cfg(all(feature = "syscall", target_arch = "x86_64"))]
pub mod syscall;

pub use kernel_info::process::Pid;
pub use kernel_info::vdso::VdsoData;
