//! # Kernel Configuration and Boot Interface
//!
//! Compile-time configuration shared by the kernel, its support crates and
//! user space. A kernel has no configuration file; every layout decision that
//! more than one component depends on lives here as a constant.
//!
//! ## Modules
//!
//! * [`memory`]: virtual address space layout, direct map, kernel stacks.
//! * [`smp`]: processor limits and the low-memory trampoline contract between
//!   the bootstrap processor and an application processor leaving reset.
//! * [`vdso`]: the per-process VDSO page contract with user-space readers.
//! * [`process`]: process identifiers.
//! * [`boot`]: the loader-to-kernel handoff structure.
//!
//! ```text
//! 0x0000_0000_0000_0000 ┌─────────────────────────────────┐
//!                       │         User Space              │
//! VDSO_ADDR             │   0x4000_0000: VDSO page (R, U) │
//! LAST_USERSPACE_ADDRESS├─────────────────────────────────┤
//!                       │        Guard Region             │
//! HHDM_BASE             ├─────────────────────────────────┤ 0xffff_8880_0000_0000
//!                       │   Higher Half Direct Mapping    │
//! KERNEL_BASE           ├─────────────────────────────────┤ 0xffff_ffff_8000_0000
//!                       │       Kernel Text & Data        │
//! 0xFFFF_FFFF_FFFF_FFFF └─────────────────────────────────┘
//! ```
//!
//! The build script of the kernel binary reads [`memory::KERNEL_BASE`] and
//! [`memory::PHYS_LOAD`] to configure the linker:
//!
//! ```rust
//! use kernel_info::memory::{KERNEL_BASE, PHYS_LOAD};
//!
//! println!("cargo:rustc-link-arg-bins=--defsym=KERNEL_BASE={:#x}", KERNEL_BASE);
//! println!("cargo:rustc-link-arg-bins=--defsym=PHYS_LOAD={:#x}", PHYS_LOAD);
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]
#![deny(unsafe_code)]

pub mod boot;
pub mod memory;
pub mod process;
pub mod smp;
pub mod vdso;
