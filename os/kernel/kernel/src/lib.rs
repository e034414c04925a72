//! # Kernel
//!
//! Ties the subsystem crates into a bootable kernel:
//!
//! * [`boot`] runs the fixed sequence of initialisation stages on the
//!   bootstrap processor and ends in the scheduler.
//! * [`process`] keeps each process's address space and VDSO page in step
//!   through spawn, fork, exec and exit.
//! * [`apic`] sends the INIT-SIPI-SIPI sequence that wakes the other cores.
//! * [`gdt`], [`idt`] and [`syscall`] hold the per-core descriptor tables
//!   and `SYSCALL` set-up that every core loads on its way to the scheduler.
//!
//! The hardware bindings (`platform`, `ap_boot`) and the kernel binary are
//! only built with the `bare-metal` feature. Everything else builds and tests
//! on the host.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

pub mod apic;
pub mod boot;
pub mod gdt;
pub mod idt;
pub mod process;
pub mod syscall;

#[cfg(all(feature = "bare-metal", target_arch = "x86_64"))]
pub mod ap_boot;
#[cfg(all(feature = "bare-metal", target_arch = "x86_64"))]
pub mod platform;

pub use boot::{BootError, BootPlatform, BootSequence, BootStage, StageError};
pub use process::{Process, ProcessError, Processes};
