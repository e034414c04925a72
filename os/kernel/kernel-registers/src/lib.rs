//! # Typed `X86_64` Registers
//!
//! The handful of control registers and MSRs the start-up path touches:
//! [`cr3::Cr3`] to activate an address space, and the x2APIC MSRs in
//! [`msr`] used to identify the current core and to send start-up IPIs.
//!
//! Encoding and decoding are plain bitfield arithmetic and work on any
//! host. The actual `mov`/`rdmsr`/`wrmsr` instructions are only compiled
//! for `x86_64` with the `asm` feature.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

#[cfg(feature = "cr3")]
pub mod cr3;

#[cfg(feature = "msr")]
pub mod msr;

pub trait LoadRegisterUnsafe {
    /// # Safety
    /// The register access is privileged and requires kernel mode (Ring 0).
    unsafe fn load_unsafe() -> Self;
}

pub trait StoreRegisterUnsafe {
    /// # Safety
    /// The register access is privileged and requires kernel mode (Ring 0).
    /// The written value must leave the machine in a consistent state.
    unsafe fn store_unsafe(self);
}
