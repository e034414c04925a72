//! # Multiprocessor Start-Up
//!
//! Brings every application processor (AP) from reset into the scheduler, one
//! at a time, through a single shared trampoline in low memory.
//!
//! ```text
//!   bootstrap core                         application core k
//!   ──────────────                         ──────────────────
//!   install entry stub
//!   ┌─ for each other core k ───────┐
//!   │ allocate kernel stack         │
//!   │ write trampoline footer       │
//!   │ INIT, SIPI, SIPI ─────────────┼──▶   real → protected → long mode
//!   │                               │      core_entry()
//!   │                               │        page table, segments, LAPIC
//!   │                               │      join_scheduler()
//!   │                               │        IDT, syscall
//!   │ spin on ready(k) ◀────────────┼───     ready(k) = true
//!   └───────────────────────────────┘        scheduler (never returns)
//!   join_scheduler()
//! ```
//!
//! The footer is rewritten for every core. The readiness latch of core `k`
//! is what makes it safe to rewrite the footer for core `k + 1`, so the
//! coordinator never signals a core before the previous one has raised it.
//!
//! Hardware is reached through two seams: [`StartupIpi`] delivers the start-up
//! interrupts, and [`CoreServices`] performs the per-core set-up steps and the
//! hand-off to the scheduler. Both are implemented by the kernel on bare metal
//! and by threads in tests.

#![cfg_attr(not(any(test, doctest)), no_std)]

mod coordinator;
mod core_table;
mod entry;
mod error;
mod trampoline;

pub use coordinator::{ApEntry, SmpBoot, StartupIpi, WaitPolicy};
pub use core_table::{CoreDescriptor, CoreId, CoreState, CoreTable, KernelStack};
pub use entry::{CoreServices, core_entry, join_scheduler};
pub use error::SmpError;
pub use trampoline::{ApBootParameters, Trampoline};
