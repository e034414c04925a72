//! # Multiprocessor Start-Up Layout
//!
//! An application processor leaves reset in real mode and starts executing at
//! `vector << 12` after a start-up IPI. The bootstrap processor copies the
//! entry stub to [`TRAMPOLINE_PHYS`] and writes a small parameter footer into
//! the bytes just below it:
//!
//! ```text
//! TRAMPOLINE_PHYS - 24  u64  boot page-table root (physical, < 4 GiB)
//! TRAMPOLINE_PHYS - 16  u64  kernel stack top (virtual)
//! TRAMPOLINE_PHYS -  8  u32  entry address (physical, < 4 GiB)
//! TRAMPOLINE_PHYS -  4  u32  temporary stack top used before long mode
//! TRAMPOLINE_PHYS       ...  entry stub
//! ```
//!
//! The footer is rewritten for every processor, so only one processor may be
//! between its start-up IPI and its readiness signal at any time.

/// Maximum number of processors the core table can describe.
pub const MAX_CPUS: usize = 8;

/// Physical address the entry stub is copied to. Must be page aligned and
/// below 1 MiB so it can be named by a start-up IPI vector.
pub const TRAMPOLINE_PHYS: u64 = 0x7000;

/// Bytes reserved below [`TRAMPOLINE_PHYS`] for the parameter footer.
pub const FOOTER_SIZE: usize = 24;

/// Largest entry stub accepted by the trampoline.
pub const TRAMPOLINE_MAX_CODE: usize = 4096;

/// Temporary stack used by the stub before the kernel stack is loaded.
/// It grows down from here into the page above the stub.
pub const AP_STACK_RESERVE: u32 = 0x8000;

/// Footer offsets, as distances below [`TRAMPOLINE_PHYS`].
pub mod footer {
    pub const PAGE_TABLE_ROOT: usize = 24;
    pub const STACK_TOP: usize = 16;
    pub const ENTRY: usize = 8;
    pub const STACK_RESERVE: usize = 4;
}

/// How many polls of a readiness flag pass between two "still waiting"
/// diagnostics when the coordinator runs with reporting enabled.
pub const READY_SPIN_REPORT_INTERVAL: u64 = 50_000_000;

/// Start-up IPIs can only name a page below 1 MiB.
const STARTUP_LIMIT: u64 = 0x10_0000;

/// Start-up IPI vector that makes a processor begin at physical `target`,
/// or `None` if `target` is not a page start below 1 MiB.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub const fn startup_vector(target: u64) -> Option<u8> {
    if target >= STARTUP_LIMIT || !target.is_multiple_of(4096) {
        return None;
    }
    Some((target >> 12) as u8)
}

const _: () = {
    assert!(startup_vector(TRAMPOLINE_PHYS).is_some());
    assert!(FOOTER_SIZE >= footer::PAGE_TABLE_ROOT);
    assert!(AP_STACK_RESERVE as u64 > TRAMPOLINE_PHYS);
};
