//! # QEMU Debug Console
//!
//! Early-boot diagnostics for kernels running under QEMU. Every byte written
//! to I/O port `0x402` shows up on the host when QEMU is started with
//! `-debugcon stdio` (or `-debugcon file:debug.log`).
//!
//! * [`qemu_trace!`] formats straight to the port without allocating.
//! * [`QemuLogger`] routes the `log` facade to the same port so the rest of
//!   the kernel only ever uses `info!`, `warn!` and friends.
//!
//! With the `enabled` feature off, or on a non-x86 host, the sink is a no-op
//! and the crate never touches I/O ports. Host tests rely on that.
//!
//! ```rust,no_run
//! use kernel_qemu::QemuLogger;
//! use log::{LevelFilter, info};
//!
//! static LOGGER: QemuLogger = QemuLogger::new(LevelFilter::Debug);
//!
//! LOGGER.install().expect("logger installed once");
//! info!("kernel subsystem initialized");
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

mod logger;

pub use logger::QemuLogger;

#[doc(hidden)]
pub mod qemu_fmt {
    use core::fmt::{self, Write};

    /// QEMU's debug console port.
    pub const QEMU_DEBUG_PORT: u16 = 0x402;

    #[cfg(all(feature = "enabled", target_arch = "x86_64"))]
    #[inline]
    pub fn dbg_putc(c: u8) {
        // SAFETY: writing the debug port has no side effects besides output.
        unsafe {
            core::arch::asm!(
                "out dx, al",
                in("dx") QEMU_DEBUG_PORT,
                in("al") c,
                options(nomem, nostack, preserves_flags)
            );
        }
    }

    #[cfg(not(all(feature = "enabled", target_arch = "x86_64")))]
    #[inline]
    pub fn dbg_putc(_c: u8) {}

    /// `fmt::Write` adapter over the debug port.
    pub struct QemuSink;

    impl Write for QemuSink {
        #[inline]
        fn write_str(&mut self, s: &str) -> fmt::Result {
            s.bytes().for_each(dbg_putc);
            Ok(())
        }
    }

    #[inline]
    pub fn qemu_write(args: fmt::Arguments<'_>) {
        // Best-effort output; the sink itself never fails.
        let _ = QemuSink.write_fmt(args);
    }
}

/// Format to the QEMU debug console.
#[macro_export]
macro_rules! qemu_trace {
    ($($arg:tt)*) => {{
        $crate::qemu_fmt::qemu_write(core::format_args!($($arg)*));
    }};
}
