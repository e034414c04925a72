use crate::qemu_fmt::QemuSink;
use core::fmt::{self, Write};
use log::{LevelFilter, Log, Metadata, Record, SetLoggerError};

/// `log` backend writing to the QEMU debug console.
pub struct QemuLogger {
    max_level: LevelFilter,
}

impl QemuLogger {
    #[must_use]
    pub const fn new(max_level: LevelFilter) -> Self {
        Self { max_level }
    }

    /// Register as the global logger. Call once during early init.
    ///
    /// # Errors
    /// Fails if a logger was already installed.
    pub fn install(&'static self) -> Result<(), SetLoggerError> {
        log::set_logger(self)?;
        log::set_max_level(self.max_level);
        Ok(())
    }

    /// Render one record as `[LEVEL] target: message`.
    pub fn format_record<W: Write>(out: &mut W, record: &Record<'_>) -> fmt::Result {
        writeln!(out, "[{}] {}: {}", record.level(), record.target(), record.args())
    }
}

impl Log for QemuLogger {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= self.max_level
    }

    fn log(&self, record: &Record<'_>) {
        if self.enabled(record.metadata()) {
            let _ = Self::format_record(&mut QemuSink, record);
        }
    }

    fn flush(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use log::Level;

    #[test]
    fn records_are_prefixed_with_level_and_target() {
        let mut out = String::new();
        QemuLogger::format_record(
            &mut out,
            &Record::builder()
                .level(Level::Info)
                .target("kernel_smp")
                .args(format_args!("cpu{}: starting", 1))
                .build(),
        )
        .unwrap();
        assert_eq!(out, "[INFO] kernel_smp: cpu1: starting\n");
    }

    #[test]
    fn filters_by_level() {
        let logger = QemuLogger::new(LevelFilter::Warn);
        let warn = Metadata::builder().level(Level::Warn).build();
        let debug = Metadata::builder().level(Level::Debug).build();
        assert!(logger.enabled(&warn));
        assert!(!logger.enabled(&debug));
    }
}
