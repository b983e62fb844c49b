//! `log` backend writing through the HAL
//!
//! The kernel emits diagnostics with the `log` macros. Installing a
//! `HalLogger` routes them to `HAL::debug_write`, one line per record:
//!
//! ```text
//! DEBUG kestrel_kernel: multiwaiter WaitSetId { .. } created for thread 1
//! ```

use kestrel_hal::HAL;
use log::{LevelFilter, Metadata, Record, SetLoggerError};

/// Logger forwarding records to a HAL's debug output.
pub struct HalLogger<H: HAL> {
    hal: &'static H,
    level: LevelFilter,
}

impl<H: HAL> HalLogger<H> {
    pub const fn new(hal: &'static H, level: LevelFilter) -> Self {
        Self { hal, level }
    }

    pub fn level(&self) -> LevelFilter {
        self.level
    }
}

impl<H: HAL> log::Log for HalLogger<H> {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            self.hal.debug_write(&alloc::format!(
                "{:5} {}: {}",
                record.level(),
                record.target(),
                record.args()
            ));
        }
    }

    fn flush(&self) {}
}

/// Install `logger` as the global `log` backend.
///
/// Fails if a logger is already installed.
pub fn init_logging<H: HAL>(logger: &'static HalLogger<H>) -> Result<(), SetLoggerError> {
    log::set_logger(logger)?;
    log::set_max_level(logger.level());
    Ok(())
}
