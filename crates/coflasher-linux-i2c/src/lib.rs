//! coflasher-linux-i2c - Linux i2c-dev transport
//!
//! This crate provides the I2C transport to the co-processor via the
//! `/dev/i2c-N` character devices.
//!
//! # Example
//!
//! ```no_run
//! use coflasher_linux_i2c::LinuxI2c;
//! use coflasher_core::I2cBus;
//!
//! let mut bus = LinuxI2c::open_device("/dev/i2c-1")?;
//! bus.write(0x65, b"v")?;
//! let mut version = [0u8; 20];
//! bus.read(0x65, &mut version)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! # System Requirements
//!
//! - Linux kernel with `CONFIG_I2C_CHARDEV`
//! - Read/write access to `/dev/i2c-N` (usually the `i2c` group)
//! - An adapter with plain I2C support; SMBus-only adapters cannot issue
//!   the bootloader's multi-byte reads

pub mod device;
pub mod error;

// Re-exports
pub use device::{parse_options, LinuxI2c, LinuxI2cConfig};
pub use error::{LinuxI2cError, Result};

/// Open a Linux I2C adapter and return a boxed I2cBus
///
/// # Example Options
///
/// - `dev=/dev/i2c-1` - Adapter device path
/// - `i2cbus=1` - Adapter number (alternative to dev)
pub fn open_linux_i2c(
    options: &[(&str, &str)],
) -> std::result::Result<Box<dyn coflasher_core::I2cBus>, Box<dyn std::error::Error>> {
    let config = parse_options(options)?;
    let bus = LinuxI2c::open(&config)?;
    Ok(Box::new(bus))
}
