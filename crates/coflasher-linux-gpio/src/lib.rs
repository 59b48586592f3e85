//! coflasher-linux-gpio - Linux GPIO control lines
//!
//! This crate drives the co-processor's reset, boot strap and SPI ownership
//! lines using the Linux character device GPIO interface (gpiocdev).
//!
//! # Example
//!
//! ```no_run
//! use coflasher_linux_gpio::{LinuxGpioLines, LinuxGpioLinesConfig};
//! use coflasher_core::{ControlLines, SpiOwner};
//!
//! let config = LinuxGpioLinesConfig::new("/dev/gpiochip0", 17, 27).with_ctrl(22);
//! //                                      device          reset boot0
//! let mut lines = LinuxGpioLines::open(&config)?;
//! lines.set_spi_owner(SpiOwner::Host)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! # Wiring
//!
//! | Co-processor pin | GPIO function       | Description                      |
//! |------------------|---------------------|----------------------------------|
//! | NRST             | reset (output)      | Low holds the chip in reset      |
//! | BOOT0            | boot0 (output/input)| High at reset selects ROM boot   |
//! | SPI mux select   | ctrl (output)       | High gives SPI to co-processor   |
//!
//! BOOT0 doubles as the debug clock on some parts, which is why it is only
//! driven around a reset and otherwise left as an input.
//!
//! # System Requirements
//!
//! - Linux kernel 4.8+ with GPIO character device support (kernel 5.5+ for v2 API)
//! - Access to `/dev/gpiochipN` devices (may require root or udev rules)

pub mod device;
pub mod error;

// Re-exports
pub use device::{parse_options, LinuxGpioLines, LinuxGpioLinesConfig};
pub use error::{LinuxGpioError, Result};

/// Open the control lines and return a boxed ControlLines
///
/// # Example Options
///
/// - `gpiochip=0` or `chip=/dev/gpiochip0` - GPIO chip
/// - `reset=17` - Reset line (required)
/// - `boot0=27` - Boot strap line (required)
/// - `ctrl=22` - SPI ownership line (optional)
pub fn open_linux_gpio(
    options: &[(&str, &str)],
) -> std::result::Result<Box<dyn coflasher_core::ControlLines>, Box<dyn std::error::Error>> {
    let config = parse_options(options)?;
    let lines = LinuxGpioLines::open(&config)?;
    Ok(Box::new(lines))
}
