//! Transport and control line abstractions
//!
//! This module defines the traits a backend implements to talk to the
//! co-processor: an addressed I2C transport and the three physical lines
//! (reset, boot strap, SPI bus ownership).

#[cfg(test)]
pub(crate) mod mock;
mod traits;

pub use traits::*;

/// I2C address the ROM bootloader answers on
pub const BOOTLOADER_ADDR: u8 = 0x64;

/// I2C address the co-processor application firmware answers on
pub const APP_ADDR: u8 = 0x65;
