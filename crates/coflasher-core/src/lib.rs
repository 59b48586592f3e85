//! coflasher-core - Co-processor bootloader and upgrade driver
//!
//! This crate drives a secondary microcontroller (the "co-processor") that
//! sits on a shared I2C bus next to the host. The co-processor either runs
//! its own application firmware, answering at [`bus::APP_ADDR`], or its
//! vendor ROM bootloader, answering at [`bus::BOOTLOADER_ADDR`].
//!
//! The crate is split bottom-up:
//!
//! - [`bus`] - transport and control line traits implemented by backends
//! - [`protocol`] - the ROM bootloader codec, bootloader operations and the
//!   application command layer
//! - [`device`] - [`Coprocessor`], the mode controller owning bus and lines
//! - [`upgrade`] - the erase / program / verify state machine
//!
//! # Features
//!
//! - `std` - Implement `std::error::Error` for the error types
//!
//! # Example
//!
//! ```ignore
//! use coflasher_core::{ControlLines, Coprocessor, FirmwareImage, I2cBus, upgrade::NoProgress};
//!
//! fn flash<B: I2cBus, L: ControlLines>(bus: B, lines: L, bin: Vec<u8>) {
//!     let mut dev = Coprocessor::new(bus, lines);
//!     if let Ok(mode) = dev.mode() {
//!         println!("before: {}", mode);
//!     }
//!     let image = FirmwareImage::new(bin, "1.2.3").unwrap();
//!     match dev.upgrade(&image, &mut NoProgress) {
//!         Ok(v) => println!("now running {}", v),
//!         Err(e) => println!("upgrade failed: {}", e),
//!     }
//! }
//! ```

#![cfg_attr(not(any(test, feature = "std")), no_std)]
#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

extern crate alloc;

pub mod bus;
pub mod device;
pub mod error;
pub mod image;
pub mod protocol;
pub mod upgrade;

pub use bus::{BootStrap, BusError, ControlLines, I2cBus, SpiOwner};
pub use device::{Coprocessor, DeviceMode};
pub use error::{Error, PreconditionError, ProtocolError, Result};
pub use image::FirmwareImage;
pub use upgrade::{UpgradeError, UpgradeProgress, UpgradeStep};
