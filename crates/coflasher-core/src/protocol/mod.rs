//! Co-processor wire protocols
//!
//! - [`codec`] - command framing shared by all ROM bootloader commands
//! - [`bootloader`] - erase, read, write, run and protection commands
//! - [`app`] - the two commands understood by the application firmware

pub mod app;
pub mod bootloader;
pub mod codec;
pub mod opcodes;

pub use bootloader::{BootloaderInfo, FLASH_START, MAX_TRANSFER};
pub use codec::{Argument, BootloaderCommand, Reply};
