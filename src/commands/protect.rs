//! Readout protection commands

use coflasher_core::protocol::Reply;
use coflasher_core::{ControlLines, Coprocessor, I2cBus};

use super::ensure_bootloader;

/// Enable readout protection
///
/// The co-processor resets once protection is applied.
pub fn run_protect<B: I2cBus, L: ControlLines>(
    dev: &mut Coprocessor<B, L>,
) -> Result<(), Box<dyn std::error::Error>> {
    ensure_bootloader(dev)?;
    match dev.readout_protect()? {
        Reply::Ack => {
            println!("Readout protection enabled");
            Ok(())
        }
        other => Err(format!("Readout protect refused ({})", other).into()),
    }
}

/// Disable readout protection, which mass erases the flash
pub fn run_unprotect<B: I2cBus, L: ControlLines>(
    dev: &mut Coprocessor<B, L>,
    confirmed: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    if !confirmed {
        return Err("Removing readout protection erases the whole flash; pass --yes".into());
    }

    ensure_bootloader(dev)?;
    match dev.readout_unprotect()? {
        Reply::Ack => {
            println!("Readout protection removed, flash erased");
            Ok(())
        }
        other => Err(format!("Readout unprotect refused ({})", other).into()),
    }
}
