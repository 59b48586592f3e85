//! CLI command implementations
//!
//! Every command takes an already opened [`coflasher_core::Coprocessor`],
//! so the same code runs against real hardware and the emulator.
//!
//! Commands that talk to the ROM bootloader (`info`, `erase`, `read`,
//! `write`, `run`, `protect`, `unprotect`) first make sure it is running
//! and reset the co-processor into it when it is not.

mod control;
mod erase;
mod list;
mod protect;
mod read;
mod status;
mod upgrade;
mod write;

pub use control::{run_enter_bootloader, run_go, run_reset, run_spi};
pub use erase::run_erase;
pub use list::list_backends;
pub use protect::{run_protect, run_unprotect};
pub use read::run_read;
pub use status::{run_info, run_status};
pub use upgrade::run_upgrade;
pub use write::run_write;

use coflasher_core::{ControlLines, Coprocessor, I2cBus};

/// Put the co-processor in its bootloader if it is not there already
fn ensure_bootloader<B: I2cBus, L: ControlLines>(
    dev: &mut Coprocessor<B, L>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mode = dev.mode()?;
    if mode.is_bootloader() {
        return Ok(());
    }

    log::info!("Co-processor reports {}, resetting into bootloader", mode);
    dev.enter_bootloader()?;

    let mode = dev.mode()?;
    if !mode.is_bootloader() {
        return Err(format!("Could not enter bootloader (device reports {})", mode).into());
    }
    Ok(())
}

#[cfg(all(test, feature = "dummy"))]
pub(crate) mod test_support {
    use coflasher_core::Coprocessor;
    use coflasher_dummy::{build_firmware, DummyBus, DummyConfig, DummyCoprocessor, DummyLines};

    /// Emulated device running an application that reports `version`
    pub fn running_app(version: &str) -> (DummyCoprocessor, Coprocessor<DummyBus, DummyLines>) {
        let emu =
            DummyCoprocessor::with_firmware(DummyConfig::default(), &build_firmware(1024, version));
        let dev = Coprocessor::new(emu.bus(), emu.lines());
        (emu, dev)
    }
}
