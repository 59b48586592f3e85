//! Reset, boot mode and SPI ownership commands

use coflasher_core::{ControlLines, Coprocessor, I2cBus, SpiOwner};

use super::ensure_bootloader;

/// Put the co-processor into its ROM bootloader
///
/// With `soft` the running application is asked to reboot itself;
/// otherwise the boot strap is held across a reset.
pub fn run_enter_bootloader<B: I2cBus, L: ControlLines>(
    dev: &mut Coprocessor<B, L>,
    soft: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    if soft {
        dev.request_bootloader_mode()?;
    } else {
        dev.enter_bootloader()?;
    }

    let mode = dev.mode()?;
    if !mode.is_bootloader() {
        return Err(format!("Bootloader not running (device reports {})", mode).into());
    }
    println!("Bootloader running");
    Ok(())
}

/// Reset the co-processor with the strap released
pub fn run_reset<B: I2cBus, L: ControlLines>(
    dev: &mut Coprocessor<B, L>,
) -> Result<(), Box<dyn std::error::Error>> {
    dev.reset()?;
    println!("Co-processor reset, now reports {}", dev.mode()?);
    Ok(())
}

/// Jump from the bootloader to the image at `addr`
pub fn run_go<B: I2cBus, L: ControlLines>(
    dev: &mut Coprocessor<B, L>,
    addr: u32,
) -> Result<(), Box<dyn std::error::Error>> {
    ensure_bootloader(dev)?;
    dev.run_at(addr)?;
    dev.bus_mut().delay_ms(coflasher_core::upgrade::RUN_SETTLE_MS);
    println!("Started image at 0x{:08X}, device reports {}", addr, dev.mode()?);
    Ok(())
}

/// Hand the shared SPI bus over
pub fn run_spi<B: I2cBus, L: ControlLines>(
    dev: &mut Coprocessor<B, L>,
    owner: SpiOwner,
) -> Result<(), Box<dyn std::error::Error>> {
    dev.set_spi_owner(owner)?;
    println!("SPI bus now owned by {}", owner);
    Ok(())
}
