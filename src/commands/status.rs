//! Status and bootloader info commands

use coflasher_core::protocol::opcodes;
use coflasher_core::{ControlLines, Coprocessor, DeviceMode, I2cBus};

use super::ensure_bootloader;

/// Print what the co-processor is running
pub fn run_status<B: I2cBus, L: ControlLines>(
    dev: &mut Coprocessor<B, L>,
) -> Result<(), Box<dyn std::error::Error>> {
    match dev.mode()? {
        DeviceMode::Application(version) => println!("Application running, version {}", version),
        DeviceMode::Bootloader => println!("ROM bootloader running"),
        DeviceMode::Unresponsive => println!("No answer from application or bootloader"),
    }
    Ok(())
}

/// Print the bootloader protocol version and command list
pub fn run_info<B: I2cBus, L: ControlLines>(
    dev: &mut Coprocessor<B, L>,
) -> Result<(), Box<dyn std::error::Error>> {
    ensure_bootloader(dev)?;
    let info = dev.bootloader_info()?;

    let (major, minor) = info.version();
    println!("Bootloader protocol v{}.{}", major, minor);
    println!("Supported commands:");
    for &op in &info.commands {
        println!("  0x{:02X}  {}", op, opcodes::name(op));
    }
    Ok(())
}
