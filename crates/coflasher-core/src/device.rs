//! The co-processor handle
//!
//! [`Coprocessor`] owns the transport and the control lines and exposes
//! every operation the rest of the tooling needs: mode detection, entering
//! and leaving the bootloader, SPI hand-over, the raw bootloader commands,
//! and the full upgrade.

use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;

use crate::bus::{BootStrap, ControlLines, I2cBus, SpiOwner};
use crate::error::Result;
use crate::image::FirmwareImage;
use crate::protocol::{app, bootloader, BootloaderInfo, Reply};
use crate::upgrade::{self, UpgradeError, UpgradeProgress};

/// Time the ROM bootloader needs after reset before it answers
pub const BOOTLOADER_SETTLE_MS: u32 = 100;

/// What the co-processor is running
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceMode {
    /// Application firmware reporting this version
    Application(String),
    /// ROM bootloader
    Bootloader,
    /// Neither answered
    Unresponsive,
}

impl DeviceMode {
    /// True when the ROM bootloader answered
    pub fn is_bootloader(&self) -> bool {
        matches!(self, Self::Bootloader)
    }

    /// Application version, if the application answered
    pub fn version(&self) -> Option<&str> {
        match self {
            Self::Application(v) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Display for DeviceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Application(v) => f.write_str(v),
            Self::Bootloader => f.write_str("BL"),
            Self::Unresponsive => f.write_str("FAIL"),
        }
    }
}

/// Pulse the reset line with whatever strap level is currently set
pub(crate) fn pulse_reset<L: ControlLines + ?Sized>(lines: &mut L) -> Result<()> {
    lines.set_reset(true)?;
    lines.set_reset(false)
}

/// Handle to one co-processor
pub struct Coprocessor<B: I2cBus, L: ControlLines> {
    bus: B,
    lines: L,
}

impl<B: I2cBus, L: ControlLines> Coprocessor<B, L> {
    /// Wrap a transport and its control lines
    pub fn new(bus: B, lines: L) -> Self {
        Self { bus, lines }
    }

    /// Give back the transport and control lines
    pub fn into_parts(self) -> (B, L) {
        (self.bus, self.lines)
    }

    /// Mutable access to the transport
    pub fn bus_mut(&mut self) -> &mut B {
        &mut self.bus
    }

    /// Mutable access to the control lines
    pub fn lines_mut(&mut self) -> &mut L {
        &mut self.lines
    }

    /// Detect the current mode
    ///
    /// See [`app::query_version`].
    pub fn mode(&mut self) -> Result<DeviceMode> {
        app::query_version(&mut self.bus)
    }

    /// Reset into the ROM bootloader using the boot strap
    ///
    /// Works regardless of what is in flash. The strap is released again
    /// once the co-processor is out of reset, since it shares a pin with the
    /// debug clock.
    pub fn enter_bootloader(&mut self) -> Result<()> {
        log::info!("Resetting co-processor into bootloader");
        self.lines.set_reset(true)?;
        self.lines.set_boot_strap(BootStrap::ForceBootloader)?;
        self.lines.set_reset(false)?;
        self.lines.set_boot_strap(BootStrap::Released)?;
        self.bus.delay_ms(BOOTLOADER_SETTLE_MS);
        Ok(())
    }

    /// Reset and boot normally from flash
    pub fn reset(&mut self) -> Result<()> {
        log::info!("Resetting co-processor");
        self.lines.set_boot_strap(BootStrap::Released)?;
        pulse_reset(&mut self.lines)
    }

    /// Ask the running application to reboot into the bootloader
    pub fn request_bootloader_mode(&mut self) -> Result<()> {
        log::info!("Asking co-processor application to enter bootloader");
        app::request_bootloader_mode(&mut self.bus, &mut self.lines)
    }

    /// Hand the shared SPI lines to `owner`
    ///
    /// Nothing else in the driver drives these lines, so whatever is set
    /// here stays in effect until the next call.
    pub fn set_spi_owner(&mut self, owner: SpiOwner) -> Result<()> {
        log::debug!("SPI bus owner: {}", owner);
        self.lines.set_spi_owner(owner)
    }

    /// Raw 20-byte bootloader Get reply
    pub fn bootloader_version(&mut self) -> Result<[u8; bootloader::VERSION_REPLY_LEN]> {
        bootloader::version(&mut self.bus)
    }

    /// Decoded bootloader Get reply
    pub fn bootloader_info(&mut self) -> Result<BootloaderInfo> {
        self.bootloader_version()
            .map(|raw| BootloaderInfo::parse(&raw))
    }

    /// Mass erase the flash
    pub fn bulk_erase(&mut self) -> Result<bool> {
        bootloader::bulk_erase(&mut self.bus)
    }

    /// Read up to 256 bytes
    pub fn read_at(&mut self, addr: u32, len: usize) -> Result<Vec<u8>> {
        bootloader::read_at(&mut self.bus, addr, len)
    }

    /// Read any number of bytes
    pub fn read_range(&mut self, addr: u32, len: usize) -> Result<Vec<u8>> {
        bootloader::read_range(&mut self.bus, addr, len)
    }

    /// Program one block
    pub fn write_at(&mut self, addr: u32, data: &[u8]) -> Result<bool> {
        bootloader::write_at(&mut self.bus, addr, data)
    }

    /// Jump to the image at `addr`
    pub fn run_at(&mut self, addr: u32) -> Result<()> {
        bootloader::run_at(&mut self.bus, addr)
    }

    /// Enable readout protection
    pub fn readout_protect(&mut self) -> Result<Reply> {
        bootloader::readout_protect(&mut self.bus)
    }

    /// Disable readout protection, erasing the flash
    pub fn readout_unprotect(&mut self) -> Result<Reply> {
        bootloader::readout_unprotect(&mut self.bus)
    }

    /// Replace the application firmware with `image`
    ///
    /// Returns the version reported by the new firmware. See
    /// [`upgrade::run`] for the sequence.
    pub fn upgrade<P: UpgradeProgress + ?Sized>(
        &mut self,
        image: &FirmwareImage,
        progress: &mut P,
    ) -> core::result::Result<String, UpgradeError> {
        upgrade::run(self, image, progress)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::mock::{LineEvent, RecordingLines, ScriptedBus};

    #[test]
    fn test_enter_bootloader_sequence() {
        let mut dev = Coprocessor::new(ScriptedBus::new(&[]), RecordingLines::default());
        dev.enter_bootloader().unwrap();
        let (bus, lines) = dev.into_parts();
        assert_eq!(
            lines.events,
            [
                LineEvent::Reset(true),
                LineEvent::Strap(BootStrap::ForceBootloader),
                LineEvent::Reset(false),
                LineEvent::Strap(BootStrap::Released),
            ]
        );
        assert_eq!(bus.delays, [BOOTLOADER_SETTLE_MS]);
    }

    #[test]
    fn test_reset_releases_strap_first() {
        let mut dev = Coprocessor::new(ScriptedBus::new(&[]), RecordingLines::default());
        dev.reset().unwrap();
        assert_eq!(
            dev.lines_mut().events,
            [
                LineEvent::Strap(BootStrap::Released),
                LineEvent::Reset(true),
                LineEvent::Reset(false),
            ]
        );
    }

    #[test]
    fn test_spi_owner_is_sticky() {
        let mut dev = Coprocessor::new(ScriptedBus::new(&[]), RecordingLines::default());
        dev.set_spi_owner(SpiOwner::Coprocessor).unwrap();
        dev.reset().unwrap();
        let events = &dev.lines_mut().events;
        assert_eq!(events[0], LineEvent::Spi(SpiOwner::Coprocessor));
        assert_eq!(
            events
                .iter()
                .filter(|e| matches!(e, LineEvent::Spi(_)))
                .count(),
            1
        );
    }

    #[test]
    fn test_mode_display() {
        assert_eq!(DeviceMode::Application("1.2.3".into()).to_string(), "1.2.3");
        assert_eq!(DeviceMode::Bootloader.to_string(), "BL");
        assert_eq!(DeviceMode::Unresponsive.to_string(), "FAIL");
        assert_eq!(DeviceMode::Application("x".into()).version(), Some("x"));
        assert!(DeviceMode::Bootloader.is_bootloader());
    }
}
