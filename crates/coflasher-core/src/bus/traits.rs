//! Backend trait definitions

use core::fmt;

use crate::error::Result;

/// Transport-level failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusError {
    /// No device acknowledged the address
    ///
    /// The co-processor may be in reset, running the other firmware, or
    /// simply absent. This is often recoverable by waiting or resetting.
    NoDevice,
    /// Any other transport fault (arbitration loss, timeout, driver error)
    Io,
}

impl fmt::Display for BusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoDevice => write!(f, "no device acknowledged the address"),
            Self::Io => write!(f, "I/O error"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for BusError {}

/// Addressed two-wire bus shared between the host and other peripherals
///
/// Every call is one complete bus transaction (start, address, data, stop).
/// Implementations must report a missing address acknowledgement as
/// [`BusError::NoDevice`] so callers can tell "not there" apart from real
/// faults.
pub trait I2cBus {
    /// Write `bytes` to the device at `addr`
    fn write(&mut self, addr: u8, bytes: &[u8]) -> core::result::Result<(), BusError>;

    /// Read exactly `buf.len()` bytes from the device at `addr`
    fn read(&mut self, addr: u8, buf: &mut [u8]) -> core::result::Result<(), BusError>;

    /// Block for the given number of milliseconds
    ///
    /// All protocol waits (busy polling, settle times) go through here so
    /// emulated backends can run without sleeping.
    fn delay_ms(&mut self, ms: u32);
}

impl<T: I2cBus + ?Sized> I2cBus for &mut T {
    fn write(&mut self, addr: u8, bytes: &[u8]) -> core::result::Result<(), BusError> {
        (**self).write(addr, bytes)
    }

    fn read(&mut self, addr: u8, buf: &mut [u8]) -> core::result::Result<(), BusError> {
        (**self).read(addr, buf)
    }

    fn delay_ms(&mut self, ms: u32) {
        (**self).delay_ms(ms)
    }
}

impl<T: I2cBus + ?Sized> I2cBus for alloc::boxed::Box<T> {
    fn write(&mut self, addr: u8, bytes: &[u8]) -> core::result::Result<(), BusError> {
        (**self).write(addr, bytes)
    }

    fn read(&mut self, addr: u8, buf: &mut [u8]) -> core::result::Result<(), BusError> {
        (**self).read(addr, buf)
    }

    fn delay_ms(&mut self, ms: u32) {
        (**self).delay_ms(ms)
    }
}

/// Level of the boot-select strap sampled at reset release
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootStrap {
    /// Line switched to input (high impedance)
    ///
    /// The co-processor boots from flash and the shared debug clock pin
    /// stays usable.
    Released,
    /// Line driven to the level that selects the ROM bootloader
    ForceBootloader,
}

/// Which side drives the shared SPI lines
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpiOwner {
    /// Host drives MOSI/SCLK; ownership line low
    Host,
    /// Host pins are inputs and the co-processor drives them; ownership line high
    Coprocessor,
}

impl fmt::Display for SpiOwner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Host => write!(f, "host"),
            Self::Coprocessor => write!(f, "co-processor"),
        }
    }
}

/// Physical control lines wired from the host to the co-processor
pub trait ControlLines {
    /// Drive the active-low reset line
    ///
    /// `true` holds the co-processor in reset, `false` lets it run.
    fn set_reset(&mut self, asserted: bool) -> Result<()>;

    /// Configure the boot-select strap
    fn set_boot_strap(&mut self, strap: BootStrap) -> Result<()>;

    /// Hand the shared SPI lines to the host or to the co-processor
    fn set_spi_owner(&mut self, owner: SpiOwner) -> Result<()>;
}

impl<T: ControlLines + ?Sized> ControlLines for &mut T {
    fn set_reset(&mut self, asserted: bool) -> Result<()> {
        (**self).set_reset(asserted)
    }

    fn set_boot_strap(&mut self, strap: BootStrap) -> Result<()> {
        (**self).set_boot_strap(strap)
    }

    fn set_spi_owner(&mut self, owner: SpiOwner) -> Result<()> {
        (**self).set_spi_owner(owner)
    }
}

impl<T: ControlLines + ?Sized> ControlLines for alloc::boxed::Box<T> {
    fn set_reset(&mut self, asserted: bool) -> Result<()> {
        (**self).set_reset(asserted)
    }

    fn set_boot_strap(&mut self, strap: BootStrap) -> Result<()> {
        (**self).set_boot_strap(strap)
    }

    fn set_spi_owner(&mut self, owner: SpiOwner) -> Result<()> {
        (**self).set_spi_owner(owner)
    }
}
