//! Linux I2C device implementation
//!
//! This module provides the `LinuxI2c` struct that implements the `I2cBus`
//! trait using Linux's i2c-dev interface.

use crate::error::{LinuxI2cError, Result};

use coflasher_core::{BusError, I2cBus};

use nix::errno::Errno;

use std::fs::{File, OpenOptions};
use std::os::unix::io::AsRawFd;

/// Linux i2c-dev ioctl constants
mod ioctl {
    use nix::{ioctl_read_bad, ioctl_write_ptr_bad};

    const I2C_FUNCS: u16 = 0x0705;
    const I2C_RDWR: u16 = 0x0707;

    /// Adapter supports plain I2C-level commands
    pub const I2C_FUNC_I2C: libc::c_ulong = 0x0000_0001;

    /// Message is a read
    pub const I2C_M_RD: u16 = 0x0001;

    /// struct i2c_msg
    #[repr(C)]
    pub struct I2cMsg {
        pub addr: u16,
        pub flags: u16,
        pub len: u16,
        pub buf: *mut u8,
    }

    /// struct i2c_rdwr_ioctl_data
    #[repr(C)]
    pub struct I2cRdwrIoctlData {
        pub msgs: *mut I2cMsg,
        pub nmsgs: u32,
    }

    ioctl_read_bad!(i2c_funcs, I2C_FUNCS, libc::c_ulong);
    ioctl_write_ptr_bad!(i2c_rdwr, I2C_RDWR, I2cRdwrIoctlData);
}

/// Configuration for opening a Linux I2C adapter
#[derive(Debug, Clone, Default)]
pub struct LinuxI2cConfig {
    /// Device path (e.g., "/dev/i2c-1")
    pub device: String,
}

impl LinuxI2cConfig {
    /// Create a new configuration with the given device path
    pub fn new(device: impl Into<String>) -> Self {
        Self {
            device: device.into(),
        }
    }
}

/// I2C transport using the i2c-dev interface
///
/// Each `write` or `read` is issued as a single-message `I2C_RDWR` transfer,
/// so the target address is passed per transfer and no `I2C_SLAVE` state is
/// kept on the file descriptor.
pub struct LinuxI2c {
    /// File handle for the adapter
    file: File,
    /// Device path, for log messages
    path: String,
}

impl LinuxI2c {
    /// Open a Linux I2C adapter with the given configuration
    pub fn open(config: &LinuxI2cConfig) -> Result<Self> {
        if config.device.is_empty() {
            return Err(LinuxI2cError::NoDevice);
        }

        log::debug!("linux_i2c: Opening device {}", config.device);

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&config.device)
            .map_err(|e| LinuxI2cError::OpenFailed {
                path: config.device.clone(),
                source: e,
            })?;

        let mut funcs: libc::c_ulong = 0;
        unsafe {
            ioctl::i2c_funcs(file.as_raw_fd(), &mut funcs).map_err(|e| {
                LinuxI2cError::FuncsFailed {
                    path: config.device.clone(),
                    source: std::io::Error::from_raw_os_error(e as i32),
                }
            })?;
        }

        if funcs & ioctl::I2C_FUNC_I2C == 0 {
            return Err(LinuxI2cError::NotI2cCapable {
                path: config.device.clone(),
            });
        }

        log::info!("linux_i2c: Opened {} (funcs=0x{:08X})", config.device, funcs);

        Ok(Self {
            file,
            path: config.device.clone(),
        })
    }

    /// Open a device with default settings
    pub fn open_device(device: &str) -> Result<Self> {
        Self::open(&LinuxI2cConfig::new(device))
    }

    /// Issue one I2C message
    fn transfer(
        &mut self,
        addr: u8,
        flags: u16,
        buf: *mut u8,
        len: usize,
    ) -> std::result::Result<(), BusError> {
        let len = u16::try_from(len).map_err(|_| {
            log::error!("linux_i2c: transfer of {} bytes is too long", len);
            BusError::Io
        })?;

        let mut msg = ioctl::I2cMsg {
            addr: u16::from(addr),
            flags,
            len,
            buf,
        };
        let data = ioctl::I2cRdwrIoctlData {
            msgs: &mut msg,
            nmsgs: 1,
        };

        let ret = unsafe { ioctl::i2c_rdwr(self.file.as_raw_fd(), &data) };
        match ret {
            Ok(_) => Ok(()),
            // Adapters report a missing address ACK as ENXIO or EREMOTEIO
            Err(Errno::ENXIO) | Err(Errno::EREMOTEIO) => Err(BusError::NoDevice),
            Err(e) => {
                log::debug!("linux_i2c: {} addr 0x{:02X}: {}", self.path, addr, e);
                Err(BusError::Io)
            }
        }
    }
}

impl I2cBus for LinuxI2c {
    fn write(&mut self, addr: u8, bytes: &[u8]) -> std::result::Result<(), BusError> {
        // The kernel only reads from the buffer of a write message
        self.transfer(addr, 0, bytes.as_ptr() as *mut u8, bytes.len())
    }

    fn read(&mut self, addr: u8, buf: &mut [u8]) -> std::result::Result<(), BusError> {
        self.transfer(addr, ioctl::I2C_M_RD, buf.as_mut_ptr(), buf.len())
    }

    fn delay_ms(&mut self, ms: u32) {
        std::thread::sleep(std::time::Duration::from_millis(u64::from(ms)));
    }
}

/// Parse transport options from a list of key-value pairs
///
/// # Supported Options
///
/// - `dev=/dev/i2c-N` - Adapter device path
/// - `i2cbus=N` - Adapter number (alternative to dev)
pub fn parse_options(options: &[(&str, &str)]) -> std::result::Result<LinuxI2cConfig, String> {
    let mut config = LinuxI2cConfig::default();
    let mut bus: Option<u32> = None;

    for (key, value) in options {
        match *key {
            "dev" => {
                config.device = value.to_string();
            }
            "i2cbus" => {
                bus = Some(
                    value
                        .parse()
                        .map_err(|_| format!("Invalid i2cbus value: {}", value))?,
                );
            }
            _ => {
                log::warn!("linux_i2c: Unknown option: {}={}", key, value);
            }
        }
    }

    match (config.device.is_empty(), bus) {
        (true, Some(n)) => config.device = format!("/dev/i2c-{}", n),
        (true, None) => {
            return Err("No device specified. Use dev=/dev/i2c-N or i2cbus=N".to_string())
        }
        (false, Some(_)) => {
            return Err("Only one of 'dev' or 'i2cbus' can be specified".to_string())
        }
        (false, None) => {}
    }

    Ok(config)
}
