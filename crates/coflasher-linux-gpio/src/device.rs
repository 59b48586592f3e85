//! Linux GPIO control line implementation
//!
//! This module provides the `LinuxGpioLines` struct that implements the
//! `ControlLines` trait using Linux's GPIO character device interface
//! (gpiocdev).
//!
//! Each line is held in its own request so it can be reconfigured without
//! touching the others:
//!
//! - **reset**: output, low holds the co-processor in reset
//! - **boot0**: input while released, driven high to select the bootloader
//! - **ctrl**: SPI ownership, high hands the shared SPI lines to the
//!   co-processor. Requested on first use, so opening the lines does not
//!   change who owns the bus.

use crate::error::{LinuxGpioError, Result};

use coflasher_core::{BootStrap, ControlLines, Error as CoreError, Result as CoreResult, SpiOwner};

use gpiocdev::line::{Offset, Value};
use gpiocdev::request::{Config, Request};

const CONSUMER: &str = "coflasher";

/// Configuration for opening the control lines
#[derive(Debug, Clone, Default)]
pub struct LinuxGpioLinesConfig {
    /// Device path (e.g., "/dev/gpiochip0")
    pub device: String,
    /// Reset line offset
    pub reset: Offset,
    /// Boot strap line offset
    pub boot0: Offset,
    /// SPI ownership line offset, if wired
    pub ctrl: Option<Offset>,
}

impl LinuxGpioLinesConfig {
    /// Create a new configuration with the given chip and required lines
    pub fn new(device: impl Into<String>, reset: Offset, boot0: Offset) -> Self {
        Self {
            device: device.into(),
            reset,
            boot0,
            ctrl: None,
        }
    }

    /// Set the SPI ownership line
    pub fn with_ctrl(mut self, ctrl: Offset) -> Self {
        self.ctrl = Some(ctrl);
        self
    }
}

/// Reset, boot strap and SPI ownership lines on a GPIO chip
pub struct LinuxGpioLines {
    device: String,
    reset: Offset,
    reset_request: Request,
    boot0: Offset,
    boot0_request: Request,
    ctrl: Option<Offset>,
    ctrl_request: Option<Request>,
}

fn request_line(device: &str, cfg: Config) -> Result<Request> {
    Request::from_config(cfg)
        .on_chip(device)
        .with_consumer(CONSUMER)
        .request()
        .map_err(LinuxGpioError::LineRequestFailed)
}

/// Log a backend error and collapse it into the core error
fn line_failed(e: LinuxGpioError) -> CoreError {
    log::error!("linux_gpio: {}", e);
    CoreError::ControlLine
}

impl LinuxGpioLines {
    /// Request the reset and boot strap lines
    ///
    /// Reset is requested released (co-processor running) and the strap as
    /// an input, so opening the lines leaves a running co-processor alone.
    pub fn open(config: &LinuxGpioLinesConfig) -> Result<Self> {
        if config.device.is_empty() {
            return Err(LinuxGpioError::NoDevice);
        }
        if config.reset == config.boot0 {
            return Err(LinuxGpioError::DuplicateLine(config.reset));
        }
        if let Some(ctrl) = config.ctrl {
            if ctrl == config.reset || ctrl == config.boot0 {
                return Err(LinuxGpioError::DuplicateLine(ctrl));
            }
        }

        log::debug!("linux_gpio: Opening device {}", config.device);

        let mut reset_cfg = Config::default();
        reset_cfg.with_line(config.reset).as_output(Value::Active);
        let reset_request = request_line(&config.device, reset_cfg)?;

        let mut boot0_cfg = Config::default();
        boot0_cfg.with_line(config.boot0).as_input();
        let boot0_request = request_line(&config.device, boot0_cfg)?;

        log::info!(
            "linux_gpio: Opened {} (reset={}, boot0={}{})",
            config.device,
            config.reset,
            config.boot0,
            match config.ctrl {
                Some(ctrl) => format!(", ctrl={}", ctrl),
                None => String::new(),
            }
        );

        Ok(Self {
            device: config.device.clone(),
            reset: config.reset,
            reset_request,
            boot0: config.boot0,
            boot0_request,
            ctrl: config.ctrl,
            ctrl_request: None,
        })
    }

    fn drive_ctrl(&mut self, ctrl: Offset, value: Value) -> Result<()> {
        if let Some(request) = &self.ctrl_request {
            request
                .set_value(ctrl, value)
                .map_err(LinuxGpioError::SetValueFailed)?;
            return Ok(());
        }

        let mut cfg = Config::default();
        cfg.with_line(ctrl).as_output(value);
        self.ctrl_request = Some(request_line(&self.device, cfg)?);
        Ok(())
    }
}

impl ControlLines for LinuxGpioLines {
    fn set_reset(&mut self, asserted: bool) -> CoreResult<()> {
        let value = if asserted {
            Value::Inactive
        } else {
            Value::Active
        };
        log::trace!("linux_gpio: reset line {} -> {:?}", self.reset, value);
        self.reset_request
            .set_value(self.reset, value)
            .map_err(|e| line_failed(LinuxGpioError::SetValueFailed(e)))?;
        Ok(())
    }

    fn set_boot_strap(&mut self, strap: BootStrap) -> CoreResult<()> {
        let mut cfg = Config::default();
        match strap {
            BootStrap::ForceBootloader => cfg.with_line(self.boot0).as_output(Value::Active),
            BootStrap::Released => cfg.with_line(self.boot0).as_input(),
        };
        log::trace!("linux_gpio: boot0 line {} -> {:?}", self.boot0, strap);
        self.boot0_request
            .reconfigure(&cfg)
            .map_err(|e| line_failed(LinuxGpioError::ReconfigureFailed(e)))?;
        Ok(())
    }

    fn set_spi_owner(&mut self, owner: SpiOwner) -> CoreResult<()> {
        let Some(ctrl) = self.ctrl else {
            return Err(line_failed(LinuxGpioError::MissingParameter("ctrl")));
        };
        let value = match owner {
            SpiOwner::Host => Value::Inactive,
            SpiOwner::Coprocessor => Value::Active,
        };
        self.drive_ctrl(ctrl, value).map_err(line_failed)
    }
}

/// Parse control line options from a list of key-value pairs
///
/// # Supported Options
///
/// - `chip=/dev/gpiochipN` - GPIO chip device path (or use gpiochip)
/// - `gpiochip=N` - GPIO chip number (alternative to chip)
/// - `reset=N` - Reset line offset (required)
/// - `boot0=N` - Boot strap line offset (required)
/// - `ctrl=N` - SPI ownership line offset (optional)
pub fn parse_options(
    options: &[(&str, &str)],
) -> std::result::Result<LinuxGpioLinesConfig, String> {
    let mut config = LinuxGpioLinesConfig::default();
    let mut gpiochip: Option<u32> = None;
    let mut reset: Option<Offset> = None;
    let mut boot0: Option<Offset> = None;

    for (key, value) in options {
        let parse_line = || {
            value
                .parse::<Offset>()
                .map_err(|_| format!("Invalid {} value: {}", key, value))
        };
        match *key {
            "chip" => {
                config.device = value.to_string();
            }
            "gpiochip" => {
                gpiochip = Some(
                    value
                        .parse()
                        .map_err(|_| format!("Invalid gpiochip value: {}", value))?,
                );
            }
            "reset" => reset = Some(parse_line()?),
            "boot0" => boot0 = Some(parse_line()?),
            "ctrl" => config.ctrl = Some(parse_line()?),
            _ => {
                log::warn!("linux_gpio: Unknown option: {}={}", key, value);
            }
        }
    }

    // Handle chip vs gpiochip
    if config.device.is_empty() {
        match gpiochip {
            Some(n) => config.device = format!("/dev/gpiochip{}", n),
            None => {
                return Err("Either 'chip' or 'gpiochip' must be specified.\n\
                     e.g. linux:i2cbus=1,gpiochip=0,reset=17,boot0=27,ctrl=22"
                    .to_string())
            }
        }
    } else if gpiochip.is_some() {
        return Err("Only one of 'chip' or 'gpiochip' can be specified".to_string());
    }

    config.reset = reset.ok_or("Missing required parameter: reset")?;
    config.boot0 = boot0.ok_or("Missing required parameter: boot0")?;

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full() {
        let config = parse_options(&[
            ("gpiochip", "0"),
            ("reset", "17"),
            ("boot0", "27"),
            ("ctrl", "22"),
        ])
        .unwrap();
        assert_eq!(config.device, "/dev/gpiochip0");
        assert_eq!(config.reset, 17);
        assert_eq!(config.boot0, 27);
        assert_eq!(config.ctrl, Some(22));
    }

    #[test]
    fn test_parse_chip_path_without_ctrl() {
        let config =
            parse_options(&[("chip", "/dev/gpiochip4"), ("reset", "1"), ("boot0", "2")]).unwrap();
        assert_eq!(config.device, "/dev/gpiochip4");
        assert_eq!(config.ctrl, None);
    }

    #[test]
    fn test_parse_missing_lines() {
        let err = parse_options(&[("gpiochip", "0"), ("boot0", "2")]).unwrap_err();
        assert!(err.contains("reset"));
        let err = parse_options(&[("gpiochip", "0"), ("reset", "2")]).unwrap_err();
        assert!(err.contains("boot0"));
        assert!(parse_options(&[("reset", "1"), ("boot0", "2")]).is_err());
        assert!(parse_options(&[("gpiochip", "0"), ("reset", "x"), ("boot0", "2")]).is_err());
    }

    #[test]
    fn test_open_rejects_duplicate_lines() {
        let config = LinuxGpioLinesConfig::new("/dev/gpiochip0", 5, 5);
        assert!(matches!(
            LinuxGpioLines::open(&config),
            Err(LinuxGpioError::DuplicateLine(5))
        ));
        let config = LinuxGpioLinesConfig::new("/dev/gpiochip0", 5, 6).with_ctrl(6);
        assert!(matches!(
            LinuxGpioLines::open(&config),
            Err(LinuxGpioError::DuplicateLine(6))
        ));
    }
}
