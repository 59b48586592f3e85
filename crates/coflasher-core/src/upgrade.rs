//! Firmware upgrade sequence
//!
//! 1. Detect the current mode
//! 2. Get into the ROM bootloader, asking the application first and falling
//!    back to the boot strap
//! 3. Mass erase
//! 4. Program every block except the first
//! 5. Program the first block (the vector table) last
//! 6. Jump to the new image
//! 7. Check the version it reports
//!
//! Once step 3 has started the co-processor holds no bootable firmware
//! until step 5 succeeds. A failure in between leaves it in the bootloader,
//! where the upgrade can simply be run again.

use alloc::string::String;
use core::fmt;

use crate::bus::{ControlLines, I2cBus};
use crate::device::{Coprocessor, DeviceMode};
use crate::error::Error;
use crate::image::FirmwareImage;

/// Settle time between jumping to the new image and asking its version
pub const RUN_SETTLE_MS: u32 = 50;

/// Steps of the upgrade, in order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum UpgradeStep {
    /// Querying the current mode
    DetectMode,
    /// Switching to the ROM bootloader
    EnterBootloader,
    /// Mass erasing
    Erase,
    /// Programming everything after the first block
    ProgramBody,
    /// Programming the vector table block
    ProgramFirstBlock,
    /// Jumping to the new image
    Run,
    /// Checking the reported version
    VerifyVersion,
}

impl UpgradeStep {
    /// True if the flash may no longer hold a bootable image
    pub fn flash_disturbed(self) -> bool {
        self >= Self::Erase && self <= Self::ProgramFirstBlock
    }
}

impl fmt::Display for UpgradeStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::DetectMode => "detect mode",
            Self::EnterBootloader => "enter bootloader",
            Self::Erase => "erase",
            Self::ProgramBody => "program",
            Self::ProgramFirstBlock => "program first block",
            Self::Run => "run",
            Self::VerifyVersion => "verify version",
        };
        f.write_str(s)
    }
}

/// Why an upgrade stopped
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpgradeError {
    /// Still not in the bootloader after trying to enter it
    NotInBootloader {
        /// Mode observed instead
        found: DeviceMode,
    },
    /// Mass erase did not end in ACK
    EraseFailed,
    /// A block write did not end in ACK
    WriteFailed {
        /// Program step the block belonged to
        step: UpgradeStep,
        /// Start address of the block
        addr: u32,
    },
    /// The new image reported something other than the expected version
    VersionMismatch {
        /// Version of the image
        expected: String,
        /// What the co-processor reported
        found: DeviceMode,
    },
    /// A command failed outright
    Command {
        /// Step in progress
        step: UpgradeStep,
        /// Underlying error
        source: Error,
        /// Mode observed before the failing command, if any
        last_mode: Option<DeviceMode>,
    },
}

impl UpgradeError {
    /// Step the upgrade stopped at
    pub fn step(&self) -> UpgradeStep {
        match self {
            Self::NotInBootloader { .. } => UpgradeStep::EnterBootloader,
            Self::EraseFailed => UpgradeStep::Erase,
            Self::WriteFailed { step, .. } | Self::Command { step, .. } => *step,
            Self::VersionMismatch { .. } => UpgradeStep::VerifyVersion,
        }
    }

    /// Last mode the co-processor was seen in, if known
    ///
    /// From the erase up to the jump the device was last confirmed to be in
    /// the bootloader.
    pub fn last_mode(&self) -> Option<DeviceMode> {
        match self {
            Self::NotInBootloader { found } | Self::VersionMismatch { found, .. } => {
                Some(found.clone())
            }
            Self::Command { last_mode, .. } => last_mode.clone(),
            Self::EraseFailed | Self::WriteFailed { .. } => Some(DeviceMode::Bootloader),
        }
    }
}

impl fmt::Display for UpgradeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotInBootloader { found } => {
                write!(f, "could not enter bootloader (device reports {})", found)
            }
            Self::EraseFailed => write!(f, "mass erase failed"),
            Self::WriteFailed { addr, .. } => write!(f, "write failed at 0x{:08X}", addr),
            Self::VersionMismatch { expected, found } => write!(
                f,
                "new firmware reports {} instead of {}",
                found, expected
            ),
            Self::Command { step, source, .. } => write!(f, "{} failed: {}", step, source),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for UpgradeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Command { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Progress callback for [`run`]
pub trait UpgradeProgress {
    /// A new step is starting
    fn step(&mut self, step: UpgradeStep);

    /// `done` of `total` image bytes have been programmed
    fn programmed(&mut self, done: usize, total: usize);
}

/// No-op progress implementation
pub struct NoProgress;

impl UpgradeProgress for NoProgress {
    fn step(&mut self, _step: UpgradeStep) {}
    fn programmed(&mut self, _done: usize, _total: usize) {}
}

fn at<T>(
    step: UpgradeStep,
    seen: Option<&DeviceMode>,
    result: crate::Result<T>,
) -> Result<T, UpgradeError> {
    result.map_err(|source| {
        log::error!("upgrade: {} failed: {}", step, source);
        UpgradeError::Command {
            step,
            source,
            last_mode: seen.cloned(),
        }
    })
}

/// Run the full upgrade sequence
///
/// On success returns the version the new image reports, which equals
/// `image.version()`.
pub fn run<B, L, P>(
    dev: &mut Coprocessor<B, L>,
    image: &FirmwareImage,
    progress: &mut P,
) -> Result<String, UpgradeError>
where
    B: I2cBus,
    L: ControlLines,
    P: UpgradeProgress + ?Sized,
{
    progress.step(UpgradeStep::DetectMode);
    let mode = at(UpgradeStep::DetectMode, None, dev.mode())?;
    log::info!("Co-processor reports: {}", mode);

    if !mode.is_bootloader() {
        progress.step(UpgradeStep::EnterBootloader);
        let entered = match &mode {
            DeviceMode::Application(_) => match dev.request_bootloader_mode() {
                Ok(()) => Ok(()),
                Err(e) => {
                    log::warn!("Application refused to reboot ({}), using boot strap", e);
                    dev.enter_bootloader()
                }
            },
            _ => dev.enter_bootloader(),
        };
        at(UpgradeStep::EnterBootloader, Some(&mode), entered)?;

        let found = at(UpgradeStep::EnterBootloader, Some(&mode), dev.mode())?;
        if !found.is_bootloader() {
            log::error!("upgrade: still not in bootloader ({})", found);
            return Err(UpgradeError::NotInBootloader { found });
        }
    }

    let bootloader = DeviceMode::Bootloader;
    let seen = Some(&bootloader);

    progress.step(UpgradeStep::Erase);
    log::info!("Erasing co-processor flash");
    if !at(UpgradeStep::Erase, seen, dev.bulk_erase())? {
        return Err(UpgradeError::EraseFailed);
    }

    let total = image.len();
    let mut done = 0usize;
    progress.step(UpgradeStep::ProgramBody);
    progress.programmed(0, total);
    log::info!("Programming {} bytes at 0x{:08X}", total, image.base());

    for (addr, block) in image.blocks_in_write_order() {
        let step = if addr == image.base() {
            progress.step(UpgradeStep::ProgramFirstBlock);
            UpgradeStep::ProgramFirstBlock
        } else {
            UpgradeStep::ProgramBody
        };

        log::debug!("upgrade: writing {} bytes at 0x{:08X}", block.len(), addr);
        if !at(step, seen, dev.write_at(addr, block))? {
            log::error!("upgrade: write at 0x{:08X} not acknowledged", addr);
            return Err(UpgradeError::WriteFailed { step, addr });
        }

        done += block.len();
        progress.programmed(done, total);
    }

    progress.step(UpgradeStep::Run);
    at(UpgradeStep::Run, seen, dev.run_at(image.base()))?;
    dev.bus_mut().delay_ms(RUN_SETTLE_MS);

    progress.step(UpgradeStep::VerifyVersion);
    let found = at(UpgradeStep::VerifyVersion, seen, dev.mode())?;
    match found.version() {
        Some(v) if v == image.version() => {
            log::info!("Co-processor now running {}", v);
            Ok(String::from(v))
        }
        _ => {
            log::error!(
                "upgrade: expected version {}, device reports {}",
                image.version(),
                found
            );
            Err(UpgradeError::VersionMismatch {
                expected: String::from(image.version()),
                found,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::mock::{LineEvent, RecordingLines, ScriptedBus, Transaction};
    use crate::bus::{BusError, APP_ADDR, BOOTLOADER_ADDR};
    use crate::error::ProtocolError;
    use crate::protocol::opcodes::{ACK, NACK};

    const BL: u8 = BOOTLOADER_ADDR;

    fn get_exchange() -> [Transaction; 4] {
        [
            Transaction::write(BL, &[0x00, 0xFF]),
            Transaction::read(BL, &[ACK]),
            Transaction::read(BL, &[0x12, 0x11, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]),
            Transaction::read(BL, &[ACK]),
        ]
    }

    fn app_absent() -> [Transaction; 2] {
        [
            Transaction::write(APP_ADDR, b"v"),
            Transaction::read_err(APP_ADDR, BusError::NoDevice),
        ]
    }

    #[derive(Default)]
    struct Recorder {
        steps: Vec<UpgradeStep>,
        last: (usize, usize),
    }

    impl UpgradeProgress for Recorder {
        fn step(&mut self, step: UpgradeStep) {
            self.steps.push(step);
        }

        fn programmed(&mut self, done: usize, total: usize) {
            self.last = (done, total);
        }
    }

    #[test]
    fn test_erase_failure_stops_before_writing() {
        let mut script = Vec::new();
        script.extend(app_absent());
        script.extend(get_exchange());
        script.extend([
            Transaction::write(BL, &[0x45, 0xBA]),
            Transaction::read(BL, &[ACK]),
            Transaction::write(BL, &[0xFF, 0xFF, 0x00]),
            Transaction::read(BL, &[NACK]),
        ]);

        let mut dev = Coprocessor::new(ScriptedBus::new(&script), RecordingLines::default());
        let image = FirmwareImage::new(vec![0; 512], "1.0").unwrap();
        let mut progress = Recorder::default();
        let err = dev.upgrade(&image, &mut progress).unwrap_err();

        assert_eq!(err, UpgradeError::EraseFailed);
        assert!(err.step().flash_disturbed());
        assert_eq!(err.last_mode(), Some(DeviceMode::Bootloader));
        assert_eq!(progress.steps, [UpgradeStep::DetectMode, UpgradeStep::Erase]);
        let (bus, lines) = dev.into_parts();
        assert!(lines.events.is_empty());
        bus.done();
    }

    #[test]
    fn test_unresponsive_device_uses_strap() {
        let mut script = Vec::new();
        // initial mode check: nobody answers
        script.extend(app_absent());
        script.extend([
            Transaction::write(BL, &[0x00, 0xFF]),
            Transaction::read_err(BL, BusError::NoDevice),
        ]);
        // after the strap reset, still nobody
        script.extend(app_absent());
        script.extend([
            Transaction::write(BL, &[0x00, 0xFF]),
            Transaction::read_err(BL, BusError::NoDevice),
        ]);

        let mut dev = Coprocessor::new(ScriptedBus::new(&script), RecordingLines::default());
        let image = FirmwareImage::new(vec![0; 4], "1.0").unwrap();
        let err = dev.upgrade(&image, &mut NoProgress).unwrap_err();

        assert_eq!(
            err,
            UpgradeError::NotInBootloader {
                found: DeviceMode::Unresponsive
            }
        );
        assert!(!err.step().flash_disturbed());
        let (bus, lines) = dev.into_parts();
        assert_eq!(lines.events[1], LineEvent::Strap(crate::BootStrap::ForceBootloader));
        bus.done();
    }

    #[test]
    fn test_write_address_rejected() {
        let mut script = Vec::new();
        script.extend(app_absent());
        script.extend(get_exchange());
        script.extend([
            Transaction::write(BL, &[0x45, 0xBA]),
            Transaction::read(BL, &[ACK]),
            Transaction::write(BL, &[0xFF, 0xFF, 0x00]),
            Transaction::read(BL, &[ACK]),
            Transaction::write(BL, &[0x32, 0xCD]),
            Transaction::read(BL, &[ACK]),
            Transaction::write(BL, &[0x08, 0x00, 0x01, 0x00, 0x09]),
            Transaction::read(BL, &[NACK]),
        ]);

        let mut dev = Coprocessor::new(ScriptedBus::new(&script), RecordingLines::default());
        let image = FirmwareImage::new(vec![0; 512], "1.0").unwrap();
        let err = dev.upgrade(&image, &mut NoProgress).unwrap_err();

        assert_eq!(
            err,
            UpgradeError::Command {
                step: UpgradeStep::ProgramBody,
                source: Error::Protocol(ProtocolError::BadAddress { response: NACK }),
                last_mode: Some(DeviceMode::Bootloader),
            }
        );
        assert_eq!(
            err.to_string(),
            "program failed: protocol error: bad address (got 0x1F)"
        );
        let (bus, _) = dev.into_parts();
        bus.done();
    }

    #[test]
    fn test_failed_strap_reports_application_mode() {
        let mut version = [0u8; 20];
        version[..3].copy_from_slice(b"1.0");
        let script = [
            Transaction::write(APP_ADDR, b"v"),
            Transaction::read(APP_ADDR, &version),
            Transaction::write(APP_ADDR, b"b"),
            Transaction::read(APP_ADDR, b"NO"),
        ];
        let lines = RecordingLines {
            fail: true,
            ..Default::default()
        };

        let mut dev = Coprocessor::new(ScriptedBus::new(&script), lines);
        let image = FirmwareImage::new(vec![0; 4], "2.0").unwrap();
        let err = dev.upgrade(&image, &mut NoProgress).unwrap_err();

        assert_eq!(
            err,
            UpgradeError::Command {
                step: UpgradeStep::EnterBootloader,
                source: Error::ControlLine,
                last_mode: Some(DeviceMode::Application("1.0".into())),
            }
        );
        assert_eq!(err.last_mode(), Some(DeviceMode::Application("1.0".into())));
        let (bus, lines) = dev.into_parts();
        assert_eq!(lines.events, [LineEvent::Reset(true)]);
        bus.done();
    }

    #[test]
    fn test_step_order() {
        assert!(UpgradeStep::DetectMode < UpgradeStep::EnterBootloader);
        assert!(UpgradeStep::ProgramBody < UpgradeStep::ProgramFirstBlock);
        assert!(!UpgradeStep::Run.flash_disturbed());
        assert!(UpgradeStep::ProgramFirstBlock.flash_disturbed());
    }
}
