//! Application firmware commands
//!
//! The application answers at [`APP_ADDR`] with a trivial protocol: write a
//! single command byte, then read a fixed-length reply.

use alloc::string::{String, ToString};

use crate::bus::{BootStrap, ControlLines, I2cBus, APP_ADDR};
use crate::device::{pulse_reset, DeviceMode, BOOTLOADER_SETTLE_MS};
use crate::error::{Error, ProtocolError, Result};
use crate::protocol::bootloader;

/// Ask for the NUL-padded version string
pub const CMD_VERSION: u8 = b'v';
/// Ask the application to reboot into the ROM bootloader
pub const CMD_ENTER_BOOTLOADER: u8 = b'b';
/// Reply confirming [`CMD_ENTER_BOOTLOADER`]
pub const ENTER_BOOTLOADER_OK: &[u8; 2] = b"OK";
/// Length of the version reply
pub const VERSION_REPLY_LEN: usize = 20;

/// Write a command to the application and read `buf.len()` reply bytes
pub fn command_response<B: I2cBus + ?Sized>(bus: &mut B, cmd: &[u8], buf: &mut [u8]) -> Result<()> {
    bus.write(APP_ADDR, cmd)?;
    bus.read(APP_ADDR, buf)?;
    Ok(())
}

/// Decode the version reply
///
/// The string ends at the first NUL. A reply without one is taken whole.
pub fn decode_version(raw: &[u8]) -> Result<String> {
    let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
    let text = &raw[..end];
    if !text.is_ascii() {
        return Err(ProtocolError::InvalidVersionString.into());
    }
    core::str::from_utf8(text)
        .map(ToString::to_string)
        .map_err(|_| ProtocolError::InvalidVersionString.into())
}

/// Decode the version reply, replacing anything that is not valid UTF-8
pub fn decode_version_lossy(raw: &[u8]) -> String {
    let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
    String::from_utf8_lossy(&raw[..end]).into_owned()
}

fn read_version_raw<B: I2cBus + ?Sized>(bus: &mut B) -> Result<[u8; VERSION_REPLY_LEN]> {
    let mut raw = [0u8; VERSION_REPLY_LEN];
    command_response(bus, &[CMD_VERSION], &mut raw)?;
    Ok(raw)
}

/// Read the version string of the running application
pub fn read_version<B: I2cBus + ?Sized>(bus: &mut B) -> Result<String> {
    decode_version(&read_version_raw(bus)?)
}

/// Find out what the co-processor is currently running
///
/// The application is asked first. If nothing acknowledges its address the
/// bootloader is asked, and if that fails too the device is reported as
/// [`DeviceMode::Unresponsive`]. A garbled version reply still means an
/// application is running; it is reported lossily so that it can never
/// match a real version.
pub fn query_version<B: I2cBus + ?Sized>(bus: &mut B) -> Result<DeviceMode> {
    match read_version_raw(bus) {
        Ok(raw) => match decode_version(&raw) {
            Ok(version) => Ok(DeviceMode::Application(version)),
            Err(_) => {
                let version = decode_version_lossy(&raw);
                log::warn!("app: garbled version reply {:02X?}", raw);
                Ok(DeviceMode::Application(version))
            }
        },
        Err(Error::Bus(e)) => {
            log::debug!("app: version query failed ({}), probing bootloader", e);
            if bootloader::is_present(bus) {
                Ok(DeviceMode::Bootloader)
            } else {
                Ok(DeviceMode::Unresponsive)
            }
        }
        Err(e) => Err(e),
    }
}

/// Send the reboot-to-bootloader command and check its confirmation
pub fn request_reboot<B: I2cBus + ?Sized>(bus: &mut B) -> Result<()> {
    let mut reply = [0u8; 2];
    command_response(bus, &[CMD_ENTER_BOOTLOADER], &mut reply)?;
    if &reply != ENTER_BOOTLOADER_OK {
        log::debug!("app: enter-bootloader answered {:02X?}", reply);
        return Err(ProtocolError::UnexpectedReply.into());
    }
    Ok(())
}

/// Switch a running application to the ROM bootloader without the strap
///
/// The application arms its reboot flag and confirms; the co-processor is
/// then pulsed through reset with the strap released and given time to
/// come up.
pub fn request_bootloader_mode<B, L>(bus: &mut B, lines: &mut L) -> Result<()>
where
    B: I2cBus + ?Sized,
    L: ControlLines + ?Sized,
{
    request_reboot(bus)?;
    lines.set_boot_strap(BootStrap::Released)?;
    pulse_reset(lines)?;
    bus.delay_ms(BOOTLOADER_SETTLE_MS);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::mock::{LineEvent, RecordingLines, ScriptedBus, Transaction};
    use crate::bus::{BusError, BOOTLOADER_ADDR};
    use crate::protocol::opcodes::ACK;

    fn version_reply(s: &str) -> [u8; VERSION_REPLY_LEN] {
        let mut raw = [0u8; VERSION_REPLY_LEN];
        raw[..s.len()].copy_from_slice(s.as_bytes());
        raw
    }

    #[test]
    fn test_decode_version() {
        assert_eq!(decode_version(&version_reply("1.2.3")).unwrap(), "1.2.3");
        assert_eq!(decode_version(&[b'x'; 20]).unwrap(), "x".repeat(20));
        assert_eq!(decode_version(&[0; 20]).unwrap(), "");
        assert_eq!(
            decode_version(&[0xC3, 0x28, 0]),
            Err(ProtocolError::InvalidVersionString.into())
        );
    }

    #[test]
    fn test_query_version_application() {
        let mut bus = ScriptedBus::new(&[
            Transaction::write(APP_ADDR, b"v"),
            Transaction::read(APP_ADDR, &version_reply("2.0.1")),
        ]);
        assert_eq!(
            query_version(&mut bus).unwrap(),
            DeviceMode::Application("2.0.1".into())
        );
        bus.done();
    }

    #[test]
    fn test_query_version_garbled_reply() {
        let mut raw = version_reply("1.2.3");
        raw[0] = 0xC3;
        raw[1] = 0x28;
        let mut bus = ScriptedBus::new(&[
            Transaction::write(APP_ADDR, b"v"),
            Transaction::read(APP_ADDR, &raw),
        ]);
        assert_eq!(
            query_version(&mut bus).unwrap(),
            DeviceMode::Application("\u{FFFD}(2.3".into())
        );
        bus.done();

        assert_eq!(decode_version_lossy(&[0xFF, b'1', 0, b'x']), "\u{FFFD}1");
    }

    #[test]
    fn test_query_version_falls_back_to_bootloader() {
        let mut get_reply = [0u8; 20];
        get_reply[0] = 0x12;
        get_reply[1] = 0x11;
        let mut bus = ScriptedBus::new(&[
            Transaction::write(APP_ADDR, b"v"),
            Transaction::read_err(APP_ADDR, BusError::NoDevice),
            Transaction::write(BOOTLOADER_ADDR, &[0x00, 0xFF]),
            Transaction::read(BOOTLOADER_ADDR, &[ACK]),
            Transaction::read(BOOTLOADER_ADDR, &get_reply),
            Transaction::read(BOOTLOADER_ADDR, &[ACK]),
        ]);
        let mode = query_version(&mut bus).unwrap();
        assert_eq!(mode, DeviceMode::Bootloader);
        assert_eq!(mode.to_string(), "BL");
        bus.done();
    }

    #[test]
    fn test_query_version_nobody_home() {
        let mut bus = ScriptedBus::new(&[
            Transaction::write(APP_ADDR, b"v"),
            Transaction::read_err(APP_ADDR, BusError::NoDevice),
            Transaction::write(BOOTLOADER_ADDR, &[0x00, 0xFF]),
            Transaction::read_err(BOOTLOADER_ADDR, BusError::NoDevice),
        ]);
        let mode = query_version(&mut bus).unwrap();
        assert_eq!(mode, DeviceMode::Unresponsive);
        assert_eq!(mode.to_string(), "FAIL");
        bus.done();
    }

    #[test]
    fn test_request_bootloader_mode() {
        let mut bus = ScriptedBus::new(&[
            Transaction::write(APP_ADDR, b"b"),
            Transaction::read(APP_ADDR, b"OK"),
        ]);
        let mut lines = RecordingLines::default();
        request_bootloader_mode(&mut bus, &mut lines).unwrap();
        assert_eq!(
            lines.events,
            [
                LineEvent::Strap(BootStrap::Released),
                LineEvent::Reset(true),
                LineEvent::Reset(false),
            ]
        );
        assert_eq!(bus.delays, [BOOTLOADER_SETTLE_MS]);
        bus.done();
    }

    #[test]
    fn test_request_bootloader_mode_refused() {
        let mut bus = ScriptedBus::new(&[
            Transaction::write(APP_ADDR, b"b"),
            Transaction::read(APP_ADDR, b"NO"),
        ]);
        let mut lines = RecordingLines::default();
        assert_eq!(
            request_bootloader_mode(&mut bus, &mut lines),
            Err(ProtocolError::UnexpectedReply.into())
        );
        assert!(lines.events.is_empty());
        bus.done();
    }
}
