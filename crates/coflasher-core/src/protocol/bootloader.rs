//! ROM bootloader operations
//!
//! High-level commands built on [`super::codec`]. All functions take the bus
//! directly and assume the co-processor is already running its bootloader.

use alloc::vec::Vec;

use crate::bus::{I2cBus, BOOTLOADER_ADDR};
use crate::error::{PreconditionError, Result};
use crate::protocol::codec::{
    busy_wait, double_ack_command, execute, send_and_wait, with_checksum, Argument,
    BootloaderCommand, Reply,
};
use crate::protocol::opcodes;

/// Base address of the co-processor's internal flash
pub const FLASH_START: u32 = 0x0800_0000;

/// Largest single read or write transfer
pub const MAX_TRANSFER: usize = 256;

/// Length of the Get reply the driver reads
pub const VERSION_REPLY_LEN: usize = 20;

/// Decoded Get reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootloaderInfo {
    /// Bootloader protocol version, as BCD (0x11 = v1.1)
    pub protocol_version: u8,
    /// Opcodes the bootloader reports as supported
    pub commands: Vec<u8>,
}

impl BootloaderInfo {
    /// Decode the raw Get reply
    ///
    /// The first byte counts the bytes that follow minus one; the list is
    /// clipped to what fits in the fixed-length read.
    pub fn parse(raw: &[u8; VERSION_REPLY_LEN]) -> Self {
        let count = raw[0] as usize;
        let end = (2 + count).min(VERSION_REPLY_LEN);
        Self {
            protocol_version: raw[1],
            commands: raw[2..end].to_vec(),
        }
    }

    /// Whether `opcode` appears in the command list
    pub fn supports(&self, opcode: u8) -> bool {
        self.commands.contains(&opcode)
    }

    /// Major and minor protocol version
    pub fn version(&self) -> (u8, u8) {
        (self.protocol_version >> 4, self.protocol_version & 0x0F)
    }
}

/// Read the raw 20-byte Get reply
///
/// Used both to identify the bootloader and to check that it is alive.
pub fn version<B: I2cBus + ?Sized>(bus: &mut B) -> Result<[u8; VERSION_REPLY_LEN]> {
    let payload = execute(
        bus,
        &BootloaderCommand::simple(opcodes::GET, VERSION_REPLY_LEN),
    )?;
    let mut raw = [0u8; VERSION_REPLY_LEN];
    raw.copy_from_slice(&payload);
    Ok(raw)
}

/// Mass erase the whole flash
///
/// Returns whether the final status was ACK. Expect the bootloader to answer
/// BUSY (or nothing at all) for a few hundred milliseconds.
pub fn bulk_erase<B: I2cBus + ?Sized>(bus: &mut B) -> Result<bool> {
    log::debug!("bootloader: mass erase");
    let status = send_and_wait(bus, opcodes::ERASE_NS, &opcodes::ERASE_ALL)?;
    if !status.is_ack() {
        log::warn!("bootloader: mass erase finished with {}", status);
    }
    Ok(status.is_ack())
}

fn check_transfer_len(len: usize) -> Result<()> {
    if len == 0 {
        return Err(PreconditionError::EmptyBlock.into());
    }
    if len > MAX_TRANSFER {
        return Err(PreconditionError::BlockTooLarge { len }.into());
    }
    Ok(())
}

/// Check that `len` bytes from `addr` stay inside the address space
pub fn check_range(addr: u32, len: usize) -> Result<()> {
    let last = len.saturating_sub(1);
    u32::try_from(last)
        .ok()
        .and_then(|last| addr.checked_add(last))
        .map(|_| ())
        .ok_or_else(|| PreconditionError::AddressOverflow { addr, len }.into())
}

/// Read `len` (1..=256) bytes starting at `addr`
pub fn read_at<B: I2cBus + ?Sized>(bus: &mut B, addr: u32, len: usize) -> Result<Vec<u8>> {
    check_transfer_len(len)?;
    check_range(addr, len)?;

    let cmd = BootloaderCommand::with_address(opcodes::READ_MEMORY, addr)
        .argument(Argument::Length((len - 1) as u8))
        .response(len)
        .no_final_ack();
    execute(bus, &cmd)
}

/// Read an arbitrary range in transfer-sized chunks
pub fn read_range<B: I2cBus + ?Sized>(bus: &mut B, addr: u32, len: usize) -> Result<Vec<u8>> {
    check_range(addr, len)?;
    let mut out = Vec::with_capacity(len);
    let mut offset = 0usize;

    while offset < len {
        let chunk = (len - offset).min(MAX_TRANSFER);
        let data = read_at(bus, addr + offset as u32, chunk)?;
        out.extend_from_slice(&data);
        offset += chunk;
    }

    Ok(out)
}

/// Program one block of flash
///
/// `data` must be 1..=256 bytes, a multiple of 4, and `addr` must be 4-byte
/// aligned. These are checked before any bus traffic. Returns whether the
/// final status was ACK. The target area must already be erased; the
/// bootloader does not report writes to programmed flash as errors.
pub fn write_at<B: I2cBus + ?Sized>(bus: &mut B, addr: u32, data: &[u8]) -> Result<bool> {
    let len = data.len();
    check_transfer_len(len)?;
    if len % 4 != 0 {
        return Err(PreconditionError::UnalignedLength { len }.into());
    }
    if addr % 4 != 0 {
        return Err(PreconditionError::UnalignedAddress { addr }.into());
    }
    check_range(addr, len)?;

    execute(
        bus,
        &BootloaderCommand::with_address(opcodes::WRITE_MEMORY_NS, addr),
    )?;

    // Length byte and data share a single checksum
    let mut block = Vec::with_capacity(len + 1);
    block.push((len - 1) as u8);
    block.extend_from_slice(data);
    bus.write(BOOTLOADER_ADDR, &with_checksum(&block))?;

    let status = busy_wait(bus)?;
    if !status.is_ack() {
        log::warn!("bootloader: write at 0x{:08X} finished with {}", addr, status);
    }
    Ok(status.is_ack())
}

/// Jump to the firmware whose vector table is at `addr`
///
/// Only the address acknowledgement is awaited. After this the bootloader
/// no longer answers.
pub fn run_at<B: I2cBus + ?Sized>(bus: &mut B, addr: u32) -> Result<()> {
    log::debug!("bootloader: go 0x{:08X}", addr);
    execute(bus, &BootloaderCommand::with_address(opcodes::GO, addr))?;
    Ok(())
}

/// Enable flash readout protection
///
/// The co-processor resets itself once protection is applied.
pub fn readout_protect<B: I2cBus + ?Sized>(bus: &mut B) -> Result<Reply> {
    double_ack_command(bus, opcodes::READOUT_PROTECT_NS)
}

/// Disable flash readout protection
///
/// This mass erases the flash as a side effect.
pub fn readout_unprotect<B: I2cBus + ?Sized>(bus: &mut B) -> Result<Reply> {
    double_ack_command(bus, opcodes::READOUT_UNPROTECT_NS)
}

/// Check whether the bootloader is answering at all
pub fn is_present<B: I2cBus + ?Sized>(bus: &mut B) -> bool {
    match version(bus) {
        Ok(_) => true,
        Err(e) => {
            log::debug!("bootloader: no answer to Get: {}", e);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::mock::{ScriptedBus, Transaction};
    use crate::bus::BusError;
    use crate::error::{Error, ProtocolError};
    use crate::protocol::opcodes::{ACK, BUSY, NACK};

    const BL: u8 = BOOTLOADER_ADDR;

    const GET_REPLY: [u8; 20] = [
        0x12, 0x11, 0x00, 0x01, 0x02, 0x11, 0x21, 0x31, 0x32, 0x44, 0x45, 0x63, 0x64, 0x73,
        0x74, 0x82, 0x83, 0x92, 0x93, 0xA1,
    ];

    #[test]
    fn test_version_reads_twenty_bytes_and_final_ack() {
        let mut bus = ScriptedBus::new(&[
            Transaction::write(BL, &[0x00, 0xFF]),
            Transaction::read(BL, &[ACK]),
            Transaction::read(BL, &GET_REPLY),
            Transaction::read(BL, &[ACK]),
        ]);
        let raw = version(&mut bus).unwrap();
        assert_eq!(raw, GET_REPLY);
        bus.done();

        let info = BootloaderInfo::parse(&raw);
        assert_eq!(info.version(), (1, 1));
        assert_eq!(info.commands.len(), 18);
        assert!(info.supports(opcodes::WRITE_MEMORY_NS));
        assert!(info.supports(opcodes::READOUT_UNPROTECT_NS));
        assert!(!info.supports(0x55));
    }

    #[test]
    fn test_bulk_erase_framing() {
        let mut bus = ScriptedBus::new(&[
            Transaction::write(BL, &[0x45, 0xBA]),
            Transaction::read(BL, &[ACK]),
            Transaction::write(BL, &[0xFF, 0xFF, 0x00]),
            Transaction::read_err(BL, BusError::NoDevice),
            Transaction::read(BL, &[BUSY]),
            Transaction::read(BL, &[ACK]),
        ]);
        assert!(bulk_erase(&mut bus).unwrap());
        bus.done();
    }

    #[test]
    fn test_bulk_erase_nack() {
        let mut bus = ScriptedBus::new(&[
            Transaction::write(BL, &[0x45, 0xBA]),
            Transaction::read(BL, &[ACK]),
            Transaction::write(BL, &[0xFF, 0xFF, 0x00]),
            Transaction::read(BL, &[NACK]),
        ]);
        assert!(!bulk_erase(&mut bus).unwrap());
        bus.done();
    }

    #[test]
    fn test_read_at_skips_final_ack() {
        let mut bus = ScriptedBus::new(&[
            Transaction::write(BL, &[0x11, 0xEE]),
            Transaction::read(BL, &[ACK]),
            Transaction::write(BL, &[0x08, 0x00, 0x00, 0x00, 0x08]),
            Transaction::read(BL, &[ACK]),
            Transaction::write(BL, &[0x07, 0xF8]),
            Transaction::read(BL, &[ACK]),
            Transaction::read(BL, &[0xA5; 8]),
        ]);
        assert_eq!(read_at(&mut bus, FLASH_START, 8).unwrap(), [0xA5; 8]);
        bus.done();
    }

    #[test]
    fn test_read_range_chunks() {
        let mut script = Vec::new();
        for (addr, len) in [(FLASH_START, 256usize), (FLASH_START + 256, 44)] {
            script.push(Transaction::write(BL, &[0x11, 0xEE]));
            script.push(Transaction::read(BL, &[ACK]));
            script.push(Transaction::write(BL, &with_checksum(&addr.to_be_bytes())));
            script.push(Transaction::read(BL, &[ACK]));
            let n = (len - 1) as u8;
            script.push(Transaction::write(BL, &[n, !n]));
            script.push(Transaction::read(BL, &[ACK]));
            script.push(Transaction::read(BL, &vec![0x5A; len]));
        }
        let mut bus = ScriptedBus::new(&script);
        let data = read_range(&mut bus, FLASH_START, 300).unwrap();
        assert_eq!(data.len(), 300);
        bus.done();
    }

    #[test]
    fn test_write_at_framing() {
        let data = [0xDE, 0xAD, 0xBE, 0xEF];
        let mut bus = ScriptedBus::new(&[
            Transaction::write(BL, &[0x32, 0xCD]),
            Transaction::read(BL, &[ACK]),
            Transaction::write(BL, &[0x08, 0x00, 0x01, 0x00, 0x09]),
            Transaction::read(BL, &[ACK]),
            // len-1, data, checksum over all five
            Transaction::write(BL, &[0x03, 0xDE, 0xAD, 0xBE, 0xEF, 0x03 ^ 0xDE ^ 0xAD ^ 0xBE ^ 0xEF]),
            Transaction::read(BL, &[BUSY]),
            Transaction::read(BL, &[ACK]),
        ]);
        assert!(write_at(&mut bus, 0x0800_0100, &data).unwrap());
        bus.done();
    }

    #[test]
    fn test_write_at_rejected_address_sends_no_data() {
        let mut bus = ScriptedBus::new(&[
            Transaction::write(BL, &[0x32, 0xCD]),
            Transaction::read(BL, &[ACK]),
            Transaction::write(BL, &[0x08, 0x00, 0x01, 0x00, 0x09]),
            Transaction::read(BL, &[NACK]),
        ]);
        let err = write_at(&mut bus, 0x0800_0100, &[0; 4]).unwrap_err();
        assert_eq!(err, Error::Protocol(ProtocolError::BadAddress { response: NACK }));
        assert_eq!(err.to_string(), "protocol error: bad address (got 0x1F)");
        bus.done();
    }

    #[test]
    fn test_write_at_preconditions_do_no_io() {
        let mut bus = ScriptedBus::new(&[]);
        assert_eq!(
            write_at(&mut bus, FLASH_START, &[0; 260]),
            Err(PreconditionError::BlockTooLarge { len: 260 }.into())
        );
        assert_eq!(
            write_at(&mut bus, FLASH_START, &[0; 6]),
            Err(PreconditionError::UnalignedLength { len: 6 }.into())
        );
        assert_eq!(
            write_at(&mut bus, FLASH_START + 2, &[0; 4]),
            Err(PreconditionError::UnalignedAddress { addr: FLASH_START + 2 }.into())
        );
        assert_eq!(
            write_at(&mut bus, FLASH_START, &[]),
            Err(PreconditionError::EmptyBlock.into())
        );
        assert_eq!(
            read_at(&mut bus, FLASH_START, 257),
            Err(PreconditionError::BlockTooLarge { len: 257 }.into())
        );
        assert_eq!(
            write_at(&mut bus, 0xFFFF_FFF8, &[0; 16]),
            Err(PreconditionError::AddressOverflow { addr: 0xFFFF_FFF8, len: 16 }.into())
        );
        assert_eq!(
            read_range(&mut bus, 0xFFFF_FF00, 0x200),
            Err(PreconditionError::AddressOverflow { addr: 0xFFFF_FF00, len: 0x200 }.into())
        );
        bus.done();
    }

    #[test]
    fn test_run_at_only_waits_for_address_ack() {
        let mut bus = ScriptedBus::new(&[
            Transaction::write(BL, &[0x21, 0xDE]),
            Transaction::read(BL, &[ACK]),
            Transaction::write(BL, &[0x08, 0x00, 0x00, 0x00, 0x08]),
            Transaction::read(BL, &[ACK]),
        ]);
        run_at(&mut bus, FLASH_START).unwrap();
        bus.done();
    }

    #[test]
    fn test_bootloader_absent() {
        let mut bus = ScriptedBus::new(&[
            Transaction::write(BL, &[0x00, 0xFF]),
            Transaction::read_err(BL, BusError::NoDevice),
        ]);
        assert!(!is_present(&mut bus));
        bus.done();
    }
}
