//! ROM bootloader command framing
//!
//! Every exchange with the bootloader is built from the same steps:
//!
//! 1. `[opcode, !opcode]`, answered by one reply byte
//! 2. optionally a 4-byte big-endian address plus XOR checksum, answered
//!    by one reply byte
//! 3. optionally a second argument (a length byte plus its complement, or
//!    a data block plus XOR checksum), answered by one reply byte
//! 4. optionally a fixed-length response, usually followed by a final ACK
//!
//! Any step that does not return ACK aborts the command. A framing failure
//! is reported immediately; retrying half-way through would desynchronise
//! the bootloader's command parser.

use alloc::vec;
use alloc::vec::Vec;
use core::fmt;

use crate::bus::{BusError, I2cBus, BOOTLOADER_ADDR};
use crate::error::{Error, ProtocolError, Result};
use crate::protocol::opcodes::{ACK, BUSY, NACK};

/// Maximum number of status polls in [`busy_wait`]
pub const BUSY_POLL_LIMIT: usize = 100;
/// Delay after a BUSY reply before polling again
pub const BUSY_DELAY_MS: u32 = 20;
/// Delay after a missing address acknowledgement before polling again
pub const NO_DEVICE_DELAY_MS: u32 = 50;

/// A single status byte returned by the bootloader
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reply {
    /// Accepted / done
    Ack,
    /// Rejected
    Nack,
    /// Still working
    Busy,
    /// Anything else; the framing is out of sync
    Other(u8),
}

impl Reply {
    /// The raw byte on the wire
    pub fn byte(self) -> u8 {
        match self {
            Self::Ack => ACK,
            Self::Nack => NACK,
            Self::Busy => BUSY,
            Self::Other(b) => b,
        }
    }

    /// True for [`Reply::Ack`]
    pub fn is_ack(self) -> bool {
        self == Self::Ack
    }
}

impl From<u8> for Reply {
    fn from(b: u8) -> Self {
        match b {
            ACK => Self::Ack,
            NACK => Self::Nack,
            BUSY => Self::Busy,
            other => Self::Other(other),
        }
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ack => write!(f, "ACK"),
            Self::Nack => write!(f, "NACK"),
            Self::Busy => write!(f, "BUSY"),
            Self::Other(b) => write!(f, "0x{:02X}", b),
        }
    }
}

/// Second argument of a command
#[derive(Debug, Clone, Copy)]
pub enum Argument<'a> {
    /// Single byte sent together with its bit complement
    Length(u8),
    /// Byte block sent with a trailing XOR checksum
    Block(&'a [u8]),
}

/// Description of one bootloader command exchange
///
/// Mirrors the framing steps listed in the module docs. Build one with the
/// constructors and run it with [`execute`].
#[derive(Debug, Clone, Copy)]
pub struct BootloaderCommand<'a> {
    /// The opcode byte
    pub opcode: u8,
    /// Address word (if any)
    pub address: Option<u32>,
    /// Second argument (if any)
    pub argument: Option<Argument<'a>>,
    /// Number of response bytes to read after framing
    pub response_len: usize,
    /// Whether a final ACK follows the response payload
    ///
    /// Open-ended responses (Read Memory) are not followed by one; waiting
    /// for it would consume a byte that never arrives.
    pub final_ack: bool,
}

impl<'a> BootloaderCommand<'a> {
    /// Command with no arguments and a fixed-length, ACK-terminated response
    pub fn simple(opcode: u8, response_len: usize) -> Self {
        Self {
            opcode,
            address: None,
            argument: None,
            response_len,
            final_ack: true,
        }
    }

    /// Command followed by an address and nothing else
    pub fn with_address(opcode: u8, address: u32) -> Self {
        Self {
            opcode,
            address: Some(address),
            argument: None,
            response_len: 0,
            final_ack: true,
        }
    }

    /// Command followed by a second argument and nothing else
    pub fn with_argument(opcode: u8, argument: Argument<'a>) -> Self {
        Self {
            opcode,
            address: None,
            argument: Some(argument),
            response_len: 0,
            final_ack: true,
        }
    }

    /// Attach a second argument after the address
    pub fn argument(mut self, argument: Argument<'a>) -> Self {
        self.argument = Some(argument);
        self
    }

    /// Expect a response payload of `len` bytes
    pub fn response(mut self, len: usize) -> Self {
        self.response_len = len;
        self
    }

    /// Do not read a final ACK after the response payload
    pub fn no_final_ack(mut self) -> Self {
        self.final_ack = false;
        self
    }
}

/// XOR of all bytes
pub fn xor_checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0, |acc, b| acc ^ b)
}

/// Copy `bytes` and append their XOR checksum
pub fn with_checksum(bytes: &[u8]) -> Vec<u8> {
    let mut framed = Vec::with_capacity(bytes.len() + 1);
    framed.extend_from_slice(bytes);
    framed.push(xor_checksum(bytes));
    framed
}

/// Read a single status byte from the bootloader
fn read_reply<B: I2cBus + ?Sized>(bus: &mut B) -> Result<Reply> {
    let mut buf = [0u8; 1];
    bus.read(BOOTLOADER_ADDR, &mut buf)?;
    Ok(Reply::from(buf[0]))
}

/// Send `[opcode, !opcode]` and require ACK
pub fn send_command<B: I2cBus + ?Sized>(bus: &mut B, opcode: u8) -> Result<()> {
    bus.write(BOOTLOADER_ADDR, &[opcode, 0xFF ^ opcode])?;
    let reply = read_reply(bus)?;
    if !reply.is_ack() {
        log::debug!("bootloader: opcode 0x{:02X} answered {}", opcode, reply);
        return Err(ProtocolError::UnknownCommand {
            opcode,
            response: reply.byte(),
        }
        .into());
    }
    Ok(())
}

/// Send a big-endian address word with checksum and require ACK
pub fn send_address<B: I2cBus + ?Sized>(bus: &mut B, addr: u32) -> Result<()> {
    bus.write(BOOTLOADER_ADDR, &with_checksum(&addr.to_be_bytes()))?;
    let reply = read_reply(bus)?;
    if !reply.is_ack() {
        log::debug!("bootloader: address 0x{:08X} answered {}", addr, reply);
        return Err(ProtocolError::BadAddress {
            response: reply.byte(),
        }
        .into());
    }
    Ok(())
}

/// Send the second argument and require ACK
pub fn send_argument<B: I2cBus + ?Sized>(bus: &mut B, argument: Argument<'_>) -> Result<()> {
    match argument {
        Argument::Length(n) => bus.write(BOOTLOADER_ADDR, &[n, 0xFF ^ n])?,
        Argument::Block(bytes) => bus.write(BOOTLOADER_ADDR, &with_checksum(bytes))?,
    }
    let reply = read_reply(bus)?;
    if !reply.is_ack() {
        log::debug!("bootloader: argument answered {}", reply);
        return Err(ProtocolError::BadArgument {
            response: reply.byte(),
        }
        .into());
    }
    Ok(())
}

/// Read a response payload and, unless suppressed, its final ACK
pub fn read_response<B: I2cBus + ?Sized>(
    bus: &mut B,
    expect_len: usize,
    consume_final_ack: bool,
) -> Result<Vec<u8>> {
    if expect_len == 0 {
        return Ok(Vec::new());
    }

    // Some commands prefix their payload with a length byte, but they do not
    // agree on how it counts, so the caller supplies the length.
    let mut payload = vec![0u8; expect_len];
    bus.read(BOOTLOADER_ADDR, &mut payload)?;

    if consume_final_ack {
        let reply = read_reply(bus)?;
        if !reply.is_ack() {
            return Err(ProtocolError::BadFinalAck { byte: reply.byte() }.into());
        }
    }

    Ok(payload)
}

/// Run a complete command exchange
pub fn execute<B: I2cBus + ?Sized>(bus: &mut B, cmd: &BootloaderCommand<'_>) -> Result<Vec<u8>> {
    send_command(bus, cmd.opcode)?;

    if let Some(addr) = cmd.address {
        send_address(bus, addr)?;
    }

    if let Some(argument) = cmd.argument {
        send_argument(bus, argument)?;
    }

    read_response(bus, cmd.response_len, cmd.final_ack)
}

/// Poll the bootloader until it stops answering BUSY
///
/// Reads one status byte up to [`BUSY_POLL_LIMIT`] times, sleeping
/// [`BUSY_DELAY_MS`] after each BUSY. A missing address acknowledgement is
/// tolerated (the bootloader drops off the bus while it erases, and the
/// device may be mid-reset) and costs [`NO_DEVICE_DELAY_MS`]. Returns the
/// first non-BUSY reply, or the last reply read once the poll budget is
/// spent. The caller decides what a non-ACK means.
pub fn busy_wait<B: I2cBus + ?Sized>(bus: &mut B) -> Result<Reply> {
    let mut last = None;

    for _ in 0..BUSY_POLL_LIMIT {
        let reply = match read_reply(bus) {
            Ok(reply) => reply,
            Err(Error::Bus(BusError::NoDevice)) => {
                log::trace!("bootloader: not responding, waiting");
                bus.delay_ms(NO_DEVICE_DELAY_MS);
                continue;
            }
            Err(e) => return Err(e),
        };

        last = Some(reply);
        if reply != Reply::Busy {
            return Ok(reply);
        }

        bus.delay_ms(BUSY_DELAY_MS);
    }

    log::warn!(
        "bootloader: still not done after {} polls",
        BUSY_POLL_LIMIT
    );
    last.ok_or(Error::Bus(BusError::NoDevice))
}

/// Send a command whose completion is signalled by two status bytes
///
/// Returns the second status if the first one was ACK, otherwise the first.
pub fn double_ack_command<B: I2cBus + ?Sized>(bus: &mut B, opcode: u8) -> Result<Reply> {
    send_command(bus, opcode)?;
    let first = busy_wait(bus)?;
    if !first.is_ack() {
        return Ok(first);
    }
    busy_wait(bus)
}

/// Send a command and a checksummed block, then wait for completion
///
/// Unlike [`send_argument`], no ACK is read right after the block: a
/// no-stretch command answers only once the work is done.
pub fn send_and_wait<B: I2cBus + ?Sized>(bus: &mut B, opcode: u8, block: &[u8]) -> Result<Reply> {
    send_command(bus, opcode)?;
    bus.write(BOOTLOADER_ADDR, &with_checksum(block))?;
    busy_wait(bus)
}
