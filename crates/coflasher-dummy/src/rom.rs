//! Byte-level model of the ROM bootloader's I2C command parser

use std::collections::VecDeque;

use coflasher_core::protocol::codec::xor_checksum;
use coflasher_core::protocol::opcodes::{self, ACK, BUSY, NACK};
use coflasher_core::protocol::FLASH_START;
use coflasher_core::BusError;

use crate::State;

/// Get reply of a v1.1 I2C bootloader: count, version, then the opcodes
const GET_REPLY: [u8; 20] = [
    0x12,
    0x11,
    opcodes::GET,
    opcodes::GET_VERSION,
    opcodes::GET_ID,
    opcodes::READ_MEMORY,
    opcodes::GO,
    opcodes::WRITE_MEMORY,
    opcodes::WRITE_MEMORY_NS,
    opcodes::ERASE,
    opcodes::ERASE_NS,
    opcodes::WRITE_PROTECT,
    opcodes::WRITE_PROTECT_NS,
    opcodes::WRITE_UNPROTECT,
    opcodes::WRITE_UNPROTECT_NS,
    opcodes::READOUT_PROTECT,
    opcodes::READOUT_PROTECT_NS,
    opcodes::READOUT_UNPROTECT,
    opcodes::READOUT_UNPROTECT_NS,
    opcodes::GET_CHECKSUM_NS,
];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
enum Expect {
    #[default]
    Command,
    Address(u8),
    ReadLength(u32),
    WriteBlock(u32),
    EraseArgument,
}

#[derive(Debug, Clone, Copy)]
enum Response {
    Byte(u8),
    /// Address phase not acknowledged
    Absent,
}

#[derive(Debug, Clone, Copy)]
enum AfterDrain {
    Jump(u32),
    SystemReset,
}

/// Parser state plus queued replies
#[derive(Debug, Default)]
pub(crate) struct Rom {
    expect: Expect,
    out: VecDeque<Response>,
    after_drain: Option<AfterDrain>,
}

impl State {
    fn reply(&mut self, byte: u8) {
        self.rom.out.push_back(Response::Byte(byte));
    }

    /// Queue the status of a no-stretch operation
    fn reply_slow(&mut self, absent_polls: u32, status: u8) {
        for _ in 0..absent_polls {
            self.rom.out.push_back(Response::Absent);
        }
        for _ in 0..self.config.busy_polls {
            self.reply(BUSY);
        }
        self.reply(status);
    }

    fn flash_offset(&self, addr: u32, len: usize) -> Option<usize> {
        let offset = addr.checked_sub(FLASH_START)? as usize;
        if offset + len <= self.flash.len() {
            Some(offset)
        } else {
            None
        }
    }

    pub(crate) fn rom_write(&mut self, bytes: &[u8]) {
        if !self.rom.out.is_empty() {
            log::warn!(
                "dummy: bootloader written with {} replies unread",
                self.rom.out.len()
            );
            self.rom.out.clear();
        }

        match core::mem::take(&mut self.rom.expect) {
            Expect::Command => self.rom_command(bytes),
            Expect::Address(opcode) => self.rom_address(opcode, bytes),
            Expect::ReadLength(addr) => self.rom_read_length(addr, bytes),
            Expect::WriteBlock(addr) => self.rom_write_block(addr, bytes),
            Expect::EraseArgument => self.rom_erase(bytes),
        }
    }

    fn rom_command(&mut self, bytes: &[u8]) {
        let &[opcode, check] = bytes else {
            self.reply(NACK);
            return;
        };
        if check != !opcode {
            self.reply(NACK);
            return;
        }

        match opcode {
            opcodes::GET => {
                self.reply(ACK);
                for b in GET_REPLY {
                    self.reply(b);
                }
                self.reply(ACK);
            }
            opcodes::READ_MEMORY | opcodes::GO | opcodes::WRITE_MEMORY_NS | opcodes::ERASE_NS
                if self.read_protected =>
            {
                self.reply(NACK);
            }
            opcodes::READ_MEMORY | opcodes::GO | opcodes::WRITE_MEMORY_NS => {
                self.reply(ACK);
                self.rom.expect = Expect::Address(opcode);
            }
            opcodes::ERASE_NS => {
                self.reply(ACK);
                self.rom.expect = Expect::EraseArgument;
            }
            opcodes::READOUT_PROTECT_NS => {
                self.reply(ACK);
                self.read_protected = true;
                self.reply_slow(0, ACK);
                self.reply_slow(0, ACK);
                self.rom.after_drain = Some(AfterDrain::SystemReset);
            }
            opcodes::READOUT_UNPROTECT_NS => {
                self.reply(ACK);
                self.read_protected = false;
                self.flash.fill(0xFF);
                self.activity.erases += 1;
                self.reply_slow(0, ACK);
                self.reply_slow(0, ACK);
                self.rom.after_drain = Some(AfterDrain::SystemReset);
            }
            _ => {
                log::debug!("dummy: unsupported opcode 0x{:02X}", opcode);
                self.reply(NACK);
            }
        }
    }

    fn rom_address(&mut self, opcode: u8, bytes: &[u8]) {
        let &[a0, a1, a2, a3, check] = bytes else {
            self.reply(NACK);
            return;
        };
        let addr = u32::from_be_bytes([a0, a1, a2, a3]);
        if xor_checksum(&bytes[..4]) != check || self.flash_offset(addr, 0).is_none() {
            self.reply(NACK);
            return;
        }

        self.reply(ACK);
        match opcode {
            opcodes::READ_MEMORY => self.rom.expect = Expect::ReadLength(addr),
            opcodes::WRITE_MEMORY_NS => self.rom.expect = Expect::WriteBlock(addr),
            _ => self.rom.after_drain = Some(AfterDrain::Jump(addr)),
        }
    }

    fn rom_read_length(&mut self, addr: u32, bytes: &[u8]) {
        let &[n, check] = bytes else {
            self.reply(NACK);
            return;
        };
        if check != !n {
            self.reply(NACK);
            return;
        }

        self.reply(ACK);
        self.activity.reads.push(addr);
        let len = n as usize + 1;
        for i in 0..len {
            let byte = self
                .flash_offset(addr.wrapping_add(i as u32), 1)
                .map_or(0xFF, |off| self.flash[off]);
            self.reply(byte);
        }
    }

    fn rom_write_block(&mut self, addr: u32, bytes: &[u8]) {
        let Some((&check, framed)) = bytes.split_last() else {
            self.reply(NACK);
            return;
        };
        let Some((&n, data)) = framed.split_first() else {
            self.reply(NACK);
            return;
        };
        if xor_checksum(framed) != check || data.len() != n as usize + 1 {
            self.reply_slow(0, NACK);
            return;
        }
        if self.config.fail_write_at == Some(addr) {
            self.reply_slow(0, NACK);
            return;
        }
        let Some(offset) = self.flash_offset(addr, data.len()) else {
            self.reply_slow(0, NACK);
            return;
        };

        let target = &mut self.flash[offset..offset + data.len()];
        if target.iter().all(|&b| b == 0xFF) {
            target.copy_from_slice(data);
            self.activity.block_writes.push(addr);
        } else {
            // Programming over programmed flash does nothing, and the
            // bootloader does not say so.
            log::debug!("dummy: write at 0x{:08X} over unerased flash ignored", addr);
        }
        self.reply_slow(0, ACK);
    }

    fn rom_erase(&mut self, bytes: &[u8]) {
        if bytes != [0xFF, 0xFF, 0x00] {
            log::debug!("dummy: only mass erase is emulated");
            self.reply(NACK);
            return;
        }

        self.flash.fill(0xFF);
        self.activity.erases += 1;
        let absent = self.config.erase_absent_polls;
        self.reply_slow(absent, ACK);
    }

    pub(crate) fn rom_read(&mut self, buf: &mut [u8]) -> Result<(), BusError> {
        let mut result = Ok(());
        for b in buf.iter_mut() {
            match self.rom.out.pop_front() {
                Some(Response::Byte(v)) => *b = v,
                Some(Response::Absent) => {
                    result = Err(BusError::NoDevice);
                    break;
                }
                // Nothing queued: the parser is waiting for a command
                None => *b = NACK,
            }
        }

        if self.rom.out.is_empty() {
            match self.rom.after_drain.take() {
                Some(AfterDrain::Jump(addr)) => self.jump(addr),
                Some(AfterDrain::SystemReset) => self.boot(),
                None => {}
            }
        }
        result
    }
}
