//! Scripted transport for byte-exact framing tests

use std::collections::VecDeque;
use std::vec::Vec;

use super::{BootStrap, BusError, ControlLines, I2cBus, SpiOwner};
use crate::error::{Error, Result};

/// One expected bus transaction
#[derive(Debug, Clone)]
pub enum Transaction {
    Write(u8, Vec<u8>),
    Read(u8, core::result::Result<Vec<u8>, BusError>),
}

impl Transaction {
    pub fn write(addr: u8, bytes: &[u8]) -> Self {
        Self::Write(addr, bytes.to_vec())
    }

    pub fn read(addr: u8, bytes: &[u8]) -> Self {
        Self::Read(addr, Ok(bytes.to_vec()))
    }

    pub fn read_err(addr: u8, err: BusError) -> Self {
        Self::Read(addr, Err(err))
    }
}

/// Bus that replays an expected transaction list and panics on divergence
pub struct ScriptedBus {
    expected: VecDeque<Transaction>,
    pub delays: Vec<u32>,
}

impl ScriptedBus {
    pub fn new(expected: &[Transaction]) -> Self {
        Self {
            expected: expected.iter().cloned().collect(),
            delays: Vec::new(),
        }
    }

    /// Assert every expected transaction was consumed
    pub fn done(&self) {
        assert!(
            self.expected.is_empty(),
            "unconsumed transactions: {:?}",
            self.expected
        );
    }

    pub fn remaining(&self) -> usize {
        self.expected.len()
    }

    pub fn total_delay_ms(&self) -> u32 {
        self.delays.iter().sum()
    }
}

impl I2cBus for ScriptedBus {
    fn write(&mut self, addr: u8, bytes: &[u8]) -> core::result::Result<(), BusError> {
        match self.expected.pop_front() {
            Some(Transaction::Write(a, b)) => {
                assert_eq!(a, addr, "write to wrong address");
                assert_eq!(b.as_slice(), bytes, "unexpected write payload");
                Ok(())
            }
            other => panic!("unexpected write {:02X?} to 0x{:02X}, expected {:?}", bytes, addr, other),
        }
    }

    fn read(&mut self, addr: u8, buf: &mut [u8]) -> core::result::Result<(), BusError> {
        match self.expected.pop_front() {
            Some(Transaction::Read(a, reply)) => {
                assert_eq!(a, addr, "read from wrong address");
                let data = reply?;
                assert_eq!(data.len(), buf.len(), "unexpected read length");
                buf.copy_from_slice(&data);
                Ok(())
            }
            other => panic!("unexpected read of {} bytes from 0x{:02X}, expected {:?}", buf.len(), addr, other),
        }
    }

    fn delay_ms(&mut self, ms: u32) {
        self.delays.push(ms);
    }
}

/// Line event recorded by [`RecordingLines`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineEvent {
    Reset(bool),
    Strap(BootStrap),
    Spi(SpiOwner),
}

/// Control lines that only record what was driven
///
/// With `fail` set every call is still recorded but reports a line error.
#[derive(Default)]
pub struct RecordingLines {
    pub events: Vec<LineEvent>,
    pub fail: bool,
}

impl RecordingLines {
    fn record(&mut self, event: LineEvent) -> Result<()> {
        self.events.push(event);
        if self.fail {
            return Err(Error::ControlLine);
        }
        Ok(())
    }
}

impl ControlLines for RecordingLines {
    fn set_reset(&mut self, asserted: bool) -> Result<()> {
        self.record(LineEvent::Reset(asserted))
    }

    fn set_boot_strap(&mut self, strap: BootStrap) -> Result<()> {
        self.record(LineEvent::Strap(strap))
    }

    fn set_spi_owner(&mut self, owner: SpiOwner) -> Result<()> {
        self.record(LineEvent::Spi(owner))
    }
}
