//! coflasher-dummy - In-memory co-processor emulator for testing
//!
//! This crate emulates a co-processor at the byte level: the vendor ROM
//! bootloader at [`BOOTLOADER_ADDR`], a minimal application at
//! [`APP_ADDR`], its flash, and the reset / boot strap / SPI ownership
//! lines. It's useful for testing the upgrade flow without real hardware.
//!
//! The bus and the lines are separate handles onto one shared device, so
//! they can be handed to [`coflasher_core::Coprocessor`] while the test
//! keeps a [`DummyCoprocessor`] to inspect what happened.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use coflasher_core::bus::{APP_ADDR, BOOTLOADER_ADDR};
use coflasher_core::protocol::FLASH_START;
use coflasher_core::{BootStrap, BusError, ControlLines, I2cBus, SpiOwner};

mod rom;

use rom::Rom;

/// Offset of the NUL-terminated version string inside an application image
pub const VERSION_OFFSET: usize = 0x40;

/// Emulator configuration
#[derive(Debug, Clone)]
pub struct DummyConfig {
    /// Flash size in bytes
    pub flash_size: usize,
    /// BUSY replies before each slow operation completes
    pub busy_polls: u32,
    /// Polls during a mass erase where the bootloader does not answer at all
    pub erase_absent_polls: u32,
    /// Answer the write of the block at this address with NACK
    pub fail_write_at: Option<u32>,
    /// The application answers the enter-bootloader request with "NO"
    pub app_refuses_bootloader: bool,
}

impl Default for DummyConfig {
    fn default() -> Self {
        Self {
            flash_size: 64 * 1024,
            busy_polls: 2,
            erase_absent_polls: 1,
            fail_write_at: None,
            app_refuses_bootloader: false,
        }
    }
}

/// What the emulated co-processor is currently doing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    /// Held in reset
    Reset,
    /// Running the ROM bootloader
    Bootloader,
    /// Running the application from flash
    Application,
    /// Crashed or no valid image; answers nothing
    Halted,
}

/// Record of what was done to the emulated device
#[derive(Debug, Clone, Default)]
pub struct Activity {
    /// Start address of every accepted block write, in order
    pub block_writes: Vec<u32>,
    /// Start address of every Read Memory command served, in order
    pub reads: Vec<u32>,
    /// Number of mass erases
    pub erases: usize,
    /// Targets of every Go command
    pub jumps: Vec<u32>,
    /// Number of times the device came out of reset
    pub boots: usize,
}

pub(crate) struct State {
    config: DummyConfig,
    flash: Vec<u8>,
    run: RunState,
    strap: BootStrap,
    spi_owner: SpiOwner,
    reboot_to_bootloader: bool,
    read_protected: bool,
    rom: Rom,
    app_out: VecDeque<u8>,
    activity: Activity,
    elapsed_ms: u64,
}

/// Build a plausible application image
///
/// The image has a non-blank vector table and carries `version` at
/// [`VERSION_OFFSET`]. It is at least large enough to hold both.
pub fn build_firmware(len: usize, version: &str) -> Vec<u8> {
    let len = len.max(VERSION_OFFSET + version.len() + 1);
    let mut image: Vec<u8> = (0..len).map(|i| (i * 7 + 3) as u8).collect();

    // Initial stack pointer and reset vector
    image[0..4].copy_from_slice(&0x2000_2000u32.to_le_bytes());
    image[4..8].copy_from_slice(&(FLASH_START + 0x101).to_le_bytes());

    let v = VERSION_OFFSET;
    image[v..v + version.len()].copy_from_slice(version.as_bytes());
    image[v + version.len()] = 0;
    image
}

impl State {
    fn new(config: DummyConfig) -> Self {
        let flash = vec![0xFF; config.flash_size];
        Self {
            config,
            flash,
            run: RunState::Reset,
            strap: BootStrap::Released,
            spi_owner: SpiOwner::Host,
            reboot_to_bootloader: false,
            read_protected: false,
            rom: Rom::default(),
            app_out: VecDeque::new(),
            activity: Activity::default(),
            elapsed_ms: 0,
        }
    }

    fn vector_table_programmed(&self) -> bool {
        self.flash[..8].iter().any(|&b| b != 0xFF)
    }

    /// Come out of reset and decide what to run
    pub(crate) fn boot(&mut self) {
        self.activity.boots += 1;
        self.rom = Rom::default();
        self.app_out.clear();

        self.run = if self.strap == BootStrap::ForceBootloader || self.reboot_to_bootloader {
            RunState::Bootloader
        } else if self.vector_table_programmed() {
            RunState::Application
        } else {
            RunState::Halted
        };
        self.reboot_to_bootloader = false;
        log::debug!("dummy: booted into {:?}", self.run);
    }

    /// Leave the bootloader for the image at `addr`
    pub(crate) fn jump(&mut self, addr: u32) {
        self.activity.jumps.push(addr);
        self.run = if addr == FLASH_START && self.vector_table_programmed() {
            RunState::Application
        } else {
            RunState::Halted
        };
        self.app_out.clear();
        log::debug!("dummy: jumped to 0x{:08X}, now {:?}", addr, self.run);
    }

    fn app_version(&self) -> [u8; 20] {
        let mut reply = [0u8; 20];
        let src = &self.flash[VERSION_OFFSET..VERSION_OFFSET + 20];
        let end = src.iter().position(|&b| b == 0).unwrap_or(src.len());
        reply[..end].copy_from_slice(&src[..end]);
        reply
    }

    fn app_write(&mut self, bytes: &[u8]) {
        self.app_out.clear();
        match bytes.first() {
            Some(b'v') => {
                let version = self.app_version();
                self.app_out.extend(version);
            }
            Some(b'b') => {
                if self.config.app_refuses_bootloader {
                    self.app_out.extend(*b"NO");
                } else {
                    self.reboot_to_bootloader = true;
                    self.app_out.extend(*b"OK");
                }
            }
            other => log::debug!("dummy: application ignores command {:?}", other),
        }
    }

    fn app_read(&mut self, buf: &mut [u8]) {
        for b in buf.iter_mut() {
            *b = self.app_out.pop_front().unwrap_or(0xFF);
        }
    }
}

/// Test-side handle to an emulated co-processor
#[derive(Clone)]
pub struct DummyCoprocessor {
    state: Rc<RefCell<State>>,
}

impl DummyCoprocessor {
    /// Power up a device with blank flash
    pub fn new(config: DummyConfig) -> Self {
        let mut state = State::new(config);
        state.boot();
        Self {
            state: Rc::new(RefCell::new(state)),
        }
    }

    /// Power up a device whose flash already holds `image`
    pub fn with_firmware(config: DummyConfig, image: &[u8]) -> Self {
        let mut state = State::new(config);
        let len = image.len().min(state.flash.len());
        state.flash[..len].copy_from_slice(&image[..len]);
        state.boot();
        Self {
            state: Rc::new(RefCell::new(state)),
        }
    }

    /// Bus handle
    pub fn bus(&self) -> DummyBus {
        DummyBus {
            state: Rc::clone(&self.state),
        }
    }

    /// Control line handle
    pub fn lines(&self) -> DummyLines {
        DummyLines {
            state: Rc::clone(&self.state),
        }
    }

    /// Change fault injection or timing on a running device
    pub fn update_config(&self, f: impl FnOnce(&mut DummyConfig)) {
        f(&mut self.state.borrow_mut().config);
    }

    /// Copy of the flash contents
    pub fn flash(&self) -> Vec<u8> {
        self.state.borrow().flash.clone()
    }

    /// Current run state
    pub fn run_state(&self) -> RunState {
        self.state.borrow().run
    }

    /// What has been done to the device so far
    pub fn activity(&self) -> Activity {
        self.state.borrow().activity.clone()
    }

    /// Sum of all delays requested through the bus
    pub fn elapsed_ms(&self) -> u64 {
        self.state.borrow().elapsed_ms
    }

    /// Current SPI bus owner
    pub fn spi_owner(&self) -> SpiOwner {
        self.state.borrow().spi_owner
    }

    /// Current boot strap configuration
    pub fn strap(&self) -> BootStrap {
        self.state.borrow().strap
    }

    /// Whether flash readout protection is active
    pub fn read_protected(&self) -> bool {
        self.state.borrow().read_protected
    }
}

/// I2C side of a [`DummyCoprocessor`]
pub struct DummyBus {
    state: Rc<RefCell<State>>,
}

impl I2cBus for DummyBus {
    fn write(&mut self, addr: u8, bytes: &[u8]) -> Result<(), BusError> {
        let mut state = self.state.borrow_mut();
        match (addr, state.run) {
            (BOOTLOADER_ADDR, RunState::Bootloader) => {
                state.rom_write(bytes);
                Ok(())
            }
            (APP_ADDR, RunState::Application) => {
                state.app_write(bytes);
                Ok(())
            }
            _ => Err(BusError::NoDevice),
        }
    }

    fn read(&mut self, addr: u8, buf: &mut [u8]) -> Result<(), BusError> {
        let mut state = self.state.borrow_mut();
        match (addr, state.run) {
            (BOOTLOADER_ADDR, RunState::Bootloader) => state.rom_read(buf),
            (APP_ADDR, RunState::Application) => {
                state.app_read(buf);
                Ok(())
            }
            _ => Err(BusError::NoDevice),
        }
    }

    fn delay_ms(&mut self, ms: u32) {
        self.state.borrow_mut().elapsed_ms += u64::from(ms);
    }
}

/// Control line side of a [`DummyCoprocessor`]
pub struct DummyLines {
    state: Rc<RefCell<State>>,
}

impl ControlLines for DummyLines {
    fn set_reset(&mut self, asserted: bool) -> coflasher_core::Result<()> {
        let mut state = self.state.borrow_mut();
        if asserted {
            state.run = RunState::Reset;
        } else if state.run == RunState::Reset {
            state.boot();
        }
        Ok(())
    }

    fn set_boot_strap(&mut self, strap: BootStrap) -> coflasher_core::Result<()> {
        self.state.borrow_mut().strap = strap;
        Ok(())
    }

    fn set_spi_owner(&mut self, owner: SpiOwner) -> coflasher_core::Result<()> {
        self.state.borrow_mut().spi_owner = owner;
        Ok(())
    }
}
