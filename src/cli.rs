//! CLI argument parsing

use crate::backends;
use clap::{Parser, Subcommand, ValueEnum};
use coflasher_core::protocol::FLASH_START;
use coflasher_core::SpiOwner;
use std::path::PathBuf;

/// Parse a string as a hex or decimal u32
fn parse_hex_u32(s: &str) -> Result<u32, String> {
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16).map_err(|e| format!("Invalid hex value: {}", e))
    } else {
        s.parse::<u32>().map_err(|e| format!("Invalid number: {}", e))
    }
}

/// Generate dynamic help text for the backend argument
fn backend_help() -> String {
    format!(
        "Backend to use, as name[:key=value,...] [available: {}]",
        backends::backend_names_short()
    )
}

#[derive(Parser)]
#[command(name = "coflasher")]
#[command(
    author,
    version,
    about = "Co-processor bootloader and firmware upgrade tool",
    long_about = None
)]
pub struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

/// Who drives the shared SPI bus
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum OwnerArg {
    /// The host
    Host,
    /// The co-processor
    Coprocessor,
}

impl From<OwnerArg> for SpiOwner {
    fn from(owner: OwnerArg) -> Self {
        match owner {
            OwnerArg::Host => SpiOwner::Host,
            OwnerArg::Coprocessor => SpiOwner::Coprocessor,
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show whether the application or the bootloader is running
    Status {
        #[arg(short, long, help = backend_help())]
        backend: String,
    },

    /// Show the bootloader protocol version and supported commands
    Info {
        #[arg(short, long, help = backend_help())]
        backend: String,
    },

    /// Reset the co-processor into its ROM bootloader
    EnterBootloader {
        #[arg(short, long, help = backend_help())]
        backend: String,

        /// Ask the application to reboot into the bootloader instead of
        /// strapping it
        #[arg(long)]
        soft: bool,
    },

    /// Reset the co-processor into its application
    Reset {
        #[arg(short, long, help = backend_help())]
        backend: String,
    },

    /// Mass erase the co-processor flash
    Erase {
        #[arg(short, long, help = backend_help())]
        backend: String,
    },

    /// Read co-processor memory
    Read {
        #[arg(short, long, help = backend_help())]
        backend: String,

        /// Start address (hex with 0x prefix, or decimal)
        #[arg(short, long, value_parser = parse_hex_u32, default_value_t = FLASH_START)]
        addr: u32,

        /// Number of bytes to read
        #[arg(short, long, value_parser = parse_hex_u32)]
        len: u32,

        /// Write the data to a file instead of printing a hex dump
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Write a file into erased flash
    Write {
        #[arg(short, long, help = backend_help())]
        backend: String,

        /// Start address (hex with 0x prefix, or decimal)
        #[arg(short, long, value_parser = parse_hex_u32, default_value_t = FLASH_START)]
        addr: u32,

        /// Input file path
        #[arg(short, long)]
        input: PathBuf,
    },

    /// Leave the bootloader and jump to an image
    Run {
        #[arg(short, long, help = backend_help())]
        backend: String,

        /// Image address (hex with 0x prefix, or decimal)
        #[arg(short, long, value_parser = parse_hex_u32, default_value_t = FLASH_START)]
        addr: u32,
    },

    /// Enable flash readout protection
    Protect {
        #[arg(short, long, help = backend_help())]
        backend: String,
    },

    /// Disable flash readout protection (erases the flash)
    Unprotect {
        #[arg(short, long, help = backend_help())]
        backend: String,

        /// Confirm that the flash will be erased
        #[arg(long)]
        yes: bool,
    },

    /// Hand the shared SPI bus to the host or the co-processor
    Spi {
        #[arg(short, long, help = backend_help())]
        backend: String,

        /// New bus owner
        #[arg(long, value_enum)]
        owner: OwnerArg,
    },

    /// Replace the co-processor firmware and check the new version
    Upgrade {
        #[arg(short, long, help = backend_help())]
        backend: String,

        /// Firmware image (raw binary)
        #[arg(short, long)]
        image: PathBuf,

        /// Version string the new firmware reports
        #[arg(long = "version", value_name = "VERSION")]
        expected_version: String,
    },

    /// List available backends
    ListBackends,
}
