//! coflasher - Co-processor bootloader and firmware upgrade tool
//!
//! Drives a microcontroller that shares an I2C bus with the host. The
//! co-processor runs either its application firmware or its vendor ROM
//! bootloader; coflasher switches between the two using the reset and boot
//! strap lines, talks the bootloader protocol to erase, read and program
//! flash, and hands the shared SPI bus between host and co-processor.
//!
//! The hardware comes from a backend:
//! - **linux** - i2c-dev for the bus, the GPIO character device for the lines
//! - **dummy** - an in-memory emulator of the co-processor
//!
//! All commands go through [`coflasher_core::Coprocessor`], so they behave
//! the same on either.

mod backends;
mod cli;
mod commands;

use backends::open_backend;
use clap::Parser;
use cli::{Cli, Commands};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    // Set log level based on verbosity
    match cli.verbose {
        0 => {} // default (info)
        1 => log::set_max_level(log::LevelFilter::Debug),
        _ => log::set_max_level(log::LevelFilter::Trace),
    }

    match cli.command {
        Commands::Status { backend } => commands::run_status(&mut open_backend(&backend)?),
        Commands::Info { backend } => commands::run_info(&mut open_backend(&backend)?),
        Commands::EnterBootloader { backend, soft } => {
            commands::run_enter_bootloader(&mut open_backend(&backend)?, soft)
        }
        Commands::Reset { backend } => commands::run_reset(&mut open_backend(&backend)?),
        Commands::Erase { backend } => commands::run_erase(&mut open_backend(&backend)?),
        Commands::Read {
            backend,
            addr,
            len,
            output,
        } => commands::run_read(&mut open_backend(&backend)?, addr, len, output.as_deref()),
        Commands::Write {
            backend,
            addr,
            input,
        } => commands::run_write(&mut open_backend(&backend)?, addr, &input),
        Commands::Run { backend, addr } => commands::run_go(&mut open_backend(&backend)?, addr),
        Commands::Protect { backend } => commands::run_protect(&mut open_backend(&backend)?),
        Commands::Unprotect { backend, yes } => {
            commands::run_unprotect(&mut open_backend(&backend)?, yes)
        }
        Commands::Spi { backend, owner } => {
            commands::run_spi(&mut open_backend(&backend)?, owner.into())
        }
        Commands::Upgrade {
            backend,
            image,
            expected_version,
        } => commands::run_upgrade(&mut open_backend(&backend)?, &image, &expected_version),
        Commands::ListBackends => {
            commands::list_backends();
            Ok(())
        }
    }
}
