//! Write command implementation

use coflasher_core::protocol::bootloader::check_range;
use coflasher_core::protocol::MAX_TRANSFER;
use coflasher_core::{ControlLines, Coprocessor, I2cBus};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;

use super::ensure_bootloader;

/// Run the write command
///
/// The flash must already be erased; the bootloader does not erase on
/// write. The file is padded with 0xFF to a multiple of four bytes.
pub fn run_write<B: I2cBus, L: ControlLines>(
    dev: &mut Coprocessor<B, L>,
    addr: u32,
    input: &Path,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut data = std::fs::read(input)?;
    if data.is_empty() {
        return Err(format!("{:?} is empty", input).into());
    }
    pad_to_word(&mut data);
    check_range(addr, data.len())?;

    ensure_bootloader(dev)?;
    write_with_progress(dev, addr, &data)?;

    println!("Wrote {} bytes at 0x{:08X}", data.len(), addr);
    Ok(())
}

fn pad_to_word(data: &mut Vec<u8>) {
    let padded = data.len().next_multiple_of(4);
    data.resize(padded, 0xFF);
}

fn write_with_progress<B: I2cBus, L: ControlLines>(
    dev: &mut Coprocessor<B, L>,
    addr: u32,
    data: &[u8],
) -> Result<(), Box<dyn std::error::Error>> {
    let pb = ProgressBar::new(data.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec}, {eta}) Writing")?
            .progress_chars("#>-"),
    );

    check_range(addr, data.len())?;

    let mut offset = 0usize;
    for chunk in data.chunks(MAX_TRANSFER) {
        let chunk_addr = addr.wrapping_add(offset as u32);
        if !dev.write_at(chunk_addr, chunk)? {
            pb.abandon_with_message("Write failed");
            return Err(format!("Write at 0x{:08X} was not acknowledged", chunk_addr).into());
        }
        offset += chunk.len();
        pb.set_position(offset as u64);
    }

    pb.finish_with_message("Write complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pad_to_word() {
        let mut data = vec![1, 2, 3, 4, 5];
        pad_to_word(&mut data);
        assert_eq!(data, vec![1, 2, 3, 4, 5, 0xFF, 0xFF, 0xFF]);

        let mut data = vec![0; 8];
        pad_to_word(&mut data);
        assert_eq!(data.len(), 8);
    }

    #[cfg(feature = "dummy")]
    #[test]
    fn test_write_after_erase() {
        use crate::commands::test_support::running_app;
        use coflasher_core::protocol::FLASH_START;

        let (emu, mut dev) = running_app("1.0");
        ensure_bootloader(&mut dev).unwrap();
        assert!(dev.bulk_erase().unwrap());

        let data: Vec<u8> = (0..300u32).map(|i| i as u8).collect();
        write_with_progress(&mut dev, FLASH_START, &data).unwrap();
        assert_eq!(emu.flash()[..300], data[..]);
        assert_eq!(
            emu.activity().block_writes,
            vec![FLASH_START, FLASH_START + 256]
        );
    }

    #[cfg(feature = "dummy")]
    #[test]
    fn test_write_past_top_of_memory_is_refused() {
        use crate::commands::test_support::running_app;
        use coflasher_core::{Error, PreconditionError};

        let (emu, mut dev) = running_app("1.0");
        ensure_bootloader(&mut dev).unwrap();
        let before = emu.activity();

        let err = write_with_progress(&mut dev, 0xFFFF_FF00, &[0u8; 512]).unwrap_err();
        assert_eq!(
            err.downcast_ref::<Error>(),
            Some(&Error::Precondition(PreconditionError::AddressOverflow {
                addr: 0xFFFF_FF00,
                len: 512
            }))
        );
        assert!(emu.activity().block_writes.is_empty());
        assert_eq!(emu.activity().boots, before.boots);
    }
}
