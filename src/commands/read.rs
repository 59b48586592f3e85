//! Read command implementation

use coflasher_core::protocol::MAX_TRANSFER;
use coflasher_core::{ControlLines, Coprocessor, I2cBus};
use indicatif::{ProgressBar, ProgressStyle};
use std::fs;
use std::path::Path;

use super::ensure_bootloader;

/// Run the read command
///
/// Without an output file the data is printed as a hex dump.
pub fn run_read<B: I2cBus, L: ControlLines>(
    dev: &mut Coprocessor<B, L>,
    addr: u32,
    len: u32,
    output: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    if len == 0 {
        return Err("Nothing to read (length is 0)".into());
    }
    addr.checked_add(len - 1)
        .ok_or("Read range wraps past the end of the address space")?;

    ensure_bootloader(dev)?;
    let data = read_with_progress(dev, addr, len as usize)?;

    match output {
        Some(path) => {
            fs::write(path, &data)?;
            println!("Wrote {} bytes to {:?}", data.len(), path);
        }
        None => print!("{}", hex_dump(addr, &data)),
    }
    Ok(())
}

/// Read `len` bytes from `addr` with a progress bar
fn read_with_progress<B: I2cBus, L: ControlLines>(
    dev: &mut Coprocessor<B, L>,
    addr: u32,
    len: usize,
) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
    let pb = ProgressBar::new(len as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec}, {eta})")?
            .progress_chars("#>-"),
    );

    let mut data = Vec::with_capacity(len);
    while data.len() < len {
        let chunk = MAX_TRANSFER.min(len - data.len());
        let chunk_addr = addr + data.len() as u32;
        data.extend_from_slice(&dev.read_at(chunk_addr, chunk)?);
        pb.set_position(data.len() as u64);
    }

    pb.finish_with_message("Read complete");
    Ok(data)
}

/// Format `data` as 16 bytes per line with address and ASCII columns
fn hex_dump(addr: u32, data: &[u8]) -> String {
    let mut out = String::new();
    for (i, line) in data.chunks(16).enumerate() {
        out.push_str(&format!("{:08X}: ", addr as usize + i * 16));
        for col in 0..16 {
            match line.get(col) {
                Some(b) => out.push_str(&format!("{:02X} ", b)),
                None => out.push_str("   "),
            }
        }
        out.push(' ');
        out.extend(line.iter().map(|&b| {
            if b.is_ascii_graphic() || b == b' ' {
                b as char
            } else {
                '.'
            }
        }));
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_dump_partial_line() {
        let dump = hex_dump(0x0800_0000, b"OK\x00\xff");
        assert_eq!(
            dump,
            format!("08000000: 4F 4B 00 FF {} OK..\n", "   ".repeat(12))
        );
    }

    #[test]
    fn test_hex_dump_line_addresses() {
        let dump = hex_dump(0x100, &[0u8; 20]);
        let lines: Vec<&str> = dump.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("00000100: "));
        assert!(lines[1].starts_with("00000110: "));
    }

    #[cfg(feature = "dummy")]
    #[test]
    fn test_read_spans_multiple_transfers() {
        use crate::commands::test_support::running_app;
        use coflasher_core::protocol::FLASH_START;

        let (emu, mut dev) = running_app("1.0");
        ensure_bootloader(&mut dev).unwrap();
        let data = read_with_progress(&mut dev, FLASH_START + 4, 600).unwrap();
        assert_eq!(data, emu.flash()[4..604].to_vec());
    }
}
