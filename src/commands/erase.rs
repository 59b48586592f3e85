//! Erase command implementation

use coflasher_core::{ControlLines, Coprocessor, I2cBus};
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

use super::ensure_bootloader;

/// Mass erase the co-processor flash
pub fn run_erase<B: I2cBus, L: ControlLines>(
    dev: &mut Coprocessor<B, L>,
) -> Result<(), Box<dyn std::error::Error>> {
    ensure_bootloader(dev)?;

    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::default_spinner().template("{spinner:.green} {msg}")?);
    pb.set_message("Erasing flash (this may take a while)...");
    pb.enable_steady_tick(Duration::from_millis(100));

    if !dev.bulk_erase()? {
        pb.abandon_with_message("Erase failed");
        return Err("Mass erase was not acknowledged".into());
    }

    pb.finish_with_message("Erase complete");
    Ok(())
}
