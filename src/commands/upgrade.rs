//! Upgrade command implementation

use coflasher_core::{
    ControlLines, Coprocessor, FirmwareImage, I2cBus, UpgradeProgress, UpgradeStep,
};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::path::Path;
use std::time::Duration;

/// Progress reporter using indicatif progress bars
struct IndicatifProgress {
    multi: MultiProgress,
    current_bar: Option<ProgressBar>,
    programming: Option<ProgressBar>,
}

impl IndicatifProgress {
    fn new() -> Self {
        Self {
            multi: MultiProgress::new(),
            current_bar: None,
            programming: None,
        }
    }

    fn create_spinner(&mut self, message: String) {
        let pb = self.multi.add(ProgressBar::new_spinner());
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        pb.set_message(message);
        pb.enable_steady_tick(Duration::from_millis(100));
        self.current_bar = Some(pb);
    }

    fn create_bar(&mut self, total: u64) -> ProgressBar {
        let pb = self.multi.add(ProgressBar::new(total));
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec}, {eta}) Writing")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );
        pb
    }

    fn finish_current(&mut self) {
        if let Some(pb) = self.current_bar.take() {
            pb.finish();
        }
    }

    fn finish(&mut self, message: &str) {
        self.finish_current();
        if let Some(pb) = self.programming.take() {
            pb.finish_with_message(message.to_string());
        }
    }

    fn abandon(&mut self) {
        if let Some(pb) = self.current_bar.take() {
            pb.abandon();
        }
        if let Some(pb) = self.programming.take() {
            pb.abandon();
        }
    }
}

impl UpgradeProgress for IndicatifProgress {
    fn step(&mut self, step: UpgradeStep) {
        self.finish_current();
        match step {
            // the bar persists across both programming steps
            UpgradeStep::ProgramBody | UpgradeStep::ProgramFirstBlock => {}
            _ => self.create_spinner(format!("{}...", capitalize(&step.to_string()))),
        }
    }

    fn programmed(&mut self, done: usize, total: usize) {
        if self.programming.is_none() {
            self.programming = Some(self.create_bar(total as u64));
        }
        if let Some(pb) = &self.programming {
            pb.set_position(done as u64);
        }
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Flash `image_path` and check that the co-processor comes back
/// reporting `expected_version`
pub fn run_upgrade<B: I2cBus, L: ControlLines>(
    dev: &mut Coprocessor<B, L>,
    image_path: &Path,
    expected_version: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let data = std::fs::read(image_path)?;
    let image = FirmwareImage::new(data, expected_version)?;
    log::info!(
        "Upgrading co-processor with {:?} ({} bytes, version {})",
        image_path,
        image.len(),
        image.version()
    );

    let mut progress = IndicatifProgress::new();
    match dev.upgrade(&image, &mut progress) {
        Ok(version) => {
            progress.finish("Upgrade complete");
            println!("Co-processor now running {}", version);
            Ok(())
        }
        Err(e) => {
            progress.abandon();
            if e.step().flash_disturbed() {
                eprintln!("Flash contents are incomplete; run the upgrade again before resetting");
            }
            if let Some(mode) = e.last_mode() {
                eprintln!("Co-processor last seen in mode: {}", mode);
            }
            Err(e.into())
        }
    }
}
