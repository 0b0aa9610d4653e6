//! Cargo-style progress display for a patch session
//!
//! - Status lines scroll above
//! - One byte bar for the file currently downloading stays at the bottom

use crate::events::Status;
use crate::session::UpdateOutcome;
use crossterm::style::{Color, Stylize};
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Mutex;
use std::time::{Duration, Instant};

pub struct TransferProgress {
    bar: ProgressBar,
    start_time: Instant,
    current_file: Mutex<String>,
    verbose: bool,
}

impl TransferProgress {
    pub fn new(verbose: bool) -> Self {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} {msg} [{bar:30.cyan/blue}] {bytes}/{total_bytes}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=> ")
                .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"),
        );
        bar.enable_steady_tick(Duration::from_millis(100));
        Self {
            bar,
            start_time: Instant::now(),
            current_file: Mutex::new(String::new()),
            verbose,
        }
    }

    pub fn on_progress(&self, file: &str, received: u64, total: u64) {
        if let Ok(mut current) = self.current_file.lock() {
            if *current != file {
                *current = file.to_string();
                self.bar.set_length(total);
                self.bar.set_position(0);
                self.bar.set_message(file.to_string());
            }
        }
        self.bar.set_position(received);
        if self.verbose && received == total {
            self.print_op("Fetched", file);
        }
    }

    pub fn on_status(&self, status: &Status) {
        match status {
            Status::ArchiveMessage(_) | Status::ArchiveProgress(_) if !self.verbose => {}
            Status::ArchiveWarning(m) => self.print_op("Warning", m),
            Status::Failed(_) => {}
            other => self.print_op("Patch", &other.to_string()),
        }
    }

    /// Print a line above the progress bar (cargo-style)
    fn print_op(&self, operation: &str, detail: &str) {
        let color = if operation == "Warning" {
            Color::Yellow
        } else {
            Color::Green
        };
        self.bar.suspend(|| {
            println!(
                "{:>12} {}",
                operation.with(color).bold(),
                detail.with(Color::Cyan)
            );
        });
    }

    pub fn finish_success(&self, outcome: &UpdateOutcome) {
        let elapsed = self.start_time.elapsed();
        let msg = match outcome {
            UpdateOutcome::UpToDate { version } => format!(
                "{} version {}",
                "Up to date".with(Color::Green).bold(),
                version
            ),
            UpdateOutcome::Updated {
                from,
                to,
                files,
                bytes,
            } => format!(
                "{} {} -> {}: {} files ({:.1} MB) in {:.1}s",
                "Updated".with(Color::Green).bold(),
                from,
                to,
                files,
                *bytes as f64 / 1_048_576.0,
                elapsed.as_secs_f64()
            ),
        };
        self.bar.finish_and_clear();
        println!("{msg}");
    }

    pub fn finish_error(&self, msg: &str) {
        self.bar.abandon_with_message(format!(
            "{} {}",
            "Failed".with(Color::Red).bold(),
            msg
        ));
    }
}
