//! Client progress display
//!
//! A single bar on the bottom line with status lines printed above it.

use crate::protocol::timeouts::PROGRESS_TICK_MS;
use crossterm::style::{Color, Stylize};
use indicatif::{ProgressBar, ProgressStyle};
use std::time::{Duration, Instant};

pub struct TransferProgress {
    bar: ProgressBar,
    start_time: Instant,
}

impl TransferProgress {
    pub fn new(total: u64, name: &str) -> Self {
        let bar = ProgressBar::new(total);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{msg} |{bar:25.yellow}| {percent}% {bytes}/{total_bytes} ({bytes_per_sec})")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("█▉▊▋▌▍▎▏ "),
        );
        bar.set_message(name.to_string());
        bar.enable_steady_tick(Duration::from_millis(PROGRESS_TICK_MS));
        Self {
            bar,
            start_time: Instant::now(),
        }
    }

    pub fn bar(&self) -> &ProgressBar {
        &self.bar
    }

    /// Print a status line above the bar
    pub fn println(&self, msg: &str, color: Color) {
        self.bar.suspend(|| {
            println!("{}", msg.with(color).bold());
        });
    }

    pub fn finish_success(&self, bytes: u64) {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        let throughput = if elapsed > 0.0 {
            bytes as f64 / elapsed / 1_048_576.0
        } else {
            0.0
        };
        self.bar.finish_and_clear();
        println!(
            "{} {:.1} MB in {:.1}s ({:.1} MB/s)",
            "Finished".with(Color::Green).bold(),
            bytes as f64 / 1_048_576.0,
            elapsed,
            throughput
        );
    }

    pub fn finish_error(&self, msg: &str) {
        self.bar.abandon();
        eprintln!("{} {}", "Failed".with(Color::Red).bold(), msg);
    }
}
