//! Progress indicators for the flagops CLI

use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

const TICK: Duration = Duration::from_millis(100);

/// Bar over a known number of steps
pub fn bar(len: u64, prefix: &str) -> ProgressBar {
    let pb = ProgressBar::new(len);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} {prefix} [{bar:30.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=>-"),
    );
    pb.set_prefix(prefix.to_string());
    pb.enable_steady_tick(TICK);
    pb
}

/// Spinner for a single remote call of unknown length
pub fn spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(message.to_string());
    pb.enable_steady_tick(TICK);
    pb
}

/// Clear a spinner and leave a success line behind
pub fn finish_success(pb: &ProgressBar, message: &str) {
    pb.finish_and_clear();
    crate::ui::success(message);
}

pub fn finish_error(pb: &ProgressBar, message: &str) {
    pb.finish_and_clear();
    crate::ui::error(message);
}
