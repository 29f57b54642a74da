//! Progress bars for cross-validation folds, outlier groups and search trials
//!
//! Bars draw to stderr and stay hidden when stderr is not a terminal, so
//! batch runs and tests only see the log lines.

use std::io::IsTerminal;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

/// Template of counted progress bars
pub const BAR_TEMPLATE: &str =
    "{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} (eta {eta}) {msg}";

/// Template of spinners
pub const SPINNER_TEMPLATE: &str = "{spinner:.green} {elapsed_precise} {msg}";

fn draw_target() -> ProgressDrawTarget {
    if std::io::stderr().is_terminal() {
        ProgressDrawTarget::stderr()
    } else {
        ProgressDrawTarget::hidden()
    }
}

/// Create a counted progress bar
///
/// # Arguments
/// * `length` - Number of steps
/// * `description` - Initial message
#[must_use]
pub fn create_main_progress_bar(length: u64, description: Option<&str>) -> ProgressBar {
    let style = ProgressStyle::with_template(BAR_TEMPLATE)
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=> ");
    let pb = ProgressBar::with_draw_target(Some(length), draw_target()).with_style(style);
    if let Some(description) = description {
        pb.set_message(description.to_string());
    }
    pb
}

/// Create a spinner for steps of unknown length
#[must_use]
pub fn create_spinner(message: Option<&str>) -> ProgressBar {
    let style = ProgressStyle::with_template(SPINNER_TEMPLATE)
        .unwrap_or_else(|_| ProgressStyle::default_spinner());
    let pb = ProgressBar::with_draw_target(None, draw_target()).with_style(style);
    if let Some(message) = message {
        pb.set_message(message.to_string());
    }
    pb.enable_steady_tick(Duration::from_millis(120));
    pb
}

/// Finish a bar, replacing its message when one is given
pub fn finish_progress_bar(pb: &ProgressBar, message: Option<&str>) {
    match message {
        Some(message) => pb.finish_with_message(message.to_string()),
        None => pb.finish_and_clear(),
    }
}
