//! Logging and progress reporting

pub mod log;
pub mod progress;

pub use self::log::{TableIoTimer, log_stage, log_warning};
pub use self::progress::{create_main_progress_bar, create_spinner, finish_progress_bar};
