//! Log helpers shared by the loaders and pipeline stages

use std::path::{Path, PathBuf};
use std::time::Instant;

/// Times one table read or write and logs its row count when done
#[derive(Debug)]
pub struct TableIoTimer {
    action: &'static str,
    path: PathBuf,
    start: Instant,
}

impl TableIoTimer {
    /// Log the start of `action` ("reading", "writing") on `path`
    #[must_use]
    pub fn start(action: &'static str, path: &Path) -> Self {
        log::debug!("{action} {}", path.display());
        Self {
            action,
            path: path.to_path_buf(),
            start: Instant::now(),
        }
    }

    /// Log the finished operation with the number of rows it touched
    pub fn finish(self, rows: usize) {
        log::info!(
            "Finished {} {} ({rows} rows, {:.2?})",
            self.action,
            self.path.display(),
            self.start.elapsed()
        );
    }
}

/// Log the outcome of a pipeline stage on one table
///
/// # Arguments
/// * `stage` - Short stage name
/// * `table` - Table the stage ran on
/// * `detail` - What the stage produced
pub fn log_stage(stage: &str, table: &str, detail: &str) {
    log::info!("[{stage}] {table}: {detail}");
}

/// Log a recoverable problem, optionally tied to a file
pub fn log_warning(message: &str, path: Option<&Path>) {
    match path {
        Some(path) => log::warn!("{message} ({})", path.display()),
        None => log::warn!("{message}"),
    }
}
