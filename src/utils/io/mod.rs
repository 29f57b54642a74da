//! IO utilities for file operations
//!
//! This module reads input tables from CSV or Parquet into Arrow record
//! batches and writes result tables back out.

pub mod csv;
pub mod parquet;

use std::path::Path;

use arrow::record_batch::RecordBatch;
use rayon::prelude::*;

use crate::error::{PipelineError, Result};

// Re-export commonly used functions for convenience
pub use self::csv::{read_csv, write_csv};
pub use self::parquet::{read_parquet, write_parquet};

/// File formats understood by the loaders
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableFormat {
    /// Comma-separated values with a header row
    Csv,
    /// Apache Parquet
    Parquet,
}

impl TableFormat {
    /// Detect the format from a file extension
    ///
    /// # Errors
    /// Returns an error for unknown extensions
    pub fn from_path(path: &Path) -> Result<Self> {
        match path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .as_deref()
        {
            Some("csv") => Ok(Self::Csv),
            Some("parquet" | "pq") => Ok(Self::Parquet),
            _ => Err(PipelineError::config(format!(
                "unsupported table format: {}",
                path.display()
            ))),
        }
    }
}

/// Read a table, choosing the reader from the file extension
pub fn read_table(path: &Path) -> Result<Vec<RecordBatch>> {
    match TableFormat::from_path(path)? {
        TableFormat::Csv => read_csv(path),
        TableFormat::Parquet => read_parquet(path),
    }
}

/// Load several tables in parallel, preserving input order
///
/// # Arguments
/// * `paths` - Files to read
///
/// # Returns
/// Record batches for each path, in the order of `paths`
pub fn load_tables_parallel(paths: &[&Path]) -> Result<Vec<Vec<RecordBatch>>> {
    paths.par_iter().map(|path| read_table(path)).collect()
}
