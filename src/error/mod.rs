//! Error handling for the scoring pipeline.

use std::io;

use arrow::error::ArrowError;
use parquet::errors::ParquetError;

/// Errors raised by the lesion scoring pipeline
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Error opening or reading a file
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Error processing Arrow data
    #[error("Arrow error: {0}")]
    Arrow(#[from] ArrowError),

    /// Error processing Parquet data
    #[error("Parquet error: {0}")]
    Parquet(#[from] ParquetError),

    /// Error reading or writing JSON configuration and reports
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A required column is absent from an input table
    #[error("Schema error: required column '{column}' not found in {table}")]
    MissingColumn {
        /// Name of the missing column
        column: String,
        /// Table the column was expected in
        table: String,
    },

    /// A column exists but has an unusable layout
    #[error("Schema error: {0}")]
    Schema(String),

    /// Configuration failed validation
    #[error("Configuration error: {0}")]
    Config(String),

    /// Metric could not be computed (for example a single-class fold)
    #[error("Metric error: {0}")]
    Metric(String),

    /// Model fit or prediction failed
    #[error("Model error: {0}")]
    Model(String),

    /// Data inconsistency between pipeline stages
    #[error("Data error: {0}")]
    Data(String),
}

impl PipelineError {
    /// Create a missing column error
    pub fn missing_column(column: impl Into<String>, table: impl Into<String>) -> Self {
        Self::MissingColumn {
            column: column.into(),
            table: table.into(),
        }
    }

    /// Create a configuration validation error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }
}

impl From<serde_arrow::Error> for PipelineError {
    fn from(error: serde_arrow::Error) -> Self {
        Self::Schema(error.to_string())
    }
}

/// Result type for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;
