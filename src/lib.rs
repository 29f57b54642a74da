//! Tabular feature engineering and boosted-tree ensemble scoring for
//! skin-lesion malignancy risk.
//!
//! Lesion metadata tables are read from CSV or Parquet, extended with derived
//! and patient-normalized features, one-hot categories, per-patient outlier
//! scores and auxiliary image-model scores, then scored by a rank-fused
//! committee of boosted-tree classifiers trained under repeated stratified
//! group k-fold cross-validation.

pub mod algorithm;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod schema;
pub mod table;
pub mod utils;

// Re-export the most common types for easier use
pub use algorithm::FeatureSet;
pub use algorithm::ensemble::{Ensemble, ModelFamily, partial_auc_score};
pub use config::{PipelineConfig, PipelineConfigBuilder};
pub use error::{PipelineError, Result};
pub use pipeline::{PipelineInputs, PreparedData, RunReport, Submission, prepare};
pub use schema::TableSchema;
pub use table::{Column, LesionTable, ScoreTable};

// Arrow types
pub use arrow::record_batch::RecordBatch;
