//! Reference-fold rescaling of auxiliary scores

use crate::config::AuxiliaryFamilyConfig;
use crate::error::{PipelineError, Result};
use crate::table::ScoreTable;
use crate::utils::stats::{nan_mean, nan_std};

/// Mean and sample standard deviation of one fold of out-of-fold scores
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FoldStatistics {
    /// Fold the statistics were taken from
    pub fold: i64,
    /// Mean raw score
    pub mean: f64,
    /// Sample standard deviation of the raw score
    pub std: f64,
}

impl FoldStatistics {
    /// Statistics of the family's reference fold in an out-of-fold record
    ///
    /// # Errors
    /// Returns an error if the fold or score column is missing, or the
    /// reference fold holds fewer than two scores
    pub fn from_out_of_fold(oof: &ScoreTable, family: &AuxiliaryFamilyConfig) -> Result<Self> {
        let rows = oof.rows_where(&family.fold_column, family.reference_fold as f64)?;
        let scores = oof.column(&family.score_column)?;
        let fold_scores: Vec<f64> = rows.iter().map(|&r| scores[r]).collect();
        let mean = nan_mean(&fold_scores);
        let std = nan_std(&fold_scores, 1);
        if mean.is_nan() || std.is_nan() {
            return Err(PipelineError::Data(format!(
                "fold {} of '{}' has too few scores for rescaling",
                family.reference_fold,
                oof.name()
            )));
        }
        Ok(Self {
            fold: family.reference_fold,
            mean,
            std,
        })
    }

    /// `(value - mean) / std`
    #[must_use]
    pub fn rescale(&self, value: f64) -> f64 {
        (value - self.mean) / self.std
    }
}
