//! Fitted ensemble members

use serde::Serialize;

use super::classifier::{BoostedTreeClassifier, ModelFamily};
use crate::algorithm::boosting::FeatureMatrix;
use crate::algorithm::feature_set::FeatureSet;
use crate::config::SamplingConfig;
use crate::error::{PipelineError, Result};
use crate::table::LesionTable;

/// Where a member came from in the cross-validation run
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MemberOrigin {
    pub family: ModelFamily,
    /// Repetition, starting at 1
    pub repetition: u64,
    /// Fold within the repetition, starting at 0
    pub fold: usize,
    /// Fold seed of the repetition
    pub seed: u64,
}

/// One fitted classifier bound to its input columns and training provenance
///
/// Members are immutable once built: the model, its feature set and the
/// sampling plan used ahead of it cannot be changed afterwards.
#[derive(Debug)]
pub struct EnsembleMember {
    origin: MemberOrigin,
    features: FeatureSet,
    sampling: SamplingConfig,
    validation_score: f64,
    model: Box<dyn BoostedTreeClassifier>,
}

impl EnsembleMember {
    /// Bind a fitted model to its provenance
    ///
    /// # Errors
    /// Returns an error if the model belongs to another family than `origin`
    pub fn new(
        origin: MemberOrigin,
        features: FeatureSet,
        sampling: SamplingConfig,
        validation_score: f64,
        model: Box<dyn BoostedTreeClassifier>,
    ) -> Result<Self> {
        if model.family() != origin.family {
            return Err(PipelineError::Model(format!(
                "{} model registered as a {} member",
                model.family(),
                origin.family
            )));
        }
        Ok(Self {
            origin,
            features,
            sampling,
            validation_score,
            model,
        })
    }

    #[must_use]
    pub const fn origin(&self) -> MemberOrigin {
        self.origin
    }

    #[must_use]
    pub const fn family(&self) -> ModelFamily {
        self.origin.family
    }

    /// Model input columns
    #[must_use]
    pub const fn features(&self) -> &FeatureSet {
        &self.features
    }

    /// Resampling and noise applied to the member's training slice
    #[must_use]
    pub const fn sampling(&self) -> &SamplingConfig {
        &self.sampling
    }

    /// Partial AUC on the member's validation fold
    #[must_use]
    pub const fn validation_score(&self) -> f64 {
        self.validation_score
    }

    /// Probabilities for a prepared matrix
    ///
    /// # Errors
    /// Returns an error if the matrix columns differ from the member's
    pub fn predict_matrix(&self, matrix: &FeatureMatrix) -> Result<Vec<f64>> {
        self.model.predict_proba(matrix)
    }

    /// Probabilities for every lesion of a table
    ///
    /// # Errors
    /// Returns an error if the table lacks one of the member's columns
    pub fn predict_proba(&self, table: &LesionTable) -> Result<Vec<f64>> {
        let matrix = self.features.to_matrix(table)?;
        self.predict_matrix(&matrix)
    }
}
