//! Builder for pipeline configurations

use std::path::PathBuf;

use super::PipelineConfig;
use crate::algorithm::ensemble::ModelFamily;
use crate::error::Result;

/// Builder for common [`PipelineConfig`] overrides
#[derive(Debug, Clone, Default)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    /// Create a builder starting from the production defaults
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing configuration
    #[must_use]
    pub const fn from_config(config: PipelineConfig) -> Self {
        Self { config }
    }

    /// Set the training table
    #[must_use]
    pub fn train_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.paths.train = path.into();
        self
    }

    /// Set the held-out table
    #[must_use]
    pub fn test_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.paths.test = path.into();
        self
    }

    /// Set or clear the submission template
    #[must_use]
    pub fn submission_template(mut self, path: Option<PathBuf>) -> Self {
        self.config.paths.submission_template = path;
        self
    }

    /// Set the output directory
    #[must_use]
    pub fn output_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.paths.output_dir = path.into();
        self
    }

    /// Set the number of cross-validation repetitions
    #[must_use]
    pub const fn n_repetitions(mut self, repetitions: u64) -> Self {
        self.config.cross_validation.n_repetitions = repetitions;
        self
    }

    /// Set the number of folds per repetition
    #[must_use]
    pub const fn n_splits(mut self, splits: usize) -> Self {
        self.config.cross_validation.n_splits = splits;
        self
    }

    /// Set whether raw measurements are imputed on load
    #[must_use]
    pub const fn impute_raw_on_load(mut self, impute: bool) -> Self {
        self.config.impute_raw_on_load = impute;
        self
    }

    /// Set the model families of the committee
    #[must_use]
    pub fn families(mut self, families: Vec<ModelFamily>) -> Self {
        self.config.ensemble.families = families;
        self
    }

    /// Set the boosting rounds of every family
    #[must_use]
    pub const fn boosting_rounds(mut self, rounds: usize) -> Self {
        self.config.ensemble.catboost.iterations = rounds;
        self.config.ensemble.lightgbm.n_iter = rounds;
        self.config.ensemble.xgboost.n_estimators = rounds;
        self
    }

    /// Set the number of search trials
    #[must_use]
    pub const fn search_trials(mut self, trials: usize) -> Self {
        self.config.search.n_trials = trials;
        self
    }

    /// Set the family tuned by the search
    #[must_use]
    pub const fn search_family(mut self, family: ModelFamily) -> Self {
        self.config.search.family = family;
        self
    }

    /// Set the legacy score tables
    #[must_use]
    pub fn legacy_scores(mut self, train: Option<PathBuf>, test: Option<PathBuf>) -> Self {
        self.config.auxiliary.legacy_train = train;
        self.config.auxiliary.legacy_test = test;
        self
    }

    /// Set the input tables of an auxiliary family, adding it when unknown
    #[must_use]
    pub fn auxiliary_family(
        mut self,
        name: &str,
        oof_path: Option<PathBuf>,
        held_out_path: Option<PathBuf>,
    ) -> Self {
        let families = &mut self.config.auxiliary.families;
        if let Some(family) = families.iter_mut().find(|f| f.name == name) {
            family.oof_path = oof_path;
            family.held_out_path = held_out_path;
        } else {
            families.push(super::AuxiliaryFamilyConfig {
                oof_path,
                held_out_path,
                ..super::AuxiliaryFamilyConfig::new(name)
            });
        }
        self
    }

    /// Validate and return the configuration
    ///
    /// # Errors
    /// Returns a configuration error if validation fails
    pub fn build(self) -> Result<PipelineConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
