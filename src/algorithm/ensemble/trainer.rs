//! Repeated group-aware cross-validation
//!
//! One loop serves every family: for each repetition the rows are split with
//! the family's seed schedule, the training slice is resampled and perturbed,
//! a classifier is fitted and scored on the untouched validation fold.

use log::{debug, info};
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::Serialize;

use super::classifier::{FamilyParams, ModelFamily};
use super::folds::StratifiedGroupKFold;
use super::member::{EnsembleMember, MemberOrigin};
use super::metric::partial_auc_score;
use super::sampling::{add_column_noise, resample_rows};
use super::scorer::Ensemble;
use crate::algorithm::feature_set::FeatureSet;
use crate::config::{CrossValidationConfig, EnsembleConfig, SamplingConfig};
use crate::error::{PipelineError, Result};
use crate::table::LesionTable;
use crate::utils::logging::{create_main_progress_bar, finish_progress_bar};
use crate::utils::stats::{nan_mean, nan_std};

/// Outcome of one fold
#[derive(Debug, Clone, Serialize)]
pub struct FoldReport {
    #[serde(flatten)]
    pub origin: MemberOrigin,
    /// Training rows after resampling
    pub train_rows: usize,
    /// Positive training rows after resampling
    pub train_positives: usize,
    pub validation_rows: usize,
    pub validation_positives: usize,
    pub num_trees: usize,
    /// Partial AUC on the validation fold
    pub score: f64,
}

/// Fold outcomes of one family
#[derive(Debug, Clone, Serialize)]
pub struct FamilyReport {
    pub family: ModelFamily,
    pub mean_score: f64,
    /// Sample standard deviation of the fold scores
    pub std_score: f64,
    pub folds: Vec<FoldReport>,
}

impl FamilyReport {
    fn from_folds(family: ModelFamily, folds: Vec<FoldReport>) -> Self {
        let scores: Vec<f64> = folds.iter().map(|f| f.score).collect();
        Self {
            family,
            mean_score: nan_mean(&scores),
            std_score: nan_std(&scores, 1),
            folds,
        }
    }
}

/// Fold outcomes of every trained family
#[derive(Debug, Clone, Default, Serialize)]
pub struct CrossValidationReport {
    pub families: Vec<FamilyReport>,
}

impl CrossValidationReport {
    /// Mean of the family mean scores
    #[must_use]
    pub fn mean_score(&self) -> f64 {
        let means: Vec<f64> = self.families.iter().map(|f| f.mean_score).collect();
        nan_mean(&means)
    }
}

/// Members and report of one family's cross-validation
#[derive(Debug)]
pub struct CrossValidationRun {
    /// Fitted members, empty when members were not kept
    pub members: Vec<EnsembleMember>,
    pub report: FamilyReport,
}

/// Runs the repeated cross-validation protocol
#[derive(Debug, Clone, Copy)]
pub struct CrossValidator<'a> {
    cv: &'a CrossValidationConfig,
    sampling: &'a SamplingConfig,
}

impl<'a> CrossValidator<'a> {
    #[must_use]
    pub const fn new(cv: &'a CrossValidationConfig, sampling: &'a SamplingConfig) -> Self {
        Self { cv, sampling }
    }

    /// Cross-validate one family
    ///
    /// # Arguments
    /// * `params` - Family parameters
    /// * `table` - Training table with a target column
    /// * `features` - Model input columns
    /// * `keep_members` - Keep the fitted models as ensemble members
    ///
    /// # Errors
    /// Returns an error if the table has no target, a fold cannot be split,
    /// a fit fails or a validation fold holds a single class
    pub fn run(
        &self,
        params: &FamilyParams,
        table: &LesionTable,
        features: &FeatureSet,
        keep_members: bool,
    ) -> Result<CrossValidationRun> {
        params.validate()?;
        let family = params.family();
        let labels = table.target().ok_or_else(|| {
            PipelineError::Data(format!("table '{}' has no target column", table.name()))
        })?;
        let matrix = features.to_matrix(table)?;

        let total = self.cv.n_repetitions * self.cv.n_splits as u64;
        let pb = create_main_progress_bar(total, Some(&format!("Cross-validating {family}")));
        let mut members = Vec::new();
        let mut folds = Vec::with_capacity(total as usize);

        for repetition in 1..=self.cv.n_repetitions {
            let seed = family.repetition_seed(repetition);
            let splitter = StratifiedGroupKFold::new(self.cv.n_splits, self.cv.shuffle, seed)?;
            for fold in splitter.split(labels, table.patient_ids())? {
                let mut rng =
                    StdRng::seed_from_u64(seed.wrapping_mul(1_000).wrapping_add(fold.index as u64));
                let rows = resample_rows(labels, fold.train, self.sampling, &mut rng);
                let train_labels: Vec<u8> = rows.iter().map(|&r| labels[r]).collect();
                let mut train = matrix.take_rows(&rows);
                add_column_noise(
                    &mut train,
                    &self.sampling.noise_columns,
                    self.sampling.noise_std,
                    &mut rng,
                )?;

                let validation = matrix.take_rows(&fold.validation);
                let validation_labels: Vec<u8> =
                    fold.validation.iter().map(|&r| labels[r]).collect();

                let mut model = params.build(seed)?;
                model.fit(&train, &train_labels, Some((&validation, &validation_labels)))?;
                let predictions = model.predict_proba(&validation)?;
                let score = partial_auc_score(&validation_labels, &predictions, self.cv.min_tpr)?;

                let origin = MemberOrigin {
                    family,
                    repetition,
                    fold: fold.index,
                    seed,
                };
                debug!(
                    "{family} repetition {repetition} fold {}: pAUC {score:.5} ({} trees)",
                    fold.index,
                    model.num_trees()
                );
                folds.push(FoldReport {
                    origin,
                    train_rows: rows.len(),
                    train_positives: train_labels.iter().filter(|&&y| y == 1).count(),
                    validation_rows: validation_labels.len(),
                    validation_positives: validation_labels.iter().filter(|&&y| y == 1).count(),
                    num_trees: model.num_trees(),
                    score,
                });
                if keep_members {
                    members.push(EnsembleMember::new(
                        origin,
                        features.clone(),
                        self.sampling.clone(),
                        score,
                        model,
                    )?);
                }
                pb.inc(1);
            }
        }

        let report = FamilyReport::from_folds(family, folds);
        finish_progress_bar(
            &pb,
            Some(&format!("{family}: mean pAUC {:.5}", report.mean_score)),
        );
        info!(
            "{family}: mean pAUC {:.5} (std {:.5}) over {} folds",
            report.mean_score,
            report.std_score,
            report.folds.len()
        );
        Ok(CrossValidationRun { members, report })
    }
}

/// Train every configured family and collect the members into an ensemble
///
/// # Errors
/// Returns an error if any family fails to cross-validate
pub fn train_ensemble(
    config: &EnsembleConfig,
    cv: &CrossValidationConfig,
    sampling: &SamplingConfig,
    table: &LesionTable,
    features: &FeatureSet,
) -> Result<(Ensemble, CrossValidationReport)> {
    let validator = CrossValidator::new(cv, sampling);
    let mut members = Vec::new();
    let mut report = CrossValidationReport::default();
    for &family in &config.families {
        let run = validator.run(&config.family_params(family), table, features, true)?;
        members.extend(run.members);
        report.families.push(run.report);
    }
    info!(
        "Trained {} ensemble members, mean pAUC {:.5}",
        members.len(),
        report.mean_score()
    );
    Ok((Ensemble::new(members)?, report))
}
