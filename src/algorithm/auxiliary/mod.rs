//! Auxiliary image-model score merging
//!
//! Two kinds of external scores join the feature table by lesion id:
//! - legacy scores (`old_set_*`), merged as-is plus a patient mean-ratio
//!   variant `<column>_m` computed over the receiving table
//! - score families (`predictions_<family>`), taken from an out-of-fold record
//!   for training lesions and from rescaled submodel outputs for held-out
//!   lesions; the `_m` variant is computed within the score table
//!
//! Missing scores stay missing and are imputed later.

pub mod calibration;
pub mod image;

use log::info;

use crate::algorithm::feature_set::FeatureSet;
use crate::algorithm::features::patient_mean_ratio;
use crate::config::AuxiliaryFamilyConfig;
use crate::error::Result;
use crate::table::{LesionTable, ScoreTable, group_rows};
use crate::utils::stats::nan_mean;

pub use calibration::FoldStatistics;
pub use image::{ImageScorer, LesionImage, score_held_out};

/// Suffix of patient mean-ratio score columns
pub const MEAN_RATIO_SUFFIX: &str = "_m";

/// Name of the mean-ratio variant of a score column
#[must_use]
pub fn mean_ratio_name(column: &str) -> String {
    format!("{column}{MEAN_RATIO_SUFFIX}")
}

/// Merge legacy score columns and their patient mean ratios
///
/// # Arguments
/// * `table` - Feature table receiving the scores
/// * `features` - Current model input columns
/// * `scores` - Legacy score table keyed by lesion id
/// * `columns` - Score columns to merge
///
/// # Errors
/// Returns an error if a listed score column is missing
pub fn merge_legacy_scores(
    table: &mut LesionTable,
    features: FeatureSet,
    scores: &ScoreTable,
    columns: &[String],
) -> Result<FeatureSet> {
    scores.left_join_into(table, columns)?;
    let groups = table.patient_groups();
    let mut ratio_columns = Vec::with_capacity(columns.len());
    for column in columns {
        let ratio = patient_mean_ratio(table.numeric(column)?, &groups);
        let name = mean_ratio_name(column);
        table.set_numeric(name.clone(), ratio)?;
        ratio_columns.push(name);
    }
    info!(
        "Merged {} legacy score columns into table '{}'",
        columns.len(),
        table.name()
    );
    Ok(features.with_columns(columns.iter().cloned()).with_columns(ratio_columns))
}

fn with_mean_ratio(
    mut scores: ScoreTable,
    family: &AuxiliaryFamilyConfig,
    values: Vec<f64>,
) -> Result<ScoreTable> {
    let groups = group_rows(scores.patient_ids()?);
    let ratio = patient_mean_ratio(&values, &groups);
    scores.set_column(family.output_column(), values)?;
    scores.set_column(family.ratio_column(), ratio)?;
    Ok(scores)
}

/// Family scores of training lesions from the out-of-fold record
///
/// The family column takes the record's rank-transformed prediction.
///
/// # Errors
/// Returns an error if the record lacks patient ids or the rank column
pub fn training_family_scores(
    oof: &ScoreTable,
    family: &AuxiliaryFamilyConfig,
) -> Result<ScoreTable> {
    let values = oof.column(&family.rank_column)?.to_vec();
    let scores = ScoreTable::new(
        format!("{}_train", family.output_column()),
        oof.lesion_ids().to_vec(),
        Some(oof.patient_ids()?.to_vec()),
    )?;
    with_mean_ratio(scores, family, values)
}

/// Family scores of held-out lesions from submodel outputs
///
/// Each submodel column is rescaled with the reference-fold statistics of the
/// out-of-fold record, then the submodels are averaged.
///
/// # Errors
/// Returns an error if a submodel column, the patient ids or the reference
/// fold are missing
pub fn held_out_family_scores(
    held_out: &ScoreTable,
    oof: &ScoreTable,
    family: &AuxiliaryFamilyConfig,
) -> Result<ScoreTable> {
    let stats = FoldStatistics::from_out_of_fold(oof, family)?;
    let submodels = family
        .submodel_columns()
        .iter()
        .map(|c| held_out.column(c))
        .collect::<Result<Vec<&[f64]>>>()?;

    let values = (0..held_out.num_rows())
        .map(|row| {
            let rescaled: Vec<f64> = submodels.iter().map(|c| stats.rescale(c[row])).collect();
            nan_mean(&rescaled)
        })
        .collect();
    info!(
        "Rescaled {} submodels of '{}' with fold {} statistics (mean {:.4}, std {:.4})",
        submodels.len(),
        family.name,
        stats.fold,
        stats.mean,
        stats.std
    );

    let scores = ScoreTable::new(
        format!("{}_held_out", family.output_column()),
        held_out.lesion_ids().to_vec(),
        Some(held_out.patient_ids()?.to_vec()),
    )?;
    with_mean_ratio(scores, family, values)
}

/// Left-join a family's score and mean-ratio columns onto a table
///
/// # Errors
/// Returns an error if the family columns are missing from `scores`
pub fn merge_family_scores(
    table: &mut LesionTable,
    features: FeatureSet,
    scores: &ScoreTable,
    family: &AuxiliaryFamilyConfig,
) -> Result<FeatureSet> {
    let columns = [family.output_column(), family.ratio_column()];
    scores.left_join_into(table, &columns)?;
    Ok(features.with_columns(columns))
}
