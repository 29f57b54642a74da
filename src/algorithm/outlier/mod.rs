//! Per-patient outlier scoring
//!
//! The configured feature subset is standardized once over the whole table.
//! Every patient with enough lesions then gets a local-outlier-factor score
//! computed within the patient's own lesions; the remaining lesions receive
//! the sentinel value.

pub mod lof;
pub mod scaler;

use log::info;
use rayon::prelude::*;

use crate::algorithm::feature_set::FeatureSet;
use crate::config::OutlierConfig;
use crate::error::Result;
use crate::table::LesionTable;
use crate::utils::logging::{create_main_progress_bar, finish_progress_bar};

pub use lof::{effective_neighbors, negative_outlier_factor};
pub use scaler::StandardScaler;

/// Outlier score of every lesion, sentinel for lesions of small patients
///
/// # Errors
/// Returns an error if an outlier feature is missing from the table
pub fn outlier_scores(table: &LesionTable, config: &OutlierConfig) -> Result<Vec<f64>> {
    let columns = config
        .features
        .iter()
        .map(|name| table.numeric(name))
        .collect::<Result<Vec<&[f64]>>>()?;
    let scaler = StandardScaler::fit(&columns);

    let groups = table.patient_groups();
    let pb = create_main_progress_bar(
        groups.len() as u64,
        Some(&format!("Outlier scoring '{}'", table.name())),
    );
    let scored: Vec<(&Vec<usize>, Vec<f64>)> = groups
        .par_iter()
        .filter_map(|rows| {
            pb.inc(1);
            if rows.len() < config.min_group_size {
                return None;
            }
            let points: Vec<Vec<f64>> = rows
                .iter()
                .map(|&r| scaler.transform_row(&columns, r))
                .collect();
            let k = config.max_neighbors.min(rows.len());
            Some((rows, negative_outlier_factor(&points, k)))
        })
        .collect();
    finish_progress_bar(&pb, None);

    let mut scores = vec![config.sentinel; table.num_rows()];
    let mut scored_patients = 0;
    for (rows, values) in scored {
        scored_patients += 1;
        for (&row, value) in rows.iter().zip(values) {
            scores[row] = value;
        }
    }
    info!(
        "Scored outliers for {scored_patients} of {} patients in table '{}'",
        groups.len(),
        table.name()
    );
    Ok(scores)
}

/// Add the outlier score column to a table
///
/// # Errors
/// Returns an error if an outlier feature is missing from the table
pub fn score_outliers(
    table: &mut LesionTable,
    features: FeatureSet,
    config: &OutlierConfig,
) -> Result<FeatureSet> {
    let scores = outlier_scores(table, config)?;
    table.set_numeric(config.column.clone(), scores)?;
    Ok(features.with_columns([config.column.clone()]))
}
