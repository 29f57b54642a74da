//! Patient-relative normalization and cohort aggregates
//!
//! Two normalization rules exist and are applied to different feature
//! families:
//! - z-score: `(value - patient_mean) / (patient_std + 1e-5)` with the sample
//!   standard deviation, written to `<feature>_patient_norm`
//! - mean ratio: `value / patient_mean`, used for auxiliary model scores
//!
//! Statistics are always computed over the table at hand, so train and test
//! each normalize against their own cohort.

use log::debug;
use rayon::prelude::*;

use crate::algorithm::feature_set::FeatureSet;
use crate::error::Result;
use crate::schema::ANATOMICAL_SITE_COLUMN;
use crate::table::{LesionTable, group_rows};
use crate::utils::stats::{nan_mean, nan_std, nan_sum};

/// Guard added to the patient standard deviation
pub const PATIENT_STD_EPSILON: f64 = 1e-5;

/// Suffix of z-score normalized columns
pub const PATIENT_NORM_SUFFIX: &str = "_patient_norm";

/// Lesion count per patient
pub const COUNT_PER_PATIENT: &str = "count_per_patient";

/// Total lesion area per patient
pub const AREA_PER_PATIENT: &str = "tbp_lv_areaMM2_patient";

/// Total lesion area per patient and anatomical site
pub const AREA_PER_BODY_PART: &str = "tbp_lv_areaMM2_bp";

const AREA_COLUMN: &str = "tbp_lv_areaMM2";

/// Name of the z-score normalized variant of a column
#[must_use]
pub fn patient_norm_name(column: &str) -> String {
    format!("{column}{PATIENT_NORM_SUFFIX}")
}

fn scatter(groups: &[Vec<usize>], n: usize, per_group: impl Fn(&[usize]) -> Vec<f64>) -> Vec<f64> {
    let mut out = vec![f64::NAN; n];
    for rows in groups {
        for (&row, value) in rows.iter().zip(per_group(rows)) {
            out[row] = value;
        }
    }
    out
}

/// Patient z-score of every value
///
/// A patient with a single present value has standard deviation 0, so the
/// lesion maps to 0.
#[must_use]
pub fn patient_zscore(values: &[f64], groups: &[Vec<usize>]) -> Vec<f64> {
    scatter(groups, values.len(), |rows| {
        let group: Vec<f64> = rows.iter().map(|&r| values[r]).collect();
        let mean = nan_mean(&group);
        let present = group.iter().filter(|v| !v.is_nan()).count();
        let std = if present <= 1 { 0.0 } else { nan_std(&group, 1) };
        group
            .iter()
            .map(|v| (v - mean) / (std + PATIENT_STD_EPSILON))
            .collect()
    })
}

/// Every value divided by its patient mean
#[must_use]
pub fn patient_mean_ratio(values: &[f64], groups: &[Vec<usize>]) -> Vec<f64> {
    scatter(groups, values.len(), |rows| {
        let group: Vec<f64> = rows.iter().map(|&r| values[r]).collect();
        let mean = nan_mean(&group);
        group.iter().map(|v| v / mean).collect()
    })
}

/// Add `<column>_patient_norm` for every listed column
///
/// # Arguments
/// * `table` - Table receiving the normalized columns
/// * `features` - Current model input columns
/// * `columns` - Columns to normalize
///
/// # Errors
/// Returns an error if a listed column is missing or not numeric
pub fn normalize_patients(
    table: &mut LesionTable,
    features: FeatureSet,
    columns: &[String],
) -> Result<FeatureSet> {
    let groups = table.patient_groups();
    let normalized = columns
        .par_iter()
        .map(|column| {
            table
                .numeric(column)
                .map(|values| (patient_norm_name(column), patient_zscore(values, &groups)))
        })
        .collect::<Result<Vec<_>>>()?;

    let names: Vec<String> = normalized.iter().map(|(n, _)| n.clone()).collect();
    for (name, values) in normalized {
        table.set_numeric(name, values)?;
    }
    debug!(
        "Normalized {} columns over {} patients in table '{}'",
        columns.len(),
        groups.len(),
        table.name()
    );
    Ok(features.with_columns(names))
}

/// Add the lesion count and lesion area totals of each patient
///
/// # Errors
/// Returns an error if the area or anatomical site column is missing
pub fn add_cohort_aggregates(table: &mut LesionTable, features: FeatureSet) -> Result<FeatureSet> {
    let groups = table.patient_groups();
    let n = table.num_rows();

    let counts = scatter(&groups, n, |rows| vec![rows.len() as f64; rows.len()]);

    let area = table.numeric(AREA_COLUMN)?;
    let sum_of = |rows: &[usize]| {
        let values: Vec<f64> = rows.iter().map(|&r| area[r]).collect();
        vec![nan_sum(&values); rows.len()]
    };
    let area_patient = scatter(&groups, n, sum_of);

    let sites = table.categorical(ANATOMICAL_SITE_COLUMN)?;
    let keys: Vec<String> = table
        .patient_ids()
        .iter()
        .zip(sites)
        .map(|(patient, site)| format!("{patient}\u{1f}{}", site.as_deref().unwrap_or_default()))
        .collect();
    let body_part_groups = group_rows(&keys);
    let area_body_part = scatter(&body_part_groups, n, sum_of);

    table.set_numeric(COUNT_PER_PATIENT, counts)?;
    table.set_numeric(AREA_PER_PATIENT, area_patient)?;
    table.set_numeric(AREA_PER_BODY_PART, area_body_part)?;
    Ok(features.with_columns([COUNT_PER_PATIENT, AREA_PER_PATIENT, AREA_PER_BODY_PART]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::Column;

    fn groups() -> Vec<Vec<usize>> {
        vec![vec![0, 2, 3], vec![1], vec![4, 5]]
    }

    #[test]
    fn test_zscore_uses_sample_std() {
        let values = [1.0, 7.0, 2.0, 3.0, 5.0, 5.0];
        let z = patient_zscore(&values, &groups());
        assert!((z[0] + 1.0 / (1.0 + PATIENT_STD_EPSILON)).abs() < 1e-12);
        assert_eq!(z[2], 0.0);
        // singleton and constant groups map to zero
        assert_eq!(z[1], 0.0);
        assert_eq!(z[4], 0.0);
        assert_eq!(z[5], 0.0);
    }

    #[test]
    fn test_mean_ratio_of_singletons_is_one() {
        let values = [1.0, 7.0, 2.0, 3.0, 4.0, 6.0];
        let r = patient_mean_ratio(&values, &groups());
        assert_eq!(r[1], 1.0);
        assert_eq!(r[0], 0.5);
        assert_eq!(r[4], 0.8);
    }

    #[test]
    fn test_missing_values_stay_missing() {
        let values = [f64::NAN, 1.0, 2.0, 4.0, f64::NAN, 3.0];
        let z = patient_zscore(&values, &groups());
        assert!(z[0].is_nan());
        assert!(z[4].is_nan());
        assert_eq!(z[5], 0.0);
    }

    #[test]
    fn test_cohort_aggregates() {
        let mut table = LesionTable::new(
            "t",
            (0..4).map(|i| format!("l{i}")).collect(),
            vec!["a".into(), "a".into(), "b".into(), "a".into()],
            None,
        )
        .unwrap();
        table.set_numeric(AREA_COLUMN, vec![1.0, 2.0, 4.0, 8.0]).unwrap();
        table
            .set_column(
                ANATOMICAL_SITE_COLUMN,
                Column::Categorical(vec![
                    Some("head".into()),
                    Some("torso".into()),
                    Some("head".into()),
                    Some("head".into()),
                ]),
            )
            .unwrap();
        let features = add_cohort_aggregates(&mut table, FeatureSet::new()).unwrap();
        assert_eq!(features.len(), 3);
        assert_eq!(table.numeric(COUNT_PER_PATIENT).unwrap(), &[3.0, 3.0, 1.0, 3.0]);
        assert_eq!(table.numeric(AREA_PER_PATIENT).unwrap(), &[11.0, 11.0, 4.0, 11.0]);
        assert_eq!(table.numeric(AREA_PER_BODY_PART).unwrap(), &[9.0, 2.0, 4.0, 9.0]);
    }
}
