//! Missing-value handling around feature derivation
//!
//! Raw measurements can be median-filled on load. After derivation every
//! infinite value produced by a division is swept to missing, then model
//! inputs are imputed with the median (numeric) or the most frequent category
//! (categorical) of the table at hand.

use log::debug;
use rustc_hash::FxHashMap;

use crate::algorithm::feature_set::FeatureSet;
use crate::error::{PipelineError, Result};
use crate::table::{Column, LesionTable};
use crate::utils::stats::{nan_median, sweep_infinite};

/// Counts of values touched by an imputation pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImputationSummary {
    /// Infinite values replaced by missing
    pub swept_infinite: usize,
    /// Numeric values filled
    pub filled_numeric: usize,
    /// Categorical values filled
    pub filled_categorical: usize,
}

fn fill_numeric(values: &mut [f64], filler: f64) -> usize {
    let mut filled = 0;
    for v in values.iter_mut().filter(|v| v.is_nan()) {
        *v = filler;
        filled += 1;
    }
    filled
}

fn most_frequent(values: &[Option<String>]) -> Option<String> {
    let mut counts: FxHashMap<&str, usize> = FxHashMap::default();
    for v in values.iter().flatten() {
        *counts.entry(v.as_str()).or_default() += 1;
    }
    // ties resolve to the smallest category
    counts
        .into_iter()
        .max_by(|a, b| a.1.cmp(&b.1).then_with(|| b.0.cmp(a.0)))
        .map(|(v, _)| v.to_string())
}

/// Fill missing raw measurements with the column median
///
/// Columns that are entirely missing are left untouched.
///
/// # Errors
/// Returns an error if a listed column is missing or not numeric
pub fn impute_raw_measurements(table: &mut LesionTable, columns: &[String]) -> Result<usize> {
    let mut filled = 0;
    for column in columns {
        let values = table.numeric_mut(column)?;
        let median = nan_median(values);
        if !median.is_nan() {
            filled += fill_numeric(values, median);
        }
    }
    if filled > 0 {
        debug!("Filled {filled} raw measurements in table '{}'", table.name());
    }
    Ok(filled)
}

/// Sweep infinities and impute every model input column
///
/// Numeric columns are filled with their median, or 0 when entirely missing.
/// Categorical columns are filled with their most frequent category.
///
/// # Errors
/// Returns an error if a feature column is missing from the table
pub fn impute_features(table: &mut LesionTable, features: &FeatureSet) -> Result<ImputationSummary> {
    let mut summary = ImputationSummary::default();
    for name in features.columns() {
        if !table.has_column(name) {
            return Err(PipelineError::missing_column(name.clone(), table.name()));
        }
        if let Ok(values) = table.numeric_mut(name) {
            summary.swept_infinite += sweep_infinite(values);
            let median = nan_median(values);
            let filler = if median.is_nan() { 0.0 } else { median };
            summary.filled_numeric += fill_numeric(values, filler);
            continue;
        }
        let Some(Column::Categorical(values)) = table.column(name) else {
            continue;
        };
        let Some(filler) = most_frequent(values) else {
            continue;
        };
        let missing = values.iter().filter(|v| v.is_none()).count();
        if missing > 0 {
            let filled: Vec<Option<String>> = values
                .iter()
                .map(|v| v.clone().or_else(|| Some(filler.clone())))
                .collect();
            table.set_column(name.clone(), Column::Categorical(filled))?;
            summary.filled_categorical += missing;
        }
    }
    debug!(
        "Imputed table '{}': {} infinite swept, {} numeric and {} categorical filled",
        table.name(),
        summary.swept_infinite,
        summary.filled_numeric,
        summary.filled_categorical
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> LesionTable {
        let mut table = LesionTable::new(
            "t",
            (0..4).map(|i| format!("l{i}")).collect(),
            vec!["p".to_string(); 4],
            None,
        )
        .unwrap();
        table
            .set_numeric("x", vec![1.0, f64::INFINITY, 3.0, f64::NAN])
            .unwrap();
        table.set_numeric("empty", vec![f64::NAN; 4]).unwrap();
        table
            .set_column(
                "site",
                Column::Categorical(vec![
                    Some("head".into()),
                    None,
                    Some("torso".into()),
                    Some("torso".into()),
                ]),
            )
            .unwrap();
        table
    }

    #[test]
    fn test_features_are_swept_then_imputed() {
        let mut table = table();
        let features = FeatureSet::from_columns(["x", "empty", "site"]);
        let summary = impute_features(&mut table, &features).unwrap();
        assert_eq!(summary.swept_infinite, 1);
        assert_eq!(summary.filled_numeric, 2 + 4);
        assert_eq!(summary.filled_categorical, 1);
        assert_eq!(table.numeric("x").unwrap(), &[1.0, 2.0, 3.0, 2.0]);
        assert_eq!(table.numeric("empty").unwrap(), &[0.0; 4]);
        assert_eq!(table.categorical("site").unwrap()[1].as_deref(), Some("torso"));
    }

    #[test]
    fn test_raw_measurements_keep_infinities_and_empty_columns() {
        let mut table = table();
        let filled =
            impute_raw_measurements(&mut table, &["x".to_string(), "empty".to_string()]).unwrap();
        assert_eq!(filled, 1);
        let x = table.numeric("x").unwrap();
        assert!(x[1].is_infinite());
        assert_eq!(x[3], 3.0);
        assert!(table.numeric("empty").unwrap()[0].is_nan());
    }

    #[test]
    fn test_missing_feature_column_is_an_error() {
        let mut table = table();
        let features = FeatureSet::from_columns(["nope"]);
        assert!(impute_features(&mut table, &features).is_err());
    }
}
