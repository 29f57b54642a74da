//! Tests for per-patient outlier scoring

use crate::common::synthetic_table;
use lesion_scorer::algorithm::features::derive_features;
use lesion_scorer::algorithm::outlier::{outlier_scores, score_outliers};
use lesion_scorer::config::OutlierConfig;
use lesion_scorer::{FeatureSet, LesionTable};

fn two_patient_table(b_spread: f64) -> LesionTable {
    let ids = (0..10).map(|i| format!("l{i}")).collect();
    let patients = (0..10).map(|i| if i < 5 { "A" } else { "B" }.to_string()).collect();
    let mut table = LesionTable::new("t", ids, patients, None).unwrap();
    let b1: Vec<f64> = [0.0, 1.0, 2.0, 3.0, 4.0].iter().map(|v| v * b_spread).collect();
    let f1 = [0.0, 1.0, 2.0, 3.0, 10.0].into_iter().chain(b1).collect();
    let f2 = vec![0.0, 3.0, 1.0, 2.0, 1.0, 5.0, 6.0, 7.0, 8.0, 9.0];
    table.set_numeric("f1", f1).unwrap();
    table.set_numeric("f2", f2).unwrap();
    table
}

fn config() -> OutlierConfig {
    OutlierConfig {
        features: vec!["f1".to_string(), "f2".to_string()],
        ..OutlierConfig::default()
    }
}

#[test]
fn test_small_patients_get_sentinel() {
    let mut table = synthetic_table("train", 21, true);
    let features = derive_features(&mut table, FeatureSet::new()).unwrap();
    let config = OutlierConfig::default();
    let features = score_outliers(&mut table, features, &config).unwrap();
    assert!(features.contains("of"));

    let scores = table.numeric("of").unwrap();
    // the first patient holds a single lesion
    assert_eq!(scores[0], -1.0);
    assert!(scores.iter().all(|s| s.is_finite() && *s < 0.0));
    assert!(scores[1..].iter().any(|&s| s != -1.0));
}

#[test]
fn test_group_size_cutoff_keeps_row_order() {
    // patient A holds two lesions, patient B three, interleaved
    let patients = ["B", "A", "B", "A", "B"];
    let ids = (0..5).map(|i| format!("l{i}")).collect();
    let mut table = LesionTable::new(
        "t",
        ids,
        patients.iter().map(ToString::to_string).collect(),
        None,
    )
    .unwrap();
    table.set_numeric("f1", vec![0.0, 7.0, 1.0, -4.0, 3.0]).unwrap();
    let config = OutlierConfig {
        features: vec!["f1".to_string()],
        ..OutlierConfig::default()
    };

    let scores = outlier_scores(&table, &config).unwrap();
    let expected = [-11.0 / 12.0, -1.0, -1.2, -1.0, -11.0 / 12.0];
    assert_eq!(scores[1], -1.0);
    assert_eq!(scores[3], -1.0);
    for (score, want) in scores.iter().zip(expected) {
        assert!((score - want).abs() < 1e-6, "{scores:?}");
    }
}

/// Standardization runs over the whole table, so one patient's scores move
/// when another patient's lesions change.
#[test]
fn test_scores_depend_on_other_patients() {
    let narrow = outlier_scores(&two_patient_table(1.0), &config()).unwrap();
    let wide = outlier_scores(&two_patient_table(100.0), &config()).unwrap();
    let shift = narrow[..5]
        .iter()
        .zip(&wide[..5])
        .map(|(a, b)| (a - b).abs())
        .fold(0.0, f64::max);
    assert!(shift > 0.01, "patient A scores moved by only {shift}");
}
