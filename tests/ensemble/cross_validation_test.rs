//! Tests for repeated cross-validation and rank-fused scoring

use std::collections::HashSet;

use crate::common::{small_config, synthetic_table};
use lesion_scorer::algorithm::ensemble::{
    CrossValidator, ModelFamily, StratifiedGroupKFold, rank_fuse, train_ensemble,
};
use lesion_scorer::pipeline::{PipelineInputs, PreparedData, prepare};

fn prepared() -> PreparedData {
    let inputs = PipelineInputs::new(
        synthetic_table("train", 41, true),
        synthetic_table("test", 42, false),
    );
    prepare(&small_config(), &inputs).unwrap()
}

#[test]
fn test_validation_folds_keep_patients_together() {
    let data = prepared();
    let labels = data.train.target().unwrap();
    let splitter = StratifiedGroupKFold::new(3, true, 17).unwrap();
    let folds = splitter.split(labels, data.train.patient_ids()).unwrap();

    let mut seen = HashSet::new();
    for fold in &folds {
        let patients: HashSet<&str> = fold
            .validation
            .iter()
            .map(|&r| data.train.patient_ids()[r].as_str())
            .collect();
        assert!(patients.is_disjoint(&seen));
        seen.extend(patients);
        assert!(fold.validation.iter().any(|&r| labels[r] == 1));
        assert!(fold.validation.iter().any(|&r| labels[r] == 0));
    }
    assert_eq!(seen.len(), 10);
}

#[test]
fn test_cross_validation_reports_every_fold() {
    let config = small_config();
    let data = prepared();
    let validator = CrossValidator::new(&config.cross_validation, &config.sampling);
    let params = config.ensemble.family_params(ModelFamily::LightGbm);
    let run = validator.run(&params, &data.train, &data.features, false).unwrap();

    assert!(run.members.is_empty());
    assert_eq!(run.report.folds.len(), 3);
    for fold in &run.report.folds {
        assert!((0.02..=0.2).contains(&fold.score), "score {}", fold.score);
        assert_eq!(fold.origin.seed, ModelFamily::LightGbm.repetition_seed(1));
    }
}

#[test]
fn test_ensemble_scores_are_ranks() {
    let config = small_config();
    let data = prepared();
    let (ensemble, report) = train_ensemble(
        &config.ensemble,
        &config.cross_validation,
        &config.sampling,
        &data.train,
        &data.features,
    )
    .unwrap();
    assert_eq!(ensemble.members().len(), 9);
    assert_eq!(report.families.len(), 3);

    let scores = ensemble.score(&data.test).unwrap();
    assert_eq!(scores.len(), 100);
    assert!(scores.iter().all(|s| *s > 0.0 && *s <= 1.0));
}

#[test]
fn test_fusion_ignores_monotone_transforms() {
    let catboost = vec![0.1, 0.7, 0.3, 0.9];
    let lightgbm = vec![0.2, 0.1, 0.8, 0.5];
    let base = rank_fuse(&[
        (ModelFamily::CatBoost, catboost.clone()),
        (ModelFamily::LightGbm, lightgbm.clone()),
    ])
    .unwrap();
    let transformed = rank_fuse(&[
        (ModelFamily::CatBoost, catboost.iter().map(|v| v.exp() * 3.0).collect()),
        (ModelFamily::LightGbm, lightgbm.iter().map(|v| v.powi(3) - 1.0).collect()),
    ])
    .unwrap();
    assert_eq!(base, transformed);
}
