//! Tests for auxiliary score merging through the prepared tables

use crate::common::{inputs_with_scores, small_config};
use lesion_scorer::pipeline::prepare;
use lesion_scorer::{PipelineError, ScoreTable};

#[test]
fn test_auxiliary_columns_become_features() {
    let prepared = prepare(&small_config(), &inputs_with_scores(31, 32)).unwrap();
    for column in [
        "old_set_0",
        "old_set_2_m",
        "predictions_eva",
        "predictions_eva_m",
        "predictions_edg",
        "predictions_edg_m",
    ] {
        assert!(prepared.features.contains(column), "{column} missing");
        assert!(prepared.test.numeric(column).unwrap().iter().all(|v| v.is_finite()));
    }
}

#[test]
fn test_training_family_scores_are_out_of_fold_ranks() {
    let inputs = inputs_with_scores(31, 32);
    let prepared = prepare(&small_config(), &inputs).unwrap();
    let family = &inputs.families[0];
    let ranks = family.oof.column(&family.config.rank_column).unwrap();
    assert_eq!(prepared.train.numeric("predictions_eva").unwrap(), ranks);
}

#[test]
fn test_unmatched_lesions_are_imputed() {
    let mut inputs = inputs_with_scores(31, 32);
    let train = &inputs.train;
    // legacy scores for only the first half of the training lesions
    let half: Vec<String> = train.lesion_ids()[..50].to_vec();
    let mut partial = ScoreTable::new("legacy", half, None).unwrap();
    for column in &small_config().auxiliary.legacy_columns {
        partial.set_column(column.clone(), vec![0.5; 50]).unwrap();
    }
    inputs.legacy_train = Some(partial);

    let prepared = prepare(&small_config(), &inputs).unwrap();
    let merged = prepared.train.numeric("old_set_0").unwrap();
    assert!(merged.iter().all(|&v| v == 0.5));
}

#[test]
fn test_one_sided_legacy_scores_are_rejected() {
    let mut inputs = inputs_with_scores(31, 32);
    inputs.legacy_test = None;
    let result = prepare(&small_config(), &inputs);
    assert!(matches!(result, Err(PipelineError::Config(_))));
}
