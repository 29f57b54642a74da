//! End-to-end pipeline tests

use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use crate::common::{CATEGORICAL, inputs_with_scores, small_config, synthetic_table};
use lesion_scorer::algorithm::ensemble::ModelFamily;
use lesion_scorer::pipeline::{self, PipelineInputs};
use lesion_scorer::schema::RAW_NUMERIC_COLUMNS;
use lesion_scorer::utils::io::read_csv;
use lesion_scorer::{Column, LesionTable};

fn write_table_csv(table: &LesionTable, path: &Path) {
    let mut text = String::from("isic_id,patient_id");
    if table.target().is_some() {
        text.push_str(",target");
    }
    for column in RAW_NUMERIC_COLUMNS.iter().chain(&CATEGORICAL) {
        write!(text, ",{column}").unwrap();
    }
    text.push('\n');

    for row in 0..table.num_rows() {
        write!(text, "{},{}", table.lesion_ids()[row], table.patient_ids()[row]).unwrap();
        if let Some(target) = table.target() {
            write!(text, ",{}", target[row]).unwrap();
        }
        for column in RAW_NUMERIC_COLUMNS.iter().chain(&CATEGORICAL) {
            match table.column(column).unwrap() {
                Column::Numeric(values) if values[row].is_nan() => text.push(','),
                Column::Numeric(values) => write!(text, ",{}", values[row]).unwrap(),
                Column::Categorical(values) => {
                    write!(text, ",{}", values[row].as_deref().unwrap_or("")).unwrap();
                }
                Column::Indicator(values) => write!(text, ",{}", values[row]).unwrap(),
            }
        }
        text.push('\n');
    }
    fs::write(path, text).unwrap();
}

#[test]
fn test_in_memory_run_scores_every_lesion() {
    let inputs = PipelineInputs::new(
        synthetic_table("train", 51, true),
        synthetic_table("test", 52, false),
    );
    let scored = pipeline::score(&small_config(), &inputs).unwrap();

    assert_eq!(scored.submission.len(), 100);
    assert!(scored.submission.scores().iter().all(|s| (0.0..=1.0).contains(s)));
    assert_eq!(scored.submission.lesion_ids(), inputs.test.lesion_ids());
    assert_eq!(scored.report.ensemble_members, 9);
    assert!(scored.report.features.iter().any(|f| f == "of"));
    assert!(!scored.report.features.iter().any(|f| f == "tbp_lv_y"));
}

#[test]
fn test_five_fold_run_with_auxiliary_scores() {
    let mut config = small_config();
    config.cross_validation.n_splits = 5;
    let inputs = inputs_with_scores(53, 54);
    let scored = pipeline::score(&config, &inputs).unwrap();

    for column in [
        "old_set_0",
        "old_set_1",
        "old_set_2",
        "old_set_0_m",
        "old_set_1_m",
        "old_set_2_m",
        "predictions_eva",
        "predictions_eva_m",
        "predictions_edg",
        "predictions_edg_m",
    ] {
        assert!(scored.report.features.iter().any(|f| f == column), "{column} missing");
    }
    assert_eq!(scored.report.ensemble_members, 15);
    assert_eq!(scored.submission.len(), 100);
    assert_eq!(scored.submission.lesion_ids(), inputs.test.lesion_ids());
    assert!(
        scored
            .submission
            .scores()
            .iter()
            .all(|s| s.is_finite() && (0.0..=1.0).contains(s))
    );
}

#[test]
fn test_file_run_writes_submission_and_report() {
    let dir = tempfile::tempdir().unwrap();
    let train = synthetic_table("train", 61, true);
    let test = synthetic_table("test", 62, false);
    let train_path = dir.path().join("train-metadata.csv");
    let test_path = dir.path().join("test-metadata.csv");
    write_table_csv(&train, &train_path);
    write_table_csv(&test, &test_path);

    // template lists the held-out lesions in reverse
    let template_path = dir.path().join("sample_submission.csv");
    let mut template = String::from("isic_id,target\n");
    for id in test.lesion_ids().iter().rev() {
        writeln!(template, "{id},0.3").unwrap();
    }
    fs::write(&template_path, template).unwrap();

    let mut config = small_config();
    config.paths.train = train_path;
    config.paths.test = test_path;
    config.paths.submission_template = Some(template_path);
    config.paths.output_dir = dir.path().join("out");
    config.ensemble.families = vec![ModelFamily::CatBoost, ModelFamily::XgBoost];

    let report = pipeline::run(&config).unwrap();
    assert_eq!(report.test_rows, 100);
    assert_eq!(report.cross_validation.families.len(), 2);

    let batches = read_csv(&config.paths.submission_path()).unwrap();
    let rows: usize = batches.iter().map(|b| b.num_rows()).sum();
    assert_eq!(rows, 100);
    let schema = batches[0].schema();
    assert_eq!(schema.field(0).name(), "isic_id");
    assert_eq!(schema.field(1).name(), "target");
    let first_id = batches[0]
        .column(0)
        .as_any()
        .downcast_ref::<arrow::array::StringArray>()
        .unwrap()
        .value(0)
        .to_string();
    assert_eq!(&first_id, test.lesion_ids().last().unwrap());

    let report_json: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(config.paths.report_path()).unwrap()).unwrap();
    assert_eq!(report_json["train_rows"], 100);
    assert!(report_json["cross_validation"]["families"].is_array());
}

#[test]
fn test_missing_raw_column_is_fatal() {
    let mut config = small_config();
    config.schema.numeric_columns.push("tbp_lv_missing".to_string());
    let inputs = PipelineInputs::new(
        synthetic_table("train", 71, true),
        synthetic_table("test", 72, false),
    );
    let result = pipeline::prepare(&config, &inputs);
    assert!(matches!(
        result,
        Err(lesion_scorer::PipelineError::MissingColumn { ref column, .. }) if column == "tbp_lv_missing"
    ));
}

#[test]
fn test_search_evaluates_every_trial() {
    let config = small_config();
    let inputs = PipelineInputs::new(
        synthetic_table("train", 81, true),
        synthetic_table("test", 82, false),
    );
    let prepared = pipeline::prepare(&config, &inputs).unwrap();
    let mut config = config;
    config.search.family = ModelFamily::LightGbm;
    let report = pipeline::search_prepared(&config, &prepared).unwrap();

    assert_eq!(report.trials.len(), 3);
    assert_eq!(report.family, ModelFamily::LightGbm);
    let best = report.trials.iter().map(|t| t.score).fold(f64::MIN, f64::max);
    assert_eq!(report.best_score, best);
    assert!(report.best_params["num_leaves"].is_number());
}
