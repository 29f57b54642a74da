//! End-to-end pipeline orchestration
//!
//! Both tables go through the same stages in a fixed order:
//! 1. required-column check and optional raw median fill
//! 2. derived features, patient normalization and cohort aggregates
//! 3. one-hot encoding with the vocabulary fitted on the training table
//! 4. per-patient outlier scores
//! 5. legacy and family auxiliary scores
//! 6. column drop list and per-table imputation
//!
//! The prepared training table then feeds the committee, whose fused scores
//! for the held-out table become the submission.

use std::fs::{self, File};
use std::io::BufWriter;
use std::path::Path;
use std::sync::Arc;

use arrow::datatypes::{Field, FieldRef, Schema};
use arrow::record_batch::RecordBatch;
use chrono::{DateTime, Utc};
use log::info;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_arrow::schema::{SchemaLike, TracingOptions};

use crate::algorithm::FeatureSet;
use crate::algorithm::auxiliary::{
    held_out_family_scores, merge_family_scores, merge_legacy_scores, training_family_scores,
};
use crate::algorithm::ensemble::{
    CrossValidationReport, CrossValidator, Ensemble, FamilyParams, ModelFamily, SearchReport,
    run_search, train_ensemble,
};
use crate::algorithm::features::{
    CategoricalVocabulary, DERIVED_FEATURE_NAMES, add_cohort_aggregates, derive_features,
    impute_features, impute_raw_measurements, normalize_patients,
};
use crate::algorithm::outlier::score_outliers;
use crate::config::{AuxiliaryFamilyConfig, PipelineConfig};
use crate::error::{PipelineError, Result};
use crate::schema::TableSchema;
use crate::table::{LesionTable, ScoreTable, string_column};
use crate::utils::io::{load_tables_parallel, read_table, write_csv};
use crate::utils::logging::{create_spinner, finish_progress_bar, log_stage, log_warning};

/// Auxiliary score tables of one family
#[derive(Debug, Clone)]
pub struct FamilyScores {
    pub config: AuxiliaryFamilyConfig,
    /// Out-of-fold record of the training lesions
    pub oof: ScoreTable,
    /// Submodel outputs for the held-out lesions
    pub held_out: ScoreTable,
}

/// Everything the pipeline reads, already in memory
#[derive(Debug, Clone)]
pub struct PipelineInputs {
    pub train: LesionTable,
    pub test: LesionTable,
    pub legacy_train: Option<ScoreTable>,
    pub legacy_test: Option<ScoreTable>,
    pub families: Vec<FamilyScores>,
    /// Lesion ids fixing the submission row order, `None` keeps test order
    pub submission_order: Option<Vec<String>>,
}

impl PipelineInputs {
    /// Inputs without auxiliary scores or submission template
    #[must_use]
    pub const fn new(train: LesionTable, test: LesionTable) -> Self {
        Self {
            train,
            test,
            legacy_train: None,
            legacy_test: None,
            families: Vec::new(),
            submission_order: None,
        }
    }
}

/// Feature tables ready for training and scoring
#[derive(Debug, Clone)]
pub struct PreparedData {
    pub train: LesionTable,
    pub test: LesionTable,
    /// Model input columns, identical for both tables
    pub features: FeatureSet,
    /// Category vocabulary fitted on the training table
    pub vocabulary: CategoricalVocabulary,
}

fn validate_table(schema: &TableSchema, table: &LesionTable) -> Result<()> {
    let identity = [schema.id_column.as_str(), schema.patient_column.as_str()];
    schema.validate(identity.into_iter().chain(table.column_names()), table.name())
}

fn patient_norm_columns(config: &PipelineConfig) -> Vec<String> {
    config.patient_norm_columns.clone().unwrap_or_else(|| {
        config
            .schema
            .numeric_columns
            .iter()
            .cloned()
            .chain(DERIVED_FEATURE_NAMES.iter().map(ToString::to_string))
            .collect()
    })
}

/// Stages that only look at the table itself
fn engineer_table(config: &PipelineConfig, table: &mut LesionTable) -> Result<FeatureSet> {
    validate_table(&config.schema, table)?;
    if config.impute_raw_on_load {
        let filled = impute_raw_measurements(table, &config.schema.numeric_columns)?;
        log_stage("impute", table.name(), &format!("{filled} raw values filled"));
    }

    let features = FeatureSet::from_columns(config.schema.numeric_columns.iter().cloned());
    let features = derive_features(table, features)?;
    let features = normalize_patients(table, features, &patient_norm_columns(config))?;
    let features = add_cohort_aggregates(table, features)?;
    log_stage("derive", table.name(), &format!("{} feature columns", features.len()));
    Ok(features)
}

fn merge_auxiliary(
    config: &PipelineConfig,
    inputs: &PipelineInputs,
    train: &mut LesionTable,
    test: &mut LesionTable,
    features: FeatureSet,
) -> Result<FeatureSet> {
    let mut features = match (&inputs.legacy_train, &inputs.legacy_test) {
        (Some(legacy_train), Some(legacy_test)) => {
            let columns = &config.auxiliary.legacy_columns;
            merge_legacy_scores(test, FeatureSet::new(), legacy_test, columns)?;
            merge_legacy_scores(train, features, legacy_train, columns)?
        }
        (None, None) => features,
        _ => {
            return Err(PipelineError::config(
                "legacy scores must be given for both tables or neither",
            ));
        }
    };

    for family in &inputs.families {
        let train_scores = training_family_scores(&family.oof, &family.config)?;
        let test_scores = held_out_family_scores(&family.held_out, &family.oof, &family.config)?;
        merge_family_scores(test, FeatureSet::new(), &test_scores, &family.config)?;
        features = merge_family_scores(train, features, &train_scores, &family.config)?;
        log_stage(
            "auxiliary",
            &family.config.name,
            &format!(
                "{} training and {} held-out scores",
                train_scores.num_rows(),
                test_scores.num_rows()
            ),
        );
    }
    Ok(features)
}

/// Run every feature stage on both tables
///
/// # Errors
/// Returns an error if a required column is missing, the two tables end up
/// with different feature columns, or an auxiliary table is inconsistent
pub fn prepare(config: &PipelineConfig, inputs: &PipelineInputs) -> Result<PreparedData> {
    let mut train = inputs.train.clone();
    let mut test = inputs.test.clone();
    if train.target().is_none() {
        return Err(PipelineError::Data(format!(
            "training table '{}' has no target column",
            train.name()
        )));
    }

    let features = engineer_table(config, &mut train)?;
    let test_features = engineer_table(config, &mut test)?;
    if features != test_features {
        return Err(PipelineError::Data(
            "training and held-out tables derived different features".to_string(),
        ));
    }

    let vocabulary = CategoricalVocabulary::fit(&train, &config.schema.categorical_columns)?;
    vocabulary.apply(&mut test, features.clone())?;
    let features = vocabulary.apply(&mut train, features)?;
    log_stage(
        "encode",
        train.name(),
        &format!("{} category indicators", vocabulary.num_indicators()),
    );

    score_outliers(&mut test, FeatureSet::new(), &config.outlier)?;
    let features = score_outliers(&mut train, features, &config.outlier)?;

    let features = merge_auxiliary(config, inputs, &mut train, &mut test, features)?;
    let features = features.without(&config.drop_columns);

    for table in [&mut train, &mut test] {
        let summary = impute_features(table, &features)?;
        log_stage(
            "impute",
            table.name(),
            &format!(
                "{} infinite swept, {} numeric and {} categorical filled",
                summary.swept_infinite, summary.filled_numeric, summary.filled_categorical
            ),
        );
    }
    info!(
        "Prepared {} training and {} held-out lesions with {} features ({} categorical)",
        train.num_rows(),
        test.num_rows(),
        features.len(),
        features.num_categorical()
    );
    Ok(PreparedData {
        train,
        test,
        features,
        vocabulary,
    })
}

#[derive(Debug, Serialize, Deserialize)]
struct SubmissionRow {
    id: String,
    target: f64,
}

/// Fused held-out scores in submission order
#[derive(Debug, Clone, PartialEq)]
pub struct Submission {
    lesion_ids: Vec<String>,
    scores: Vec<f64>,
}

impl Submission {
    /// Pair scores with lesion ids, reordered to `order` when given
    ///
    /// # Errors
    /// Returns an error if the lengths differ or `order` names an unscored
    /// lesion
    pub fn new(
        lesion_ids: &[String],
        scores: Vec<f64>,
        order: Option<&[String]>,
    ) -> Result<Self> {
        if lesion_ids.len() != scores.len() {
            return Err(PipelineError::Data(format!(
                "{} scores for {} lesions",
                scores.len(),
                lesion_ids.len()
            )));
        }
        let Some(order) = order else {
            return Ok(Self {
                lesion_ids: lesion_ids.to_vec(),
                scores,
            });
        };

        let lookup: FxHashMap<&str, f64> = lesion_ids
            .iter()
            .map(String::as_str)
            .zip(scores.iter().copied())
            .collect();
        let scores = order
            .iter()
            .map(|id| {
                lookup.get(id.as_str()).copied().ok_or_else(|| {
                    PipelineError::Data(format!("submission template lists unscored lesion '{id}'"))
                })
            })
            .collect::<Result<Vec<f64>>>()?;
        Ok(Self {
            lesion_ids: order.to_vec(),
            scores,
        })
    }

    #[must_use]
    pub fn lesion_ids(&self) -> &[String] {
        &self.lesion_ids
    }

    #[must_use]
    pub fn scores(&self) -> &[f64] {
        &self.scores
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.scores.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    /// Convert to a two-column record batch
    ///
    /// # Arguments
    /// * `id_column` - Name of the lesion id column
    /// * `target_column` - Name of the score column
    ///
    /// # Errors
    /// Returns an error if serialization fails
    pub fn to_record_batch(&self, id_column: &str, target_column: &str) -> Result<RecordBatch> {
        let rows: Vec<SubmissionRow> = self
            .lesion_ids
            .iter()
            .zip(&self.scores)
            .map(|(id, &target)| SubmissionRow {
                id: id.clone(),
                target,
            })
            .collect();
        let fields = Vec::<FieldRef>::from_type::<SubmissionRow>(TracingOptions::default())?;
        let batch = serde_arrow::to_record_batch(&fields, &rows)?;

        let renamed: Vec<Field> = batch
            .schema()
            .fields()
            .iter()
            .zip([id_column, target_column])
            .map(|(field, name)| field.as_ref().clone().with_name(name))
            .collect();
        Ok(RecordBatch::try_new(
            Arc::new(Schema::new(renamed)),
            batch.columns().to_vec(),
        )?)
    }

    /// Write the submission as CSV
    ///
    /// # Errors
    /// Returns an error if serialization or writing fails
    pub fn write_csv(&self, path: &Path, schema: &TableSchema) -> Result<()> {
        let batch = self.to_record_batch(&schema.id_column, &schema.target_column)?;
        write_csv(path, &batch)
    }
}

/// Summary of a training run, written next to the submission
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub created_at: DateTime<Utc>,
    pub train_rows: usize,
    pub test_rows: usize,
    pub features: Vec<String>,
    pub categorical_features: usize,
    pub ensemble_members: usize,
    pub cross_validation: CrossValidationReport,
    pub config: PipelineConfig,
}

/// Outcome of [`score`]
#[derive(Debug)]
pub struct ScoredRun {
    pub ensemble: Ensemble,
    pub submission: Submission,
    pub report: RunReport,
}

/// Prepare the tables, train the committee and score the held-out lesions
///
/// # Errors
/// Returns an error if any stage fails
pub fn score(config: &PipelineConfig, inputs: &PipelineInputs) -> Result<ScoredRun> {
    config.validate()?;
    let prepared = prepare(config, inputs)?;
    let (ensemble, cross_validation) = train_ensemble(
        &config.ensemble,
        &config.cross_validation,
        &config.sampling,
        &prepared.train,
        &prepared.features,
    )?;

    let scores = ensemble.score(&prepared.test)?;
    let submission = Submission::new(
        prepared.test.lesion_ids(),
        scores,
        inputs.submission_order.as_deref(),
    )?;
    let report = RunReport {
        created_at: Utc::now(),
        train_rows: prepared.train.num_rows(),
        test_rows: prepared.test.num_rows(),
        features: prepared.features.columns().to_vec(),
        categorical_features: prepared.features.num_categorical(),
        ensemble_members: ensemble.members().len(),
        cross_validation,
        config: config.clone(),
    };
    Ok(ScoredRun {
        ensemble,
        submission,
        report,
    })
}

fn load_score_table(path: &Path, schema: &TableSchema) -> Result<ScoreTable> {
    let name = path.file_stem().and_then(|s| s.to_str()).unwrap_or("scores");
    ScoreTable::from_record_batches(name, &read_table(path)?, &schema.id_column, &schema.patient_column)
}

fn load_lesion_table(name: &str, batches: &[RecordBatch], schema: &TableSchema) -> Result<LesionTable> {
    if let Some(first) = batches.first() {
        let arrow_schema = first.schema();
        schema.validate(arrow_schema.fields().iter().map(|f| f.name().as_str()), name)?;
    }
    LesionTable::from_record_batches(name, batches, schema)
}

/// Read every configured input table
///
/// Auxiliary families without both of their tables are skipped with a warning.
///
/// # Errors
/// Returns an error if a table cannot be read or lacks a required column
pub fn load_inputs(config: &PipelineConfig) -> Result<PipelineInputs> {
    let paths = &config.paths;
    let mut tables = load_tables_parallel(&[paths.train.as_path(), paths.test.as_path()])?;
    let test_batches = tables.pop().unwrap_or_default();
    let train_batches = tables.pop().unwrap_or_default();
    let train = load_lesion_table("train", &train_batches, &config.schema)?;
    let test = load_lesion_table("test", &test_batches, &config.schema)?;

    let aux = &config.auxiliary;
    let legacy_train = aux
        .legacy_train
        .as_deref()
        .map(|p| load_score_table(p, &config.schema))
        .transpose()?;
    let legacy_test = aux
        .legacy_test
        .as_deref()
        .map(|p| load_score_table(p, &config.schema))
        .transpose()?;

    let mut families = Vec::new();
    for family in &aux.families {
        match (&family.oof_path, &family.held_out_path) {
            (Some(oof), Some(held_out)) => families.push(FamilyScores {
                config: family.clone(),
                oof: load_score_table(oof, &config.schema)?,
                held_out: load_score_table(held_out, &config.schema)?,
            }),
            (None, None) => {}
            _ => log_warning(
                &format!("auxiliary family '{}' needs both score tables, skipping", family.name),
                None,
            ),
        }
    }

    let submission_order = paths
        .submission_template
        .as_deref()
        .map(|path| read_submission_order(path, &config.schema))
        .transpose()?;

    Ok(PipelineInputs {
        train,
        test,
        legacy_train,
        legacy_test,
        families,
        submission_order,
    })
}

fn read_submission_order(path: &Path, schema: &TableSchema) -> Result<Vec<String>> {
    let mut order = Vec::new();
    for batch in read_table(path)? {
        order.extend(
            string_column(&batch, &schema.id_column, "submission template")?
                .into_iter()
                .map(Option::unwrap_or_default),
        );
    }
    Ok(order)
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(writer, value)?;
    Ok(())
}

/// Load the inputs, score them and write the submission and run report
///
/// # Errors
/// Returns an error if loading, any stage or writing fails
pub fn run(config: &PipelineConfig) -> Result<RunReport> {
    let inputs = load_inputs(config)?;
    let scored = score(config, &inputs)?;

    fs::create_dir_all(&config.paths.output_dir)?;
    scored
        .submission
        .write_csv(&config.paths.submission_path(), &config.schema)?;
    write_json(&config.paths.report_path(), &scored.report)?;
    info!(
        "Wrote {} submission rows and the run report to {}",
        scored.submission.len(),
        config.paths.output_dir.display()
    );
    Ok(scored.report)
}

/// Tune the configured search family on prepared data
///
/// Every trial cross-validates the family without keeping its models.
///
/// # Errors
/// Returns an error if a trial fails
pub fn search_prepared(config: &PipelineConfig, prepared: &PreparedData) -> Result<SearchReport> {
    let cv = config.search_cross_validation();
    let validator = CrossValidator::new(&cv, &config.sampling);
    let evaluate = |params: FamilyParams| -> Result<f64> {
        let run = validator.run(&params, &prepared.train, &prepared.features, false)?;
        Ok(run.report.mean_score)
    };

    let ensemble = &config.ensemble;
    match config.search.family {
        ModelFamily::CatBoost => run_search(
            ModelFamily::CatBoost,
            &ensemble.catboost,
            &config.search,
            |p| evaluate(FamilyParams::CatBoost(p.clone())),
        ),
        ModelFamily::LightGbm => run_search(
            ModelFamily::LightGbm,
            &ensemble.lightgbm,
            &config.search,
            |p| evaluate(FamilyParams::LightGbm(p.clone())),
        ),
        ModelFamily::XgBoost => run_search(
            ModelFamily::XgBoost,
            &ensemble.xgboost,
            &config.search,
            |p| {
                evaluate(FamilyParams::XgBoost {
                    params: p.clone(),
                    enable_categorical: ensemble.xgboost_enable_categorical,
                })
            },
        ),
    }
}

/// Load and prepare the inputs, run the search and write its report
///
/// The report lands in the output directory as `search_<family>.json`.
///
/// # Errors
/// Returns an error if loading, preparation, a trial or writing fails
pub fn search(config: &PipelineConfig) -> Result<SearchReport> {
    config.validate()?;
    let inputs = load_inputs(config)?;
    let spinner = create_spinner(Some("Preparing feature tables"));
    let prepared = prepare(config, &inputs)?;
    finish_progress_bar(
        &spinner,
        Some(&format!("Prepared {} features", prepared.features.len())),
    );

    let report = search_prepared(config, &prepared)?;
    fs::create_dir_all(&config.paths.output_dir)?;
    let path = config
        .paths
        .output_dir
        .join(format!("search_{}.json", report.family.name()));
    write_json(&path, &report)?;
    info!(
        "Best {} pAUC {:.5} at trial {}, report written to {}",
        report.family,
        report.best_score,
        report.best_trial,
        path.display()
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(values: &[&str]) -> Vec<String> {
        values.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_submission_follows_template_order() {
        let submission = Submission::new(
            &ids(&["a", "b", "c"]),
            vec![0.1, 0.2, 0.3],
            Some(&ids(&["c", "a", "b"])),
        )
        .unwrap();
        assert_eq!(submission.lesion_ids(), ids(&["c", "a", "b"]));
        assert_eq!(submission.scores(), &[0.3, 0.1, 0.2]);
    }

    #[test]
    fn test_submission_rejects_unknown_template_id() {
        let result = Submission::new(&ids(&["a"]), vec![0.5], Some(&ids(&["z"])));
        assert!(matches!(result, Err(PipelineError::Data(_))));
    }

    #[test]
    fn test_submission_batch_uses_schema_names() {
        let submission = Submission::new(&ids(&["a", "b"]), vec![0.25, 0.75], None).unwrap();
        let batch = submission.to_record_batch("isic_id", "target").unwrap();
        assert_eq!(batch.num_rows(), 2);
        let schema = batch.schema();
        assert_eq!(schema.field(0).name(), "isic_id");
        assert_eq!(schema.field(1).name(), "target");
    }
}
