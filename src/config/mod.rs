//! Configuration for the lesion scoring pipeline
//!
//! Every stage reads its settings from one [`PipelineConfig`]. The defaults
//! are the production values; a JSON file may override any subset of them.

pub mod builder;

use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use crate::algorithm::ensemble::{
    CatBoostParams, FamilyParams, LightGbmParams, ModelFamily, XgBoostParams,
};
use crate::error::{PipelineError, Result};
use crate::schema::TableSchema;

pub use builder::PipelineConfigBuilder;

/// Features of the per-patient outlier score, duplicates intended
pub const OUTLIER_FEATURES: [&str; 17] = [
    "tbp_lv_H",
    "hue_contrast",
    "age_normalized_nevi_confidence_2",
    "tbp_lv_deltaB",
    "color_uniformity",
    "tbp_lv_z",
    "clin_size_long_diam_mm",
    "tbp_lv_y",
    "position_distance_3d",
    "hue_contrast",
    "tbp_lv_stdLExt",
    "mean_hue_difference",
    "age_normalized_nevi_confidence",
    "lesion_visibility_score",
    "position_distance_3d",
    "tbp_lv_minorAxisMM",
    "tbp_lv_Hext",
];

/// Columns excluded from model input
pub const DROP_COLUMNS: [&str; 14] = [
    "tbp_lv_B",
    "tbp_lv_C",
    "tbp_lv_H",
    "tbp_lv_L",
    "tbp_lv_radial_color_std_max",
    "tbp_lv_y",
    "tbp_lv_z",
    "luminance_contrast",
    "lesion_color_difference",
    "normalized_lesion_size",
    "tbp_lv_norm_border_patient_norm",
    "lesion_color_difference_patient_norm",
    "age_normalized_nevi_confidence_2_patient_norm",
    "tbp_lv_deltaA",
];

/// Auxiliary score columns perturbed in training slices
pub const NOISE_COLUMNS: [&str; 4] = [
    "predictions_eva",
    "predictions_eva_m",
    "predictions_edg",
    "predictions_edg_m",
];

/// Legacy image-model score columns
pub const LEGACY_SCORE_COLUMNS: [&str; 3] = ["old_set_0", "old_set_1", "old_set_2"];

fn strings<const N: usize>(values: [&str; N]) -> Vec<String> {
    values.iter().map(ToString::to_string).collect()
}

/// Input and output locations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataPaths {
    /// Training metadata table
    pub train: PathBuf,
    /// Held-out metadata table
    pub test: PathBuf,
    /// Submission template fixing the output row order
    pub submission_template: Option<PathBuf>,
    /// Directory receiving the submission and the run report
    pub output_dir: PathBuf,
    pub submission_file: String,
    pub report_file: String,
}

impl Default for DataPaths {
    fn default() -> Self {
        Self {
            train: PathBuf::from("data/train-metadata.csv"),
            test: PathBuf::from("data/test-metadata.csv"),
            submission_template: Some(PathBuf::from("data/sample_submission.csv")),
            output_dir: PathBuf::from("output"),
            submission_file: "submission.csv".to_string(),
            report_file: "run_report.json".to_string(),
        }
    }
}

impl DataPaths {
    /// Full path of the submission file
    #[must_use]
    pub fn submission_path(&self) -> PathBuf {
        self.output_dir.join(&self.submission_file)
    }

    /// Full path of the run report
    #[must_use]
    pub fn report_path(&self) -> PathBuf {
        self.output_dir.join(&self.report_file)
    }
}

/// Per-patient local outlier factor settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutlierConfig {
    /// Features of the outlier space, duplicates count twice
    pub features: Vec<String>,
    /// Upper bound of the neighborhood size
    pub max_neighbors: usize,
    /// Smallest patient group that gets a score
    pub min_group_size: usize,
    /// Score of lesions in smaller groups
    pub sentinel: f64,
    /// Output column
    pub column: String,
}

impl Default for OutlierConfig {
    fn default() -> Self {
        Self {
            features: strings(OUTLIER_FEATURES),
            max_neighbors: 30,
            min_group_size: 3,
            sentinel: -1.0,
            column: "of".to_string(),
        }
    }
}

/// One auxiliary image-model score family
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuxiliaryFamilyConfig {
    /// Family name, the merged column is `predictions_{name}`
    pub name: String,
    /// Out-of-fold record of the training lesions
    pub oof_path: Option<PathBuf>,
    /// Submodel outputs for the held-out lesions
    pub held_out_path: Option<PathBuf>,
    pub fold_column: String,
    /// Raw out-of-fold score
    pub score_column: String,
    /// Rank-transformed out-of-fold score
    pub rank_column: String,
    /// Fold whose statistics rescale held-out scores
    pub reference_fold: i64,
    pub submodel_prefix: String,
    pub num_submodels: usize,
}

impl Default for AuxiliaryFamilyConfig {
    fn default() -> Self {
        Self::new("eva")
    }
}

impl AuxiliaryFamilyConfig {
    /// Family with the standard column layout and no input files
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            oof_path: None,
            held_out_path: None,
            fold_column: "fold_n".to_string(),
            score_column: "tmp_predictions_all".to_string(),
            rank_column: "tmp_predictions_all__pr".to_string(),
            reference_fold: 0,
            submodel_prefix: "predictions__".to_string(),
            num_submodels: 5,
        }
    }

    /// Merged score column
    #[must_use]
    pub fn output_column(&self) -> String {
        format!("predictions_{}", self.name)
    }

    /// Merged patient mean-ratio column
    #[must_use]
    pub fn ratio_column(&self) -> String {
        format!("predictions_{}_m", self.name)
    }

    /// Submodel columns of the held-out table
    #[must_use]
    pub fn submodel_columns(&self) -> Vec<String> {
        (0..self.num_submodels)
            .map(|i| format!("{}{i}", self.submodel_prefix))
            .collect()
    }
}

/// External image-model scores merged into the feature tables
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuxiliaryConfig {
    /// Legacy scores of the training lesions
    pub legacy_train: Option<PathBuf>,
    /// Legacy scores of the held-out lesions
    pub legacy_test: Option<PathBuf>,
    pub legacy_columns: Vec<String>,
    pub families: Vec<AuxiliaryFamilyConfig>,
}

impl Default for AuxiliaryConfig {
    fn default() -> Self {
        Self {
            legacy_train: None,
            legacy_test: None,
            legacy_columns: strings(LEGACY_SCORE_COLUMNS),
            families: vec![
                AuxiliaryFamilyConfig::new("eva"),
                AuxiliaryFamilyConfig::new("edg"),
            ],
        }
    }
}

/// Repeated cross-validation protocol
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrossValidationConfig {
    /// Repetitions, each with its own fold seed
    pub n_repetitions: u64,
    pub n_splits: usize,
    pub shuffle: bool,
    /// Sensitivity floor of the partial AUC metric
    pub min_tpr: f64,
}

impl Default for CrossValidationConfig {
    fn default() -> Self {
        Self {
            n_repetitions: 9,
            n_splits: 5,
            shuffle: true,
            min_tpr: 0.80,
        }
    }
}

/// Resampling and noise applied to every training slice
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingConfig {
    /// Positive-to-negative ratio reached by oversampling, `None` skips it
    pub oversample_ratio: Option<f64>,
    /// Positive-to-negative ratio reached by undersampling, `None` skips it
    pub undersample_ratio: Option<f64>,
    /// Columns receiving Gaussian noise
    pub noise_columns: Vec<String>,
    pub noise_std: f64,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            oversample_ratio: Some(0.003),
            undersample_ratio: Some(0.01),
            noise_columns: strings(NOISE_COLUMNS),
            noise_std: 0.1,
        }
    }
}

/// Model families of the committee and their parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnsembleConfig {
    /// Families trained and fused
    pub families: Vec<ModelFamily>,
    pub catboost: CatBoostParams,
    pub lightgbm: LightGbmParams,
    pub xgboost: XgBoostParams,
    /// Let the XGBoost-style family split indicators by category
    pub xgboost_enable_categorical: bool,
}

impl Default for EnsembleConfig {
    fn default() -> Self {
        Self {
            families: ModelFamily::ALL.to_vec(),
            catboost: CatBoostParams::default(),
            lightgbm: LightGbmParams::default(),
            xgboost: XgBoostParams::default(),
            xgboost_enable_categorical: true,
        }
    }
}

impl EnsembleConfig {
    /// Parameters of one family
    #[must_use]
    pub fn family_params(&self, family: ModelFamily) -> FamilyParams {
        match family {
            ModelFamily::CatBoost => FamilyParams::CatBoost(self.catboost.clone()),
            ModelFamily::LightGbm => FamilyParams::LightGbm(self.lightgbm.clone()),
            ModelFamily::XgBoost => FamilyParams::XgBoost {
                params: self.xgboost.clone(),
                enable_categorical: self.xgboost_enable_categorical,
            },
        }
    }
}

/// Hyperparameter search budget
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Family being tuned
    pub family: ModelFamily,
    pub n_trials: usize,
    /// Trials sampled from the prior before the estimators take over
    pub n_startup_trials: usize,
    /// Candidates scored per parameter and trial
    pub n_ei_candidates: usize,
    pub seed: u64,
    /// Cross-validation repetitions per trial, `None` uses the run setting
    pub n_repetitions: Option<u64>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            family: ModelFamily::CatBoost,
            n_trials: 50,
            n_startup_trials: 10,
            n_ei_candidates: 24,
            seed: 42,
            n_repetitions: None,
        }
    }
}

/// Complete pipeline configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub paths: DataPaths,
    pub schema: TableSchema,
    /// Fill missing raw measurements with the column median before derivation
    pub impute_raw_on_load: bool,
    /// Columns normalized per patient, `None` for every raw and derived column
    pub patient_norm_columns: Option<Vec<String>>,
    /// Columns removed from the model input
    pub drop_columns: Vec<String>,
    pub outlier: OutlierConfig,
    pub auxiliary: AuxiliaryConfig,
    pub cross_validation: CrossValidationConfig,
    pub sampling: SamplingConfig,
    pub ensemble: EnsembleConfig,
    pub search: SearchConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            paths: DataPaths::default(),
            schema: TableSchema::default(),
            impute_raw_on_load: true,
            patient_norm_columns: None,
            drop_columns: strings(DROP_COLUMNS),
            outlier: OutlierConfig::default(),
            auxiliary: AuxiliaryConfig::default(),
            cross_validation: CrossValidationConfig::default(),
            sampling: SamplingConfig::default(),
            ensemble: EnsembleConfig::default(),
            search: SearchConfig::default(),
        }
    }
}

fn check(condition: bool, message: impl FnOnce() -> String) -> Result<()> {
    if condition {
        Ok(())
    } else {
        Err(PipelineError::config(message()))
    }
}

fn is_ratio(value: Option<f64>) -> bool {
    value.is_none_or(|r| r.is_finite() && r > 0.0)
}

impl PipelineConfig {
    /// Create a configuration with production defaults
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a builder for common overrides
    #[must_use]
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder::new()
    }

    /// Load a configuration from a JSON file and validate it
    ///
    /// Fields missing from the file keep their defaults.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed, or the result
    /// fails validation
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        let config: Self = serde_json::from_reader(reader)?;
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges and cross-field consistency
    ///
    /// # Errors
    /// Returns a configuration error describing the first problem found
    pub fn validate(&self) -> Result<()> {
        check(!self.schema.id_column.is_empty(), || "schema id column is empty".into())?;
        check(!self.schema.patient_column.is_empty(), || {
            "schema patient column is empty".into()
        })?;

        let cv = &self.cross_validation;
        check(cv.n_repetitions >= 1, || "at least one repetition is required".into())?;
        check(cv.n_splits >= 2, || format!("n_splits must be at least 2, got {}", cv.n_splits))?;
        check(cv.min_tpr > 0.0 && cv.min_tpr < 1.0, || {
            format!("min_tpr must be in (0, 1), got {}", cv.min_tpr)
        })?;

        let sampling = &self.sampling;
        check(is_ratio(sampling.oversample_ratio), || {
            "oversample_ratio must be positive".into()
        })?;
        check(is_ratio(sampling.undersample_ratio), || {
            "undersample_ratio must be positive".into()
        })?;
        check(sampling.noise_std.is_finite() && sampling.noise_std >= 0.0, || {
            format!("noise_std must be non-negative, got {}", sampling.noise_std)
        })?;

        let outlier = &self.outlier;
        check(!outlier.features.is_empty(), || "outlier features are empty".into())?;
        check(outlier.max_neighbors >= 1, || "max_neighbors must be at least 1".into())?;
        check(outlier.min_group_size >= 2, || {
            format!("min_group_size must be at least 2, got {}", outlier.min_group_size)
        })?;

        let mut names: Vec<&str> = self.auxiliary.families.iter().map(|f| f.name.as_str()).collect();
        names.sort_unstable();
        check(names.windows(2).all(|w| w[0] != w[1]), || {
            "auxiliary family names must be unique".into()
        })?;
        for family in &self.auxiliary.families {
            check(family.num_submodels >= 1, || {
                format!("auxiliary family '{}' needs at least one submodel", family.name)
            })?;
        }

        check(!self.ensemble.families.is_empty(), || "no model families configured".into())?;
        let mut families = self.ensemble.families.clone();
        families.sort_unstable();
        families.dedup();
        check(families.len() == self.ensemble.families.len(), || {
            "model families must be unique".into()
        })?;
        for &family in &self.ensemble.families {
            self.ensemble.family_params(family).validate()?;
        }

        check(self.search.n_trials >= 1, || "search needs at least one trial".into())?;
        check(self.search.n_repetitions != Some(0), || {
            "search repetitions must be at least 1".into()
        })?;
        Ok(())
    }

    /// Cross-validation settings of a search trial
    #[must_use]
    pub fn search_cross_validation(&self) -> CrossValidationConfig {
        CrossValidationConfig {
            n_repetitions: self
                .search
                .n_repetitions
                .unwrap_or(self.cross_validation.n_repetitions),
            ..self.cross_validation.clone()
        }
    }
}

impl fmt::Display for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Pipeline Configuration:")?;
        writeln!(f, "  Train: {}", self.paths.train.display())?;
        writeln!(f, "  Test: {}", self.paths.test.display())?;
        if let Some(template) = &self.paths.submission_template {
            writeln!(f, "  Submission Template: {}", template.display())?;
        }
        writeln!(f, "  Output Directory: {}", self.paths.output_dir.display())?;
        writeln!(f, "  Impute Raw On Load: {}", self.impute_raw_on_load)?;
        writeln!(f, "  Dropped Columns: {}", self.drop_columns.len())?;
        writeln!(
            f,
            "  Outlier Score: {} features, k <= {}, groups >= {}",
            self.outlier.features.len(),
            self.outlier.max_neighbors,
            self.outlier.min_group_size
        )?;
        writeln!(
            f,
            "  Auxiliary Families: {}",
            self.auxiliary.families.iter().map(|a| &a.name).join(", ")
        )?;
        writeln!(
            f,
            "  Cross-Validation: {} x {}-fold",
            self.cross_validation.n_repetitions, self.cross_validation.n_splits
        )?;
        if let Some(ratio) = self.sampling.oversample_ratio {
            writeln!(f, "  Oversample Ratio: {ratio}")?;
        }
        if let Some(ratio) = self.sampling.undersample_ratio {
            writeln!(f, "  Undersample Ratio: {ratio}")?;
        }
        writeln!(f, "  Model Families: {}", self.ensemble.families.iter().join(", "))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_validate() {
        assert!(PipelineConfig::default().validate().is_ok());
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"cross_validation": {{"n_repetitions": 2}}, "ensemble": {{"families": ["lightgbm"]}}}}"#
        )
        .unwrap();
        let config = PipelineConfig::from_json_file(file.path()).unwrap();
        assert_eq!(config.cross_validation.n_repetitions, 2);
        assert_eq!(config.cross_validation.n_splits, 5);
        assert_eq!(config.ensemble.families, vec![ModelFamily::LightGbm]);
        assert_eq!(config.outlier.features.len(), 17);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let mut config = PipelineConfig::default();
        config.cross_validation.n_splits = 1;
        assert!(matches!(config.validate(), Err(PipelineError::Config(_))));

        let mut config = PipelineConfig::default();
        config.ensemble.families = vec![ModelFamily::XgBoost, ModelFamily::XgBoost];
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::default();
        config.ensemble.lightgbm.bagging_fraction = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_auxiliary_family_columns() {
        let family = AuxiliaryFamilyConfig::new("edg");
        assert_eq!(family.output_column(), "predictions_edg");
        assert_eq!(family.ratio_column(), "predictions_edg_m");
        assert_eq!(family.submodel_columns()[4], "predictions__4");
    }

    #[test]
    fn test_search_repetitions_override() {
        let mut config = PipelineConfig::default();
        config.search.n_repetitions = Some(2);
        assert_eq!(config.search_cross_validation().n_repetitions, 2);
        assert_eq!(config.search_cross_validation().n_splits, 5);
    }
}
