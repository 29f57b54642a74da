//! Feature engineering stages
//!
//! Stages run in a fixed order: raw imputation, derivation, patient
//! normalization, cohort aggregates, categorical encoding. Each takes the
//! current [`FeatureSet`](crate::algorithm::feature_set::FeatureSet) and returns
//! the extended one.

pub mod derive;
pub mod encoder;
pub mod impute;
pub mod patient;

pub use derive::{DERIVED_FEATURE_NAMES, EPSILON, derive_features};
pub use encoder::CategoricalVocabulary;
pub use impute::{ImputationSummary, impute_features, impute_raw_measurements};
pub use patient::{
    AREA_PER_BODY_PART, AREA_PER_PATIENT, COUNT_PER_PATIENT, add_cohort_aggregates,
    normalize_patients, patient_mean_ratio, patient_norm_name, patient_zscore,
};
