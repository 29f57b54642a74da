//! Boosted-tree committee training and scoring
//!
//! This module provides:
//! - Typed parameter sets and classifiers for three model families
//! - Stratified group k-fold splitting repeated over per-family seeds
//! - Training-slice resampling and auxiliary-score noise
//! - The partial AUC validation metric
//! - Rank-fused inference and TPE hyperparameter search

pub mod classifier;
pub mod folds;
pub mod member;
pub mod metric;
pub mod params;
pub mod sampling;
pub mod scorer;
pub mod search;
pub mod trainer;

pub use classifier::{
    BoostedTreeClassifier, CatBoostClassifier, FamilyParams, LightGbmClassifier, ModelFamily,
    XgBoostClassifier,
};
pub use folds::{Fold, StratifiedGroupKFold};
pub use member::{EnsembleMember, MemberOrigin};
pub use metric::{DEFAULT_MIN_TPR, partial_auc_score, roc_auc};
pub use params::{CatBoostGrowPolicy, CatBoostParams, LightGbmParams, XgBoostParams};
pub use sampling::{RandomOverSampler, RandomUnderSampler, add_column_noise, resample_rows};
pub use scorer::{Ensemble, rank_fuse};
pub use search::{SearchReport, SearchSpace, TpeSampler, Trial, Tunable, run_search};
pub use trainer::{
    CrossValidationReport, CrossValidationRun, CrossValidator, FamilyReport, FoldReport,
    train_ensemble,
};
