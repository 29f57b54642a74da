//! Typed parameter sets of the three model families
//!
//! Each family exposes the knobs of the library it is modelled after and maps
//! them onto the shared boosting engine. Parameters are validated before a
//! classifier is built from them.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::algorithm::boosting::{BoosterParams, GrowPolicy, RowSampling, SplitParams, TreeParams};
use crate::error::{PipelineError, Result};

fn check_positive(family: &str, name: &str, value: f64) -> Result<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(PipelineError::config(format!("{family}: {name} must be positive, got {value}")))
    }
}

fn check_non_negative(family: &str, name: &str, value: f64) -> Result<()> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(PipelineError::config(format!(
            "{family}: {name} must be non-negative, got {value}"
        )))
    }
}

fn check_fraction(family: &str, name: &str, value: f64) -> Result<()> {
    if value > 0.0 && value <= 1.0 {
        Ok(())
    } else {
        Err(PipelineError::config(format!("{family}: {name} must be in (0, 1], got {value}")))
    }
}

fn check_count(family: &str, name: &str, value: usize) -> Result<()> {
    if value > 0 {
        Ok(())
    } else {
        Err(PipelineError::config(format!("{family}: {name} must be at least 1")))
    }
}

/// LightGBM-style parameters: leaf-wise trees with periodic bagging
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LightGbmParams {
    /// Boosting rounds
    pub n_iter: usize,
    pub learning_rate: f64,
    /// Depth limit, non-positive for unlimited
    pub max_depth: i32,
    pub num_leaves: usize,
    pub lambda_l1: f64,
    pub lambda_l2: f64,
    pub colsample_bytree: f64,
    pub colsample_bynode: f64,
    pub bagging_fraction: f64,
    /// Bagging redraw period, 0 disables bagging
    pub bagging_freq: usize,
    pub min_data_in_leaf: u32,
    pub min_sum_hessian_in_leaf: f64,
    pub scale_pos_weight: f64,
    pub max_bin: usize,
    /// Model seed, independent of the fold seed
    pub seed: u64,
}

impl Default for LightGbmParams {
    fn default() -> Self {
        Self {
            n_iter: 200,
            learning_rate: 0.032_310_071_031_955_77,
            max_depth: 4,
            num_leaves: 103,
            lambda_l1: 0.087_587_189_193_973_21,
            lambda_l2: 0.003_968_917_517_602_546_5,
            colsample_bytree: 0.832_955_158_582_772_6,
            colsample_bynode: 0.402_596_135_565_330_4,
            bagging_fraction: 0.773_895_445_247_322_3,
            bagging_freq: 4,
            min_data_in_leaf: 85,
            min_sum_hessian_in_leaf: 1e-3,
            scale_pos_weight: 2.798_418_477_887_554_3,
            max_bin: 255,
            seed: 42,
        }
    }
}

impl LightGbmParams {
    /// Check parameter ranges
    ///
    /// # Errors
    /// Returns a configuration error naming the first invalid parameter
    pub fn validate(&self) -> Result<()> {
        const FAMILY: &str = "lightgbm";
        check_count(FAMILY, "n_iter", self.n_iter)?;
        check_positive(FAMILY, "learning_rate", self.learning_rate)?;
        if self.num_leaves < 2 {
            return Err(PipelineError::config("lightgbm: num_leaves must be at least 2"));
        }
        check_non_negative(FAMILY, "lambda_l1", self.lambda_l1)?;
        check_non_negative(FAMILY, "lambda_l2", self.lambda_l2)?;
        check_fraction(FAMILY, "colsample_bytree", self.colsample_bytree)?;
        check_fraction(FAMILY, "colsample_bynode", self.colsample_bynode)?;
        check_fraction(FAMILY, "bagging_fraction", self.bagging_fraction)?;
        check_non_negative(FAMILY, "min_sum_hessian_in_leaf", self.min_sum_hessian_in_leaf)?;
        check_positive(FAMILY, "scale_pos_weight", self.scale_pos_weight)?;
        if self.max_bin < 2 {
            return Err(PipelineError::config("lightgbm: max_bin must be at least 2"));
        }
        Ok(())
    }

    /// Engine configuration for these parameters
    #[must_use]
    pub fn to_booster_params(&self) -> BoosterParams {
        BoosterParams {
            iterations: self.n_iter,
            tree: TreeParams {
                policy: GrowPolicy::LeafWise,
                max_depth: usize::try_from(self.max_depth).ok().filter(|&d| d > 0),
                max_leaves: Some(self.num_leaves),
                split: SplitParams {
                    lambda_l1: self.lambda_l1,
                    lambda_l2: self.lambda_l2,
                    min_data_in_leaf: self.min_data_in_leaf.max(1),
                    min_child_weight: self.min_sum_hessian_in_leaf,
                    min_split_gain: 0.0,
                },
                learning_rate: self.learning_rate,
                colsample_bylevel: 1.0,
                colsample_bynode: self.colsample_bynode,
            },
            max_bins: self.max_bin,
            scale_pos_weight: self.scale_pos_weight,
            row_sampling: RowSampling::Bagging {
                fraction: self.bagging_fraction,
                freq: self.bagging_freq,
            },
            colsample_bytree: self.colsample_bytree,
            random_strength: 0.0,
            early_stopping_rounds: None,
        }
    }
}

/// XGBoost-style parameters: depth-wise trees on histogram bins
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct XgBoostParams {
    pub n_estimators: usize,
    pub learning_rate: f64,
    /// L2 penalty
    pub lambda: f64,
    /// L1 penalty
    pub alpha: f64,
    pub max_depth: usize,
    pub subsample: f64,
    pub colsample_bytree: f64,
    pub colsample_bylevel: f64,
    pub colsample_bynode: f64,
    pub min_child_weight: f64,
    /// Minimum loss reduction of a split
    pub gamma: f64,
    pub scale_pos_weight: f64,
    pub max_bin: usize,
    pub seed: u64,
}

impl Default for XgBoostParams {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            learning_rate: 0.085_012_574_733_920_47,
            lambda: 8.879_624_125_465_703,
            alpha: 0.677_992_606_782_505_5,
            max_depth: 6,
            subsample: 0.601_268_138_871_107_5,
            colsample_bytree: 0.843_777_227_707_471_6,
            colsample_bylevel: 0.547_609_089_882_371_6,
            colsample_bynode: 0.992_860_120_363_512_9,
            min_child_weight: 1.0,
            gamma: 0.0,
            scale_pos_weight: 3.294_403_133_346_88,
            max_bin: 256,
            seed: 42,
        }
    }
}

impl XgBoostParams {
    /// Check parameter ranges
    ///
    /// # Errors
    /// Returns a configuration error naming the first invalid parameter
    pub fn validate(&self) -> Result<()> {
        const FAMILY: &str = "xgboost";
        check_count(FAMILY, "n_estimators", self.n_estimators)?;
        check_positive(FAMILY, "learning_rate", self.learning_rate)?;
        check_non_negative(FAMILY, "lambda", self.lambda)?;
        check_non_negative(FAMILY, "alpha", self.alpha)?;
        check_count(FAMILY, "max_depth", self.max_depth)?;
        check_fraction(FAMILY, "subsample", self.subsample)?;
        check_fraction(FAMILY, "colsample_bytree", self.colsample_bytree)?;
        check_fraction(FAMILY, "colsample_bylevel", self.colsample_bylevel)?;
        check_fraction(FAMILY, "colsample_bynode", self.colsample_bynode)?;
        check_non_negative(FAMILY, "min_child_weight", self.min_child_weight)?;
        check_non_negative(FAMILY, "gamma", self.gamma)?;
        check_positive(FAMILY, "scale_pos_weight", self.scale_pos_weight)?;
        if self.max_bin < 2 {
            return Err(PipelineError::config("xgboost: max_bin must be at least 2"));
        }
        Ok(())
    }

    /// Engine configuration for these parameters
    #[must_use]
    pub fn to_booster_params(&self) -> BoosterParams {
        BoosterParams {
            iterations: self.n_estimators,
            tree: TreeParams {
                policy: GrowPolicy::DepthWise,
                max_depth: Some(self.max_depth),
                max_leaves: None,
                split: SplitParams {
                    lambda_l1: self.alpha,
                    lambda_l2: self.lambda,
                    min_data_in_leaf: 1,
                    min_child_weight: self.min_child_weight,
                    min_split_gain: self.gamma,
                },
                learning_rate: self.learning_rate,
                colsample_bylevel: self.colsample_bylevel,
                colsample_bynode: self.colsample_bynode,
            },
            max_bins: self.max_bin,
            scale_pos_weight: self.scale_pos_weight,
            row_sampling: RowSampling::Subsample {
                fraction: self.subsample,
            },
            colsample_bytree: self.colsample_bytree,
            random_strength: 0.0,
            early_stopping_rounds: None,
        }
    }
}

/// Tree growth policy names of the CatBoost-style family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CatBoostGrowPolicy {
    /// Oblivious trees
    #[default]
    SymmetricTree,
    /// Level by level
    Depthwise,
    /// Best-first by loss reduction
    Lossguide,
}

impl CatBoostGrowPolicy {
    /// All policies in search order
    pub const ALL: [Self; 3] = [Self::SymmetricTree, Self::Depthwise, Self::Lossguide];

    /// Engine policy implementing this one
    #[must_use]
    pub const fn grow_policy(self) -> GrowPolicy {
        match self {
            Self::SymmetricTree => GrowPolicy::Symmetric,
            Self::Depthwise => GrowPolicy::DepthWise,
            Self::Lossguide => GrowPolicy::LeafWise,
        }
    }
}

impl fmt::Display for CatBoostGrowPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::SymmetricTree => "SymmetricTree",
            Self::Depthwise => "Depthwise",
            Self::Lossguide => "Lossguide",
        };
        f.write_str(name)
    }
}

/// CatBoost-style parameters: Bayesian bootstrap, score noise and
/// validation-based early stopping
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatBoostParams {
    pub iterations: usize,
    pub learning_rate: f64,
    pub l2_leaf_reg: f64,
    /// Scale of the split-score noise
    pub random_strength: f64,
    pub depth: usize,
    pub bagging_temperature: f64,
    /// Bins per numeric feature
    pub border_count: usize,
    pub grow_policy: CatBoostGrowPolicy,
    /// Ignored by symmetric trees
    pub min_data_in_leaf: u32,
    /// Leaf limit of `Lossguide` trees
    pub max_leaves: usize,
    /// Early-stopping patience on the validation fold, `None` disables it
    pub od_wait: Option<usize>,
    pub scale_pos_weight: f64,
}

impl Default for CatBoostParams {
    fn default() -> Self {
        Self {
            iterations: 2000,
            learning_rate: 0.026_061_615_178_434_35,
            l2_leaf_reg: 18.044_222_766_981_95,
            random_strength: 4.706_958_078_388_999_5,
            depth: 6,
            bagging_temperature: 0.873_594_047_354_833_9,
            border_count: 256,
            grow_policy: CatBoostGrowPolicy::Lossguide,
            min_data_in_leaf: 38,
            max_leaves: 31,
            od_wait: Some(100),
            scale_pos_weight: 1.0,
        }
    }
}

impl CatBoostParams {
    /// Check parameter ranges
    ///
    /// # Errors
    /// Returns a configuration error naming the first invalid parameter
    pub fn validate(&self) -> Result<()> {
        const FAMILY: &str = "catboost";
        check_count(FAMILY, "iterations", self.iterations)?;
        check_positive(FAMILY, "learning_rate", self.learning_rate)?;
        check_non_negative(FAMILY, "l2_leaf_reg", self.l2_leaf_reg)?;
        check_non_negative(FAMILY, "random_strength", self.random_strength)?;
        if !(1..=16).contains(&self.depth) {
            return Err(PipelineError::config(format!(
                "catboost: depth must be in [1, 16], got {}",
                self.depth
            )));
        }
        check_non_negative(FAMILY, "bagging_temperature", self.bagging_temperature)?;
        if self.border_count < 2 {
            return Err(PipelineError::config("catboost: border_count must be at least 2"));
        }
        if self.max_leaves < 2 {
            return Err(PipelineError::config("catboost: max_leaves must be at least 2"));
        }
        if self.od_wait == Some(0) {
            return Err(PipelineError::config("catboost: od_wait must be at least 1"));
        }
        check_positive(FAMILY, "scale_pos_weight", self.scale_pos_weight)?;
        Ok(())
    }

    /// Engine configuration for these parameters
    #[must_use]
    pub fn to_booster_params(&self) -> BoosterParams {
        let policy = self.grow_policy.grow_policy();
        let min_data_in_leaf = match self.grow_policy {
            CatBoostGrowPolicy::SymmetricTree => 1,
            _ => self.min_data_in_leaf.max(1),
        };
        BoosterParams {
            iterations: self.iterations,
            tree: TreeParams {
                policy,
                max_depth: Some(self.depth),
                max_leaves: (self.grow_policy == CatBoostGrowPolicy::Lossguide)
                    .then_some(self.max_leaves),
                split: SplitParams {
                    lambda_l1: 0.0,
                    lambda_l2: self.l2_leaf_reg,
                    min_data_in_leaf,
                    min_child_weight: 0.0,
                    min_split_gain: 0.0,
                },
                learning_rate: self.learning_rate,
                colsample_bylevel: 1.0,
                colsample_bynode: 1.0,
            },
            max_bins: self.border_count,
            scale_pos_weight: self.scale_pos_weight,
            row_sampling: RowSampling::Bayesian {
                temperature: self.bagging_temperature,
            },
            colsample_bytree: 1.0,
            random_strength: self.random_strength,
            early_stopping_rounds: self.od_wait,
        }
    }
}
