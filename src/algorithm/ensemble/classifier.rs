//! Boosted-tree classifiers of the three model families
//!
//! Every family is a thin adapter over the shared boosting engine: it maps its
//! typed parameters onto the engine, decides how categorical inputs are
//! treated, and chooses which seed drives the model.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::params::{CatBoostParams, LightGbmParams, XgBoostParams};
use crate::algorithm::boosting::{FeatureMatrix, GradientBooster};
use crate::error::{PipelineError, Result};

/// Model family of an ensemble member
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelFamily {
    CatBoost,
    LightGbm,
    XgBoost,
}

impl ModelFamily {
    /// Every family, in fusion order
    pub const ALL: [Self; 3] = [Self::CatBoost, Self::LightGbm, Self::XgBoost];

    /// Short lowercase name
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::CatBoost => "catboost",
            Self::LightGbm => "lightgbm",
            Self::XgBoost => "xgboost",
        }
    }

    /// Fold seed of a cross-validation repetition (1-based)
    #[must_use]
    pub const fn repetition_seed(self, repetition: u64) -> u64 {
        match self {
            Self::CatBoost => repetition,
            Self::LightGbm => repetition * 10 + 17,
            Self::XgBoost => repetition * 10 + 88,
        }
    }
}

impl fmt::Display for ModelFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ModelFamily {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|family| family.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| PipelineError::config(format!("unknown model family '{s}'")))
    }
}

/// A binary classifier fitted on a feature matrix
pub trait BoostedTreeClassifier: fmt::Debug + Send + Sync {
    /// Family the classifier belongs to
    fn family(&self) -> ModelFamily;

    /// Whether categorical-flagged columns are split on by category
    fn supports_native_categoricals(&self) -> bool;

    /// Fit on labelled rows
    ///
    /// # Arguments
    /// * `train` - Training features
    /// * `labels` - 0/1 labels aligned with `train`
    /// * `eval` - Validation rows, used by families with early stopping
    ///
    /// # Errors
    /// Returns an error if the engine rejects the inputs
    fn fit(
        &mut self,
        train: &FeatureMatrix,
        labels: &[u8],
        eval: Option<(&FeatureMatrix, &[u8])>,
    ) -> Result<()>;

    /// Positive-class probability of every row
    ///
    /// # Errors
    /// Returns an error if the classifier is not fitted or the features differ
    fn predict_proba(&self, matrix: &FeatureMatrix) -> Result<Vec<f64>>;

    /// Number of trees in the fitted model
    fn num_trees(&self) -> usize;
}

fn native_view(matrix: &FeatureMatrix, native: bool) -> std::borrow::Cow<'_, FeatureMatrix> {
    if native {
        std::borrow::Cow::Borrowed(matrix)
    } else {
        std::borrow::Cow::Owned(matrix.without_categoricals())
    }
}

fn fitted(model: Option<&GradientBooster>, family: ModelFamily) -> Result<&GradientBooster> {
    model.ok_or_else(|| PipelineError::Model(format!("{family} classifier used before fit")))
}

/// LightGBM-style classifier
#[derive(Debug, Clone)]
pub struct LightGbmClassifier {
    params: LightGbmParams,
    model: Option<GradientBooster>,
}

impl LightGbmClassifier {
    /// Create an unfitted classifier
    ///
    /// # Errors
    /// Returns an error if the parameters are invalid
    pub fn new(params: LightGbmParams) -> Result<Self> {
        params.validate()?;
        Ok(Self {
            params,
            model: None,
        })
    }
}

impl BoostedTreeClassifier for LightGbmClassifier {
    fn family(&self) -> ModelFamily {
        ModelFamily::LightGbm
    }

    fn supports_native_categoricals(&self) -> bool {
        true
    }

    fn fit(
        &mut self,
        train: &FeatureMatrix,
        labels: &[u8],
        _eval: Option<(&FeatureMatrix, &[u8])>,
    ) -> Result<()> {
        let booster = self.params.to_booster_params();
        self.model = Some(GradientBooster::fit(&booster, train, labels, None, self.params.seed)?);
        Ok(())
    }

    fn predict_proba(&self, matrix: &FeatureMatrix) -> Result<Vec<f64>> {
        fitted(self.model.as_ref(), self.family())?.predict_proba(matrix)
    }

    fn num_trees(&self) -> usize {
        self.model.as_ref().map_or(0, GradientBooster::num_trees)
    }
}

/// XGBoost-style classifier
#[derive(Debug, Clone)]
pub struct XgBoostClassifier {
    params: XgBoostParams,
    enable_categorical: bool,
    model: Option<GradientBooster>,
}

impl XgBoostClassifier {
    /// Create an unfitted classifier
    ///
    /// # Arguments
    /// * `params` - Family parameters
    /// * `enable_categorical` - Split categorical columns by category instead
    ///   of by threshold
    ///
    /// # Errors
    /// Returns an error if the parameters are invalid
    pub fn new(params: XgBoostParams, enable_categorical: bool) -> Result<Self> {
        params.validate()?;
        Ok(Self {
            params,
            enable_categorical,
            model: None,
        })
    }
}

impl BoostedTreeClassifier for XgBoostClassifier {
    fn family(&self) -> ModelFamily {
        ModelFamily::XgBoost
    }

    fn supports_native_categoricals(&self) -> bool {
        self.enable_categorical
    }

    fn fit(
        &mut self,
        train: &FeatureMatrix,
        labels: &[u8],
        _eval: Option<(&FeatureMatrix, &[u8])>,
    ) -> Result<()> {
        let train = native_view(train, self.enable_categorical);
        let booster = self.params.to_booster_params();
        self.model = Some(GradientBooster::fit(&booster, &train, labels, None, self.params.seed)?);
        Ok(())
    }

    fn predict_proba(&self, matrix: &FeatureMatrix) -> Result<Vec<f64>> {
        let matrix = native_view(matrix, self.enable_categorical);
        fitted(self.model.as_ref(), self.family())?.predict_proba(&matrix)
    }

    fn num_trees(&self) -> usize {
        self.model.as_ref().map_or(0, GradientBooster::num_trees)
    }
}

/// CatBoost-style classifier, seeded per repetition
#[derive(Debug, Clone)]
pub struct CatBoostClassifier {
    params: CatBoostParams,
    seed: u64,
    model: Option<GradientBooster>,
}

impl CatBoostClassifier {
    /// Create an unfitted classifier
    ///
    /// # Errors
    /// Returns an error if the parameters are invalid
    pub fn new(params: CatBoostParams, seed: u64) -> Result<Self> {
        params.validate()?;
        Ok(Self {
            params,
            seed,
            model: None,
        })
    }

    /// Iteration kept after early stopping
    #[must_use]
    pub fn best_iteration(&self) -> Option<usize> {
        self.model.as_ref().and_then(GradientBooster::best_iteration)
    }
}

impl BoostedTreeClassifier for CatBoostClassifier {
    fn family(&self) -> ModelFamily {
        ModelFamily::CatBoost
    }

    fn supports_native_categoricals(&self) -> bool {
        true
    }

    fn fit(
        &mut self,
        train: &FeatureMatrix,
        labels: &[u8],
        eval: Option<(&FeatureMatrix, &[u8])>,
    ) -> Result<()> {
        let booster = self.params.to_booster_params();
        let eval = eval.filter(|_| booster.early_stopping_rounds.is_some());
        self.model = Some(GradientBooster::fit(&booster, train, labels, eval, self.seed)?);
        Ok(())
    }

    fn predict_proba(&self, matrix: &FeatureMatrix) -> Result<Vec<f64>> {
        fitted(self.model.as_ref(), self.family())?.predict_proba(matrix)
    }

    fn num_trees(&self) -> usize {
        self.model.as_ref().map_or(0, GradientBooster::num_trees)
    }
}

/// Parameters of one family, enough to build its classifiers
#[derive(Debug, Clone, PartialEq)]
pub enum FamilyParams {
    CatBoost(CatBoostParams),
    LightGbm(LightGbmParams),
    XgBoost {
        params: XgBoostParams,
        enable_categorical: bool,
    },
}

impl FamilyParams {
    /// Family of these parameters
    #[must_use]
    pub const fn family(&self) -> ModelFamily {
        match self {
            Self::CatBoost(_) => ModelFamily::CatBoost,
            Self::LightGbm(_) => ModelFamily::LightGbm,
            Self::XgBoost { .. } => ModelFamily::XgBoost,
        }
    }

    /// Check parameter ranges
    ///
    /// # Errors
    /// Returns a configuration error naming the first invalid parameter
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::CatBoost(p) => p.validate(),
            Self::LightGbm(p) => p.validate(),
            Self::XgBoost { params, .. } => params.validate(),
        }
    }

    /// Build an unfitted classifier for one repetition
    ///
    /// Only the CatBoost-style family takes the repetition seed as its model
    /// seed; the others use the seed in their parameters.
    ///
    /// # Errors
    /// Returns an error if the parameters are invalid
    pub fn build(&self, repetition_seed: u64) -> Result<Box<dyn BoostedTreeClassifier>> {
        Ok(match self {
            Self::CatBoost(p) => Box::new(CatBoostClassifier::new(p.clone(), repetition_seed)?),
            Self::LightGbm(p) => Box::new(LightGbmClassifier::new(p.clone())?),
            Self::XgBoost {
                params,
                enable_categorical,
            } => Box::new(XgBoostClassifier::new(params.clone(), *enable_categorical)?),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toy_matrix() -> (FeatureMatrix, Vec<u8>) {
        let x: Vec<f64> = (0..60).map(f64::from).collect();
        let flag: Vec<f64> = (0..60).map(|i| f64::from(i % 2)).collect();
        let labels: Vec<u8> = (0..60).map(|i| u8::from(i >= 40)).collect();
        let matrix = FeatureMatrix::new(
            vec!["x".into(), "onehot_0".into()],
            vec![x, flag],
            vec![false, true],
        )
        .unwrap();
        (matrix, labels)
    }

    #[test]
    fn test_repetition_seed_schedules() {
        assert_eq!(ModelFamily::CatBoost.repetition_seed(3), 3);
        assert_eq!(ModelFamily::LightGbm.repetition_seed(1), 27);
        assert_eq!(ModelFamily::XgBoost.repetition_seed(9), 178);
    }

    #[test]
    fn test_family_names_parse() {
        assert_eq!("LightGBM".parse::<ModelFamily>().unwrap(), ModelFamily::LightGbm);
        assert_eq!("catboost".parse::<ModelFamily>().unwrap(), ModelFamily::CatBoost);
        assert!("forest".parse::<ModelFamily>().is_err());
    }

    #[test]
    fn test_predict_before_fit_is_an_error() {
        let (matrix, _) = toy_matrix();
        let model = LightGbmClassifier::new(LightGbmParams::default()).unwrap();
        assert!(matches!(model.predict_proba(&matrix), Err(PipelineError::Model(_))));
    }

    #[test]
    fn test_every_family_learns_a_threshold() {
        let (matrix, labels) = toy_matrix();
        let families = [
            FamilyParams::CatBoost(CatBoostParams {
                iterations: 40,
                learning_rate: 0.3,
                min_data_in_leaf: 1,
                od_wait: None,
                ..CatBoostParams::default()
            }),
            FamilyParams::LightGbm(LightGbmParams {
                n_iter: 40,
                learning_rate: 0.3,
                min_data_in_leaf: 1,
                bagging_freq: 0,
                colsample_bynode: 1.0,
                colsample_bytree: 1.0,
                ..LightGbmParams::default()
            }),
            FamilyParams::XgBoost {
                params: XgBoostParams {
                    n_estimators: 40,
                    learning_rate: 0.3,
                    subsample: 1.0,
                    colsample_bytree: 1.0,
                    colsample_bylevel: 1.0,
                    colsample_bynode: 1.0,
                    lambda: 1.0,
                    alpha: 0.0,
                    ..XgBoostParams::default()
                },
                enable_categorical: false,
            },
        ];
        for params in families {
            let mut model = params.build(1).unwrap();
            assert_eq!(model.family(), params.family());
            model.fit(&matrix, &labels, None).unwrap();
            let proba = model.predict_proba(&matrix).unwrap();
            assert!(proba.iter().all(|p| (0.0..=1.0).contains(p)));
            assert!(proba[55] > proba[5], "{} did not separate", params.family());
            assert!(model.num_trees() > 0);
        }
    }

    #[test]
    fn test_invalid_params_are_rejected_at_construction() {
        let params = CatBoostParams {
            learning_rate: -0.1,
            ..CatBoostParams::default()
        };
        assert!(CatBoostClassifier::new(params, 1).is_err());
    }
}
