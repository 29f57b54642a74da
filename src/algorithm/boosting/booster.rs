//! Gradient boosting for binary logloss

use log::debug;
use rand::rngs::StdRng;
use rand::seq::index;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;

use super::grower::{TreeGrower, TreeParams, sample_features};
use super::matrix::FeatureMatrix;
use super::quantize::QuantizedMatrix;
use super::tree::Tree;
use crate::error::{PipelineError, Result};

const MIN_HESSIAN: f64 = 1e-16;
const PROBABILITY_CLIP: f64 = 1e-15;

/// Row sampling applied before each tree
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum RowSampling {
    /// Every row, unit weight
    #[default]
    None,
    /// Fresh subsample without replacement every iteration
    Subsample {
        /// Fraction of rows kept
        fraction: f64,
    },
    /// Subsample without replacement, redrawn every `freq` iterations
    Bagging {
        /// Fraction of rows kept
        fraction: f64,
        /// Redraw period, 0 disables bagging
        freq: usize,
    },
    /// Every row with weight `(-ln U)^temperature`
    Bayesian {
        /// Bootstrap temperature, 0 gives unit weights
        temperature: f64,
    },
}

/// Configuration of a boosting run
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoosterParams {
    /// Number of boosting rounds
    pub iterations: usize,
    /// Per-tree settings
    pub tree: TreeParams,
    /// Maximum bins per numeric feature
    pub max_bins: usize,
    /// Weight multiplier of positive rows
    pub scale_pos_weight: f64,
    /// Row sampling scheme
    pub row_sampling: RowSampling,
    /// Fraction of features available to each tree
    pub colsample_bytree: f64,
    /// Scale of the split-score noise, decays over the run
    pub random_strength: f64,
    /// Stop when the eval loss has not improved for this many rounds
    pub early_stopping_rounds: Option<usize>,
}

impl Default for BoosterParams {
    fn default() -> Self {
        Self {
            iterations: 100,
            tree: TreeParams::default(),
            max_bins: 255,
            scale_pos_weight: 1.0,
            row_sampling: RowSampling::None,
            colsample_bytree: 1.0,
            random_strength: 0.0,
            early_stopping_rounds: None,
        }
    }
}

/// A fitted additive tree model
#[derive(Debug, Clone, PartialEq)]
pub struct GradientBooster {
    feature_names: Vec<String>,
    base_score: f64,
    trees: Vec<Tree>,
    best_iteration: Option<usize>,
}

impl GradientBooster {
    /// Fit a booster on labelled rows
    ///
    /// # Arguments
    /// * `params` - Boosting configuration
    /// * `train` - Training features
    /// * `labels` - 0/1 labels aligned with `train`
    /// * `eval` - Optional evaluation set for early stopping
    /// * `seed` - Seed for every random draw of the run
    ///
    /// # Errors
    /// Returns an error if labels and rows disagree, the eval set has other
    /// features, or the training set is empty
    pub fn fit(
        params: &BoosterParams,
        train: &FeatureMatrix,
        labels: &[u8],
        eval: Option<(&FeatureMatrix, &[u8])>,
        seed: u64,
    ) -> Result<Self> {
        if labels.len() != train.num_rows() {
            return Err(PipelineError::Model(format!(
                "{} labels for {} training rows",
                labels.len(),
                train.num_rows()
            )));
        }
        if train.num_rows() == 0 {
            return Err(PipelineError::Model("empty training set".to_string()));
        }
        if let Some((matrix, eval_labels)) = eval {
            if matrix.names() != train.names() {
                return Err(PipelineError::Model(
                    "eval features differ from training features".to_string(),
                ));
            }
            if eval_labels.len() != matrix.num_rows() {
                return Err(PipelineError::Model(format!(
                    "{} labels for {} eval rows",
                    eval_labels.len(),
                    matrix.num_rows()
                )));
            }
        }

        let mut rng = StdRng::seed_from_u64(seed);
        let qm = QuantizedMatrix::from_matrix(train, params.max_bins);
        let n = train.num_rows();
        let row_weights: Vec<f64> = labels
            .iter()
            .map(|&y| if y == 1 { params.scale_pos_weight } else { 1.0 })
            .collect();

        let base_score = weighted_logit_prior(labels, &row_weights);
        let mut train_scores = vec![base_score; n];
        let mut eval_scores = eval.map(|(m, _)| vec![base_score; m.num_rows()]);

        let all_features: Vec<usize> = (0..train.num_features()).collect();
        let mut grad = vec![0.0; n];
        let mut hess = vec![0.0; n];
        let mut bag: Vec<usize> = (0..n).collect();
        let mut trees = Vec::with_capacity(params.iterations);
        let mut best: Option<(usize, f64)> = None;

        for iter in 0..params.iterations {
            compute_gradients(&train_scores, labels, &row_weights, &mut grad, &mut hess);

            let rows = match params.row_sampling {
                RowSampling::None => (0..n).collect(),
                RowSampling::Subsample { fraction } => sample_rows(n, fraction, &mut rng),
                RowSampling::Bagging { fraction, freq } => {
                    if freq > 0 && iter % freq == 0 {
                        bag = sample_rows(n, fraction, &mut rng);
                    }
                    bag.clone()
                }
                RowSampling::Bayesian { temperature } => {
                    if temperature > 0.0 {
                        for (g, h) in grad.iter_mut().zip(hess.iter_mut()) {
                            let u: f64 = rng.random_range(f64::EPSILON..1.0);
                            let w = (-u.ln()).powf(temperature);
                            *g *= w;
                            *h *= w;
                        }
                    }
                    (0..n).collect()
                }
            };

            let noise_std = if params.random_strength > 0.0 {
                let mean_sq = rows.iter().map(|&r| grad[r] * grad[r]).sum::<f64>()
                    / rows.len().max(1) as f64;
                let decay = 1.0 - iter as f64 / params.iterations as f64;
                params.random_strength * mean_sq.sqrt() * decay
            } else {
                0.0
            };

            let tree_features = sample_features(&all_features, params.colsample_bytree, &mut rng);
            let grower = TreeGrower::new(&qm, &params.tree, &grad, &hess);
            let tree = grower.grow(rows, &tree_features, &mut rng, noise_std);

            train_scores
                .par_iter_mut()
                .enumerate()
                .for_each(|(row, s)| *s += tree.predict_row(train, row));

            if let (Some((matrix, eval_labels)), Some(scores)) = (eval, eval_scores.as_mut()) {
                scores
                    .par_iter_mut()
                    .enumerate()
                    .for_each(|(row, s)| *s += tree.predict_row(matrix, row));
                let loss = logloss(scores, eval_labels);
                trees.push(tree);

                if best.is_none_or(|(_, b)| loss < b) {
                    best = Some((iter, loss));
                }
                if let (Some(rounds), Some((best_iter, best_loss))) =
                    (params.early_stopping_rounds, best)
                {
                    if iter - best_iter >= rounds {
                        debug!(
                            "Early stopping at iteration {iter}, best iteration {best_iter} (logloss {best_loss:.5})"
                        );
                        break;
                    }
                }
            } else {
                trees.push(tree);
            }
        }

        let best_iteration = match (params.early_stopping_rounds, best) {
            (Some(_), Some((best_iter, _))) => {
                trees.truncate(best_iter + 1);
                Some(best_iter)
            }
            _ => None,
        };

        Ok(Self {
            feature_names: train.names().to_vec(),
            base_score,
            trees,
            best_iteration,
        })
    }

    /// Feature names the model was trained on, in order
    #[must_use]
    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    /// Number of trees kept
    #[must_use]
    pub fn num_trees(&self) -> usize {
        self.trees.len()
    }

    /// Best eval iteration when early stopping was active
    #[must_use]
    pub const fn best_iteration(&self) -> Option<usize> {
        self.best_iteration
    }

    /// Raw additive scores (log-odds)
    ///
    /// # Errors
    /// Returns an error if the matrix features differ from the training features
    pub fn predict_raw(&self, matrix: &FeatureMatrix) -> Result<Vec<f64>> {
        if matrix.names() != self.feature_names.as_slice() {
            return Err(PipelineError::Model(
                "prediction features differ from training features".to_string(),
            ));
        }
        Ok((0..matrix.num_rows())
            .into_par_iter()
            .map(|row| {
                self.base_score
                    + self
                        .trees
                        .iter()
                        .map(|t| t.predict_row(matrix, row))
                        .sum::<f64>()
            })
            .collect())
    }

    /// Positive-class probabilities
    ///
    /// # Errors
    /// Returns an error if the matrix features differ from the training features
    pub fn predict_proba(&self, matrix: &FeatureMatrix) -> Result<Vec<f64>> {
        Ok(self.predict_raw(matrix)?.into_iter().map(sigmoid).collect())
    }
}

#[must_use]
pub fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

fn weighted_logit_prior(labels: &[u8], weights: &[f64]) -> f64 {
    let (pos, total) = labels
        .iter()
        .zip(weights)
        .fold((0.0, 0.0), |(p, t), (&y, &w)| {
            (if y == 1 { p + w } else { p }, t + w)
        });
    let prior = (pos / total).clamp(1e-6, 1.0 - 1e-6);
    (prior / (1.0 - prior)).ln()
}

fn compute_gradients(
    scores: &[f64],
    labels: &[u8],
    weights: &[f64],
    grad: &mut [f64],
    hess: &mut [f64],
) {
    grad.par_iter_mut()
        .zip(hess.par_iter_mut())
        .enumerate()
        .for_each(|(i, (g, h))| {
            let p = sigmoid(scores[i]);
            let y = f64::from(labels[i]);
            *g = weights[i] * (p - y);
            *h = (weights[i] * p * (1.0 - p)).max(MIN_HESSIAN);
        });
}

fn sample_rows(n: usize, fraction: f64, rng: &mut StdRng) -> Vec<usize> {
    if fraction >= 1.0 {
        return (0..n).collect();
    }
    let amount = ((n as f64 * fraction).round() as usize).clamp(1, n);
    let mut rows = index::sample(rng, n, amount).into_vec();
    rows.sort_unstable();
    rows
}

/// Mean binary cross-entropy of raw scores
#[must_use]
pub fn logloss(scores: &[f64], labels: &[u8]) -> f64 {
    if scores.is_empty() {
        return 0.0;
    }
    let total: f64 = scores
        .iter()
        .zip(labels)
        .map(|(&s, &y)| {
            let p = sigmoid(s).clamp(PROBABILITY_CLIP, 1.0 - PROBABILITY_CLIP);
            if y == 1 { -p.ln() } else { -(1.0 - p).ln() }
        })
        .sum();
    total / scores.len() as f64
}
