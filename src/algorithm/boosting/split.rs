//! Split evaluation over node histograms
//!
//! Gains use the second-order objective with L1 thresholding on the gradient
//! sum and L2 regularization on the hessian sum.

use rand::rngs::StdRng;
use rand_distr::{Distribution, StandardNormal};

use super::histogram::{BinStat, NodeHistogram};
use super::quantize::{FeatureBins, QuantizedMatrix};

/// Regularization and size limits applied to every split
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SplitParams {
    /// L1 penalty on leaf weights
    pub lambda_l1: f64,
    /// L2 penalty on leaf weights
    pub lambda_l2: f64,
    /// Minimum number of rows in each child
    pub min_data_in_leaf: u32,
    /// Minimum hessian sum in each child
    pub min_child_weight: f64,
    /// Minimum gain for a split to be kept
    pub min_split_gain: f64,
}

impl Default for SplitParams {
    fn default() -> Self {
        Self {
            lambda_l1: 0.0,
            lambda_l2: 1.0,
            min_data_in_leaf: 1,
            min_child_weight: 1e-3,
            min_split_gain: 0.0,
        }
    }
}

impl SplitParams {
    fn thresholded(&self, grad: f64) -> f64 {
        if grad > self.lambda_l1 {
            grad - self.lambda_l1
        } else if grad < -self.lambda_l1 {
            grad + self.lambda_l1
        } else {
            0.0
        }
    }

    /// Optimal leaf weight of a set of rows (before shrinkage)
    #[must_use]
    pub fn leaf_weight(&self, stat: &BinStat) -> f64 {
        -self.thresholded(stat.grad) / (stat.hess + self.lambda_l2)
    }

    /// Objective reduction achieved by a leaf holding these rows
    #[must_use]
    pub fn leaf_objective(&self, stat: &BinStat) -> f64 {
        let g = self.thresholded(stat.grad);
        g * g / (stat.hess + self.lambda_l2)
    }

    /// Gain of splitting `parent` into `left` and `right`, `None` when a child
    /// violates the size limits
    #[must_use]
    pub fn split_gain(&self, parent: &BinStat, left: &BinStat, right: &BinStat) -> Option<f64> {
        if left.count < self.min_data_in_leaf
            || right.count < self.min_data_in_leaf
            || left.hess < self.min_child_weight
            || right.hess < self.min_child_weight
        {
            return None;
        }
        Some(self.leaf_objective(left) + self.leaf_objective(right) - self.leaf_objective(parent))
    }
}

/// Decision rule of an internal node
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SplitRule {
    /// `value <= threshold` goes left; missing follows `missing_left`
    Threshold {
        /// Last bin on the left side
        bin: u16,
        /// Raw-value threshold equivalent to `bin`
        threshold: f64,
        /// Direction of missing values
        missing_left: bool,
    },
    /// `value == category` goes left, everything else right
    Category {
        /// Bin of the category
        bin: u16,
        /// Raw category value
        value: f64,
    },
}

impl SplitRule {
    /// Route a quantized value
    #[must_use]
    pub fn goes_left_bin(&self, bin: u16) -> bool {
        match *self {
            Self::Threshold {
                bin: split_bin,
                missing_left,
                ..
            } => {
                if bin == 0 {
                    missing_left
                } else {
                    bin <= split_bin
                }
            }
            Self::Category { bin: split_bin, .. } => bin == split_bin,
        }
    }

    /// Route a raw value
    #[must_use]
    pub fn goes_left(&self, value: f64) -> bool {
        match *self {
            Self::Threshold {
                threshold,
                missing_left,
                ..
            } => {
                if value.is_nan() {
                    missing_left
                } else {
                    value <= threshold
                }
            }
            Self::Category { value: category, .. } => value == category,
        }
    }
}

/// A scored split of one node on one feature
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SplitCandidate {
    /// Feature index
    pub feature: usize,
    /// Decision rule
    pub rule: SplitRule,
    /// Unperturbed gain
    pub gain: f64,
    /// Statistics routed left
    pub left: BinStat,
    /// Statistics routed right
    pub right: BinStat,
}

/// Gaussian perturbation of split scores
#[derive(Debug)]
pub struct ScoreNoise<'a> {
    rng: Option<&'a mut StdRng>,
    std: f64,
}

impl<'a> ScoreNoise<'a> {
    /// No perturbation
    #[must_use]
    pub fn none() -> Self {
        Self { rng: None, std: 0.0 }
    }

    /// Perturb scores with `N(0, std)` noise
    pub fn gaussian(rng: &'a mut StdRng, std: f64) -> Self {
        Self { rng: Some(rng), std }
    }

    /// Score used to rank a candidate
    pub fn perturb(&mut self, gain: f64) -> f64 {
        match self.rng.as_deref_mut() {
            Some(rng) if self.std > 0.0 => {
                let z: f64 = StandardNormal.sample(rng);
                gain + self.std * z
            }
            _ => gain,
        }
    }
}

/// Enumerate every rule of a feature with the statistics it routes each way
///
/// The rule list depends only on the bin layout, so it lines up across nodes.
#[must_use]
pub fn scan_feature(
    bins: &FeatureBins,
    stats: &[BinStat],
    total: &BinStat,
) -> Vec<(SplitRule, BinStat, BinStat)> {
    let mut out = Vec::new();
    match bins {
        FeatureBins::Numeric(cuts) => {
            let missing = stats[0];
            let present = total.minus(&missing);
            let mut running = BinStat::default();
            for (k, &threshold) in cuts.iter().enumerate() {
                let bin = k + 1;
                running.merge(&stats[bin]);
                let right = present.minus(&running);
                let mut right_with_missing = right;
                right_with_missing.merge(&missing);
                out.push((
                    SplitRule::Threshold {
                        bin: bin as u16,
                        threshold,
                        missing_left: false,
                    },
                    running,
                    right_with_missing,
                ));
                let mut left_with_missing = running;
                left_with_missing.merge(&missing);
                out.push((
                    SplitRule::Threshold {
                        bin: bin as u16,
                        threshold,
                        missing_left: true,
                    },
                    left_with_missing,
                    right,
                ));
            }
        }
        FeatureBins::Categorical(values) => {
            for (i, &value) in values.iter().enumerate() {
                let bin = i + 1;
                let left = stats[bin];
                out.push((
                    SplitRule::Category {
                        bin: bin as u16,
                        value,
                    },
                    left,
                    total.minus(&left),
                ));
            }
        }
    }
    out
}

/// Best split of one node over the allowed features
///
/// Candidates are ranked by their perturbed score; only candidates whose raw
/// gain exceeds `min_split_gain` qualify.
pub fn best_split(
    qm: &QuantizedMatrix,
    hist: &NodeHistogram,
    features: &[usize],
    params: &SplitParams,
    noise: &mut ScoreNoise<'_>,
) -> Option<SplitCandidate> {
    let total = hist.total();
    let mut best: Option<(f64, SplitCandidate)> = None;
    for &feature in features {
        for (rule, left, right) in scan_feature(qm.feature_bins(feature), hist.feature(feature), &total)
        {
            let Some(gain) = params.split_gain(&total, &left, &right) else {
                continue;
            };
            if gain <= params.min_split_gain {
                continue;
            }
            let score = noise.perturb(gain);
            if best.as_ref().is_none_or(|(s, _)| score > *s) {
                best = Some((
                    score,
                    SplitCandidate {
                        feature,
                        rule,
                        gain,
                        left,
                        right,
                    },
                ));
            }
        }
    }
    best.map(|(_, c)| c)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stat(grad: f64, hess: f64, count: u32) -> BinStat {
        BinStat { grad, hess, count }
    }

    #[test]
    fn test_leaf_weight_applies_l1_and_l2() {
        let params = SplitParams {
            lambda_l1: 1.0,
            lambda_l2: 2.0,
            ..SplitParams::default()
        };
        assert_eq!(params.leaf_weight(&stat(-5.0, 2.0, 4)), 1.0);
        assert_eq!(params.leaf_weight(&stat(0.5, 2.0, 4)), 0.0);
    }

    #[test]
    fn test_scan_numeric_feature_routes_missing_both_ways() {
        let bins = FeatureBins::Numeric(vec![1.5]);
        let stats = [stat(1.0, 1.0, 1), stat(-2.0, 1.0, 2), stat(3.0, 1.0, 3)];
        let total = stat(2.0, 3.0, 6);
        let rules = scan_feature(&bins, &stats, &total);
        assert_eq!(rules.len(), 2);
        let (_, left, right) = rules[0];
        assert_eq!((left.count, right.count), (2, 4));
        let (_, left, right) = rules[1];
        assert_eq!((left.count, right.count), (3, 3));
    }

    #[test]
    fn test_rule_routing_matches_bins() {
        let rule = SplitRule::Threshold {
            bin: 2,
            threshold: 2.5,
            missing_left: false,
        };
        assert!(rule.goes_left_bin(2) && rule.goes_left(2.5));
        assert!(!rule.goes_left_bin(3) && !rule.goes_left(2.6));
        assert!(!rule.goes_left_bin(0) && !rule.goes_left(f64::NAN));

        let rule = SplitRule::Category { bin: 1, value: 0.0 };
        assert!(rule.goes_left(0.0) && !rule.goes_left(1.0) && !rule.goes_left(f64::NAN));
    }
}
