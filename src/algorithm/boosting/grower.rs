//! Tree growth policies
//!
//! Three policies cover the model families:
//! - [`GrowPolicy::DepthWise`] splits every node of a level before moving on
//! - [`GrowPolicy::LeafWise`] always splits the leaf with the largest gain
//! - [`GrowPolicy::Symmetric`] applies one shared split to the whole level

use rand::rngs::StdRng;
use rand::seq::index;

use super::histogram::NodeHistogram;
use super::quantize::QuantizedMatrix;
use super::split::{ScoreNoise, SplitCandidate, SplitParams, SplitRule, best_split, scan_feature};
use super::tree::Tree;

/// How a tree is expanded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GrowPolicy {
    /// Level by level
    #[default]
    DepthWise,
    /// Best-first by gain
    LeafWise,
    /// Oblivious trees with one split per level
    Symmetric,
}

/// Parameters controlling the shape of a single tree
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TreeParams {
    /// Expansion policy
    pub policy: GrowPolicy,
    /// Maximum depth, `None` for unlimited
    pub max_depth: Option<usize>,
    /// Maximum number of leaves, `None` for unlimited
    pub max_leaves: Option<usize>,
    /// Split regularization
    pub split: SplitParams,
    /// Shrinkage applied to leaf values
    pub learning_rate: f64,
    /// Fraction of the tree's features considered per level
    pub colsample_bylevel: f64,
    /// Fraction of the level's features considered per node
    pub colsample_bynode: f64,
}

impl Default for TreeParams {
    fn default() -> Self {
        Self {
            policy: GrowPolicy::DepthWise,
            max_depth: Some(6),
            max_leaves: None,
            split: SplitParams::default(),
            learning_rate: 0.1,
            colsample_bylevel: 1.0,
            colsample_bynode: 1.0,
        }
    }
}

struct LeafState {
    node: usize,
    rows: Vec<usize>,
    hist: NodeHistogram,
    depth: usize,
}

/// Grows one tree from gradient statistics
pub struct TreeGrower<'a> {
    qm: &'a QuantizedMatrix,
    params: &'a TreeParams,
    grad: &'a [f64],
    hess: &'a [f64],
}

impl<'a> TreeGrower<'a> {
    /// Create a grower over quantized training data
    #[must_use]
    pub fn new(
        qm: &'a QuantizedMatrix,
        params: &'a TreeParams,
        grad: &'a [f64],
        hess: &'a [f64],
    ) -> Self {
        Self {
            qm,
            params,
            grad,
            hess,
        }
    }

    /// Grow a tree on `rows` using only `features`
    ///
    /// # Arguments
    /// * `rows` - Training rows in the tree's sample
    /// * `features` - Features selected for this tree
    /// * `rng` - Source for column sampling and score noise
    /// * `noise_std` - Standard deviation of split-score noise
    pub fn grow(
        &self,
        rows: Vec<usize>,
        features: &[usize],
        rng: &mut StdRng,
        noise_std: f64,
    ) -> Tree {
        let mut tree = Tree::new();
        if rows.is_empty() || features.is_empty() {
            return tree;
        }
        let hist = NodeHistogram::build(self.qm, &rows, self.grad, self.hess);
        let root = LeafState {
            node: 0,
            rows,
            hist,
            depth: 0,
        };
        let leaves = match self.params.policy {
            GrowPolicy::DepthWise => self.grow_depth_wise(&mut tree, root, features, rng, noise_std),
            GrowPolicy::LeafWise => self.grow_leaf_wise(&mut tree, root, features, rng, noise_std),
            GrowPolicy::Symmetric => self.grow_symmetric(&mut tree, root, features, rng, noise_std),
        };
        for leaf in leaves {
            let value = self.params.split.leaf_weight(&leaf.hist.total()) * self.params.learning_rate;
            tree.set_leaf(leaf.node, value);
        }
        tree
    }

    fn depth_allows_split(&self, depth: usize) -> bool {
        self.params.max_depth.is_none_or(|d| depth < d)
    }

    fn leaves_allow_split(&self, leaves: usize) -> bool {
        self.params.max_leaves.is_none_or(|m| leaves < m)
    }

    fn find_split(
        &self,
        state: &LeafState,
        features: &[usize],
        rng: &mut StdRng,
        noise_std: f64,
    ) -> Option<SplitCandidate> {
        let node_features = sample_features(features, self.params.colsample_bynode, rng);
        let mut noise = ScoreNoise::gaussian(rng, noise_std);
        best_split(
            self.qm,
            &state.hist,
            &node_features,
            &self.params.split,
            &mut noise,
        )
    }

    fn apply_split(
        &self,
        tree: &mut Tree,
        state: LeafState,
        feature: usize,
        rule: SplitRule,
    ) -> (LeafState, LeafState) {
        let codes = self.qm.codes(feature);
        let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = state
            .rows
            .iter()
            .partition(|&&r| rule.goes_left_bin(codes[r]));
        let (left_node, right_node) = tree.split(state.node, feature, rule);

        // build the smaller child, derive the larger one by subtraction
        let (left_hist, right_hist) = if left_rows.len() <= right_rows.len() {
            let small = NodeHistogram::build(self.qm, &left_rows, self.grad, self.hess);
            let large = small.sibling_of(&state.hist);
            (small, large)
        } else {
            let small = NodeHistogram::build(self.qm, &right_rows, self.grad, self.hess);
            let large = small.sibling_of(&state.hist);
            (large, small)
        };

        let depth = state.depth + 1;
        (
            LeafState {
                node: left_node,
                rows: left_rows,
                hist: left_hist,
                depth,
            },
            LeafState {
                node: right_node,
                rows: right_rows,
                hist: right_hist,
                depth,
            },
        )
    }

    fn grow_depth_wise(
        &self,
        tree: &mut Tree,
        root: LeafState,
        features: &[usize],
        rng: &mut StdRng,
        noise_std: f64,
    ) -> Vec<LeafState> {
        let mut finished = Vec::new();
        let mut level = vec![root];
        let mut leaves = 1;
        while !level.is_empty() {
            let level_features = sample_features(features, self.params.colsample_bylevel, rng);
            let mut next = Vec::with_capacity(level.len() * 2);
            for state in level {
                if !self.depth_allows_split(state.depth) || !self.leaves_allow_split(leaves) {
                    finished.push(state);
                    continue;
                }
                match self.find_split(&state, &level_features, rng, noise_std) {
                    Some(candidate) => {
                        let (left, right) =
                            self.apply_split(tree, state, candidate.feature, candidate.rule);
                        leaves += 1;
                        next.push(left);
                        next.push(right);
                    }
                    None => finished.push(state),
                }
            }
            level = next;
        }
        finished
    }

    fn grow_leaf_wise(
        &self,
        tree: &mut Tree,
        root: LeafState,
        features: &[usize],
        rng: &mut StdRng,
        noise_std: f64,
    ) -> Vec<LeafState> {
        let mut open: Vec<(LeafState, Option<SplitCandidate>)> = Vec::new();
        let root_split = self.leaf_wise_candidate(&root, features, rng, noise_std);
        open.push((root, root_split));
        let mut leaves = 1;

        while self.leaves_allow_split(leaves) {
            let best = open
                .iter()
                .enumerate()
                .filter_map(|(i, (_, c))| c.map(|c| (i, c.gain)))
                .max_by(|a, b| a.1.total_cmp(&b.1));
            let Some((idx, _)) = best else {
                break;
            };
            let (state, candidate) = open.swap_remove(idx);
            let Some(candidate) = candidate else {
                break;
            };
            let (left, right) = self.apply_split(tree, state, candidate.feature, candidate.rule);
            leaves += 1;
            let left_split = self.leaf_wise_candidate(&left, features, rng, noise_std);
            let right_split = self.leaf_wise_candidate(&right, features, rng, noise_std);
            open.push((left, left_split));
            open.push((right, right_split));
        }
        open.into_iter().map(|(state, _)| state).collect()
    }

    fn leaf_wise_candidate(
        &self,
        state: &LeafState,
        features: &[usize],
        rng: &mut StdRng,
        noise_std: f64,
    ) -> Option<SplitCandidate> {
        if !self.depth_allows_split(state.depth) {
            return None;
        }
        let level_features = sample_features(features, self.params.colsample_bylevel, rng);
        self.find_split(state, &level_features, rng, noise_std)
    }

    fn grow_symmetric(
        &self,
        tree: &mut Tree,
        root: LeafState,
        features: &[usize],
        rng: &mut StdRng,
        noise_std: f64,
    ) -> Vec<LeafState> {
        let mut level = vec![root];
        let mut depth = 0;
        while self.depth_allows_split(depth) && self.leaves_allow_split(level.len()) {
            let level_features = sample_features(features, self.params.colsample_bylevel, rng);
            let Some((feature, rule)) =
                self.best_shared_split(&level, &level_features, rng, noise_std)
            else {
                break;
            };
            let mut next = Vec::with_capacity(level.len() * 2);
            for state in level {
                let (left, right) = self.apply_split(tree, state, feature, rule);
                next.push(left);
                next.push(right);
            }
            level = next;
            depth += 1;
        }
        level
    }

    /// Rule maximizing the summed gain over all nodes of a level
    fn best_shared_split(
        &self,
        level: &[LeafState],
        features: &[usize],
        rng: &mut StdRng,
        noise_std: f64,
    ) -> Option<(usize, SplitRule)> {
        let params = &self.params.split;
        let mut noise = ScoreNoise::gaussian(rng, noise_std);
        let mut best: Option<(f64, usize, SplitRule)> = None;
        for &feature in features {
            let bins = self.qm.feature_bins(feature);
            let scans: Vec<_> = level
                .iter()
                .map(|s| {
                    let total = s.hist.total();
                    (total, scan_feature(bins, s.hist.feature(feature), &total))
                })
                .collect();
            let Some((_, first)) = scans.first() else {
                continue;
            };
            for (i, (rule, _, _)) in first.iter().enumerate() {
                let gain: f64 = scans
                    .iter()
                    .filter_map(|(total, scan)| {
                        let (_, left, right) = &scan[i];
                        params.split_gain(total, left, right)
                    })
                    .sum();
                if gain <= params.min_split_gain {
                    continue;
                }
                let score = noise.perturb(gain);
                if best.as_ref().is_none_or(|(s, _, _)| score > *s) {
                    best = Some((score, feature, *rule));
                }
            }
        }
        best.map(|(_, feature, rule)| (feature, rule))
    }
}

/// Random subset of `features` of size `ceil(fraction * len)`, at least one
pub fn sample_features(features: &[usize], fraction: f64, rng: &mut StdRng) -> Vec<usize> {
    if fraction >= 1.0 || features.len() <= 1 {
        return features.to_vec();
    }
    let amount = ((features.len() as f64 * fraction).ceil() as usize).clamp(1, features.len());
    let mut picked: Vec<usize> = index::sample(rng, features.len(), amount)
        .into_iter()
        .map(|i| features[i])
        .collect();
    picked.sort_unstable();
    picked
}
