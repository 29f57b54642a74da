//! Regression trees produced by the growers

use super::matrix::FeatureMatrix;
use super::split::SplitRule;

/// A node of a regression tree
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// Terminal node holding the (shrunk) leaf value
    Leaf {
        /// Additive contribution to the raw score
        value: f64,
    },
    /// Internal node
    Split {
        /// Feature index into the training matrix
        feature: usize,
        /// Routing rule
        rule: SplitRule,
        /// Index of the left child
        left: usize,
        /// Index of the right child
        right: usize,
    },
}

/// Regression tree stored as a flat node list, node 0 is the root
#[derive(Debug, Clone, PartialEq)]
pub struct Tree {
    nodes: Vec<Node>,
}

impl Default for Tree {
    fn default() -> Self {
        Self::new()
    }
}

impl Tree {
    /// Tree consisting of a single zero leaf
    #[must_use]
    pub fn new() -> Self {
        Self {
            nodes: vec![Node::Leaf { value: 0.0 }],
        }
    }

    /// Turn a leaf into a split and return the indices of the new children
    pub fn split(&mut self, node: usize, feature: usize, rule: SplitRule) -> (usize, usize) {
        let left = self.nodes.len();
        let right = left + 1;
        self.nodes.push(Node::Leaf { value: 0.0 });
        self.nodes.push(Node::Leaf { value: 0.0 });
        self.nodes[node] = Node::Split {
            feature,
            rule,
            left,
            right,
        };
        (left, right)
    }

    /// Set the value of a leaf
    pub fn set_leaf(&mut self, node: usize, value: f64) {
        if let Node::Leaf { value: v } = &mut self.nodes[node] {
            *v = value;
        }
    }

    /// All nodes
    #[must_use]
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Number of leaves
    #[must_use]
    pub fn num_leaves(&self) -> usize {
        self.nodes
            .iter()
            .filter(|n| matches!(n, Node::Leaf { .. }))
            .count()
    }

    /// Raw contribution of one row of `matrix`
    #[must_use]
    pub fn predict_row(&self, matrix: &FeatureMatrix, row: usize) -> f64 {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                Node::Leaf { value } => return *value,
                Node::Split {
                    feature,
                    rule,
                    left,
                    right,
                } => {
                    idx = if rule.goes_left(matrix.column(*feature)[row]) {
                        *left
                    } else {
                        *right
                    };
                }
            }
        }
    }

    /// Add the tree's contribution for every row of `matrix` to `scores`
    pub fn accumulate(&self, matrix: &FeatureMatrix, scores: &mut [f64]) {
        for (row, score) in scores.iter_mut().enumerate() {
            *score += self.predict_row(matrix, row);
        }
    }
}
