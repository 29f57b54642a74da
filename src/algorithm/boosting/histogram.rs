//! Gradient/hessian histograms per tree node

use rayon::prelude::*;

use super::quantize::QuantizedMatrix;

/// Accumulated gradient statistics of a set of rows
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BinStat {
    /// Sum of gradients
    pub grad: f64,
    /// Sum of hessians
    pub hess: f64,
    /// Number of rows
    pub count: u32,
}

impl BinStat {
    /// Add one row
    pub fn add(&mut self, grad: f64, hess: f64) {
        self.grad += grad;
        self.hess += hess;
        self.count += 1;
    }

    /// Merge another statistic into this one
    pub fn merge(&mut self, other: &Self) {
        self.grad += other.grad;
        self.hess += other.hess;
        self.count += other.count;
    }

    /// Statistic of the rows in `self` that are not in `other`
    #[must_use]
    pub fn minus(&self, other: &Self) -> Self {
        Self {
            grad: self.grad - other.grad,
            hess: self.hess - other.hess,
            count: self.count.saturating_sub(other.count),
        }
    }
}

/// Per-feature bin statistics of one node
#[derive(Debug, Clone)]
pub struct NodeHistogram {
    features: Vec<Vec<BinStat>>,
    total: BinStat,
}

impl NodeHistogram {
    /// Build the histogram of the given rows
    ///
    /// Features are accumulated in parallel.
    #[must_use]
    pub fn build(qm: &QuantizedMatrix, rows: &[usize], grad: &[f64], hess: &[f64]) -> Self {
        let features = (0..qm.num_features())
            .into_par_iter()
            .map(|j| {
                let mut bins = vec![BinStat::default(); qm.feature_bins(j).num_bins()];
                let codes = qm.codes(j);
                for &r in rows {
                    bins[codes[r] as usize].add(grad[r], hess[r]);
                }
                bins
            })
            .collect();

        let mut total = BinStat::default();
        for &r in rows {
            total.add(grad[r], hess[r]);
        }
        Self { features, total }
    }

    /// Histogram of the sibling node: `parent - self`
    #[must_use]
    pub fn sibling_of(&self, parent: &Self) -> Self {
        let features = parent
            .features
            .iter()
            .zip(&self.features)
            .map(|(p, c)| p.iter().zip(c).map(|(a, b)| a.minus(b)).collect())
            .collect();
        Self {
            features,
            total: parent.total.minus(&self.total),
        }
    }

    /// Bins of one feature
    #[must_use]
    pub fn feature(&self, feature: usize) -> &[BinStat] {
        &self.features[feature]
    }

    /// Statistics of all rows in the node
    #[must_use]
    pub fn total(&self) -> BinStat {
        self.total
    }
}
