//! Feature quantization into histogram bins
//!
//! Bin 0 is reserved for missing values. Numeric features map a value `v`
//! to `1 + #{cuts < v}`, so "bin <= k" is the same test as `v <= cuts[k - 1]`.
//! Categorical features map each distinct value to its own bin.

use rayon::prelude::*;

use super::matrix::FeatureMatrix;

/// Bin reserved for missing values
pub const MISSING_BIN: u16 = 0;

/// Largest number of distinct values kept for a categorical feature
pub const MAX_CATEGORIES: usize = 256;

/// Bin boundaries of a single feature
#[derive(Debug, Clone, PartialEq)]
pub enum FeatureBins {
    /// Sorted upper bounds for numeric bins `1..=cuts.len()`
    Numeric(Vec<f64>),
    /// Sorted category values, bin `i + 1` holds `values[i]`
    Categorical(Vec<f64>),
}

impl FeatureBins {
    /// Total number of bins including the missing bin
    #[must_use]
    pub fn num_bins(&self) -> usize {
        match self {
            Self::Numeric(cuts) => cuts.len() + 2,
            Self::Categorical(values) => values.len() + 1,
        }
    }

    /// Bin of a raw value
    #[must_use]
    pub fn bin(&self, value: f64) -> u16 {
        if value.is_nan() {
            return MISSING_BIN;
        }
        match self {
            Self::Numeric(cuts) => (1 + cuts.partition_point(|&c| c < value)) as u16,
            Self::Categorical(values) => values
                .binary_search_by(|probe| probe.total_cmp(&value))
                .map_or(MISSING_BIN, |i| (i + 1) as u16),
        }
    }
}

/// Quantized copy of a feature matrix
#[derive(Debug, Clone)]
pub struct QuantizedMatrix {
    bins: Vec<FeatureBins>,
    codes: Vec<Vec<u16>>,
    rows: usize,
}

impl QuantizedMatrix {
    /// Quantize every feature of a matrix
    ///
    /// # Arguments
    /// * `matrix` - Raw feature matrix
    /// * `max_bins` - Upper bound on numeric bins per feature (excluding missing)
    #[must_use]
    pub fn from_matrix(matrix: &FeatureMatrix, max_bins: usize) -> Self {
        let bins: Vec<FeatureBins> = (0..matrix.num_features())
            .into_par_iter()
            .map(|j| {
                if matrix.is_categorical(j) {
                    categorical_bins(matrix.column(j))
                } else {
                    FeatureBins::Numeric(numeric_cuts(matrix.column(j), max_bins))
                }
            })
            .collect();
        let codes = bins
            .par_iter()
            .enumerate()
            .map(|(j, b)| matrix.column(j).iter().map(|&v| b.bin(v)).collect())
            .collect();
        Self {
            bins,
            codes,
            rows: matrix.num_rows(),
        }
    }

    /// Number of rows
    #[must_use]
    pub fn num_rows(&self) -> usize {
        self.rows
    }

    /// Number of features
    #[must_use]
    pub fn num_features(&self) -> usize {
        self.bins.len()
    }

    /// Bin layout of a feature
    #[must_use]
    pub fn feature_bins(&self, feature: usize) -> &FeatureBins {
        &self.bins[feature]
    }

    /// Bin codes of a feature column
    #[must_use]
    pub fn codes(&self, feature: usize) -> &[u16] {
        &self.codes[feature]
    }
}

fn numeric_cuts(values: &[f64], max_bins: usize) -> Vec<f64> {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
    sorted.sort_by(f64::total_cmp);
    sorted.dedup();
    if sorted.len() <= 1 {
        return Vec::new();
    }

    let max_bins = max_bins.max(2);
    if sorted.len() <= max_bins {
        // midpoints between consecutive distinct values
        return sorted.windows(2).map(|w| w[0] + (w[1] - w[0]) / 2.0).collect();
    }

    let mut cuts: Vec<f64> = (1..max_bins)
        .map(|k| {
            let idx = k * sorted.len() / max_bins;
            sorted[idx - 1] + (sorted[idx] - sorted[idx - 1]) / 2.0
        })
        .collect();
    cuts.dedup();
    cuts
}

fn categorical_bins(values: &[f64]) -> FeatureBins {
    let mut distinct: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
    distinct.sort_by(f64::total_cmp);
    distinct.dedup();
    distinct.truncate(MAX_CATEGORIES);
    FeatureBins::Categorical(distinct)
}
