//! Column standardization

use crate::utils::stats::{nan_mean, nan_std};

/// Per-column mean and scale fit on a whole dataset
#[derive(Debug, Clone, PartialEq)]
pub struct StandardScaler {
    means: Vec<f64>,
    scales: Vec<f64>,
}

impl StandardScaler {
    /// Fit on columns using the population standard deviation
    ///
    /// A column with zero spread (or no present values) is scaled by 1.
    #[must_use]
    pub fn fit(columns: &[&[f64]]) -> Self {
        let means = columns
            .iter()
            .map(|c| {
                let m = nan_mean(c);
                if m.is_nan() { 0.0 } else { m }
            })
            .collect();
        let scales = columns
            .iter()
            .map(|c| {
                let s = nan_std(c, 0);
                if s.is_nan() || s == 0.0 { 1.0 } else { s }
            })
            .collect();
        Self { means, scales }
    }

    /// Standardized point of one row
    ///
    /// Missing or infinite inputs map to 0, the column mean.
    #[must_use]
    pub fn transform_row(&self, columns: &[&[f64]], row: usize) -> Vec<f64> {
        columns
            .iter()
            .zip(self.means.iter().zip(&self.scales))
            .map(|(c, (mean, scale))| {
                let v = (c[row] - mean) / scale;
                if v.is_finite() { v } else { 0.0 }
            })
            .collect()
    }

    /// Column means
    #[must_use]
    pub fn means(&self) -> &[f64] {
        &self.means
    }

    /// Column scales
    #[must_use]
    pub fn scales(&self) -> &[f64] {
        &self.scales
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_population_std_and_constant_columns() {
        let a = [1.0, 3.0];
        let b = [5.0, 5.0];
        let scaler = StandardScaler::fit(&[&a, &b]);
        assert_eq!(scaler.means(), &[2.0, 5.0]);
        assert_eq!(scaler.scales(), &[1.0, 1.0]);
        assert_eq!(scaler.transform_row(&[&a, &b], 1), vec![1.0, 0.0]);
    }

    #[test]
    fn test_missing_maps_to_mean() {
        let a = [1.0, f64::NAN, 3.0];
        let scaler = StandardScaler::fit(&[&a]);
        assert_eq!(scaler.transform_row(&[&a], 1), vec![0.0]);
    }
}
