//! Missing-aware descriptive statistics
//!
//! NaN marks a missing value everywhere in the pipeline. These helpers skip
//! missing values the way dataframe aggregations do.

use std::cmp::Ordering;

/// Mean of the non-missing values, NaN when none are present
#[must_use]
pub fn nan_mean(values: &[f64]) -> f64 {
    let (sum, count) = values
        .iter()
        .filter(|v| !v.is_nan())
        .fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
    if count == 0 { f64::NAN } else { sum / count as f64 }
}

/// Sum of the non-missing values (0 when none are present)
#[must_use]
pub fn nan_sum(values: &[f64]) -> f64 {
    values.iter().filter(|v| !v.is_nan()).sum()
}

/// Standard deviation of the non-missing values
///
/// # Arguments
/// * `values` - Input values
/// * `ddof` - Delta degrees of freedom (1 for sample, 0 for population)
///
/// # Returns
/// NaN when fewer than `ddof + 1` values are present
#[must_use]
pub fn nan_std(values: &[f64], ddof: usize) -> f64 {
    let present: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
    if present.len() <= ddof {
        return f64::NAN;
    }
    let mean = present.iter().sum::<f64>() / present.len() as f64;
    let ss: f64 = present.iter().map(|v| (v - mean).powi(2)).sum();
    (ss / (present.len() - ddof) as f64).sqrt()
}

/// Median of the non-missing values, NaN when none are present
#[must_use]
pub fn nan_median(values: &[f64]) -> f64 {
    let mut present: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
    if present.is_empty() {
        return f64::NAN;
    }
    present.sort_by(f64::total_cmp);
    let mid = present.len() / 2;
    if present.len() % 2 == 0 {
        (present[mid - 1] + present[mid]) / 2.0
    } else {
        present[mid]
    }
}

/// Percentile ranks with ties averaged, `rank / n_present`
///
/// Missing values keep a missing rank. Every present value maps into `(0, 1]`.
#[must_use]
pub fn percentile_rank(values: &[f64]) -> Vec<f64> {
    let mut order: Vec<usize> = (0..values.len()).filter(|&i| !values[i].is_nan()).collect();
    order.sort_by(|&a, &b| values[a].partial_cmp(&values[b]).unwrap_or(Ordering::Equal));

    let n = order.len() as f64;
    let mut ranks = vec![f64::NAN; values.len()];
    let mut start = 0;
    while start < order.len() {
        let mut end = start;
        while end + 1 < order.len() && values[order[end + 1]] == values[order[start]] {
            end += 1;
        }
        // 1-based ranks start+1 ..= end+1 share their average
        let avg = (start + end) as f64 / 2.0 + 1.0;
        for &idx in &order[start..=end] {
            ranks[idx] = avg / n;
        }
        start = end + 1;
    }
    ranks
}

/// Replace positive and negative infinity with NaN in place
///
/// # Returns
/// Number of values replaced
pub fn sweep_infinite(values: &mut [f64]) -> usize {
    let mut swept = 0;
    for v in values.iter_mut().filter(|v| v.is_infinite()) {
        *v = f64::NAN;
        swept += 1;
    }
    swept
}
