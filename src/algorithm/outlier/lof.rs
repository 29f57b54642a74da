//! Local outlier factor
//!
//! Exact brute-force neighbourhoods, which is plenty for per-patient groups.
//! Neighbour ties are broken by point index so scores are reproducible for a
//! fixed input order.

/// Added to the mean reachability distance before inverting it
const REACHABILITY_EPSILON: f64 = 1e-10;

fn euclidean(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y).powi(2))
        .sum::<f64>()
        .sqrt()
}

/// Effective neighbourhood size for a group of `n` points
///
/// The requested size is capped at `n - 1`, the number of other points.
#[must_use]
pub fn effective_neighbors(requested: usize, n: usize) -> usize {
    requested.min(n.saturating_sub(1)).max(1)
}

/// Negative local outlier factor of every point
///
/// Values near -1 are inliers, more negative values are outliers.
///
/// # Arguments
/// * `points` - Points of one group, all of the same dimension
/// * `n_neighbors` - Requested neighbourhood size
///
/// # Returns
/// One score per point, or an empty vector for fewer than two points
#[must_use]
pub fn negative_outlier_factor(points: &[Vec<f64>], n_neighbors: usize) -> Vec<f64> {
    let n = points.len();
    if n < 2 {
        return Vec::new();
    }
    let k = effective_neighbors(n_neighbors, n);

    let distances: Vec<Vec<f64>> = points
        .iter()
        .map(|p| points.iter().map(|q| euclidean(p, q)).collect())
        .collect();

    let neighbors: Vec<Vec<usize>> = (0..n)
        .map(|i| {
            let mut others: Vec<usize> = (0..n).filter(|&j| j != i).collect();
            others.sort_by(|&a, &b| {
                distances[i][a]
                    .total_cmp(&distances[i][b])
                    .then(a.cmp(&b))
            });
            others.truncate(k);
            others
        })
        .collect();

    let k_distance: Vec<f64> = (0..n)
        .map(|i| distances[i][neighbors[i][k - 1]])
        .collect();

    let lrd: Vec<f64> = (0..n)
        .map(|i| {
            let mean_reach = neighbors[i]
                .iter()
                .map(|&j| k_distance[j].max(distances[i][j]))
                .sum::<f64>()
                / k as f64;
            1.0 / (mean_reach + REACHABILITY_EPSILON)
        })
        .collect();

    (0..n)
        .map(|i| {
            let ratio = neighbors[i].iter().map(|&j| lrd[j] / lrd[i]).sum::<f64>() / k as f64;
            -ratio
        })
        .collect()
}
