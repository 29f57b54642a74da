//! Partial area under the ROC curve
//!
//! The validation metric rewards ranking malignant lesions ahead of benign
//! ones in the high-sensitivity region: labels and scores are inverted, the
//! ROC area is restricted to `max_fpr = 1 - min_tpr`, McClish-standardized,
//! and finally mapped back onto the raw partial-area scale.

use crate::error::{PipelineError, Result};

/// Sensitivity floor of the competition metric
pub const DEFAULT_MIN_TPR: f64 = 0.80;

/// ROC curve points `(fpr, tpr)` at every distinct score threshold,
/// starting from `(0, 0)`
fn roc_points(labels: &[u8], scores: &[f64]) -> Result<Vec<(f64, f64)>> {
    if labels.len() != scores.len() {
        return Err(PipelineError::Metric(format!(
            "{} labels for {} scores",
            labels.len(),
            scores.len()
        )));
    }
    if let Some(bad) = scores.iter().find(|s| !s.is_finite()) {
        return Err(PipelineError::Metric(format!("non-finite score {bad}")));
    }
    let positives = labels.iter().filter(|&&y| y == 1).count();
    let negatives = labels.len() - positives;
    if positives == 0 || negatives == 0 {
        return Err(PipelineError::Metric(
            "only one class present in labels, ROC AUC is undefined".to_string(),
        ));
    }

    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]));

    let mut points = vec![(0.0, 0.0)];
    let (mut tp, mut fp) = (0usize, 0usize);
    for (pos, &idx) in order.iter().enumerate() {
        if labels[idx] == 1 {
            tp += 1;
        } else {
            fp += 1;
        }
        let last_of_threshold = order
            .get(pos + 1)
            .is_none_or(|&next| scores[next] != scores[idx]);
        if last_of_threshold {
            points.push((fp as f64 / negatives as f64, tp as f64 / positives as f64));
        }
    }
    Ok(points)
}

fn trapezoid(points: &[(f64, f64)]) -> f64 {
    points
        .windows(2)
        .map(|w| (w[1].0 - w[0].0) * (w[0].1 + w[1].1) / 2.0)
        .sum()
}

/// Area under the ROC curve, optionally standardized partial area
///
/// With `max_fpr` the curve is cut at that false-positive rate (linearly
/// interpolated) and the area is McClish-standardized so that a random
/// ranking scores 0.5 and a perfect one 1.0.
///
/// # Errors
/// Returns an error if only one class is present, a score is not finite, the
/// inputs differ in length, or `max_fpr` is outside `(0, 1]`
pub fn roc_auc(labels: &[u8], scores: &[f64], max_fpr: Option<f64>) -> Result<f64> {
    let points = roc_points(labels, scores)?;
    let Some(max_fpr) = max_fpr.filter(|&m| m != 1.0) else {
        return Ok(trapezoid(&points));
    };
    if !(max_fpr > 0.0 && max_fpr <= 1.0) {
        return Err(PipelineError::Metric(format!(
            "max_fpr must be in (0, 1], got {max_fpr}"
        )));
    }

    let stop = points.partition_point(|&(fpr, _)| fpr <= max_fpr);
    let (x0, y0) = points[stop - 1];
    let (x1, y1) = points[stop];
    let tpr_at_cut = if x1 > x0 {
        y0 + (y1 - y0) * (max_fpr - x0) / (x1 - x0)
    } else {
        y0
    };
    let mut clipped = points[..stop].to_vec();
    clipped.push((max_fpr, tpr_at_cut));
    let partial = trapezoid(&clipped);

    let min_area = 0.5 * max_fpr * max_fpr;
    let max_area = max_fpr;
    Ok(0.5 * (1.0 + (partial - min_area) / (max_area - min_area)))
}

/// Partial AUC above a true-positive-rate floor
///
/// Labels and scores are inverted (`1 - y`, `1 - p`), the standardized ROC
/// area is computed with `max_fpr = |1 - min_tpr|`, then rescaled to
/// `0.5 m² + (m - 0.5 m²) / 0.5 * (scaled - 0.5)`. The result lies in
/// `[0.5 m², m]` for rankings no worse than random.
///
/// # Arguments
/// * `labels` - 0/1 labels, 1 = malignant
/// * `scores` - Predicted malignancy probabilities
/// * `min_tpr` - Sensitivity floor, 0.8 for the competition metric
///
/// # Errors
/// Returns an error if only one class is present or a score is not finite
pub fn partial_auc_score(labels: &[u8], scores: &[f64], min_tpr: f64) -> Result<f64> {
    let max_fpr = (1.0 - min_tpr).abs();
    let inverted_labels: Vec<u8> = labels.iter().map(|&y| u8::from(y == 0)).collect();
    let inverted_scores: Vec<f64> = scores.iter().map(|p| 1.0 - p).collect();
    let scaled = roc_auc(&inverted_labels, &inverted_scores, Some(max_fpr))?;
    let floor = 0.5 * max_fpr * max_fpr;
    Ok(floor + (max_fpr - floor) / (1.0 - 0.5) * (scaled - 0.5))
}
