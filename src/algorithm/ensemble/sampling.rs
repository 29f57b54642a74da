//! Class-imbalance resampling and training-slice noise
//!
//! Both operate on the training slice of a fold only. Resampling returns row
//! positions into the slice, so the same draw applies to features and labels.

use log::debug;
use rand::Rng;
use rand::rngs::StdRng;
use rand::seq::index;
use rand_distr::{Distribution, Normal};

use crate::algorithm::boosting::FeatureMatrix;
use crate::config::SamplingConfig;
use crate::error::{PipelineError, Result};

fn class_rows(labels: &[u8], rows: &[usize]) -> (Vec<usize>, Vec<usize>) {
    rows.iter().partition(|&&r| labels[r] == 1)
}

/// Random oversampling of positives with replacement
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RandomOverSampler {
    /// Target positive-to-negative ratio after sampling
    pub ratio: f64,
}

impl RandomOverSampler {
    /// Add positive rows until `positives = floor(ratio * negatives)`
    ///
    /// Nothing is added when the positives already reach the target or there
    /// are none to copy. Drawn rows are appended after the input rows.
    #[must_use]
    pub fn resample(&self, labels: &[u8], rows: Vec<usize>, rng: &mut StdRng) -> Vec<usize> {
        let (positives, negatives) = class_rows(labels, &rows);
        let target = (self.ratio * negatives.len() as f64).floor() as usize;
        if positives.is_empty() || target <= positives.len() {
            debug!(
                "Skipping oversampling at ratio {}: {} positives, {} negatives",
                self.ratio,
                positives.len(),
                negatives.len()
            );
            return rows;
        }
        let extra = target - positives.len();
        debug!(
            "Oversampling {extra} positives onto {} (negatives {})",
            positives.len(),
            negatives.len()
        );
        let mut out = rows;
        out.extend((0..extra).map(|_| positives[rng.random_range(0..positives.len())]));
        out
    }
}

/// Random undersampling of negatives without replacement
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RandomUnderSampler {
    /// Target positive-to-negative ratio after sampling
    pub ratio: f64,
}

impl RandomUnderSampler {
    /// Keep every positive and `floor(positives / ratio)` negatives
    ///
    /// Nothing is removed when the negatives are already below the target.
    /// Kept rows preserve their input order.
    #[must_use]
    pub fn resample(&self, labels: &[u8], rows: Vec<usize>, rng: &mut StdRng) -> Vec<usize> {
        let negative_slots: Vec<usize> = (0..rows.len()).filter(|&i| labels[rows[i]] == 0).collect();
        let positives = rows.len() - negative_slots.len();
        let target = (positives as f64 / self.ratio).floor() as usize;
        if target >= negative_slots.len() {
            debug!(
                "Skipping undersampling, ratio {} needs {target} negatives but only {} remain",
                self.ratio,
                negative_slots.len()
            );
            return rows;
        }
        debug!(
            "Undersampling negatives from {} to {target} (positives {positives})",
            negative_slots.len()
        );
        let mut keep = vec![true; rows.len()];
        for &slot in &negative_slots {
            keep[slot] = false;
        }
        for pick in index::sample(rng, negative_slots.len(), target) {
            keep[negative_slots[pick]] = true;
        }
        rows.into_iter()
            .zip(keep)
            .filter_map(|(row, kept)| kept.then_some(row))
            .collect()
    }
}

/// Rows of a training slice after oversampling then undersampling
///
/// # Arguments
/// * `labels` - Labels of the full table
/// * `rows` - Training rows of the fold
/// * `config` - Sampling ratios, `None` skips a step
/// * `rng` - Fold random source
#[must_use]
pub fn resample_rows(
    labels: &[u8],
    rows: Vec<usize>,
    config: &SamplingConfig,
    rng: &mut StdRng,
) -> Vec<usize> {
    let rows = match config.oversample_ratio {
        Some(ratio) => RandomOverSampler { ratio }.resample(labels, rows, rng),
        None => rows,
    };
    match config.undersample_ratio {
        Some(ratio) => RandomUnderSampler { ratio }.resample(labels, rows, rng),
        None => rows,
    }
}

/// Add zero-mean Gaussian noise to the configured columns of a matrix
///
/// Columns absent from the matrix are skipped.
///
/// # Returns
/// Number of columns perturbed
///
/// # Errors
/// Returns an error if the noise scale is negative or not finite
pub fn add_column_noise(
    matrix: &mut FeatureMatrix,
    columns: &[String],
    std: f64,
    rng: &mut StdRng,
) -> Result<usize> {
    if std == 0.0 {
        return Ok(0);
    }
    let normal = Normal::new(0.0, std)
        .map_err(|e| PipelineError::config(format!("invalid noise scale {std}: {e}")))?;
    let mut perturbed = 0;
    for name in columns {
        let Some(values) = matrix.column_mut(name) else {
            debug!("Noise column '{name}' is not a model input, skipping");
            continue;
        };
        for v in values.iter_mut() {
            *v += normal.sample(rng);
        }
        perturbed += 1;
    }
    Ok(perturbed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn labels(pos: usize, neg: usize) -> Vec<u8> {
        let mut labels = vec![1; pos];
        labels.extend(vec![0; neg]);
        labels
    }

    #[test]
    fn test_oversampling_reaches_the_target_ratio() {
        let labels = labels(2, 2000);
        let mut rng = StdRng::seed_from_u64(1);
        let rows = RandomOverSampler { ratio: 0.003 }.resample(&labels, (0..2002).collect(), &mut rng);
        let positives = rows.iter().filter(|&&r| labels[r] == 1).count();
        assert_eq!(positives, 6);
        assert_eq!(rows.len(), 2006);
        assert!(rows[2002..].iter().all(|&r| r < 2));
    }

    #[test]
    fn test_oversampling_is_a_noop_past_the_target() {
        let labels = labels(10, 100);
        let mut rng = StdRng::seed_from_u64(1);
        let rows = RandomOverSampler { ratio: 0.003 }.resample(&labels, (0..110).collect(), &mut rng);
        assert_eq!(rows, (0..110).collect::<Vec<_>>());
    }

    #[test]
    fn test_undersampling_keeps_all_positives() {
        let labels = labels(3, 1000);
        let mut rng = StdRng::seed_from_u64(5);
        let rows = RandomUnderSampler { ratio: 0.01 }.resample(&labels, (0..1003).collect(), &mut rng);
        assert_eq!(rows.len(), 303);
        assert_eq!(&rows[..3], &[0, 1, 2]);
        assert!(rows.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_undersampling_is_a_noop_below_the_target() {
        let labels = labels(30, 100);
        let mut rng = StdRng::seed_from_u64(5);
        let rows = RandomUnderSampler { ratio: 0.01 }.resample(&labels, (0..130).collect(), &mut rng);
        assert_eq!(rows, (0..130).collect::<Vec<_>>());
    }

    #[test]
    fn test_resample_applies_both_steps() {
        let labels = labels(2, 2000);
        let mut rng = StdRng::seed_from_u64(9);
        let rows = resample_rows(&labels, (0..2002).collect(), &SamplingConfig::default(), &mut rng);
        let positives = rows.iter().filter(|&&r| labels[r] == 1).count();
        assert_eq!(positives, 6);
        assert_eq!(rows.len() - positives, 600);
    }

    #[test]
    fn test_noise_only_touches_named_columns() {
        let mut matrix = FeatureMatrix::new(
            vec!["predictions_eva".into(), "age_approx".into()],
            vec![vec![0.5; 50], vec![40.0; 50]],
            vec![false, false],
        )
        .unwrap();
        let mut rng = StdRng::seed_from_u64(2);
        let columns = vec!["predictions_eva".to_string(), "predictions_edg".to_string()];
        let perturbed = add_column_noise(&mut matrix, &columns, 0.1, &mut rng).unwrap();
        assert_eq!(perturbed, 1);
        assert!(matrix.column(0).iter().any(|&v| v != 0.5));
        assert!(matrix.column(1).iter().all(|&v| v == 40.0));
    }
}
