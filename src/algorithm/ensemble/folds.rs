//! Stratified group k-fold splitting
//!
//! Every patient's lesions land in exactly one validation fold. Patients are
//! assigned greedily, most class-skewed first, to the fold that keeps the
//! per-class distribution across folds most even.

use log::warn;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rustc_hash::FxHashMap;

use crate::error::{PipelineError, Result};

const NUM_CLASSES: usize = 2;

/// One train/validation split
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fold {
    /// Fold number, starting at 0
    pub index: usize,
    /// Training rows, ascending
    pub train: Vec<usize>,
    /// Validation rows, ascending
    pub validation: Vec<usize>,
}

/// Group-aware stratified k-fold splitter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StratifiedGroupKFold {
    n_splits: usize,
    shuffle: bool,
    seed: u64,
}

impl StratifiedGroupKFold {
    /// Create a splitter
    ///
    /// # Errors
    /// Returns an error if fewer than two splits are requested
    pub fn new(n_splits: usize, shuffle: bool, seed: u64) -> Result<Self> {
        if n_splits < 2 {
            return Err(PipelineError::config(format!(
                "stratified group k-fold needs at least 2 splits, got {n_splits}"
            )));
        }
        Ok(Self {
            n_splits,
            shuffle,
            seed,
        })
    }

    /// Number of folds
    #[must_use]
    pub const fn n_splits(&self) -> usize {
        self.n_splits
    }

    /// Split rows into folds
    ///
    /// # Arguments
    /// * `labels` - 0/1 label of every row
    /// * `groups` - Group key of every row
    ///
    /// # Errors
    /// Returns an error if the inputs differ in length or there are fewer
    /// groups than folds
    pub fn split<K: AsRef<str>>(&self, labels: &[u8], groups: &[K]) -> Result<Vec<Fold>> {
        if labels.len() != groups.len() {
            return Err(PipelineError::Data(format!(
                "{} labels for {} group keys",
                labels.len(),
                groups.len()
            )));
        }

        let mut keys: Vec<&str> = groups.iter().map(AsRef::as_ref).collect();
        keys.sort_unstable();
        keys.dedup();
        if keys.len() < self.n_splits {
            return Err(PipelineError::Data(format!(
                "cannot split {} groups into {} folds",
                keys.len(),
                self.n_splits
            )));
        }
        let group_of: FxHashMap<&str, usize> =
            keys.iter().enumerate().map(|(i, k)| (*k, i)).collect();
        let row_groups: Vec<usize> = groups.iter().map(|g| group_of[g.as_ref()]).collect();

        let mut counts = vec![[0.0f64; NUM_CLASSES]; keys.len()];
        let mut class_totals = [0.0f64; NUM_CLASSES];
        for (&group, &label) in row_groups.iter().zip(labels) {
            let class = usize::from(label == 1);
            counts[group][class] += 1.0;
            class_totals[class] += 1.0;
        }
        if let Some(smallest) = class_totals.iter().copied().reduce(f64::min) {
            if smallest < self.n_splits as f64 {
                warn!(
                    "The least populated class has only {smallest} members, fewer than {} folds",
                    self.n_splits
                );
            }
        }

        let mut order: Vec<usize> = (0..keys.len()).collect();
        if self.shuffle {
            let mut rng = StdRng::seed_from_u64(self.seed);
            order.shuffle(&mut rng);
        }
        // stable, so equally skewed groups keep the shuffled order
        order.sort_by(|&a, &b| class_std(&counts[b]).total_cmp(&class_std(&counts[a])));

        let mut fold_counts = vec![[0.0f64; NUM_CLASSES]; self.n_splits];
        let mut fold_of_group = vec![0usize; keys.len()];
        for group in order {
            let fold = best_fold(&mut fold_counts, &counts[group], &class_totals);
            for class in 0..NUM_CLASSES {
                fold_counts[fold][class] += counts[group][class];
            }
            fold_of_group[group] = fold;
        }

        Ok((0..self.n_splits)
            .map(|index| {
                let (validation, train): (Vec<usize>, Vec<usize>) =
                    (0..labels.len()).partition(|&row| fold_of_group[row_groups[row]] == index);
                Fold {
                    index,
                    train,
                    validation,
                }
            })
            .collect())
    }
}

fn population_std(values: impl Iterator<Item = f64> + Clone) -> f64 {
    let n = values.clone().count() as f64;
    let mean = values.clone().sum::<f64>() / n;
    (values.map(|v| (v - mean).powi(2)).sum::<f64>() / n).sqrt()
}

fn class_std(counts: &[f64; NUM_CLASSES]) -> f64 {
    population_std(counts.iter().copied())
}

fn is_close(a: f64, b: f64) -> bool {
    (a - b).abs() <= 1e-8 + 1e-5 * b.abs()
}

/// Fold whose class distribution stays most even after adding the group,
/// ties going to the fold with fewer rows
fn best_fold(
    fold_counts: &mut [[f64; NUM_CLASSES]],
    group: &[f64; NUM_CLASSES],
    class_totals: &[f64; NUM_CLASSES],
) -> usize {
    let mut best = 0;
    let mut min_eval = f64::INFINITY;
    let mut min_rows = f64::INFINITY;
    for fold in 0..fold_counts.len() {
        for class in 0..NUM_CLASSES {
            fold_counts[fold][class] += group[class];
        }
        let eval = (0..NUM_CLASSES)
            .map(|class| {
                let total = class_totals[class];
                population_std(fold_counts.iter().map(move |c| {
                    if total > 0.0 { c[class] / total } else { 0.0 }
                }))
            })
            .sum::<f64>()
            / NUM_CLASSES as f64;
        for class in 0..NUM_CLASSES {
            fold_counts[fold][class] -= group[class];
        }

        let rows: f64 = fold_counts[fold].iter().sum();
        if eval < min_eval || (is_close(eval, min_eval) && rows < min_rows) {
            min_eval = eval;
            min_rows = rows;
            best = fold;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn fixture() -> (Vec<u8>, Vec<String>) {
        let mut labels = Vec::new();
        let mut groups = Vec::new();
        for patient in 0..20 {
            for lesion in 0..(patient % 4 + 1) {
                labels.push(u8::from(lesion == 0 && patient % 3 == 0));
                groups.push(format!("p{patient}"));
            }
        }
        (labels, groups)
    }

    #[test]
    fn test_groups_never_cross_folds() {
        let (labels, groups) = fixture();
        let folds = StratifiedGroupKFold::new(5, true, 7).unwrap().split(&labels, &groups).unwrap();
        assert_eq!(folds.len(), 5);

        let mut seen = HashSet::new();
        for fold in &folds {
            assert_eq!(fold.train.len() + fold.validation.len(), labels.len());
            let fold_groups: HashSet<&str> =
                fold.validation.iter().map(|&r| groups[r].as_str()).collect();
            for g in &fold_groups {
                assert!(seen.insert(*g), "group {g} validated twice");
            }
            for &r in &fold.train {
                assert!(!fold_groups.contains(groups[r].as_str()));
            }
        }
        assert_eq!(seen.len(), 20);
    }

    #[test]
    fn test_positives_are_spread_across_folds() {
        let (labels, groups) = fixture();
        let folds = StratifiedGroupKFold::new(5, true, 3).unwrap().split(&labels, &groups).unwrap();
        for fold in &folds {
            let positives = fold.validation.iter().filter(|&&r| labels[r] == 1).count();
            assert!(positives >= 1, "fold {} has no positives", fold.index);
        }
    }

    #[test]
    fn test_split_is_deterministic_per_seed() {
        let (labels, groups) = fixture();
        let a = StratifiedGroupKFold::new(5, true, 11).unwrap().split(&labels, &groups).unwrap();
        let b = StratifiedGroupKFold::new(5, true, 11).unwrap().split(&labels, &groups).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_too_few_groups_is_an_error() {
        let groups = ["a", "a", "b"];
        let result = StratifiedGroupKFold::new(5, false, 0).unwrap().split(&[0, 1, 0], &groups);
        assert!(result.is_err());
        assert!(StratifiedGroupKFold::new(1, false, 0).is_err());
    }
}
