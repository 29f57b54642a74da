//! Rank fusion of ensemble member predictions
//!
//! Every member's probabilities are turned into percentile ranks within the
//! scored batch, ranks are averaged per family, and the family averages are
//! averaged with equal weight.

use log::info;
use std::collections::BTreeMap;

use super::classifier::ModelFamily;
use super::member::EnsembleMember;
use crate::algorithm::boosting::FeatureMatrix;
use crate::error::{PipelineError, Result};
use crate::table::LesionTable;
use crate::utils::logging::{create_main_progress_bar, finish_progress_bar};
use crate::utils::stats::percentile_rank;

/// Fuse per-member predictions into one score per row
///
/// # Arguments
/// * `predictions` - Family and raw predictions of every member
///
/// # Returns
/// Mean over families of the mean member percentile rank
///
/// # Errors
/// Returns an error if there are no predictions or their lengths differ
pub fn rank_fuse(predictions: &[(ModelFamily, Vec<f64>)]) -> Result<Vec<f64>> {
    let Some((_, first)) = predictions.first() else {
        return Err(PipelineError::Model("no predictions to fuse".to_string()));
    };
    let rows = first.len();
    if predictions.iter().any(|(_, p)| p.len() != rows) {
        return Err(PipelineError::Model(
            "member predictions differ in length".to_string(),
        ));
    }

    let mut per_family: BTreeMap<ModelFamily, (Vec<f64>, usize)> = BTreeMap::new();
    for (family, raw) in predictions {
        let (sums, count) = per_family
            .entry(*family)
            .or_insert_with(|| (vec![0.0; rows], 0));
        for (sum, rank) in sums.iter_mut().zip(percentile_rank(raw)) {
            *sum += rank;
        }
        *count += 1;
    }

    let families = per_family.len() as f64;
    let mut fused = vec![0.0; rows];
    for (sums, count) in per_family.values() {
        for (out, sum) in fused.iter_mut().zip(sums) {
            *out += sum / *count as f64 / families;
        }
    }
    Ok(fused)
}

/// A committee of fitted members scored by rank fusion
#[derive(Debug)]
pub struct Ensemble {
    members: Vec<EnsembleMember>,
}

impl Ensemble {
    /// Create an ensemble
    ///
    /// # Errors
    /// Returns an error if `members` is empty
    pub fn new(members: Vec<EnsembleMember>) -> Result<Self> {
        if members.is_empty() {
            return Err(PipelineError::Model("ensemble has no members".to_string()));
        }
        Ok(Self { members })
    }

    #[must_use]
    pub fn members(&self) -> &[EnsembleMember] {
        &self.members
    }

    /// Families with at least one member
    #[must_use]
    pub fn families(&self) -> Vec<ModelFamily> {
        let mut families: Vec<ModelFamily> = self.members.iter().map(EnsembleMember::family).collect();
        families.sort_unstable();
        families.dedup();
        families
    }

    /// Fused malignancy score of every lesion in a table, in `(0, 1]`
    ///
    /// # Errors
    /// Returns an error if the table lacks a member's input column
    pub fn score(&self, table: &LesionTable) -> Result<Vec<f64>> {
        let pb = create_main_progress_bar(
            self.members.len() as u64,
            Some(&format!("Scoring '{}'", table.name())),
        );
        let mut shared: Option<(&EnsembleMember, FeatureMatrix)> = None;
        let mut predictions = Vec::with_capacity(self.members.len());
        for member in &self.members {
            let reusable = shared
                .as_ref()
                .is_some_and(|(owner, _)| owner.features() == member.features());
            if !reusable {
                shared = Some((member, member.features().to_matrix(table)?));
            }
            let raw = match &shared {
                Some((_, matrix)) => member.predict_matrix(matrix)?,
                None => member.predict_proba(table)?,
            };
            predictions.push((member.family(), raw));
            pb.inc(1);
        }
        finish_progress_bar(&pb, None);

        let fused = rank_fuse(&predictions)?;
        info!(
            "Scored {} lesions of '{}' with {} members from {} families",
            table.num_rows(),
            table.name(),
            self.members.len(),
            self.families().len()
        );
        Ok(fused)
    }
}
