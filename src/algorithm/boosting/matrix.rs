//! Column-major feature matrix handed to boosted-tree models

use crate::error::{PipelineError, Result};

/// Dense column-major matrix of model inputs, NaN marks a missing value
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMatrix {
    names: Vec<String>,
    columns: Vec<Vec<f64>>,
    categorical: Vec<bool>,
    rows: usize,
}

impl FeatureMatrix {
    /// Create a matrix from named columns
    ///
    /// # Errors
    /// Returns an error if columns differ in length or the metadata does not
    /// line up with the columns
    pub fn new(names: Vec<String>, columns: Vec<Vec<f64>>, categorical: Vec<bool>) -> Result<Self> {
        if names.len() != columns.len() || categorical.len() != columns.len() {
            return Err(PipelineError::Model(
                "feature names, columns and categorical flags differ in count".to_string(),
            ));
        }
        let rows = columns.first().map_or(0, Vec::len);
        if let Some((idx, _)) = columns.iter().enumerate().find(|(_, c)| c.len() != rows) {
            return Err(PipelineError::Model(format!(
                "feature column '{}' has a different row count",
                names[idx]
            )));
        }
        Ok(Self {
            names,
            columns,
            categorical,
            rows,
        })
    }

    /// Number of rows
    #[must_use]
    pub fn num_rows(&self) -> usize {
        self.rows
    }

    /// Number of feature columns
    #[must_use]
    pub fn num_features(&self) -> usize {
        self.columns.len()
    }

    /// Feature names in column order
    #[must_use]
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Values of one feature column
    #[must_use]
    pub fn column(&self, feature: usize) -> &[f64] {
        &self.columns[feature]
    }

    /// Whether a feature is a native categorical
    #[must_use]
    pub fn is_categorical(&self, feature: usize) -> bool {
        self.categorical[feature]
    }

    /// Position of a named feature
    #[must_use]
    pub fn position(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    /// Mutable values of a named feature column
    pub fn column_mut(&mut self, name: &str) -> Option<&mut Vec<f64>> {
        let idx = self.position(name)?;
        Some(&mut self.columns[idx])
    }

    /// Copy of the matrix with all categorical flags cleared
    #[must_use]
    pub fn without_categoricals(&self) -> Self {
        Self {
            categorical: vec![false; self.categorical.len()],
            ..self.clone()
        }
    }

    /// Select a subset of rows, in the given order (duplicates allowed)
    #[must_use]
    pub fn take_rows(&self, rows: &[usize]) -> Self {
        Self {
            names: self.names.clone(),
            columns: self
                .columns
                .iter()
                .map(|c| rows.iter().map(|&r| c[r]).collect())
                .collect(),
            categorical: self.categorical.clone(),
            rows: rows.len(),
        }
    }
}
