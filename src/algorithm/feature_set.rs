//! Model input column list
//!
//! Every setup stage receives the current [`FeatureSet`] and returns the next
//! one; nothing edits a shared list in place.

use std::fmt;

use rustc_hash::FxHashSet;

use crate::algorithm::boosting::FeatureMatrix;
use crate::error::{PipelineError, Result};
use crate::table::{Column, LesionTable};

/// Ordered list of model input columns with their categorical flags
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeatureSet {
    columns: Vec<String>,
    categorical: FxHashSet<String>,
}

impl FeatureSet {
    /// Empty feature set
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feature set holding the given numeric columns
    #[must_use]
    pub fn from_columns<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new().with_columns(columns)
    }

    /// Append numeric columns, skipping names already present
    #[must_use]
    pub fn with_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for column in columns {
            let column = column.into();
            if !self.contains(&column) {
                self.columns.push(column);
            }
        }
        self
    }

    /// Append columns that models receive as native categoricals
    #[must_use]
    pub fn with_categorical_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for column in columns {
            let column = column.into();
            if !self.contains(&column) {
                self.columns.push(column.clone());
            }
            self.categorical.insert(column);
        }
        self
    }

    /// Remove every listed column
    #[must_use]
    pub fn without<S: AsRef<str>>(mut self, dropped: &[S]) -> Self {
        let dropped: FxHashSet<&str> = dropped.iter().map(AsRef::as_ref).collect();
        self.columns.retain(|c| !dropped.contains(c.as_str()));
        self.categorical.retain(|c| !dropped.contains(c.as_str()));
        self
    }

    /// Column names in model order
    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Number of columns
    #[must_use]
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Whether the set holds no columns
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Whether a column is part of the set
    #[must_use]
    pub fn contains(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c == column)
    }

    /// Whether a column is a native categorical
    #[must_use]
    pub fn is_categorical(&self, column: &str) -> bool {
        self.categorical.contains(column)
    }

    /// Number of native categorical columns
    #[must_use]
    pub fn num_categorical(&self) -> usize {
        self.categorical.len()
    }

    /// Gather the set's columns from a table into a model matrix
    ///
    /// # Errors
    /// Returns an error if a column is missing from the table or holds raw
    /// category strings
    pub fn to_matrix(&self, table: &LesionTable) -> Result<FeatureMatrix> {
        let mut columns = Vec::with_capacity(self.columns.len());
        for name in &self.columns {
            let values = match table.column(name) {
                Some(Column::Numeric(v)) => v.clone(),
                Some(Column::Indicator(v)) => v.iter().map(|&b| f64::from(b)).collect(),
                Some(Column::Categorical(_)) => {
                    return Err(PipelineError::Data(format!(
                        "column '{name}' must be encoded before model input"
                    )));
                }
                None => {
                    return Err(PipelineError::missing_column(
                        name.clone(),
                        table.name(),
                    ));
                }
            };
            columns.push(values);
        }
        let flags = self.columns.iter().map(|c| self.is_categorical(c)).collect();
        FeatureMatrix::new(self.columns.clone(), columns, flags)
    }
}

impl fmt::Display for FeatureSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} features ({} categorical)",
            self.columns.len(),
            self.categorical.len()
        )
    }
}
