//! In-memory lesion table
//!
//! `LesionTable` is the column store every pipeline stage reads from and
//! returns. It keeps the identity columns (lesion, patient, optional label)
//! apart from the feature columns so stages can never overwrite them.

use arrow::array::{Array, ArrayRef, Float64Array, StringArray};
use arrow::compute::{CastOptions, cast_with_options, concat_batches};
use arrow::datatypes::DataType;
use arrow::record_batch::RecordBatch;
use rustc_hash::FxHashMap;

use crate::error::{PipelineError, Result};
use crate::schema::TableSchema;

pub mod scores;

pub use scores::ScoreTable;

/// A single feature column
#[derive(Debug, Clone, PartialEq)]
pub enum Column {
    /// Continuous values, NaN marks a missing entry
    Numeric(Vec<f64>),
    /// Raw string categories, `None` marks a missing entry
    Categorical(Vec<Option<String>>),
    /// One-hot indicator handed to models as a native categorical
    Indicator(Vec<u8>),
}

impl Column {
    /// Number of rows in the column
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Numeric(v) => v.len(),
            Self::Categorical(v) => v.len(),
            Self::Indicator(v) => v.len(),
        }
    }

    /// Whether the column holds no rows
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Value of a row as a model input (indicators widen to 0.0 / 1.0)
    ///
    /// Raw categorical columns are not model inputs and read as NaN.
    #[must_use]
    pub fn value_f64(&self, row: usize) -> f64 {
        match self {
            Self::Numeric(v) => v[row],
            Self::Indicator(v) => f64::from(v[row]),
            Self::Categorical(_) => f64::NAN,
        }
    }

    fn take(&self, rows: &[usize]) -> Self {
        match self {
            Self::Numeric(v) => Self::Numeric(rows.iter().map(|&r| v[r]).collect()),
            Self::Categorical(v) => Self::Categorical(rows.iter().map(|&r| v[r].clone()).collect()),
            Self::Indicator(v) => Self::Indicator(rows.iter().map(|&r| v[r]).collect()),
        }
    }
}

/// Lesion rows with identity columns and named feature columns
#[derive(Debug, Clone)]
pub struct LesionTable {
    name: String,
    lesion_ids: Vec<String>,
    patient_ids: Vec<String>,
    target: Option<Vec<u8>>,
    columns: Vec<(String, Column)>,
    index: FxHashMap<String, usize>,
}

impl LesionTable {
    /// Create a table holding only identity columns
    ///
    /// # Errors
    /// Returns an error if the identity columns differ in length
    pub fn new(
        name: impl Into<String>,
        lesion_ids: Vec<String>,
        patient_ids: Vec<String>,
        target: Option<Vec<u8>>,
    ) -> Result<Self> {
        let name = name.into();
        if lesion_ids.len() != patient_ids.len()
            || target.as_ref().is_some_and(|t| t.len() != lesion_ids.len())
        {
            return Err(PipelineError::Data(format!(
                "identity columns of table '{name}' have different lengths"
            )));
        }
        Ok(Self {
            name,
            lesion_ids,
            patient_ids,
            target,
            columns: Vec::new(),
            index: FxHashMap::default(),
        })
    }

    /// Table name used in log and error messages
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of lesion rows
    #[must_use]
    pub fn num_rows(&self) -> usize {
        self.lesion_ids.len()
    }

    /// Lesion identifiers in row order
    #[must_use]
    pub fn lesion_ids(&self) -> &[String] {
        &self.lesion_ids
    }

    /// Patient identifiers in row order
    #[must_use]
    pub fn patient_ids(&self) -> &[String] {
        &self.patient_ids
    }

    /// Binary labels, present for training tables only
    #[must_use]
    pub fn target(&self) -> Option<&[u8]> {
        self.target.as_deref()
    }

    /// Whether a feature column exists
    #[must_use]
    pub fn has_column(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Feature column names in insertion order
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(name, _)| name.as_str())
    }

    /// Look up a feature column
    #[must_use]
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.index.get(name).map(|&i| &self.columns[i].1)
    }

    /// Look up a numeric column
    ///
    /// # Errors
    /// Returns an error if the column is missing or not numeric
    pub fn numeric(&self, name: &str) -> Result<&[f64]> {
        match self.column(name) {
            Some(Column::Numeric(values)) => Ok(values),
            Some(_) => Err(PipelineError::Schema(format!(
                "column '{name}' in table '{}' is not numeric",
                self.name
            ))),
            None => Err(PipelineError::missing_column(name, &self.name)),
        }
    }

    /// Look up a numeric column for in-place updates
    ///
    /// # Errors
    /// Returns an error if the column is missing or not numeric
    pub fn numeric_mut(&mut self, name: &str) -> Result<&mut Vec<f64>> {
        let table = self.name.clone();
        let idx = *self
            .index
            .get(name)
            .ok_or_else(|| PipelineError::missing_column(name, &table))?;
        match &mut self.columns[idx].1 {
            Column::Numeric(values) => Ok(values),
            _ => Err(PipelineError::Schema(format!(
                "column '{name}' in table '{table}' is not numeric"
            ))),
        }
    }

    /// Look up a raw categorical column
    ///
    /// # Errors
    /// Returns an error if the column is missing or not categorical
    pub fn categorical(&self, name: &str) -> Result<&[Option<String>]> {
        match self.column(name) {
            Some(Column::Categorical(values)) => Ok(values),
            Some(_) => Err(PipelineError::Schema(format!(
                "column '{name}' in table '{}' is not categorical",
                self.name
            ))),
            None => Err(PipelineError::missing_column(name, &self.name)),
        }
    }

    /// Insert a column, replacing any column with the same name
    ///
    /// # Errors
    /// Returns an error if the column length does not match the table
    pub fn set_column(&mut self, name: impl Into<String>, column: Column) -> Result<()> {
        let name = name.into();
        if column.len() != self.num_rows() {
            return Err(PipelineError::Data(format!(
                "column '{name}' has {} rows, table '{}' has {}",
                column.len(),
                self.name,
                self.num_rows()
            )));
        }
        if let Some(&idx) = self.index.get(&name) {
            self.columns[idx].1 = column;
        } else {
            self.index.insert(name.clone(), self.columns.len());
            self.columns.push((name, column));
        }
        Ok(())
    }

    /// Insert a numeric column
    ///
    /// # Errors
    /// Returns an error if the column length does not match the table
    pub fn set_numeric(&mut self, name: impl Into<String>, values: Vec<f64>) -> Result<()> {
        self.set_column(name, Column::Numeric(values))
    }

    /// Names of all numeric feature columns
    #[must_use]
    pub fn numeric_column_names(&self) -> Vec<String> {
        self.columns
            .iter()
            .filter(|(_, c)| matches!(c, Column::Numeric(_)))
            .map(|(n, _)| n.clone())
            .collect()
    }

    /// Select a subset of rows, in the given order
    #[must_use]
    pub fn take_rows(&self, rows: &[usize]) -> Self {
        let columns: Vec<(String, Column)> = self
            .columns
            .iter()
            .map(|(name, column)| (name.clone(), column.take(rows)))
            .collect();
        Self {
            name: self.name.clone(),
            lesion_ids: rows.iter().map(|&r| self.lesion_ids[r].clone()).collect(),
            patient_ids: rows.iter().map(|&r| self.patient_ids[r].clone()).collect(),
            target: self.target.as_ref().map(|t| rows.iter().map(|&r| t[r]).collect()),
            columns,
            index: self.index.clone(),
        }
    }

    /// Row indices of every patient, groups ordered by first appearance
    #[must_use]
    pub fn patient_groups(&self) -> Vec<Vec<usize>> {
        group_rows(&self.patient_ids)
    }

    /// Build a table from Arrow record batches
    ///
    /// Identity columns are taken from `schema`. Declared numeric columns are
    /// cast to `Float64` with unparseable entries (such as `"NA"`) becoming
    /// missing. Other numeric columns stay numeric and string columns become
    /// categorical.
    ///
    /// # Errors
    /// Returns an error if an identity column is missing, a target value is
    /// missing or a cast fails
    pub fn from_record_batches(
        name: &str,
        batches: &[RecordBatch],
        schema: &TableSchema,
    ) -> Result<Self> {
        let Some(first) = batches.first() else {
            return Err(PipelineError::Data(format!("table '{name}' has no record batches")));
        };
        let batch = concat_batches(&first.schema(), batches)?;

        let lesion_ids = string_column(&batch, &schema.id_column, name)?
            .into_iter()
            .map(Option::unwrap_or_default)
            .collect();
        let patient_ids = string_column(&batch, &schema.patient_column, name)?
            .into_iter()
            .map(Option::unwrap_or_default)
            .collect();
        let target = match batch.schema().index_of(&schema.target_column) {
            Ok(idx) => {
                let values = float_array(batch.column(idx))?;
                if let Some(row) = values.iter().position(Option::is_none) {
                    return Err(PipelineError::Data(format!(
                        "table '{name}' has a missing or unparseable '{}' at row {row}",
                        schema.target_column
                    )));
                }
                Some(values.iter().map(|v| u8::from(v.is_some_and(|v| v > 0.5))).collect())
            }
            Err(_) => None,
        };

        let mut table = Self::new(name, lesion_ids, patient_ids, target)?;
        let arrow_schema = batch.schema();
        for (idx, field) in arrow_schema.fields().iter().enumerate() {
            let column_name = field.name();
            if column_name == &schema.id_column
                || column_name == &schema.patient_column
                || column_name == &schema.target_column
            {
                continue;
            }
            let array = batch.column(idx);
            let column = if schema.is_categorical(column_name) {
                Column::Categorical(string_values(array)?)
            } else if schema.is_numeric(column_name) || is_numeric_type(field.data_type()) {
                Column::Numeric(
                    float_array(array)?
                        .iter()
                        .map(|v| v.unwrap_or(f64::NAN))
                        .collect(),
                )
            } else {
                Column::Categorical(string_values(array)?)
            };
            table.set_column(column_name.clone(), column)?;
        }
        Ok(table)
    }
}

/// Group row indices by key, groups ordered by first appearance
#[must_use]
pub fn group_rows<K: AsRef<str>>(keys: &[K]) -> Vec<Vec<usize>> {
    let mut positions: FxHashMap<&str, usize> = FxHashMap::default();
    let mut groups: Vec<Vec<usize>> = Vec::new();
    for (row, key) in keys.iter().enumerate() {
        let slot = *positions.entry(key.as_ref()).or_insert_with(|| {
            groups.push(Vec::new());
            groups.len() - 1
        });
        groups[slot].push(row);
    }
    groups
}

fn is_numeric_type(data_type: &DataType) -> bool {
    data_type.is_numeric() || matches!(data_type, DataType::Boolean)
}

fn float_array(array: &ArrayRef) -> Result<Vec<Option<f64>>> {
    let options = CastOptions {
        safe: true,
        ..Default::default()
    };
    let cast = cast_with_options(array, &DataType::Float64, &options)?;
    let floats = cast
        .as_any()
        .downcast_ref::<Float64Array>()
        .ok_or_else(|| PipelineError::Schema("failed to downcast to Float64Array".to_string()))?;
    Ok(floats.iter().collect())
}

fn string_values(array: &ArrayRef) -> Result<Vec<Option<String>>> {
    let cast = cast_with_options(array, &DataType::Utf8, &CastOptions::default())?;
    let strings = cast
        .as_any()
        .downcast_ref::<StringArray>()
        .ok_or_else(|| PipelineError::Schema("failed to downcast to StringArray".to_string()))?;
    Ok(strings
        .iter()
        .map(|v| v.filter(|s| !s.is_empty()).map(ToString::to_string))
        .collect())
}

pub(crate) fn string_column(batch: &RecordBatch, column: &str, table: &str) -> Result<Vec<Option<String>>> {
    let idx = batch
        .schema()
        .index_of(column)
        .map_err(|_| PipelineError::missing_column(column, table))?;
    string_values(batch.column(idx))
}
