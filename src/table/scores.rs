//! Per-lesion score tables produced outside the pipeline
//!
//! Auxiliary model outputs arrive keyed by lesion id, optionally with the
//! patient id and fold bookkeeping columns. Only numeric columns are kept.

use arrow::compute::concat_batches;
use arrow::record_batch::RecordBatch;
use rustc_hash::FxHashMap;

use super::{LesionTable, float_array, is_numeric_type, string_column};
use crate::error::{PipelineError, Result};

/// Numeric score columns keyed by lesion id
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreTable {
    name: String,
    lesion_ids: Vec<String>,
    patient_ids: Option<Vec<String>>,
    columns: Vec<(String, Vec<f64>)>,
}

impl ScoreTable {
    /// Create an empty score table over the given lesions
    ///
    /// # Errors
    /// Returns an error if the patient ids do not line up with the lesions
    pub fn new(
        name: impl Into<String>,
        lesion_ids: Vec<String>,
        patient_ids: Option<Vec<String>>,
    ) -> Result<Self> {
        let name = name.into();
        if patient_ids.as_ref().is_some_and(|p| p.len() != lesion_ids.len()) {
            return Err(PipelineError::Data(format!(
                "identity columns of score table '{name}' have different lengths"
            )));
        }
        Ok(Self {
            name,
            lesion_ids,
            patient_ids,
            columns: Vec::new(),
        })
    }

    /// Build a score table from Arrow record batches
    ///
    /// # Arguments
    /// * `name` - Table name for messages
    /// * `batches` - Batches sharing one schema
    /// * `id_column` - Lesion id column (required)
    /// * `patient_column` - Patient id column (optional in the data)
    ///
    /// # Errors
    /// Returns an error if the lesion id column is missing or a cast fails
    pub fn from_record_batches(
        name: &str,
        batches: &[RecordBatch],
        id_column: &str,
        patient_column: &str,
    ) -> Result<Self> {
        let Some(first) = batches.first() else {
            return Err(PipelineError::Data(format!("score table '{name}' has no record batches")));
        };
        let batch = concat_batches(&first.schema(), batches)?;
        let lesion_ids = string_column(&batch, id_column, name)?
            .into_iter()
            .map(Option::unwrap_or_default)
            .collect();
        let patient_ids = if batch.schema().index_of(patient_column).is_ok() {
            Some(
                string_column(&batch, patient_column, name)?
                    .into_iter()
                    .map(Option::unwrap_or_default)
                    .collect(),
            )
        } else {
            None
        };

        let mut table = Self::new(name, lesion_ids, patient_ids)?;
        let schema = batch.schema();
        for (idx, field) in schema.fields().iter().enumerate() {
            if field.name() == id_column
                || field.name() == patient_column
                || !is_numeric_type(field.data_type())
            {
                continue;
            }
            let values = float_array(batch.column(idx))?
                .into_iter()
                .map(|v| v.unwrap_or(f64::NAN))
                .collect();
            table.set_column(field.name().clone(), values)?;
        }
        Ok(table)
    }

    /// Table name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of rows
    #[must_use]
    pub fn num_rows(&self) -> usize {
        self.lesion_ids.len()
    }

    /// Lesion ids in row order
    #[must_use]
    pub fn lesion_ids(&self) -> &[String] {
        &self.lesion_ids
    }

    /// Patient ids in row order
    ///
    /// # Errors
    /// Returns an error if the table carries no patient ids
    pub fn patient_ids(&self) -> Result<&[String]> {
        self.patient_ids
            .as_deref()
            .ok_or_else(|| PipelineError::missing_column("patient_id", self.name.clone()))
    }

    /// Values of a score column
    ///
    /// # Errors
    /// Returns an error if the column is missing
    pub fn column(&self, name: &str) -> Result<&[f64]> {
        self.columns
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_slice())
            .ok_or_else(|| PipelineError::missing_column(name, self.name.clone()))
    }

    /// Names of all score columns
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(n, _)| n.as_str())
    }

    /// Insert or replace a score column
    ///
    /// # Errors
    /// Returns an error if the column length does not match the table
    pub fn set_column(&mut self, name: impl Into<String>, values: Vec<f64>) -> Result<()> {
        let name = name.into();
        if values.len() != self.num_rows() {
            return Err(PipelineError::Data(format!(
                "score column '{name}' has {} rows, table '{}' has {}",
                values.len(),
                self.name,
                self.num_rows()
            )));
        }
        if let Some(slot) = self.columns.iter_mut().find(|(n, _)| *n == name) {
            slot.1 = values;
        } else {
            self.columns.push((name, values));
        }
        Ok(())
    }

    /// Rows whose column value equals `value`
    ///
    /// # Errors
    /// Returns an error if the column is missing
    pub fn rows_where(&self, column: &str, value: f64) -> Result<Vec<usize>> {
        Ok(self
            .column(column)?
            .iter()
            .enumerate()
            .filter(|(_, v)| **v == value)
            .map(|(i, _)| i)
            .collect())
    }

    /// Left-join score columns onto a lesion table by lesion id
    ///
    /// Lesions absent from the score table receive NaN. When a lesion id
    /// occurs more than once in the score table the first occurrence wins.
    ///
    /// # Arguments
    /// * `target` - Table receiving the columns
    /// * `columns` - Score columns to copy, under the same names
    ///
    /// # Errors
    /// Returns an error if a score column is missing
    pub fn left_join_into(&self, target: &mut LesionTable, columns: &[String]) -> Result<()> {
        let mut lookup: FxHashMap<&str, usize> = FxHashMap::default();
        for (row, id) in self.lesion_ids.iter().enumerate() {
            lookup.entry(id.as_str()).or_insert(row);
        }
        let positions: Vec<Option<usize>> = target
            .lesion_ids()
            .iter()
            .map(|id| lookup.get(id.as_str()).copied())
            .collect();

        for column in columns {
            let source = self.column(column)?;
            let joined = positions
                .iter()
                .map(|p| p.map_or(f64::NAN, |row| source[row]))
                .collect();
            target.set_numeric(column.clone(), joined)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Float64Array, Int64Array, StringArray};
    use arrow::datatypes::{DataType, Field, Schema};
    use std::sync::Arc;

    #[test]
    fn test_from_record_batches_keeps_numeric_columns() {
        let schema = Arc::new(Schema::new(vec![
            Field::new("isic_id", DataType::Utf8, false),
            Field::new("fold_n", DataType::Int64, false),
            Field::new("tmp_predictions_all", DataType::Float64, true),
            Field::new("note", DataType::Utf8, true),
        ]));
        let batch = RecordBatch::try_new(
            schema,
            vec![
                Arc::new(StringArray::from(vec!["a", "b"])),
                Arc::new(Int64Array::from(vec![0, 1])),
                Arc::new(Float64Array::from(vec![Some(0.25), None])),
                Arc::new(StringArray::from(vec!["x", "y"])),
            ],
        )
        .unwrap();
        let table = ScoreTable::from_record_batches("oof", &[batch], "isic_id", "patient_id").unwrap();
        assert_eq!(table.num_rows(), 2);
        assert!(table.patient_ids().is_err());
        assert_eq!(table.column_names().collect::<Vec<_>>(), vec!["fold_n", "tmp_predictions_all"]);
        assert_eq!(table.rows_where("fold_n", 1.0).unwrap(), vec![1]);
        assert!(table.column("tmp_predictions_all").unwrap()[1].is_nan());
    }

    #[test]
    fn test_left_join_fills_missing_with_nan() {
        let mut scores = ScoreTable::new("s", vec!["b".into(), "a".into()], None).unwrap();
        scores.set_column("old_set_0", vec![0.2, 0.1]).unwrap();
        let mut table = LesionTable::new(
            "t",
            vec!["a".into(), "b".into(), "c".into()],
            vec!["p".to_string(); 3],
            None,
        )
        .unwrap();
        scores
            .left_join_into(&mut table, &["old_set_0".to_string()])
            .unwrap();
        let joined = table.numeric("old_set_0").unwrap();
        assert_eq!(&joined[..2], &[0.1, 0.2]);
        assert!(joined[2].is_nan());
    }
}
