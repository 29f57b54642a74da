//! Tests for reading auxiliary tables from disk

use std::sync::Arc;

use arrow::array::{Float64Array, Int64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use lesion_scorer::utils::io::{TableFormat, read_table, write_parquet};
use lesion_scorer::{RecordBatch, ScoreTable};

#[test]
fn test_parquet_score_table_loads_numeric_columns() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("eva_oof.parquet");
    let schema = Arc::new(Schema::new(vec![
        Field::new("isic_id", DataType::Utf8, false),
        Field::new("patient_id", DataType::Utf8, false),
        Field::new("fold_n", DataType::Int64, false),
        Field::new("tmp_predictions_all", DataType::Float64, true),
    ]));
    let batch = RecordBatch::try_new(
        schema,
        vec![
            Arc::new(StringArray::from(vec!["a", "b", "c"])),
            Arc::new(StringArray::from(vec!["p", "p", "q"])),
            Arc::new(Int64Array::from(vec![0, 1, 0])),
            Arc::new(Float64Array::from(vec![Some(0.2), None, Some(0.9)])),
        ],
    )
    .unwrap();
    write_parquet(&path, &batch).unwrap();

    let batches = read_table(&path).unwrap();
    let scores = ScoreTable::from_record_batches("eva", &batches, "isic_id", "patient_id").unwrap();
    assert_eq!(scores.num_rows(), 3);
    assert_eq!(scores.patient_ids().unwrap(), ["p", "p", "q"]);
    assert_eq!(scores.rows_where("fold_n", 0.0).unwrap(), vec![0, 2]);
    assert!(scores.column("tmp_predictions_all").unwrap()[1].is_nan());
}

#[test]
fn test_unknown_extension_is_rejected() {
    assert!(TableFormat::from_path(std::path::Path::new("scores.xlsx")).is_err());
    assert_eq!(
        TableFormat::from_path(std::path::Path::new("scores.PARQUET")).unwrap(),
        TableFormat::Parquet
    );
}
