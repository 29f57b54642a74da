//! CSV table operations

use std::fs::File;
use std::io::{BufReader, Seek, SeekFrom};
use std::path::Path;
use std::sync::Arc;

use arrow::csv::reader::Format;
use arrow::csv::{ReaderBuilder, WriterBuilder};
use arrow::record_batch::RecordBatch;

use crate::error::Result;
use crate::utils::logging::TableIoTimer;

/// Default batch size for CSV reading
pub const DEFAULT_BATCH_SIZE: usize = 16384;

/// Read a CSV file with a header row into record batches
///
/// The schema is inferred from the full file so that sparse numeric columns
/// are not mistaken for strings.
pub fn read_csv(path: &Path) -> Result<Vec<RecordBatch>> {
    let timer = TableIoTimer::start("reading", path);

    let mut file = File::open(path)?;
    let format = Format::default().with_header(true);
    let (schema, _) = format.infer_schema(BufReader::new(&file), None)?;
    file.seek(SeekFrom::Start(0))?;

    let reader = ReaderBuilder::new(Arc::new(schema))
        .with_format(format)
        .with_batch_size(DEFAULT_BATCH_SIZE)
        .build(BufReader::new(file))?;

    let batches = reader.collect::<std::result::Result<Vec<_>, _>>()?;
    let rows = batches.iter().map(RecordBatch::num_rows).sum();
    timer.finish(rows);
    Ok(batches)
}

/// Write a record batch to a CSV file with a header row
pub fn write_csv(path: &Path, batch: &RecordBatch) -> Result<()> {
    let timer = TableIoTimer::start("writing", path);
    let file = File::create(path)?;
    let mut writer = WriterBuilder::new().with_header(true).build(file);
    writer.write(batch)?;
    timer.finish(batch.num_rows());
    Ok(())
}
