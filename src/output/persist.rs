use crate::models::{Field, ListingRecord};
use anyhow::{Context, Result};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;

/// File name prefix shared by the writer and the aggregator
pub const QUERY_FILE_PREFIX: &str = "property_data_";

/// Path of the raw result file for 1-based query index `index`
pub fn query_file_path(dir: &Path, index: usize) -> PathBuf {
    dir.join(format!("{}{}.csv", QUERY_FILE_PREFIX, index))
}

/// Write one query's records as CSV, header first, missing fields empty.
///
/// The file only appears under its final name once fully flushed, so a
/// crash mid-write leaves no truncated query file behind.
pub fn write_query_results(dir: &Path, index: usize, records: &[ListingRecord]) -> Result<PathBuf> {
    let path = query_file_path(dir, index);
    let mut tmp = tempfile::NamedTempFile::new_in(dir)
        .with_context(|| format!("Failed to create temporary file in {}", dir.display()))?;

    {
        let mut wtr = csv::Writer::from_writer(tmp.as_file_mut());
        wtr.write_record(Field::ALL.iter().map(|field| field.column()))?;
        for record in records {
            wtr.write_record(record.to_row())?;
        }
        wtr.flush()
            .with_context(|| format!("Failed to flush {}", path.display()))?;
    }
    tmp.as_file_mut().flush()?;
    tmp.persist(&path)
        .with_context(|| format!("Failed to write {}", path.display()))?;

    info!(query = index, rows = records.len(), path = %path.display(), "💾 Saved query results");
    Ok(path)
}
