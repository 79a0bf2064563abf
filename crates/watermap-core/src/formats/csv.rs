//! Delimited text reader for relational tables (census extracts and similar)

use std::io::Read;
use std::path::Path;

use crate::error::{Result, WatermapError};
use crate::formats::validation::verify_file_exists;
use crate::models::Table;

/// Read a CSV file, dropping the first `skip_rows` records before the header.
///
/// Census downloads carry a metadata row above the real header, so callers
/// typically pass `skip_rows = 1`. Header names are kept verbatim.
pub fn read_csv_table(path: &Path, skip_rows: usize) -> Result<Table> {
    verify_file_exists(path)?;
    let file = std::fs::File::open(path)?;
    read_csv_from(file, &path.display().to_string(), skip_rows)
}

/// Read CSV data from any reader
pub fn read_csv_from<R: Read>(reader: R, source_name: &str, skip_rows: usize) -> Result<Table> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::None)
        .from_reader(reader);

    let mut records = csv_reader.records().skip(skip_rows);

    let header = records
        .next()
        .transpose()?
        .ok_or_else(|| WatermapError::FormatError {
            format: "CSV".to_string(),
            message: format!("{} has no header row after skipping {} rows", source_name, skip_rows),
        })?;
    let columns: Vec<String> = header.iter().map(|s| s.to_string()).collect();

    let mut rows = Vec::new();
    for record in records {
        let record = record?;
        rows.push(record.iter().map(|s| s.to_string()).collect());
    }

    tracing::debug!("Read {} rows with {} columns from {}", rows.len(), columns.len(), source_name);

    Ok(Table::new(source_name, columns, rows))
}
