//! Dataset loader for delimited (CSV) and Parquet files

use polars::prelude::*;
use std::path::Path;

use super::error::{HicsError, Result};
use super::table::ColumnarTable;

/// Options controlling how a delimited file is parsed
#[derive(Debug, Clone, Copy)]
pub struct LoadOptions {
    /// Field separator for delimited files
    pub separator: u8,
    /// Number of rows used for schema inference. 0 means a full table scan.
    pub infer_schema_length: usize,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            separator: b',',
            infer_schema_length: 10000,
        }
    }
}

/// Create a LazyFrame for a dataset file (CSV or Parquet based on extension)
fn scan_dataset(path: &Path, options: &LoadOptions) -> PolarsResult<LazyFrame> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();

    let schema_length = if options.infer_schema_length == 0 {
        None
    } else {
        Some(options.infer_schema_length)
    };

    let lf = match extension.as_str() {
        "parquet" => LazyFrame::scan_parquet(path, Default::default())?,
        _ => LazyCsvReader::new(path)
            .with_has_header(true)
            .with_separator(options.separator)
            .with_infer_schema_length(schema_length)
            .finish()?,
    };

    Ok(lf)
}

/// Load a dataset file into a polars DataFrame
pub fn load_dataframe(path: &Path, options: &LoadOptions) -> PolarsResult<DataFrame> {
    scan_dataset(path, options)?.collect()
}

/// Load a dataset file and convert it into a column-major table.
///
/// Any failure (missing file, parse error, non-numeric column) is reported as
/// `DatasetUnavailable` for `dataset_id`.
pub fn load_table(dataset_id: &str, path: &Path, options: &LoadOptions) -> Result<ColumnarTable> {
    if !path.exists() {
        return Err(HicsError::unavailable(
            dataset_id,
            format!("file not found: {}", path.display()),
        ));
    }

    let df = load_dataframe(path, options).map_err(|e| {
        HicsError::unavailable(
            dataset_id,
            format!("failed to parse {}: {}", path.display(), e),
        )
    })?;

    ColumnarTable::from_dataframe(&df).map_err(|e| HicsError::unavailable(dataset_id, e.to_string()))
}

/// Get column names from the header of a dataset file without loading all rows
pub fn get_column_names(path: &Path, options: &LoadOptions) -> Result<Vec<String>> {
    let schema = scan_dataset(path, options)
        .and_then(|mut lf| lf.collect_schema())
        .map_err(|e| {
            HicsError::unavailable(
                path.display().to_string(),
                format!("failed to read header: {}", e),
            )
        })?;
    Ok(schema.iter_names().map(|s| s.to_string()).collect())
}
