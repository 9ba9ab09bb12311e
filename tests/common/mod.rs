//! Shared test utilities and fixture generators

#![allow(dead_code)]

use fexum::pipeline::{ColumnarTable, FeatureCatalog, InMemoryStorage};
use polars::prelude::*;
use std::path::PathBuf;
use tempfile::TempDir;

/// The ten-row reference scenario
///
/// - `Col1`, `Col2`: continuous features
/// - `Col3`: categorical target with classes {0, 1, 2}
pub fn create_scenario_dataframe() -> DataFrame {
    df! {
        "Col1" => [0.1f64, 2.3, 1.7, 4.2, 3.3, 5.8, 6.1, 7.4, 8.9, 9.5],
        "Col2" => [3.2f64, 1.1, 4.8, 2.2, 9.7, 5.5, 0.4, 7.7, 6.3, 8.1],
        "Col3" => [0i32, 0, 1, 1, 1, 1, 2, 2, 2, 2],
    }
    .unwrap()
}

pub fn scenario_table() -> ColumnarTable {
    ColumnarTable::from_dataframe(&create_scenario_dataframe()).unwrap()
}

/// A table in which `signal` determines `target` and `noise` does not
///
/// - `signal`: 0..rows in order
/// - `shadow`: `signal` plus a small deterministic wobble (redundant with `signal`)
/// - `noise`: deterministic pseudo-random values
/// - `target`: 0 for the lower half of `signal`, 1 for the upper half
pub fn create_signal_dataframe(rows: usize) -> DataFrame {
    let signal: Vec<f64> = (0..rows).map(|i| i as f64).collect();
    let shadow: Vec<f64> = (0..rows).map(|i| i as f64 + ((i * 31) % 5) as f64 * 0.1).collect();
    let noise: Vec<f64> = (0..rows).map(|i| ((i * 7919 + 13) % 101) as f64).collect();
    let target: Vec<i32> = (0..rows).map(|i| if i < rows / 2 { 0 } else { 1 }).collect();

    DataFrame::new(vec![
        Column::new("signal".into(), signal),
        Column::new("shadow".into(), shadow),
        Column::new("noise".into(), noise),
        Column::new("target".into(), target),
    ])
    .unwrap()
}

pub fn signal_table(rows: usize) -> ColumnarTable {
    ColumnarTable::from_dataframe(&create_signal_dataframe(rows)).unwrap()
}

/// Empty in-memory store for the columns of `table`
pub fn storage_for(table: &ColumnarTable) -> InMemoryStorage {
    InMemoryStorage::new(FeatureCatalog::from_table(table))
}

/// Create a temporary directory with a test CSV file
pub fn create_temp_csv(df: &mut DataFrame) -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let csv_path = temp_dir.path().join("test_data.csv");

    let mut file = std::fs::File::create(&csv_path).unwrap();
    CsvWriter::new(&mut file).finish(df).unwrap();

    (temp_dir, csv_path)
}

/// Create a temporary directory with a test Parquet file
pub fn create_temp_parquet(df: &mut DataFrame) -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let parquet_path = temp_dir.path().join("test_data.parquet");

    let file = std::fs::File::create(&parquet_path).unwrap();
    ParquetWriter::new(file).finish(df).unwrap();

    (temp_dir, parquet_path)
}
