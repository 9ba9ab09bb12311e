//! Column-major in-memory table shared by all workers

use polars::prelude::*;
use std::collections::HashMap;

use super::error::{HicsError, Result};

/// Position of a column in a loaded table. Used as the feature identifier.
pub type FeatureId = usize;

/// An immutable, column-major table of `f64` values.
///
/// Nulls from the source file are stored as NaN. Columns keep the order of
/// the header row.
#[derive(Debug, Clone)]
pub struct ColumnarTable {
    names: Vec<String>,
    columns: Vec<Vec<f64>>,
    index: HashMap<String, usize>,
    rows: usize,
}

impl ColumnarTable {
    /// Build a table from named columns. All columns must have the same length
    /// and names must be unique.
    pub fn new(columns: Vec<(String, Vec<f64>)>) -> Result<Self> {
        let rows = columns.first().map(|(_, c)| c.len()).unwrap_or(0);
        let mut names = Vec::with_capacity(columns.len());
        let mut data = Vec::with_capacity(columns.len());
        let mut index = HashMap::with_capacity(columns.len());

        for (name, values) in columns {
            if values.len() != rows {
                return Err(HicsError::InvalidParameter(format!(
                    "column '{}' has {} rows, expected {}",
                    name,
                    values.len(),
                    rows
                )));
            }
            if index.insert(name.clone(), names.len()).is_some() {
                return Err(HicsError::InvalidParameter(format!(
                    "duplicate column name '{}'",
                    name
                )));
            }
            names.push(name);
            data.push(values);
        }

        Ok(Self {
            names,
            columns: data,
            index,
            rows,
        })
    }

    /// Convert a polars DataFrame into a table. Every column must be numeric
    /// or boolean.
    pub fn from_dataframe(df: &DataFrame) -> Result<Self> {
        let mut columns = Vec::with_capacity(df.width());

        for col in df.get_columns() {
            let name = col.name().to_string();
            if !(col.dtype().is_primitive_numeric() || col.dtype() == &DataType::Boolean) {
                return Err(HicsError::InvalidParameter(format!(
                    "column '{}' has non-numeric type {}",
                    name,
                    col.dtype()
                )));
            }

            let float_col = col.cast(&DataType::Float64).map_err(|e| {
                HicsError::InvalidParameter(format!("column '{}' cannot be cast to f64: {}", name, e))
            })?;
            let ca = float_col.f64().map_err(|e| {
                HicsError::InvalidParameter(format!("column '{}' is not Float64: {}", name, e))
            })?;
            let values: Vec<f64> = ca.iter().map(|v| v.unwrap_or(f64::NAN)).collect();
            columns.push((name, values));
        }

        Self::new(columns)
    }

    pub fn height(&self) -> usize {
        self.rows
    }

    pub fn width(&self) -> usize {
        self.names.len()
    }

    pub fn column_names(&self) -> &[String] {
        &self.names
    }

    pub fn column_index(&self, name: &str) -> Option<FeatureId> {
        self.index.get(name).copied()
    }

    /// Values of a column by name
    pub fn column(&self, name: &str) -> Result<&[f64]> {
        self.column_index(name)
            .map(|i| self.columns[i].as_slice())
            .ok_or_else(|| HicsError::ColumnNotFound(name.to_string()))
    }

    /// Values of a column by position
    pub fn column_at(&self, id: FeatureId) -> Option<&[f64]> {
        self.columns.get(id).map(Vec::as_slice)
    }

    /// Rough size of the column data in bytes
    pub fn estimated_size(&self) -> usize {
        self.rows * self.names.len() * std::mem::size_of::<f64>()
    }
}
