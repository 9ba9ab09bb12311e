//! Per-feature summary statistics and derived views
//!
//! Statistics ignore NaN values. A column is categorical when all of its
//! distinct values are integer-like and there are fewer than
//! `CATEGORICAL_THRESHOLD` of them.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use super::error::{HicsError, Result};
use super::table::ColumnarTable;

/// Columns with fewer distinct integer values than this are categorical
pub const CATEGORICAL_THRESHOLD: usize = 10;

/// Default number of histogram buckets for continuous features
pub const DEFAULT_HISTOGRAM_BUCKETS: usize = 50;

/// Default cap for stride sampling
pub const DEFAULT_MAX_SAMPLES: usize = 10000;

/// Kernel bandwidth for class densities
const DENSITY_BANDWIDTH: f64 = 0.75;

/// Number of evaluation points for class densities
const DENSITY_POINTS: usize = 100;

/// Summary statistics of a single feature
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureStats {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    /// Population variance
    pub variance: f64,
    pub is_categorical: bool,
    /// Sorted distinct values, only present for categorical features
    #[serde(skip_serializing_if = "Option::is_none")]
    pub categories: Option<Vec<f64>>,
}

/// A histogram bucket covering `from_value..=to_value`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bucket {
    pub from_value: f64,
    pub to_value: f64,
    pub count: usize,
}

/// Density estimate of a feature for one target class
#[derive(Debug, Clone, Serialize)]
pub struct ClassDensity {
    pub target_class: f64,
    pub density_values: Vec<f64>,
}

/// Everything computed for a feature at ingestion time
#[derive(Debug, Clone, Serialize)]
pub struct FeatureProfile {
    pub name: String,
    pub stats: FeatureStats,
    pub histogram: Vec<Bucket>,
}

fn finite_values(values: &[f64]) -> Vec<f64> {
    values.iter().copied().filter(|v| !v.is_nan()).collect()
}

fn sorted_distinct(values: &[f64]) -> Vec<f64> {
    let mut distinct = finite_values(values);
    distinct.sort_by(|a, b| a.total_cmp(b));
    distinct.dedup();
    distinct
}

/// Sorted category list if the values form a categorical column
fn detect_categories(values: &[f64]) -> Option<Vec<f64>> {
    let distinct = sorted_distinct(values);
    let integer_like = distinct.iter().all(|v| v.fract() == 0.0);
    if !distinct.is_empty() && integer_like && distinct.len() < CATEGORICAL_THRESHOLD {
        Some(distinct)
    } else {
        None
    }
}

/// Compute summary statistics of a column
pub fn profile(table: &ColumnarTable, column: &str) -> Result<FeatureStats> {
    let values = table.column(column)?;
    Ok(profile_values(values))
}

pub(crate) fn profile_values(values: &[f64]) -> FeatureStats {
    let finite = finite_values(values);

    if finite.is_empty() {
        return FeatureStats {
            min: f64::NAN,
            max: f64::NAN,
            mean: f64::NAN,
            variance: f64::NAN,
            is_categorical: false,
            categories: None,
        };
    }

    let n = finite.len() as f64;
    let min = finite.iter().copied().fold(f64::INFINITY, f64::min);
    let max = finite.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let mean = finite.iter().sum::<f64>() / n;
    let variance = finite.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n;
    let categories = detect_categories(&finite);

    FeatureStats {
        min,
        max,
        mean,
        variance,
        is_categorical: categories.is_some(),
        categories,
    }
}

/// Names of all categorical columns of a table
pub fn categorical_columns(table: &ColumnarTable) -> HashSet<String> {
    table
        .column_names()
        .par_iter()
        .filter(|name| {
            table
                .column(name)
                .map(|values| detect_categories(values).is_some())
                .unwrap_or(false)
        })
        .cloned()
        .collect()
}

/// Histogram of a column.
///
/// Continuous columns use `bucket_count` equal-width buckets between min and
/// max (last bucket closed). Categorical columns use one bucket per category.
pub fn histogram(table: &ColumnarTable, column: &str, bucket_count: usize) -> Result<Vec<Bucket>> {
    if bucket_count == 0 {
        return Err(HicsError::InvalidParameter(
            "bucket_count must be at least 1".to_string(),
        ));
    }
    let values = table.column(column)?;
    let finite = finite_values(values);

    if let Some(categories) = detect_categories(&finite) {
        return Ok(categories
            .into_iter()
            .map(|category| Bucket {
                from_value: category,
                to_value: category,
                count: finite.iter().filter(|&&v| v == category).count(),
            })
            .collect());
    }

    if finite.is_empty() {
        return Ok(Vec::new());
    }

    let mut lo = finite.iter().copied().fold(f64::INFINITY, f64::min);
    let mut hi = finite.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if lo == hi {
        lo -= 0.5;
        hi += 0.5;
    }
    let width = (hi - lo) / bucket_count as f64;

    let mut counts = vec![0usize; bucket_count];
    for v in &finite {
        let idx = (((v - lo) / width) as usize).min(bucket_count - 1);
        counts[idx] += 1;
    }

    Ok(counts
        .into_iter()
        .enumerate()
        .map(|(i, count)| Bucket {
            from_value: lo + width * i as f64,
            to_value: if i + 1 == bucket_count {
                hi
            } else {
                lo + width * (i + 1) as f64
            },
            count,
        })
        .collect())
}

fn median(values: &mut [f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.sort_by(|a, b| a.total_cmp(b));
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    }
}

/// Representative sequence of `target_count` values: the median of each of
/// `target_count` contiguous, equally sized row groups, in row order.
///
/// With fewer rows than `target_count` every row is its own group.
pub fn downsample(table: &ColumnarTable, column: &str, target_count: usize) -> Result<Vec<f64>> {
    if target_count == 0 {
        return Err(HicsError::InvalidParameter(
            "target_count must be at least 1".to_string(),
        ));
    }
    let values = table.column(column)?;
    let n = values.len();
    let groups = target_count.min(n);

    Ok((0..groups)
        .map(|i| {
            let start = i * n / groups;
            let end = (i + 1) * n / groups;
            let mut group = finite_values(&values[start..end]);
            median(&mut group)
        })
        .collect())
}

/// Every `ceil(rows / max_samples)`-th value of a column, starting with the first row
pub fn stride_samples(table: &ColumnarTable, column: &str, max_samples: usize) -> Result<Vec<f64>> {
    let values = table.column(column)?;
    let max_samples = if max_samples == 0 {
        DEFAULT_MAX_SAMPLES
    } else {
        max_samples
    };
    let step = values.len().div_ceil(max_samples).max(1);
    Ok(values.iter().copied().step_by(step).collect())
}

/// Gaussian kernel density of `feature` for each class of a categorical `target`,
/// evaluated on 100 evenly spaced points between the feature's min and max.
pub fn class_densities(
    table: &ColumnarTable,
    target: &str,
    feature: &str,
) -> Result<Vec<ClassDensity>> {
    let target_values = table.column(target)?;
    let feature_values = table.column(feature)?;
    let categories = detect_categories(target_values).ok_or_else(|| {
        HicsError::InvalidParameter(format!("target '{}' is not categorical", target))
    })?;
    let stats = profile_values(feature_values);
    if stats.min.is_nan() {
        return Ok(Vec::new());
    }

    let grid: Vec<f64> = (0..DENSITY_POINTS)
        .map(|i| {
            stats.min + (stats.max - stats.min) * i as f64 / (DENSITY_POINTS - 1) as f64
        })
        .collect();
    let norm = DENSITY_BANDWIDTH * (2.0 * std::f64::consts::PI).sqrt();

    Ok(categories
        .par_iter()
        .map(|&category| {
            let samples: Vec<f64> = target_values
                .iter()
                .zip(feature_values)
                .filter(|(t, f)| **t == category && !f.is_nan())
                .map(|(_, f)| *f)
                .collect();

            let density_values = grid
                .iter()
                .map(|x| {
                    if samples.is_empty() {
                        return 0.0;
                    }
                    let sum: f64 = samples
                        .iter()
                        .map(|s| {
                            let z = (x - s) / DENSITY_BANDWIDTH;
                            (-0.5 * z * z).exp()
                        })
                        .sum();
                    sum / (samples.len() as f64 * norm)
                })
                .collect();

            ClassDensity {
                target_class: category,
                density_values,
            }
        })
        .collect())
}

/// Profile every column of a table in parallel (statistics and histogram)
pub fn profile_dataset(table: &ColumnarTable, bucket_count: usize) -> Result<Vec<FeatureProfile>> {
    table
        .column_names()
        .par_iter()
        .map(|name| {
            Ok(FeatureProfile {
                name: name.clone(),
                stats: profile(table, name)?,
                histogram: histogram(table, name, bucket_count)?,
            })
        })
        .collect()
}
