//! Randomized slice sampling (HiCS contrast)
//!
//! A slice restricts every feature of a subset to a random region: a
//! contiguous window over the sorted values of a continuous feature or a
//! random category set of a categorical one. Each dimension keeps a fraction
//! `alpha^(1/d)` of its rows, so a slice over `d` features captures about
//! `alpha` of the dataset when the features are independent. The deviation
//! of the target inside the slice from its marginal distribution measures
//! how much the subset explains the target.

use rand::seq::SliceRandom;
use rand::Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::debug;

use super::distribution::DistributionPoint;
use super::error::{HicsError, Result};
use super::table::{ColumnarTable, FeatureId};

/// Default fraction of rows a slice should capture
pub const DEFAULT_ALPHA: f64 = 0.1;

/// Number of redraws for a slice that captured no rows
pub const MAX_SLICE_RETRIES: usize = 10;

/// Equal-width bins used to report continuous target distributions
const DISTRIBUTION_BINS: usize = 20;

/// Region of one feature covered by a slice
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SliceBound {
    Range { from_value: f64, to_value: f64 },
    Categories { categories: Vec<f64> },
}

impl SliceBound {
    fn contains(&self, value: f64) -> bool {
        match self {
            SliceBound::Range {
                from_value,
                to_value,
            } => value >= *from_value && value <= *to_value,
            SliceBound::Categories { categories } => categories.contains(&value),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureBound {
    pub feature: String,
    #[serde(flatten)]
    pub bound: SliceBound,
}

/// One sampled slice and the target's behaviour inside it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SliceEvidence {
    pub definition: Vec<FeatureBound>,
    pub marginal: Vec<DistributionPoint>,
    pub conditional: Vec<DistributionPoint>,
    pub deviation: f64,
    /// Fraction of all rows captured by the slice
    pub frequency: f64,
}

/// Mean deviation of several slices of one subset, plus the strongest slice
#[derive(Debug, Clone)]
pub struct ContrastResult {
    pub score: f64,
    pub best: SliceEvidence,
    pub slices: usize,
}

/// Sorted row order and category list of one column
#[derive(Debug)]
struct ColumnOrder {
    /// Rows with a non-NaN value, ordered by value
    sorted_rows: Vec<usize>,
    /// Sorted distinct values when the column is categorical
    categories: Option<Vec<f64>>,
}

impl ColumnOrder {
    /// No finite value to draw a bound from
    fn is_empty(&self) -> bool {
        match &self.categories {
            Some(categories) => categories.is_empty(),
            None => self.sorted_rows.is_empty(),
        }
    }
}

/// Sorted orders of all columns of a table, shared by every sampler over it
#[derive(Debug)]
pub struct SliceIndex<'a> {
    table: &'a ColumnarTable,
    columns: Vec<ColumnOrder>,
}

impl<'a> SliceIndex<'a> {
    /// Index every column. Columns named in `categorical` are sliced by category.
    pub fn new(table: &'a ColumnarTable, categorical: &HashSet<String>) -> Self {
        let columns = table
            .column_names()
            .par_iter()
            .enumerate()
            .map(|(id, name)| {
                let values = table.column_at(id).unwrap_or(&[]);
                let mut sorted_rows: Vec<usize> =
                    (0..values.len()).filter(|&r| !values[r].is_nan()).collect();
                sorted_rows.sort_by(|&a, &b| values[a].total_cmp(&values[b]));

                let categories = categorical.contains(name).then(|| {
                    let mut distinct: Vec<f64> = sorted_rows.iter().map(|&r| values[r]).collect();
                    distinct.dedup();
                    distinct
                });

                ColumnOrder {
                    sorted_rows,
                    categories,
                }
            })
            .collect();

        Self { table, columns }
    }

    pub fn table(&self) -> &'a ColumnarTable {
        self.table
    }

    pub fn is_categorical(&self, id: FeatureId) -> bool {
        self.columns
            .get(id)
            .map(|c| c.categories.is_some())
            .unwrap_or(false)
    }

    fn resolve(&self, name: &str) -> Result<FeatureId> {
        self.table
            .column_index(name)
            .ok_or_else(|| HicsError::ColumnNotFound(name.to_string()))
    }

    /// Build a sampler measuring deviations of `target`
    pub fn sampler(&self, target: &str, alpha: f64) -> Result<SliceSampler<'_>> {
        if !(alpha > 0.0 && alpha <= 1.0) {
            return Err(HicsError::InvalidParameter(format!(
                "alpha must be in (0, 1], got {}",
                alpha
            )));
        }
        let target_id = self.resolve(target)?;
        let values = self.table.column_at(target_id).unwrap_or(&[]);
        let order = &self.columns[target_id];
        let sorted_values: Vec<f64> = order.sorted_rows.iter().map(|&r| values[r]).collect();

        let kind = match &order.categories {
            Some(categories) => TargetKind::Categorical {
                categories: categories.clone(),
            },
            None => TargetKind::Continuous,
        };
        let marginal = kind.distribution(&sorted_values, &sorted_values);

        Ok(SliceSampler {
            index: self,
            target_id,
            kind,
            sorted_values,
            marginal,
            alpha,
        })
    }
}

#[derive(Debug, Clone)]
enum TargetKind {
    Categorical { categories: Vec<f64> },
    Continuous,
}

impl TargetKind {
    /// Distribution of `values` (sorted), binned over the range of `reference` (sorted)
    fn distribution(&self, values: &[f64], reference: &[f64]) -> Vec<DistributionPoint> {
        if values.is_empty() {
            return Vec::new();
        }
        let total = values.len() as f64;

        match self {
            TargetKind::Categorical { categories } => categories
                .iter()
                .map(|&category| DistributionPoint {
                    value: category,
                    probability: values.iter().filter(|&&v| v == category).count() as f64 / total,
                })
                .collect(),
            TargetKind::Continuous => {
                let lo = reference[0];
                let hi = reference[reference.len() - 1];
                if lo == hi {
                    return vec![DistributionPoint {
                        value: lo,
                        probability: 1.0,
                    }];
                }
                let width = (hi - lo) / DISTRIBUTION_BINS as f64;
                let mut counts = [0usize; DISTRIBUTION_BINS];
                for v in values {
                    let idx = (((v - lo) / width) as usize).min(DISTRIBUTION_BINS - 1);
                    counts[idx] += 1;
                }
                counts
                    .iter()
                    .enumerate()
                    .map(|(i, &count)| DistributionPoint {
                        value: lo + width * (i as f64 + 0.5),
                        probability: count as f64 / total,
                    })
                    .collect()
            }
        }
    }
}

/// Draws slices of feature subsets and scores them against one target
pub struct SliceSampler<'a> {
    index: &'a SliceIndex<'a>,
    target_id: FeatureId,
    kind: TargetKind,
    /// Non-NaN target values in ascending order
    sorted_values: Vec<f64>,
    marginal: Vec<DistributionPoint>,
    alpha: f64,
}

impl<'a> SliceSampler<'a> {
    pub fn marginal(&self) -> &[DistributionPoint] {
        &self.marginal
    }

    fn subset_ids(&self, subset: &[String]) -> Result<Vec<FeatureId>> {
        if subset.is_empty() {
            return Err(HicsError::InvalidSubsetRequest(
                "cannot slice an empty feature subset".to_string(),
            ));
        }
        subset
            .iter()
            .map(|name| {
                let id = self.index.resolve(name)?;
                if id == self.target_id {
                    return Err(HicsError::InvalidSubsetRequest(format!(
                        "subset contains the target '{}'",
                        name
                    )));
                }
                Ok(id)
            })
            .collect()
    }

    /// Draw one random slice of `subset` and measure the target's deviation in it.
    pub fn sample<R: Rng + ?Sized>(&self, subset: &[String], rng: &mut R) -> Result<SliceEvidence> {
        let ids = self.subset_ids(subset)?;
        Ok(self.sample_ids(&ids, rng))
    }

    /// Slice that captured nothing: empty definition, zero deviation and frequency
    fn empty_slice(&self, definition: Vec<FeatureBound>) -> SliceEvidence {
        SliceEvidence {
            definition,
            marginal: self.marginal.clone(),
            conditional: Vec::new(),
            deviation: 0.0,
            frequency: 0.0,
        }
    }

    fn sample_ids<R: Rng + ?Sized>(&self, ids: &[FeatureId], rng: &mut R) -> SliceEvidence {
        if ids.iter().any(|&id| self.index.columns[id].is_empty()) {
            debug!("Subset has a feature without values, no slice drawn");
            return self.empty_slice(Vec::new());
        }
        let table = self.index.table;
        let target = table.column_at(self.target_id).unwrap_or(&[]);
        let fraction = self.alpha.powf(1.0 / ids.len() as f64);
        let mut definition = Vec::new();

        for attempt in 0..=MAX_SLICE_RETRIES {
            definition = ids
                .iter()
                .map(|&id| self.draw_bound(id, fraction, rng))
                .collect();

            let columns: Vec<&[f64]> = ids
                .iter()
                .map(|&id| table.column_at(id).unwrap_or(&[]))
                .collect();
            let mut captured = 0usize;
            let mut inside: Vec<f64> = Vec::new();
            for row in 0..table.height() {
                let in_slice = definition
                    .iter()
                    .zip(&columns)
                    .all(|(b, values)| b.bound.contains(values[row]));
                if in_slice {
                    captured += 1;
                    if !target[row].is_nan() {
                        inside.push(target[row]);
                    }
                }
            }

            if inside.is_empty() {
                debug!(attempt, "Degenerate slice captured no rows, resampling");
                continue;
            }

            inside.sort_by(|a, b| a.total_cmp(b));
            let conditional = self.kind.distribution(&inside, &self.sorted_values);
            let deviation = match self.kind {
                TargetKind::Categorical { .. } => total_variation(&self.marginal, &conditional),
                TargetKind::Continuous => ks_statistic(&self.sorted_values, &inside),
            };

            return SliceEvidence {
                definition,
                marginal: self.marginal.clone(),
                conditional,
                deviation,
                frequency: captured as f64 / table.height() as f64,
            };
        }

        self.empty_slice(definition)
    }

    /// Random bound of one feature. The column must have at least one value.
    fn draw_bound<R: Rng + ?Sized>(&self, id: FeatureId, fraction: f64, rng: &mut R) -> FeatureBound {
        let table = self.index.table;
        let order = &self.index.columns[id];
        let values = table.column_at(id).unwrap_or(&[]);

        let bound = match &order.categories {
            Some(categories) => {
                let count = ((categories.len() as f64 * fraction).round() as usize)
                    .clamp(1, categories.len().max(1));
                let mut chosen: Vec<f64> = categories.choose_multiple(rng, count).copied().collect();
                chosen.sort_by(|a, b| a.total_cmp(b));
                SliceBound::Categories { categories: chosen }
            }
            None => {
                let available = order.sorted_rows.len();
                let window = ((available as f64 * fraction).ceil() as usize).clamp(1, available);
                let start = rng.gen_range(0..=available - window);
                SliceBound::Range {
                    from_value: values[order.sorted_rows[start]],
                    to_value: values[order.sorted_rows[start + window - 1]],
                }
            }
        };

        FeatureBound {
            feature: table.column_names()[id].clone(),
            bound,
        }
    }

    /// HiCS contrast: mean deviation of `iterations` random slices of `subset`.
    pub fn contrast<R: Rng + ?Sized>(
        &self,
        subset: &[String],
        iterations: usize,
        rng: &mut R,
    ) -> Result<ContrastResult> {
        if iterations == 0 {
            return Err(HicsError::InvalidParameter(
                "iterations must be at least 1".to_string(),
            ));
        }
        let ids = self.subset_ids(subset)?;

        let mut total = 0.0;
        let mut best: Option<SliceEvidence> = None;
        for _ in 0..iterations {
            let slice = self.sample_ids(&ids, rng);
            total += slice.deviation;
            if best.as_ref().map_or(true, |b| slice.deviation > b.deviation) {
                best = Some(slice);
            }
        }

        Ok(ContrastResult {
            score: total / iterations as f64,
            best: best.unwrap_or_else(|| self.sample_ids(&ids, rng)),
            slices: iterations,
        })
    }
}

/// Draw one slice of `subset_columns` and score the deviation of `target_column`.
///
/// Builds a fresh index; use `SliceIndex` directly to draw many slices.
pub fn sample_slice<R: Rng + ?Sized>(
    table: &ColumnarTable,
    target_column: &str,
    subset_columns: &[String],
    categorical_columns: &HashSet<String>,
    alpha: f64,
    rng: &mut R,
) -> Result<SliceEvidence> {
    let index = SliceIndex::new(table, categorical_columns);
    let sampler = index.sampler(target_column, alpha)?;
    sampler.sample(subset_columns, rng)
}

/// Total variation distance between two distributions over the same support
fn total_variation(p: &[DistributionPoint], q: &[DistributionPoint]) -> f64 {
    p.iter()
        .zip(q)
        .map(|(a, b)| (a.probability - b.probability).abs())
        .sum::<f64>()
        / 2.0
}

/// Two-sample Kolmogorov-Smirnov statistic of two ascending samples
fn ks_statistic(a: &[f64], b: &[f64]) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let (na, nb) = (a.len() as f64, b.len() as f64);
    let (mut i, mut j) = (0usize, 0usize);
    let mut d: f64 = 0.0;

    while i < a.len() && j < b.len() {
        let x = a[i].min(b[j]);
        while i < a.len() && a[i] <= x {
            i += 1;
        }
        while j < b.len() && b[j] <= x {
            j += 1;
        }
        d = d.max((i as f64 / na - j as f64 / nb).abs());
    }
    d
}
