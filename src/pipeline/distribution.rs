//! Conditional target distributions inside user-defined feature constraints

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

use super::error::{HicsError, Result};
use super::table::ColumnarTable;

/// One point of a discrete distribution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistributionPoint {
    pub value: f64,
    pub probability: f64,
}

/// A restriction on one feature: an inclusive value range or a category set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FeatureConstraint {
    Range {
        feature: String,
        from_value: f64,
        to_value: f64,
    },
    Categories {
        feature: String,
        categories: Vec<f64>,
    },
}

impl FeatureConstraint {
    pub fn feature(&self) -> &str {
        match self {
            FeatureConstraint::Range { feature, .. } => feature,
            FeatureConstraint::Categories { feature, .. } => feature,
        }
    }

    fn matches(&self, value: f64) -> bool {
        match self {
            FeatureConstraint::Range {
                from_value,
                to_value,
                ..
            } => value >= *from_value && value <= *to_value,
            FeatureConstraint::Categories { categories, .. } => categories.contains(&value),
        }
    }
}

/// Target distribution inside the constrained region
#[derive(Debug, Clone, Serialize)]
pub struct ConditionalDistribution {
    pub distribution: Vec<DistributionPoint>,
    /// Number of rows satisfying every constraint
    pub matching_rows: usize,
    /// Stride-subsampled matching rows per column (constrained features and target)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub samples: Option<BTreeMap<String, Vec<f64>>>,
}

/// Compute the distribution of `target` over the rows matching all `constraints`.
///
/// Probabilities are value counts divided by the number of matching rows.
/// When `max_samples` is set, up to about that many matching rows are
/// returned for the constrained features and the target.
pub fn conditional_distribution(
    table: &ColumnarTable,
    target: &str,
    constraints: &[FeatureConstraint],
    max_samples: Option<usize>,
) -> Result<ConditionalDistribution> {
    let target_values = table.column(target)?;
    let columns: Vec<&[f64]> = constraints
        .iter()
        .map(|c| table.column(c.feature()))
        .collect::<Result<_>>()?;

    let matching: Vec<usize> = (0..table.height())
        .filter(|&row| {
            constraints
                .iter()
                .zip(&columns)
                .all(|(constraint, values)| constraint.matches(values[row]))
        })
        .collect();

    debug!(
        column = target,
        constraints = constraints.len(),
        matching = matching.len(),
        "Computed conditional distribution"
    );

    let mut counts: BTreeMap<u64, (f64, usize)> = BTreeMap::new();
    for &row in &matching {
        let value = target_values[row];
        if value.is_nan() {
            continue;
        }
        counts
            .entry(ordered_key(value))
            .or_insert((value, 0))
            .1 += 1;
    }

    let total = matching.len() as f64;
    let distribution = counts
        .into_values()
        .map(|(value, count)| DistributionPoint {
            value,
            probability: count as f64 / total,
        })
        .collect();

    let samples = match max_samples {
        Some(0) => {
            return Err(HicsError::InvalidParameter(
                "max_samples must be at least 1".to_string(),
            ))
        }
        Some(max) => {
            let step = matching.len().div_ceil(max).max(1);
            let mut names: Vec<&str> = constraints.iter().map(|c| c.feature()).collect();
            names.push(target);
            let mut samples = BTreeMap::new();
            for name in names {
                let values = table.column(name)?;
                samples.insert(
                    name.to_string(),
                    matching.iter().step_by(step).map(|&row| values[row]).collect(),
                );
            }
            Some(samples)
        }
        None => None,
    };

    Ok(ConditionalDistribution {
        distribution,
        matching_rows: matching.len(),
        samples,
    })
}

/// Map an f64 to a key whose integer order matches the float order
pub(crate) fn ordered_key(value: f64) -> u64 {
    let bits = value.to_bits();
    if bits >> 63 == 1 {
        !bits
    } else {
        bits | (1 << 63)
    }
}
