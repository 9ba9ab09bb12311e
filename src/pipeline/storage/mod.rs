//! Result persistence
//!
//! The engine reads and writes evidence through [`ResultStorage`] by feature
//! name. Adapters translate names to the stable feature ids of a
//! [`FeatureCatalog`] and keep at most one record per key.

mod json;
mod memory;
mod records;

pub use json::JsonFileStorage;
pub use memory::InMemoryStorage;
pub use records::{RecordStore, RedundancyRecord, RelevancyRecord, SliceRecord};

use faer::Mat;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use super::calculation::{Calculation, CalculationId, ResultSet, ResultSetId};
use super::error::{HicsError, Result};
use super::sampler::SliceEvidence;
use super::table::{ColumnarTable, FeatureId};

/// A set of feature names, kept sorted and free of duplicates
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FeatureSubset(Vec<String>);

impl FeatureSubset {
    pub fn new<S: Into<String>>(names: impl IntoIterator<Item = S>) -> Self {
        let mut names: Vec<String> = names.into_iter().map(Into::into).collect();
        names.sort();
        names.dedup();
        Self(names)
    }

    pub fn names(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.binary_search_by(|n| n.as_str().cmp(name)).is_ok()
    }

    pub fn is_superset_of(&self, other: &FeatureSubset) -> bool {
        other.0.iter().all(|n| self.contains(n))
    }
}

impl fmt::Display for FeatureSubset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join(", "))
    }
}

/// Accumulated relevance of one feature subset for a target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relevancy {
    pub subset: FeatureSubset,
    pub relevancy: f64,
    /// Number of contrast evaluations merged into `relevancy`
    pub iteration: u64,
}

/// Symmetric pairwise redundancy scores with the weight behind each score.
///
/// A pair with weight 0 has never been evaluated.
#[derive(Debug, Clone)]
pub struct RedundancyMatrix {
    features: Vec<String>,
    index: HashMap<String, usize>,
    scores: Mat<f64>,
    weights: Mat<f64>,
}

impl RedundancyMatrix {
    pub fn new(features: Vec<String>) -> Self {
        let n = features.len();
        let index = features
            .iter()
            .enumerate()
            .map(|(i, name)| (name.clone(), i))
            .collect();
        Self {
            features,
            index,
            scores: Mat::zeros(n, n),
            weights: Mat::zeros(n, n),
        }
    }

    pub fn features(&self) -> &[String] {
        &self.features
    }

    pub fn position(&self, feature: &str) -> Option<usize> {
        self.index.get(feature).copied()
    }

    fn pair(&self, a: &str, b: &str) -> Result<(usize, usize)> {
        let i = self
            .position(a)
            .ok_or_else(|| HicsError::UnknownFeature(a.to_string()))?;
        let j = self
            .position(b)
            .ok_or_else(|| HicsError::UnknownFeature(b.to_string()))?;
        if i == j {
            return Err(HicsError::InvalidSubsetRequest(format!(
                "redundancy of '{}' with itself is undefined",
                a
            )));
        }
        Ok((i, j))
    }

    /// Score and weight of a pair, in either order
    pub fn get(&self, a: &str, b: &str) -> Result<(f64, f64)> {
        let (i, j) = self.pair(a, b)?;
        Ok((self.scores[(i, j)], self.weights[(i, j)]))
    }

    pub fn set(&mut self, a: &str, b: &str, score: f64, weight: f64) -> Result<()> {
        let (i, j) = self.pair(a, b)?;
        self.set_at(i, j, score, weight);
        Ok(())
    }

    pub(crate) fn set_at(&mut self, i: usize, j: usize, score: f64, weight: f64) {
        self.scores[(i, j)] = score;
        self.scores[(j, i)] = score;
        self.weights[(i, j)] = weight;
        self.weights[(j, i)] = weight;
    }

    pub(crate) fn at(&self, i: usize, j: usize) -> (f64, f64) {
        (self.scores[(i, j)], self.weights[(i, j)])
    }

    /// Evaluated pairs as `(first, second, score, weight)` with `first < second` by position
    pub fn pairs(&self) -> Vec<(&str, &str, f64, f64)> {
        let n = self.features.len();
        let mut pairs = Vec::new();
        for i in 0..n {
            for j in (i + 1)..n {
                let weight = self.weights[(i, j)];
                if weight > 0.0 {
                    pairs.push((
                        self.features[i].as_str(),
                        self.features[j].as_str(),
                        self.scores[(i, j)],
                        weight,
                    ));
                }
            }
        }
        pairs
    }

    /// Scores as a dense matrix, unevaluated pairs are 0
    pub fn scores(&self) -> &Mat<f64> {
        &self.scores
    }

    pub fn weights(&self) -> &Mat<f64> {
        &self.weights
    }
}

/// Bidirectional mapping between column names and stable feature ids
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FeatureCatalog {
    names: Vec<String>,
    ids: HashMap<String, FeatureId>,
}

impl FeatureCatalog {
    pub fn new(names: Vec<String>) -> Self {
        let ids = names
            .iter()
            .enumerate()
            .map(|(id, name)| (name.clone(), id))
            .collect();
        Self { names, ids }
    }

    pub fn from_table(table: &ColumnarTable) -> Self {
        Self::new(table.column_names().to_vec())
    }

    pub fn id_of(&self, name: &str) -> Result<FeatureId> {
        self.ids
            .get(name)
            .copied()
            .ok_or_else(|| HicsError::UnknownFeature(name.to_string()))
    }

    pub fn name_of(&self, id: FeatureId) -> Result<&str> {
        self.names
            .get(id)
            .map(String::as_str)
            .ok_or_else(|| HicsError::UnknownFeature(format!("#{}", id)))
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Sorted feature ids of a subset
    pub fn ids_of(&self, subset: &FeatureSubset) -> Result<Vec<FeatureId>> {
        let mut ids: Vec<FeatureId> = subset
            .names()
            .iter()
            .map(|name| self.id_of(name))
            .collect::<Result<_>>()?;
        ids.sort_unstable();
        Ok(ids)
    }

    pub fn subset_of(&self, ids: &[FeatureId]) -> Result<FeatureSubset> {
        let names: Vec<&str> = ids
            .iter()
            .map(|&id| self.name_of(id))
            .collect::<Result<_>>()?;
        Ok(FeatureSubset::new(names))
    }
}

/// Persistence port of the engine
pub trait ResultStorage: Send + Sync {
    fn load_result_set(&self, result_set: ResultSetId) -> Result<ResultSet>;

    fn get_relevancies(&self, result_set: ResultSetId) -> Result<Vec<Relevancy>>;

    /// Insert or update the relevancy of each subset
    fn update_relevancies(&self, result_set: ResultSetId, relevancies: &[Relevancy]) -> Result<()>;

    /// Stored redundancies among `features`. Pairs outside the list are ignored.
    fn get_redundancies(
        &self,
        result_set: ResultSetId,
        features: &[String],
    ) -> Result<RedundancyMatrix>;

    /// Insert or update every evaluated pair of the matrix
    fn update_redundancies(&self, result_set: ResultSetId, matrix: &RedundancyMatrix)
        -> Result<()>;

    fn get_slices(&self, result_set: ResultSetId) -> Result<HashMap<FeatureSubset, SliceEvidence>>;

    fn update_slices(
        &self,
        result_set: ResultSetId,
        slices: &HashMap<FeatureSubset, SliceEvidence>,
    ) -> Result<()>;

    fn load_calculation(&self, id: CalculationId) -> Result<Calculation>;

    fn save_calculation(&self, calculation: &Calculation) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subset_is_sorted_and_deduplicated() {
        let subset = FeatureSubset::new(["b", "a", "b"]);
        assert_eq!(subset.names(), &["a".to_string(), "b".to_string()]);
        assert!(subset.contains("a"));
        assert!(!subset.contains("c"));
        assert_eq!(subset.to_string(), "a, b");
    }

    #[test]
    fn test_superset_check() {
        let big = FeatureSubset::new(["a", "b", "c"]);
        let small = FeatureSubset::new(["c", "a"]);
        assert!(big.is_superset_of(&small));
        assert!(!small.is_superset_of(&big));
    }

    #[test]
    fn test_redundancy_matrix_is_symmetric() {
        let mut matrix =
            RedundancyMatrix::new(vec!["a".to_string(), "b".to_string(), "c".to_string()]);
        matrix.set("c", "a", 0.4, 3.0).unwrap();
        assert_eq!(matrix.get("a", "c").unwrap(), (0.4, 3.0));
        assert_eq!(matrix.get("c", "a").unwrap(), (0.4, 3.0));
        assert_eq!(matrix.get("a", "b").unwrap(), (0.0, 0.0));

        let pairs = matrix.pairs();
        assert_eq!(pairs, vec![("a", "c", 0.4, 3.0)]);
    }

    #[test]
    fn test_redundancy_matrix_rejects_self_pairs() {
        let mut matrix = RedundancyMatrix::new(vec!["a".to_string(), "b".to_string()]);
        assert!(matrix.set("a", "a", 0.1, 1.0).is_err());
        assert!(matches!(
            matrix.get("a", "zzz"),
            Err(HicsError::UnknownFeature(_))
        ));
    }

    #[test]
    fn test_catalog_round_trip() {
        let catalog = FeatureCatalog::new(vec!["x".to_string(), "y".to_string(), "z".to_string()]);
        let subset = FeatureSubset::new(["z", "x"]);
        let ids = catalog.ids_of(&subset).unwrap();
        assert_eq!(ids, vec![0, 2]);
        assert_eq!(catalog.subset_of(&ids).unwrap(), subset);
        assert!(catalog.id_of("w").is_err());
    }
}
