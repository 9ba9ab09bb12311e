//! Id-keyed result records and the upsert rules that keep them unique

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::pipeline::calculation::{
    Calculation, CalculationId, HicsRequest, ResultSet, ResultSetId,
};
use crate::pipeline::error::{HicsError, Result};
use crate::pipeline::sampler::{FeatureBound, SliceEvidence};
use crate::pipeline::distribution::DistributionPoint;
use crate::pipeline::table::FeatureId;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelevancyRecord {
    pub id: u64,
    pub result_set: ResultSetId,
    /// Sorted feature ids
    pub features: Vec<FeatureId>,
    pub relevancy: f64,
    pub iteration: u64,
}

/// Redundancy of an unordered pair, stored with `first_feature < second_feature`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RedundancyRecord {
    pub id: u64,
    pub result_set: ResultSetId,
    pub first_feature: FeatureId,
    pub second_feature: FeatureId,
    pub redundancy: f64,
    pub weight: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SliceRecord {
    pub id: u64,
    pub result_set: ResultSetId,
    /// Sorted feature ids
    pub features: Vec<FeatureId>,
    pub output_definition: Vec<FeatureBound>,
    pub marginal_distribution: Vec<DistributionPoint>,
    pub conditional_distribution: Vec<DistributionPoint>,
    pub deviation: f64,
    pub frequency: f64,
}

impl SliceRecord {
    pub fn evidence(&self) -> SliceEvidence {
        SliceEvidence {
            definition: self.output_definition.clone(),
            marginal: self.marginal_distribution.clone(),
            conditional: self.conditional_distribution.clone(),
            deviation: self.deviation,
            frequency: self.frequency,
        }
    }
}

/// All persisted rows. `features` names the catalog the ids refer to.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecordStore {
    #[serde(default)]
    pub features: Vec<String>,
    #[serde(default)]
    next_id: u64,
    #[serde(default)]
    pub result_sets: Vec<ResultSet>,
    #[serde(default)]
    pub calculations: Vec<Calculation>,
    #[serde(default)]
    pub relevancies: Vec<RelevancyRecord>,
    #[serde(default)]
    pub redundancies: Vec<RedundancyRecord>,
    #[serde(default)]
    pub slices: Vec<SliceRecord>,
}

/// Position of the single row matching a key, or a duplicate error
fn unique_match<T>(
    rows: &[T],
    kind: &'static str,
    key: impl Fn() -> String,
    result_set: ResultSetId,
    matches: impl Fn(&T) -> bool,
) -> Result<Option<usize>> {
    let positions: Vec<usize> = rows
        .iter()
        .enumerate()
        .filter(|(_, row)| matches(row))
        .map(|(i, _)| i)
        .collect();
    match positions.as_slice() {
        [] => Ok(None),
        [only] => Ok(Some(*only)),
        _ => Err(HicsError::ConcurrentDuplicateResult {
            kind,
            key: key(),
            result_set,
            count: positions.len(),
        }),
    }
}

fn normalize_pair(a: FeatureId, b: FeatureId) -> Result<(FeatureId, FeatureId)> {
    match a.cmp(&b) {
        std::cmp::Ordering::Less => Ok((a, b)),
        std::cmp::Ordering::Greater => Ok((b, a)),
        std::cmp::Ordering::Equal => Err(HicsError::InvalidSubsetRequest(format!(
            "redundancy pair needs two distinct features, got #{} twice",
            a
        ))),
    }
}

impl RecordStore {
    pub fn new(features: Vec<String>) -> Self {
        Self {
            features,
            ..Default::default()
        }
    }

    fn allocate_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    pub fn create_result_set(&mut self, target: &str) -> ResultSetId {
        let id = self.allocate_id();
        self.result_sets.push(ResultSet {
            id,
            target: target.to_string(),
        });
        id
    }

    /// Most recent result set for a target
    pub fn find_result_set(&self, target: &str) -> Option<ResultSetId> {
        self.result_sets
            .iter()
            .rev()
            .find(|rs| rs.target == target)
            .map(|rs| rs.id)
    }

    pub fn result_set(&self, id: ResultSetId) -> Result<&ResultSet> {
        self.result_sets
            .iter()
            .find(|rs| rs.id == id)
            .ok_or(HicsError::ResultSetNotFound(id))
    }

    pub fn create_calculation(
        &mut self,
        result_set: ResultSetId,
        request: HicsRequest,
        max_iteration: u32,
    ) -> Result<Calculation> {
        self.result_set(result_set)?;
        let calculation = Calculation {
            id: self.allocate_id(),
            result_set,
            request,
            current_iteration: 0,
            max_iteration,
        };
        self.calculations.push(calculation.clone());
        Ok(calculation)
    }

    pub fn calculation(&self, id: CalculationId) -> Result<&Calculation> {
        self.calculations
            .iter()
            .find(|c| c.id == id)
            .ok_or(HicsError::CalculationNotFound(id))
    }

    pub fn save_calculation(&mut self, calculation: &Calculation) -> Result<()> {
        let slot = self
            .calculations
            .iter_mut()
            .find(|c| c.id == calculation.id)
            .ok_or(HicsError::CalculationNotFound(calculation.id))?;
        *slot = calculation.clone();
        Ok(())
    }

    pub fn relevancies(&self, result_set: ResultSetId) -> impl Iterator<Item = &RelevancyRecord> {
        self.relevancies
            .iter()
            .filter(move |r| r.result_set == result_set)
    }

    pub fn redundancies(&self, result_set: ResultSetId) -> impl Iterator<Item = &RedundancyRecord> {
        self.redundancies
            .iter()
            .filter(move |r| r.result_set == result_set)
    }

    pub fn slices(&self, result_set: ResultSetId) -> impl Iterator<Item = &SliceRecord> {
        self.slices
            .iter()
            .filter(move |r| r.result_set == result_set)
    }

    /// Insert the relevancy of `features` or overwrite the existing row
    pub fn upsert_relevancy(
        &mut self,
        result_set: ResultSetId,
        features: Vec<FeatureId>,
        relevancy: f64,
        iteration: u64,
    ) -> Result<u64> {
        let existing = unique_match(
            &self.relevancies,
            "relevancy",
            || format!("{:?}", features),
            result_set,
            |r| r.result_set == result_set && r.features == features,
        )?;
        match existing {
            Some(pos) => {
                let row = &mut self.relevancies[pos];
                row.relevancy = relevancy;
                row.iteration = iteration;
                Ok(row.id)
            }
            None => {
                let id = self.allocate_id();
                self.relevancies.push(RelevancyRecord {
                    id,
                    result_set,
                    features,
                    relevancy,
                    iteration,
                });
                Ok(id)
            }
        }
    }

    /// Insert or overwrite the redundancy of an unordered pair
    pub fn upsert_redundancy(
        &mut self,
        result_set: ResultSetId,
        a: FeatureId,
        b: FeatureId,
        redundancy: f64,
        weight: f64,
    ) -> Result<u64> {
        let (first, second) = normalize_pair(a, b)?;
        let existing = unique_match(
            &self.redundancies,
            "redundancy",
            || format!("({}, {})", first, second),
            result_set,
            |r| {
                r.result_set == result_set
                    && r.first_feature == first
                    && r.second_feature == second
            },
        )?;
        match existing {
            Some(pos) => {
                let row = &mut self.redundancies[pos];
                row.redundancy = redundancy;
                row.weight = weight;
                Ok(row.id)
            }
            None => {
                let id = self.allocate_id();
                self.redundancies.push(RedundancyRecord {
                    id,
                    result_set,
                    first_feature: first,
                    second_feature: second,
                    redundancy,
                    weight,
                });
                Ok(id)
            }
        }
    }

    /// Insert or overwrite the slice stored for `features`
    pub fn upsert_slice(
        &mut self,
        result_set: ResultSetId,
        features: Vec<FeatureId>,
        evidence: &SliceEvidence,
    ) -> Result<u64> {
        let existing = unique_match(
            &self.slices,
            "slice",
            || format!("{:?}", features),
            result_set,
            |r| r.result_set == result_set && r.features == features,
        )?;
        let id = match existing {
            Some(pos) => self.slices[pos].id,
            None => self.allocate_id(),
        };
        let record = SliceRecord {
            id,
            result_set,
            features,
            output_definition: evidence.definition.clone(),
            marginal_distribution: evidence.marginal.clone(),
            conditional_distribution: evidence.conditional.clone(),
            deviation: evidence.deviation,
            frequency: evidence.frequency,
        };
        match existing {
            Some(pos) => self.slices[pos] = record,
            None => self.slices.push(record),
        }
        Ok(id)
    }

    /// Check that no key is stored twice, e.g. after loading a file written by
    /// several uncoordinated writers.
    pub fn validate(&self) -> Result<()> {
        let mut relevancy_keys: HashMap<(ResultSetId, &[FeatureId]), usize> = HashMap::new();
        for r in &self.relevancies {
            *relevancy_keys
                .entry((r.result_set, r.features.as_slice()))
                .or_default() += 1;
        }
        if let Some(((result_set, features), count)) =
            relevancy_keys.into_iter().find(|(_, count)| *count > 1)
        {
            return Err(HicsError::ConcurrentDuplicateResult {
                kind: "relevancy",
                key: format!("{:?}", features),
                result_set,
                count,
            });
        }

        let mut pair_keys: HashMap<(ResultSetId, FeatureId, FeatureId), usize> = HashMap::new();
        for r in &self.redundancies {
            let (first, second) = normalize_pair(r.first_feature, r.second_feature)?;
            *pair_keys.entry((r.result_set, first, second)).or_default() += 1;
        }
        if let Some(((result_set, first, second), count)) =
            pair_keys.into_iter().find(|(_, count)| *count > 1)
        {
            return Err(HicsError::ConcurrentDuplicateResult {
                kind: "redundancy",
                key: format!("({}, {})", first, second),
                result_set,
                count,
            });
        }

        let mut slice_keys: HashMap<(ResultSetId, &[FeatureId]), usize> = HashMap::new();
        for r in &self.slices {
            *slice_keys
                .entry((r.result_set, r.features.as_slice()))
                .or_default() += 1;
        }
        if let Some(((result_set, features), count)) =
            slice_keys.into_iter().find(|(_, count)| *count > 1)
        {
            return Err(HicsError::ConcurrentDuplicateResult {
                kind: "slice",
                key: format!("{:?}", features),
                result_set,
                count,
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with_result_set() -> (RecordStore, ResultSetId) {
        let mut store = RecordStore::new(vec!["a".into(), "b".into(), "t".into()]);
        let rs = store.create_result_set("t");
        (store, rs)
    }

    #[test]
    fn test_relevancy_upsert_updates_in_place() {
        let (mut store, rs) = store_with_result_set();
        let first = store.upsert_relevancy(rs, vec![0], 0.2, 5).unwrap();
        let second = store.upsert_relevancy(rs, vec![0], 0.3, 10).unwrap();
        assert_eq!(first, second);
        let rows: Vec<_> = store.relevancies(rs).collect();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].iteration, 10);
    }

    #[test]
    fn test_redundancy_pair_is_normalized() {
        let (mut store, rs) = store_with_result_set();
        store.upsert_redundancy(rs, 1, 0, 0.5, 2.0).unwrap();
        store.upsert_redundancy(rs, 0, 1, 0.6, 4.0).unwrap();
        let rows: Vec<_> = store.redundancies(rs).collect();
        assert_eq!(rows.len(), 1);
        assert_eq!((rows[0].first_feature, rows[0].second_feature), (0, 1));
        assert_eq!(rows[0].weight, 4.0);
    }

    #[test]
    fn test_self_pair_is_rejected() {
        let (mut store, rs) = store_with_result_set();
        assert!(matches!(
            store.upsert_redundancy(rs, 1, 1, 0.5, 1.0),
            Err(HicsError::InvalidSubsetRequest(_))
        ));
    }

    #[test]
    fn test_duplicate_rows_are_reported() {
        let (mut store, rs) = store_with_result_set();
        store.upsert_relevancy(rs, vec![0, 1], 0.2, 5).unwrap();
        let duplicate = store.relevancies[0].clone();
        store.relevancies.push(duplicate);

        assert!(matches!(
            store.upsert_relevancy(rs, vec![0, 1], 0.2, 5),
            Err(HicsError::ConcurrentDuplicateResult { count: 2, .. })
        ));
        assert!(store.validate().is_err());
    }

    #[test]
    fn test_result_sets_are_isolated() {
        let (mut store, rs) = store_with_result_set();
        let other = store.create_result_set("b");
        store.upsert_relevancy(rs, vec![0], 0.2, 5).unwrap();
        store.upsert_relevancy(other, vec![0], 0.9, 5).unwrap();
        assert_eq!(store.relevancies(rs).count(), 1);
        assert_eq!(store.find_result_set("b"), Some(other));
    }

    #[test]
    fn test_calculation_requires_result_set() {
        let mut store = RecordStore::default();
        assert!(matches!(
            store.create_calculation(99, HicsRequest::bivariate(), 1),
            Err(HicsError::ResultSetNotFound(99))
        ));
    }
}
