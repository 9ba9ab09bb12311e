use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use super::records::RecordStore;
use super::{FeatureCatalog, FeatureSubset, RedundancyMatrix, Relevancy, ResultStorage};
use crate::pipeline::calculation::{
    Calculation, CalculationId, HicsRequest, ResultSet, ResultSetId,
};
use crate::pipeline::error::{HicsError, Result};
use crate::pipeline::sampler::{SliceBound, SliceEvidence};

/// Process-local result storage.
///
/// The revision counter increases on every write, including writes that
/// leave the stored values unchanged.
#[derive(Debug)]
pub struct InMemoryStorage {
    catalog: FeatureCatalog,
    store: Mutex<RecordStore>,
    revision: AtomicU64,
}

impl InMemoryStorage {
    pub fn new(catalog: FeatureCatalog) -> Self {
        let store = RecordStore::new(catalog.names().to_vec());
        Self::with_store(catalog, store)
    }

    pub(crate) fn with_store(catalog: FeatureCatalog, store: RecordStore) -> Self {
        Self {
            catalog,
            store: Mutex::new(store),
            revision: AtomicU64::new(0),
        }
    }

    pub fn catalog(&self) -> &FeatureCatalog {
        &self.catalog
    }

    pub fn revision(&self) -> u64 {
        self.revision.load(Ordering::SeqCst)
    }

    /// Run a write against the records and bump the revision on success
    pub(crate) fn write<T>(&self, f: impl FnOnce(&mut RecordStore) -> Result<T>) -> Result<T> {
        let mut store = self.store.lock();
        let value = f(&mut store)?;
        self.revision.fetch_add(1, Ordering::SeqCst);
        Ok(value)
    }

    pub(crate) fn read<T>(&self, f: impl FnOnce(&RecordStore) -> T) -> T {
        f(&*self.store.lock())
    }

    /// Copy of every stored record
    pub fn snapshot(&self) -> RecordStore {
        self.read(RecordStore::clone)
    }

    /// Put back records taken with `snapshot`
    pub(crate) fn restore(&self, store: RecordStore) {
        *self.store.lock() = store;
        self.revision.fetch_add(1, Ordering::SeqCst);
    }

    pub fn create_result_set(&self, target: &str) -> Result<ResultSetId> {
        self.catalog.id_of(target)?;
        self.write(|store| Ok(store.create_result_set(target)))
    }

    /// Reuse the latest result set of `target` or create one
    pub fn find_or_create_result_set(&self, target: &str) -> Result<ResultSetId> {
        match self.read(|store| store.find_result_set(target)) {
            Some(id) => Ok(id),
            None => self.create_result_set(target),
        }
    }

    pub fn create_calculation(
        &self,
        result_set: ResultSetId,
        request: HicsRequest,
        max_iteration: u32,
    ) -> Result<Calculation> {
        self.write(|store| store.create_calculation(result_set, request, max_iteration))
    }
}

impl ResultStorage for InMemoryStorage {
    fn load_result_set(&self, result_set: ResultSetId) -> Result<ResultSet> {
        self.read(|store| store.result_set(result_set).cloned())
    }

    fn get_relevancies(&self, result_set: ResultSetId) -> Result<Vec<Relevancy>> {
        self.read(|store| {
            store
                .relevancies(result_set)
                .map(|row| {
                    Ok(Relevancy {
                        subset: self.catalog.subset_of(&row.features)?,
                        relevancy: row.relevancy,
                        iteration: row.iteration,
                    })
                })
                .collect()
        })
    }

    fn update_relevancies(&self, result_set: ResultSetId, relevancies: &[Relevancy]) -> Result<()> {
        let rows: Vec<_> = relevancies
            .iter()
            .map(|r| {
                let value = HicsError::check_finite(
                    || format!("relevancy of [{}]", r.subset),
                    r.relevancy,
                )?;
                Ok((self.catalog.ids_of(&r.subset)?, value, r.iteration))
            })
            .collect::<Result<_>>()?;

        self.write(|store| {
            store.result_set(result_set)?;
            for (features, value, iteration) in rows {
                store.upsert_relevancy(result_set, features, value, iteration)?;
            }
            Ok(())
        })
    }

    fn get_redundancies(
        &self,
        result_set: ResultSetId,
        features: &[String],
    ) -> Result<RedundancyMatrix> {
        let mut matrix = RedundancyMatrix::new(features.to_vec());
        let rows: Vec<_> = self.read(|store| store.redundancies(result_set).cloned().collect());

        for row in rows {
            let first = self.catalog.name_of(row.first_feature)?;
            let second = self.catalog.name_of(row.second_feature)?;
            let (Some(i), Some(j)) = (matrix.position(first), matrix.position(second)) else {
                continue;
            };
            let value = HicsError::check_finite(
                || format!("stored redundancy of ({}, {})", first, second),
                row.redundancy,
            )?;
            matrix.set_at(i, j, value, row.weight);
        }
        Ok(matrix)
    }

    fn update_redundancies(&self, result_set: ResultSetId, matrix: &RedundancyMatrix) -> Result<()> {
        let rows: Vec<_> = matrix
            .pairs()
            .into_iter()
            .map(|(a, b, score, weight)| {
                let value =
                    HicsError::check_finite(|| format!("redundancy of ({}, {})", a, b), score)?;
                Ok((self.catalog.id_of(a)?, self.catalog.id_of(b)?, value, weight))
            })
            .collect::<Result<_>>()?;

        self.write(|store| {
            store.result_set(result_set)?;
            for (a, b, value, weight) in rows {
                store.upsert_redundancy(result_set, a, b, value, weight)?;
            }
            Ok(())
        })
    }

    fn get_slices(&self, result_set: ResultSetId) -> Result<HashMap<FeatureSubset, SliceEvidence>> {
        self.read(|store| {
            store
                .slices(result_set)
                .map(|row| Ok((self.catalog.subset_of(&row.features)?, row.evidence())))
                .collect()
        })
    }

    fn update_slices(
        &self,
        result_set: ResultSetId,
        slices: &HashMap<FeatureSubset, SliceEvidence>,
    ) -> Result<()> {
        let rows: Vec<_> = slices
            .iter()
            .map(|(subset, evidence)| {
                check_slice(subset, evidence)?;
                Ok((self.catalog.ids_of(subset)?, evidence))
            })
            .collect::<Result<_>>()?;

        self.write(|store| {
            store.result_set(result_set)?;
            for (features, evidence) in rows {
                store.upsert_slice(result_set, features, evidence)?;
            }
            Ok(())
        })
    }

    fn load_calculation(&self, id: CalculationId) -> Result<Calculation> {
        self.read(|store| store.calculation(id).cloned())
    }

    fn save_calculation(&self, calculation: &Calculation) -> Result<()> {
        self.write(|store| store.save_calculation(calculation))
    }
}

/// Every number of a slice must survive a round trip through the record files.
fn check_slice(subset: &FeatureSubset, evidence: &SliceEvidence) -> Result<()> {
    HicsError::check_finite(|| format!("slice deviation of [{}]", subset), evidence.deviation)?;
    HicsError::check_finite(|| format!("slice frequency of [{}]", subset), evidence.frequency)?;
    for bound in &evidence.definition {
        let values = match &bound.bound {
            SliceBound::Range { from_value, to_value } => vec![*from_value, *to_value],
            SliceBound::Categories { categories } => categories.clone(),
        };
        for value in values {
            HicsError::check_finite(
                || format!("slice bound of {} in [{}]", bound.feature, subset),
                value,
            )?;
        }
    }
    for point in evidence.marginal.iter().chain(&evidence.conditional) {
        HicsError::check_finite(|| format!("slice distribution of [{}]", subset), point.value)?;
        HicsError::check_finite(
            || format!("slice distribution of [{}]", subset),
            point.probability,
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::sampler::FeatureBound;

    fn storage() -> InMemoryStorage {
        InMemoryStorage::new(FeatureCatalog::new(vec![
            "a".to_string(),
            "b".to_string(),
            "t".to_string(),
        ]))
    }

    #[test]
    fn test_relevancies_round_trip_by_name() {
        let storage = storage();
        let rs = storage.create_result_set("t").unwrap();
        let relevancy = Relevancy {
            subset: FeatureSubset::new(["b", "a"]),
            relevancy: 0.25,
            iteration: 5,
        };
        storage.update_relevancies(rs, &[relevancy.clone()]).unwrap();
        assert_eq!(storage.get_relevancies(rs).unwrap(), vec![relevancy]);
    }

    #[test]
    fn test_non_finite_relevancy_is_not_written() {
        let storage = storage();
        let rs = storage.create_result_set("t").unwrap();
        let before = storage.revision();
        let bad = Relevancy {
            subset: FeatureSubset::new(["a"]),
            relevancy: f64::NAN,
            iteration: 1,
        };
        assert!(matches!(
            storage.update_relevancies(rs, &[bad]),
            Err(HicsError::NumericInstability { .. })
        ));
        assert_eq!(storage.revision(), before);
        assert!(storage.get_relevancies(rs).unwrap().is_empty());
    }

    #[test]
    fn test_slice_with_nan_bound_is_not_written() {
        let storage = storage();
        let rs = storage.create_result_set("t").unwrap();
        let before = storage.revision();
        let subset = FeatureSubset::new(["a"]);
        let slice = SliceEvidence {
            definition: vec![FeatureBound {
                feature: "a".to_string(),
                bound: SliceBound::Range {
                    from_value: f64::NAN,
                    to_value: f64::NAN,
                },
            }],
            marginal: Vec::new(),
            conditional: Vec::new(),
            deviation: 0.0,
            frequency: 0.0,
        };
        let slices: HashMap<_, _> = [(subset, slice)].into_iter().collect();

        assert!(matches!(
            storage.update_slices(rs, &slices),
            Err(HicsError::NumericInstability { .. })
        ));
        assert_eq!(storage.revision(), before);
        assert!(storage.get_slices(rs).unwrap().is_empty());
    }

    #[test]
    fn test_redundancies_filtered_by_requested_features() {
        let storage = storage();
        let rs = storage.create_result_set("t").unwrap();
        let mut matrix = RedundancyMatrix::new(vec!["a".to_string(), "b".to_string()]);
        matrix.set("a", "b", 0.3, 10.0).unwrap();
        storage.update_redundancies(rs, &matrix).unwrap();

        let loaded = storage
            .get_redundancies(rs, &["b".to_string(), "a".to_string()])
            .unwrap();
        assert_eq!(loaded.get("a", "b").unwrap(), (0.3, 10.0));

        let narrow = storage.get_redundancies(rs, &["a".to_string()]).unwrap();
        assert!(narrow.pairs().is_empty());
    }

    #[test]
    fn test_unknown_target_rejected() {
        let storage = storage();
        assert!(storage.create_result_set("zzz").is_err());
    }

    #[test]
    fn test_find_or_create_reuses_result_set() {
        let storage = storage();
        let first = storage.find_or_create_result_set("t").unwrap();
        let second = storage.find_or_create_result_set("t").unwrap();
        assert_eq!(first, second);
    }
}
