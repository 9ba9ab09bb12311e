use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::memory::InMemoryStorage;
use super::records::RecordStore;
use super::{FeatureCatalog, FeatureSubset, RedundancyMatrix, Relevancy, ResultStorage};
use crate::pipeline::calculation::{
    Calculation, CalculationId, HicsRequest, ResultSet, ResultSetId,
};
use crate::pipeline::error::{HicsError, Result};
use crate::pipeline::sampler::SliceEvidence;

/// Result storage backed by a single JSON document.
///
/// Every write rewrites the whole file through a temporary sibling and a
/// rename, so readers never observe a partially written document.
#[derive(Debug)]
pub struct JsonFileStorage {
    path: PathBuf,
    inner: InMemoryStorage,
    persist: Mutex<()>,
}

impl JsonFileStorage {
    /// Open the store at `path`, creating an empty one if the file is missing.
    ///
    /// Fails if the file holds duplicate keys or was written for a dataset
    /// with different columns.
    pub fn open(path: impl Into<PathBuf>, catalog: FeatureCatalog) -> Result<Self> {
        let path = path.into();
        let store = if path.exists() {
            let content = fs::read_to_string(&path)?;
            let mut store: RecordStore = serde_json::from_str(&content)?;
            store.validate()?;
            if store.features.is_empty() {
                store.features = catalog.names().to_vec();
            } else if store.features != catalog.names() {
                return Err(HicsError::InvalidParameter(format!(
                    "result store {} was written for different dataset columns",
                    path.display()
                )));
            }
            info!(
                path = %path.display(),
                result_sets = store.result_sets.len(),
                relevancies = store.relevancies.len(),
                "Opened result store"
            );
            store
        } else {
            debug!(path = %path.display(), "Creating new result store");
            RecordStore::new(catalog.names().to_vec())
        };

        Ok(Self {
            path,
            inner: InMemoryStorage::with_store(catalog, store),
            persist: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn revision(&self) -> u64 {
        self.inner.revision()
    }

    pub fn snapshot(&self) -> RecordStore {
        self.inner.snapshot()
    }

    /// Apply a write and persist it. On a failed flush the records fall back
    /// to what the file holds.
    fn persisted<T>(&self, f: impl FnOnce(&InMemoryStorage) -> Result<T>) -> Result<T> {
        let _guard = self.persist.lock();
        let before = self.inner.snapshot();
        let value = f(&self.inner)?;
        if let Err(e) = self.flush() {
            warn!(path = %self.path.display(), error = %e, "Failed to persist result store");
            self.inner.restore(before);
            return Err(e);
        }
        Ok(value)
    }

    fn flush(&self) -> Result<()> {
        let json = serde_json::to_string_pretty(&self.inner.snapshot())?;
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    pub fn create_result_set(&self, target: &str) -> Result<ResultSetId> {
        self.persisted(|inner| inner.create_result_set(target))
    }

    pub fn find_or_create_result_set(&self, target: &str) -> Result<ResultSetId> {
        self.persisted(|inner| inner.find_or_create_result_set(target))
    }

    pub fn create_calculation(
        &self,
        result_set: ResultSetId,
        request: HicsRequest,
        max_iteration: u32,
    ) -> Result<Calculation> {
        self.persisted(|inner| inner.create_calculation(result_set, request, max_iteration))
    }
}

impl ResultStorage for JsonFileStorage {
    fn load_result_set(&self, result_set: ResultSetId) -> Result<ResultSet> {
        self.inner.load_result_set(result_set)
    }

    fn get_relevancies(&self, result_set: ResultSetId) -> Result<Vec<Relevancy>> {
        self.inner.get_relevancies(result_set)
    }

    fn update_relevancies(&self, result_set: ResultSetId, relevancies: &[Relevancy]) -> Result<()> {
        self.persisted(|inner| inner.update_relevancies(result_set, relevancies))
    }

    fn get_redundancies(
        &self,
        result_set: ResultSetId,
        features: &[String],
    ) -> Result<RedundancyMatrix> {
        self.inner.get_redundancies(result_set, features)
    }

    fn update_redundancies(&self, result_set: ResultSetId, matrix: &RedundancyMatrix) -> Result<()> {
        self.persisted(|inner| inner.update_redundancies(result_set, matrix))
    }

    fn get_slices(&self, result_set: ResultSetId) -> Result<HashMap<FeatureSubset, SliceEvidence>> {
        self.inner.get_slices(result_set)
    }

    fn update_slices(
        &self,
        result_set: ResultSetId,
        slices: &HashMap<FeatureSubset, SliceEvidence>,
    ) -> Result<()> {
        self.persisted(|inner| inner.update_slices(result_set, slices))
    }

    fn load_calculation(&self, id: CalculationId) -> Result<Calculation> {
        self.inner.load_calculation(id)
    }

    fn save_calculation(&self, calculation: &Calculation) -> Result<()> {
        self.persisted(|inner| inner.save_calculation(calculation))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn catalog() -> FeatureCatalog {
        FeatureCatalog::new(vec!["a".to_string(), "b".to_string(), "t".to_string()])
    }

    #[test]
    fn test_records_survive_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("results.json");

        let storage = JsonFileStorage::open(&path, catalog()).unwrap();
        let rs = storage.create_result_set("t").unwrap();
        storage
            .update_relevancies(
                rs,
                &[Relevancy {
                    subset: FeatureSubset::new(["a"]),
                    relevancy: 0.4,
                    iteration: 5,
                }],
            )
            .unwrap();
        drop(storage);

        let reopened = JsonFileStorage::open(&path, catalog()).unwrap();
        let relevancies = reopened.get_relevancies(rs).unwrap();
        assert_eq!(relevancies.len(), 1);
        assert_eq!(relevancies[0].relevancy, 0.4);
        assert!(!dir.path().join("results.json.tmp").exists());
    }

    #[test]
    fn test_failed_flush_rolls_back_write() {
        let dir = TempDir::new().unwrap();
        let store_dir = dir.path().join("store");
        fs::create_dir(&store_dir).unwrap();
        let storage = JsonFileStorage::open(store_dir.join("results.json"), catalog()).unwrap();
        let rs = storage.create_result_set("t").unwrap();

        fs::remove_dir_all(&store_dir).unwrap();
        let result = storage.update_relevancies(
            rs,
            &[Relevancy {
                subset: FeatureSubset::new(["a"]),
                relevancy: 0.4,
                iteration: 5,
            }],
        );

        assert!(matches!(result, Err(HicsError::Io(_))));
        assert!(storage.get_relevancies(rs).unwrap().is_empty());
        assert_eq!(storage.load_result_set(rs).unwrap().id, rs);
    }

    #[test]
    fn test_mismatched_columns_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("results.json");
        let storage = JsonFileStorage::open(&path, catalog()).unwrap();
        storage.create_result_set("t").unwrap();

        let other = FeatureCatalog::new(vec!["x".to_string(), "t".to_string()]);
        assert!(matches!(
            JsonFileStorage::open(&path, other),
            Err(HicsError::InvalidParameter(_))
        ));
    }
}
