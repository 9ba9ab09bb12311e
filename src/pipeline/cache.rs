//! Process-wide registry of loaded datasets
//!
//! A dataset is parsed once and published as an `Arc<ColumnarTable>` under
//! its id. The registry map lock is held only to find or create the slot of
//! a dataset; the slot lock is held while that dataset is parsed, so loading
//! one dataset never blocks access to another. A slot lock may be held while
//! taking the map lock, never the other way round: code holding the map lock
//! only try-locks slots.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use super::error::{HicsError, Result};
use super::loader::{load_table, LoadOptions};
use super::table::ColumnarTable;

/// Resolves a dataset id to its durable file
pub trait DatasetSource: Send + Sync {
    fn dataset_path(&self, dataset_id: &str) -> Result<PathBuf>;
}

/// Datasets stored as `<root>/<id>.csv` or `<root>/<id>.parquet`
#[derive(Debug, Clone)]
pub struct DirectorySource {
    root: PathBuf,
}

impl DirectorySource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl DatasetSource for DirectorySource {
    fn dataset_path(&self, dataset_id: &str) -> Result<PathBuf> {
        for extension in ["csv", "parquet"] {
            let path = self.root.join(format!("{}.{}", dataset_id, extension));
            if path.exists() {
                return Ok(path);
            }
        }
        Err(HicsError::unavailable(
            dataset_id,
            format!("no dataset file in {}", self.root.display()),
        ))
    }
}

/// Explicit dataset id to file mapping
#[derive(Debug, Clone, Default)]
pub struct FileMapSource {
    files: HashMap<String, PathBuf>,
}

impl FileMapSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(mut self, dataset_id: impl Into<String>, path: impl AsRef<Path>) -> Self {
        self.insert(dataset_id, path);
        self
    }

    pub fn insert(&mut self, dataset_id: impl Into<String>, path: impl AsRef<Path>) {
        self.files
            .insert(dataset_id.into(), path.as_ref().to_path_buf());
    }
}

impl DatasetSource for FileMapSource {
    fn dataset_path(&self, dataset_id: &str) -> Result<PathBuf> {
        self.files
            .get(dataset_id)
            .cloned()
            .ok_or_else(|| HicsError::unavailable(dataset_id, "unknown dataset id"))
    }
}

#[derive(Default)]
struct Slot {
    table: Option<Arc<ColumnarTable>>,
    last_access: Option<Instant>,
    evicted: bool,
}

/// Shared, lazily populated table registry keyed by dataset id
pub struct DatasetCache<S: DatasetSource> {
    source: S,
    options: LoadOptions,
    slots: Mutex<HashMap<String, Arc<Mutex<Slot>>>>,
    loads: AtomicU64,
}

impl<S: DatasetSource> DatasetCache<S> {
    pub fn new(source: S) -> Self {
        Self::with_options(source, LoadOptions::default())
    }

    pub fn with_options(source: S, options: LoadOptions) -> Self {
        Self {
            source,
            options,
            slots: Mutex::new(HashMap::new()),
            loads: AtomicU64::new(0),
        }
    }

    fn slot(&self, dataset_id: &str) -> Arc<Mutex<Slot>> {
        let mut slots = self.slots.lock();
        Arc::clone(slots.entry(dataset_id.to_string()).or_default())
    }

    /// Drop the map entry of `dataset_id` if it still points at `slot`
    fn remove_slot(&self, dataset_id: &str, slot: &Arc<Mutex<Slot>>) {
        let mut slots = self.slots.lock();
        if slots.get(dataset_id).is_some_and(|s| Arc::ptr_eq(s, slot)) {
            slots.remove(dataset_id);
        }
    }

    /// Get the table of a dataset, parsing its durable file on a cache miss.
    pub fn acquire(&self, dataset_id: &str) -> Result<Arc<ColumnarTable>> {
        loop {
            let slot = self.slot(dataset_id);
            let mut guard = slot.lock();

            // Eviction removed this slot between lookup and lock
            if guard.evicted {
                continue;
            }

            guard.last_access = Some(Instant::now());

            if let Some(table) = &guard.table {
                info!(dataset_id, "Cache hit for dataset");
                return Ok(Arc::clone(table));
            }

            info!(dataset_id, "Cache miss for dataset");
            let loaded = self
                .source
                .dataset_path(dataset_id)
                .and_then(|path| load_table(dataset_id, &path, &self.options));
            let table = match loaded {
                Ok(table) => Arc::new(table),
                Err(e) => {
                    // Waiting acquirers retry on a fresh slot
                    guard.evicted = true;
                    drop(guard);
                    self.remove_slot(dataset_id, &slot);
                    return Err(e);
                }
            };
            self.loads.fetch_add(1, Ordering::Relaxed);
            guard.table = Some(Arc::clone(&table));
            info!(
                dataset_id,
                rows = table.height(),
                columns = table.width(),
                "Cache save for dataset"
            );
            return Ok(table);
        }
    }

    /// Refresh the access time of a cached dataset. Returns false if it is not cached.
    pub fn touch(&self, dataset_id: &str) -> bool {
        let slot = self.slots.lock().get(dataset_id).cloned();
        match slot {
            Some(slot) => {
                let mut guard = slot.lock();
                if guard.table.is_some() && !guard.evicted {
                    guard.last_access = Some(Instant::now());
                    true
                } else {
                    false
                }
            }
            None => false,
        }
    }

    /// Remove every dataset not accessed within `max_age`. Returns the evicted ids.
    pub fn evict_idle(&self, max_age: Duration) -> Vec<String> {
        let now = Instant::now();
        self.evict_where(|slot| match slot.last_access {
            Some(last) => now.duration_since(last) > max_age,
            None => false,
        })
    }

    /// Remove one dataset regardless of its access time
    ///
    /// Waits for an in-flight load of the same dataset, never for other datasets.
    pub fn evict(&self, dataset_id: &str) -> bool {
        let Some(slot) = self.slots.lock().get(dataset_id).cloned() else {
            return false;
        };
        {
            let mut guard = slot.lock();
            if guard.evicted {
                return false;
            }
            guard.evicted = true;
            guard.table = None;
        }
        self.remove_slot(dataset_id, &slot);
        info!(dataset_id, "Evicted dataset");
        true
    }

    fn evict_where(&self, is_idle: impl Fn(&Slot) -> bool) -> Vec<String> {
        let mut slots = self.slots.lock();
        let mut evicted = Vec::new();

        slots.retain(|dataset_id, slot| {
            // A slot locked by an in-flight acquire is in use
            let Some(mut guard) = slot.try_lock() else {
                debug!(dataset_id = dataset_id.as_str(), "Skipping busy dataset");
                return true;
            };
            if guard.table.is_some() && is_idle(&guard) {
                guard.evicted = true;
                guard.table = None;
                evicted.push(dataset_id.clone());
                false
            } else {
                true
            }
        });

        for dataset_id in &evicted {
            info!(dataset_id = dataset_id.as_str(), "Evicted idle dataset");
        }
        evicted
    }

    pub fn contains(&self, dataset_id: &str) -> bool {
        let slot = self.slots.lock().get(dataset_id).cloned();
        slot.map(|s| s.lock().table.is_some()).unwrap_or(false)
    }

    /// Number of datasets currently cached
    pub fn len(&self) -> usize {
        let slots: Vec<_> = self.slots.lock().values().cloned().collect();
        slots.iter().filter(|s| s.lock().table.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of times a durable file has been parsed (cache misses that succeeded)
    pub fn loads(&self) -> u64 {
        self.loads.load(Ordering::Relaxed)
    }
}

impl<S: DatasetSource + 'static> DatasetCache<S> {
    /// Start a background thread that calls `evict_idle(max_age)` every `interval`.
    pub fn spawn_evictor(
        self: &Arc<Self>,
        interval: Duration,
        max_age: Duration,
    ) -> EvictorHandle {
        let cache = Arc::clone(self);
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = Arc::clone(&stop);
        let tick = interval.min(Duration::from_millis(100)).max(Duration::from_millis(1));

        let handle = std::thread::spawn(move || {
            let mut waited = Duration::ZERO;
            while !stop_flag.load(Ordering::Relaxed) {
                std::thread::sleep(tick);
                waited += tick;
                if waited >= interval {
                    waited = Duration::ZERO;
                    cache.evict_idle(max_age);
                }
            }
        });

        EvictorHandle {
            stop,
            handle: Some(handle),
        }
    }
}

/// Handle to a running background evictor. Dropping it stops the thread.
pub struct EvictorHandle {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl EvictorHandle {
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for EvictorHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_csv(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "a,b").unwrap();
        writeln!(file, "1,2").unwrap();
        writeln!(file, "3,4").unwrap();
        path
    }

    #[test]
    fn test_directory_source_resolves_csv() {
        let dir = TempDir::new().unwrap();
        write_csv(dir.path(), "ds1.csv");
        let source = DirectorySource::new(dir.path());
        assert!(source.dataset_path("ds1").is_ok());
        assert!(matches!(
            source.dataset_path("ds2"),
            Err(HicsError::DatasetUnavailable { .. })
        ));
    }

    #[test]
    fn test_evict_removes_dataset() {
        let dir = TempDir::new().unwrap();
        let path = write_csv(dir.path(), "data.csv");
        let cache = DatasetCache::new(FileMapSource::new().with_file("ds", &path));

        cache.acquire("ds").unwrap();
        assert!(cache.contains("ds"));
        assert!(cache.evict("ds"));
        assert!(!cache.contains("ds"));
        assert!(!cache.evict("ds"));
    }

    #[test]
    fn test_touch_requires_cached_dataset() {
        let dir = TempDir::new().unwrap();
        let path = write_csv(dir.path(), "data.csv");
        let cache = DatasetCache::new(FileMapSource::new().with_file("ds", &path));

        assert!(!cache.touch("ds"));
        cache.acquire("ds").unwrap();
        assert!(cache.touch("ds"));
    }

    #[test]
    fn test_failed_load_is_not_cached() {
        let cache = DatasetCache::new(FileMapSource::new().with_file("ds", "/nonexistent/x.csv"));
        assert!(cache.acquire("ds").is_err());
        assert!(!cache.contains("ds"));
        assert_eq!(cache.loads(), 0);
        assert!(cache.slots.lock().is_empty());
    }

    #[test]
    fn test_failed_loads_leave_no_slots() {
        let cache = DatasetCache::new(FileMapSource::new());
        for i in 0..50 {
            assert!(cache.acquire(&format!("missing-{}", i)).is_err());
        }
        assert!(cache.slots.lock().is_empty());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_evict_waits_without_blocking_other_datasets() {
        let dir = TempDir::new().unwrap();
        let first = write_csv(dir.path(), "first.csv");
        let second = write_csv(dir.path(), "second.csv");
        let cache = DatasetCache::new(
            FileMapSource::new()
                .with_file("first", &first)
                .with_file("second", &second),
        );
        cache.acquire("first").unwrap();

        std::thread::scope(|scope| {
            let cache = &cache;
            // Stand-in for a long load of "first"
            let slot = cache.slot("first");
            let guard = slot.lock();

            let evictor = scope.spawn(|| cache.evict("first"));
            std::thread::sleep(Duration::from_millis(50));

            let (tx, rx) = std::sync::mpsc::channel();
            scope.spawn(move || {
                let _ = tx.send(cache.acquire("second").is_ok());
            });
            let acquired = rx.recv_timeout(Duration::from_secs(5));
            drop(guard);

            assert_eq!(acquired, Ok(true));
            assert!(evictor.join().unwrap());
        });

        assert!(!cache.contains("first"));
        assert!(cache.contains("second"));
    }
}
