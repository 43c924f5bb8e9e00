//! Record store backends for the classroom economy.

#![deny(unsafe_code)]

use classgold_core::store::{Collection, RecordStore, StoreError};
use serde_json::Value;
use std::collections::BTreeSet;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

/// One JSON file per collection under a data directory.
///
/// Every save writes a temp file and renames it over the target, so a
/// collection is either fully old or fully new on disk.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn collection_path(&self, collection: Collection) -> PathBuf {
        self.dir.join(format!("{}.json", collection.key()))
    }
}

impl RecordStore for JsonFileStore {
    fn label(&self) -> &'static str {
        "json-file"
    }

    fn load(&self, collection: Collection) -> Result<Option<Vec<Value>>, StoreError> {
        let path = self.collection_path(collection);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        if bytes.is_empty() {
            return Ok(None);
        }
        Ok(Some(serde_json::from_slice(&bytes)?))
    }

    fn save(&self, collection: Collection, records: Vec<Value>) -> Result<(), StoreError> {
        fs::create_dir_all(&self.dir)?;
        let path = self.collection_path(collection);
        let bytes = serde_json::to_vec_pretty(&records)?;
        let tmp_path = path.with_extension("tmp");
        fs::write(&tmp_path, bytes)?;
        fs::rename(tmp_path, &path)?;
        debug!(collection = %collection, records = records.len(), "Collection persisted");
        Ok(())
    }

    fn clear(&self) -> Result<(), StoreError> {
        for collection in Collection::ALL {
            match fs::remove_file(self.collection_path(collection)) {
                Ok(()) => {}
                Err(err) if err.kind() == ErrorKind::NotFound => {}
                Err(err) => return Err(err.into()),
            }
        }
        Ok(())
    }
}

/// Wraps a store and fails writes to chosen collections.
///
/// Useful for exercising rollback paths against a real backend.
pub struct FaultyStore {
    inner: Arc<dyn RecordStore>,
    failing: Mutex<BTreeSet<Collection>>,
    reason: String,
}

impl FaultyStore {
    pub fn new(inner: Arc<dyn RecordStore>, reason: impl Into<String>) -> Self {
        Self {
            inner,
            failing: Mutex::new(BTreeSet::new()),
            reason: reason.into(),
        }
    }

    pub fn fail_writes(&self, collection: Collection) -> Result<(), StoreError> {
        self.failing_set()?.insert(collection);
        Ok(())
    }

    pub fn heal(&self) -> Result<(), StoreError> {
        self.failing_set()?.clear();
        Ok(())
    }

    fn failing_set(&self) -> Result<MutexGuard<'_, BTreeSet<Collection>>, StoreError> {
        self.failing
            .lock()
            .map_err(|_| StoreError::Unavailable("fault set lock poisoned".to_string()))
    }

    fn is_failing(&self, collection: Collection) -> Result<bool, StoreError> {
        Ok(self.failing_set()?.contains(&collection))
    }
}

impl RecordStore for FaultyStore {
    fn label(&self) -> &'static str {
        "faulty"
    }

    fn load(&self, collection: Collection) -> Result<Option<Vec<Value>>, StoreError> {
        self.inner.load(collection)
    }

    fn save(&self, collection: Collection, records: Vec<Value>) -> Result<(), StoreError> {
        if self.is_failing(collection)? {
            return Err(StoreError::Unavailable(format!(
                "{collection}: {}",
                self.reason
            )));
        }
        self.inner.save(collection, records)
    }

    fn clear(&self) -> Result<(), StoreError> {
        self.inner.clear()
    }
}
