//! Sample set persistence
//!
//! The durable-storage collaborator is best-effort: callers log failures and
//! carry on. A data directory contains:
//! - meta.json: Version and timestamps
//! - samples.json: Feature layout, labels and their vectors

use crate::samples::StoreSnapshot;
use crate::training::BackendError;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use thiserror::Error;

pub const SAMPLES_FILE: &str = "samples.json";
pub const META_FILE: &str = "meta.json";

/// Persistence errors
#[derive(Error, Debug)]
pub enum PersistError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Missing required file: {0}")]
    MissingFile(String),

    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    #[error("Model error: {0}")]
    Backend(#[from] BackendError),
}

/// Version and timestamps written next to the samples
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageMeta {
    pub version: String,
    pub format: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Default for StorageMeta {
    fn default() -> Self {
        let now = Utc::now();
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            format: "gsd-v1".to_string(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// Durable storage for the label/sample set
pub trait SampleRepository: Send + Sync {
    fn persist(&self, snapshot: &StoreSnapshot) -> Result<(), PersistError>;

    /// Previously persisted samples, or `None` when nothing was stored yet
    fn restore(&self) -> Result<Option<StoreSnapshot>, PersistError>;
}

/// Repository writing JSON files into a data directory
#[derive(Debug, Clone)]
pub struct JsonFileRepository {
    dir: PathBuf,
}

impl JsonFileRepository {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn read_meta(&self) -> Result<Option<StorageMeta>, PersistError> {
        let meta_path = self.dir.join(META_FILE);
        if !meta_path.exists() {
            return Ok(None);
        }
        let meta_content = fs::read_to_string(&meta_path)?;
        Ok(Some(serde_json::from_str(&meta_content)?))
    }

    /// Write through a temp file in the same directory so readers never see
    /// a half-written file
    fn write_atomic(&self, name: &str, content: &[u8]) -> Result<(), PersistError> {
        let mut file = tempfile::NamedTempFile::new_in(&self.dir)?;
        file.write_all(content)?;
        file.persist(self.dir.join(name))
            .map_err(|e| PersistError::Io(e.error))?;
        Ok(())
    }
}

impl SampleRepository for JsonFileRepository {
    fn persist(&self, snapshot: &StoreSnapshot) -> Result<(), PersistError> {
        if !self.dir.exists() {
            fs::create_dir_all(&self.dir)?;
        }

        let samples_content = serde_json::to_vec(snapshot)?;
        self.write_atomic(SAMPLES_FILE, &samples_content)?;

        // Keep the original creation time across saves
        let mut meta = match self.read_meta() {
            Ok(Some(meta)) => meta,
            Ok(None) => StorageMeta::default(),
            Err(e) => {
                tracing::warn!("Replacing unreadable {}: {}", META_FILE, e);
                StorageMeta::default()
            }
        };
        meta.updated_at = Utc::now();
        let meta_content = serde_json::to_vec_pretty(&meta)?;
        self.write_atomic(META_FILE, &meta_content)?;

        let total: usize = snapshot.labels.iter().map(|l| l.samples.len()).sum();
        tracing::debug!(
            "Saved {} labels / {} samples to {:?}",
            snapshot.labels.len(),
            total,
            self.dir
        );
        Ok(())
    }

    fn restore(&self) -> Result<Option<StoreSnapshot>, PersistError> {
        let samples_path = self.dir.join(SAMPLES_FILE);
        if !samples_path.exists() {
            return Ok(None);
        }

        let samples_content = fs::read_to_string(&samples_path)?;
        let snapshot: StoreSnapshot = serde_json::from_str(&samples_content)?;

        tracing::debug!(
            "Loaded {} labels from {:?}",
            snapshot.labels.len(),
            self.dir
        );
        Ok(Some(snapshot))
    }
}

/// In-process repository for hosts without a disk and for tests
#[derive(Debug, Default)]
pub struct MemoryRepository {
    stored: Mutex<Option<StoreSnapshot>>,
    persist_count: AtomicUsize,
    failing: AtomicBool,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail, simulating an unavailable backend
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::Relaxed);
    }

    /// Number of successful persist calls
    pub fn persist_count(&self) -> usize {
        self.persist_count.load(Ordering::Relaxed)
    }

    pub fn last_snapshot(&self) -> Option<StoreSnapshot> {
        self.stored.lock().clone()
    }

    fn check_available(&self) -> Result<(), PersistError> {
        if self.failing.load(Ordering::Relaxed) {
            return Err(PersistError::Unavailable("memory repository disabled".to_string()));
        }
        Ok(())
    }
}

impl SampleRepository for MemoryRepository {
    fn persist(&self, snapshot: &StoreSnapshot) -> Result<(), PersistError> {
        self.check_available()?;
        *self.stored.lock() = Some(snapshot.clone());
        self.persist_count.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn restore(&self) -> Result<Option<StoreSnapshot>, PersistError> {
        self.check_available()?;
        Ok(self.stored.lock().clone())
    }
}
