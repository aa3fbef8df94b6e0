//! Persistent block-name → classification store.
//!
//! Keys are the block identifier text and nothing else: every instance of a
//! block name anywhere in a drawing shares one record. Records never expire;
//! [`CacheStore::clear`] is the only way to drop them.

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use extract::{Classification, ClassificationMethod};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::CacheError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheRecord {
    pub category: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub confidence: f64,
    pub reasoning: String,
    pub cached_at: DateTime<Utc>,
}

impl CacheRecord {
    pub fn to_classification(&self) -> Classification {
        Classification {
            category: self.category.clone(),
            kind: self.kind.clone(),
            confidence: self.confidence,
            reasoning: self.reasoning.clone(),
            method: ClassificationMethod::Cached,
        }
    }

    fn is_valid(&self) -> bool {
        !self.category.is_empty()
            && !self.kind.is_empty()
            && self.confidence.is_finite()
            && (0.0..=1.0).contains(&self.confidence)
    }
}

#[derive(Debug, Serialize)]
pub struct CacheStats {
    pub total: usize,
    pub categories: BTreeMap<String, usize>,
}

pub struct CacheStore {
    path: Option<PathBuf>,
    records: DashMap<String, CacheRecord>,
    /// Held for every mutation; counts records written since the last flush.
    writer: Mutex<usize>,
    flush_lock: tokio::sync::Mutex<()>,
    /// Cleared when the file on disk could not be read, so it is never
    /// overwritten with a partial map.
    persist: AtomicBool,
    flush_every: usize,
}

impl CacheStore {
    /// Store backed by `path`. Nothing is read until [`CacheStore::load`].
    pub fn new(path: impl Into<PathBuf>, flush_every: usize) -> Self {
        Self {
            path: Some(path.into()),
            records: DashMap::new(),
            writer: Mutex::new(0),
            flush_lock: tokio::sync::Mutex::new(()),
            persist: AtomicBool::new(true),
            flush_every,
        }
    }

    /// Store that lives only for this process.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            persist: AtomicBool::new(false),
            ..Self::new(PathBuf::new(), 0)
        }
    }

    /// Create and load in one step. A load failure is logged and the store
    /// carries on in memory.
    pub async fn open(path: impl Into<PathBuf>, flush_every: usize) -> Self {
        let store = Self::new(path, flush_every);
        if let Err(e) = store.load().await {
            warn!(error = %e, "Cache unavailable, continuing in memory only");
        }
        store
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn is_persistent(&self) -> bool {
        self.persist.load(Ordering::SeqCst)
    }

    /// Replace the in-memory map with the persisted one. A missing file is an
    /// empty cache. Returns the number of records loaded.
    pub async fn load(&self) -> Result<usize, CacheError> {
        let Some(path) = &self.path else {
            return Ok(0);
        };

        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %path.display(), "No cache file yet");
                return Ok(0);
            }
            Err(source) => {
                self.persist.store(false, Ordering::SeqCst);
                return Err(CacheError::Io {
                    path: path.clone(),
                    source,
                });
            }
        };

        let loaded: BTreeMap<String, CacheRecord> =
            serde_json::from_slice(&bytes).map_err(|source| {
                self.persist.store(false, Ordering::SeqCst);
                CacheError::Parse {
                    path: path.clone(),
                    source,
                }
            })?;

        let mut unflushed = self.lock_writer();
        self.records.clear();
        for (key, record) in loaded {
            if record.is_valid() {
                self.records.insert(key, record);
            } else {
                warn!(block = %key, "Dropping invalid cache record");
            }
        }
        *unflushed = 0;

        let count = self.records.len();
        info!(path = %path.display(), records = count, "Cache loaded");
        Ok(count)
    }

    pub fn get(&self, key: &str) -> Option<Classification> {
        self.records.get(key).map(|r| r.to_classification())
    }

    pub fn record(&self, key: &str) -> Option<CacheRecord> {
        self.records.get(key).map(|r| r.value().clone())
    }

    /// Store `classification` under `key`, replacing any previous record.
    /// Returns true once enough writes have piled up to warrant a flush.
    pub fn set(&self, key: &str, classification: &Classification) -> bool {
        let record = CacheRecord {
            category: classification.category.clone(),
            kind: classification.kind.clone(),
            confidence: classification.confidence,
            reasoning: classification.reasoning.clone(),
            cached_at: Utc::now(),
        };

        let mut unflushed = self.lock_writer();
        self.records.insert(key.to_string(), record);
        *unflushed += 1;

        self.flush_every > 0 && *unflushed >= self.flush_every
    }

    /// Write the whole map to disk via a temporary file and rename, so the
    /// file is always either the previous or the new complete map.
    pub async fn flush(&self) -> Result<usize, CacheError> {
        let Some(path) = &self.path else {
            return Ok(0);
        };
        if !self.is_persistent() {
            debug!("Cache is in-memory only, flush skipped");
            return Ok(0);
        }

        let _flushing = self.flush_lock.lock().await;

        let snapshot: BTreeMap<String, CacheRecord> = {
            let mut unflushed = self.lock_writer();
            *unflushed = 0;
            self.records
                .iter()
                .map(|r| (r.key().clone(), r.value().clone()))
                .collect()
        };
        let json = serde_json::to_vec_pretty(&snapshot)?;

        let io_err = |source| CacheError::Io {
            path: path.clone(),
            source,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
        }

        let tmp = temp_path(path);
        tokio::fs::write(&tmp, &json).await.map_err(io_err)?;
        tokio::fs::rename(&tmp, path).await.map_err(io_err)?;

        info!(path = %path.display(), records = snapshot.len(), "Cache flushed");
        Ok(snapshot.len())
    }

    /// Drop every record and delete the persisted file.
    pub async fn clear(&self) -> Result<(), CacheError> {
        {
            let mut unflushed = self.lock_writer();
            self.records.clear();
            *unflushed = 0;
        }

        if let Some(path) = &self.path {
            match tokio::fs::remove_file(path).await {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(source) => {
                    return Err(CacheError::Io {
                        path: path.clone(),
                        source,
                    });
                }
            }
            // the unreadable file is gone, so persisting is safe again
            self.persist.store(true, Ordering::SeqCst);
        }

        info!("Cache cleared");
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        let mut categories = BTreeMap::new();
        for record in self.records.iter() {
            *categories.entry(record.category.clone()).or_insert(0) += 1;
        }
        CacheStats {
            total: self.records.len(),
            categories,
        }
    }

    fn lock_writer(&self) -> std::sync::MutexGuard<'_, usize> {
        self.writer.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
