//! Host key-value surfaces.
//!
//! The private store and the shared document store are both reached through
//! [`KvStore`]. Two backends ship here:
//!
//! - [`MemoryStore`]: in-process map with per-key write counters and
//!   switchable failures, for tests and embedded hosts.
//! - [`FileStore`]: one JSON file per key under
//!   `<home>/.stencil/store/`, written with the `.tmp` + rename pattern.

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

use crate::error::{io_err, StoreError};

/// Async key-value API provided by the host.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Read a value. `Ok(None)` when the key was never written.
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError>;

    /// Write a value, replacing any previous one.
    async fn set(&self, key: &str, value: Value) -> Result<(), StoreError>;

    /// Delete a value. Deleting an absent key succeeds.
    async fn remove(&self, key: &str) -> Result<(), StoreError>;
}

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct MemoryInner {
    entries: BTreeMap<String, Value>,
    writes: BTreeMap<String, usize>,
}

/// In-memory [`KvStore`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<MemoryInner>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `get` fail until switched off.
    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Make every subsequent `set`/`remove` fail until switched off.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of successful writes to `key`.
    pub async fn writes(&self, key: &str) -> usize {
        self.inner.read().await.writes.get(key).copied().unwrap_or(0)
    }

    /// Snapshot of every stored key.
    pub async fn keys(&self) -> Vec<String> {
        self.inner.read().await.entries.keys().cloned().collect()
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable(format!("read of '{key}' refused")));
        }
        Ok(self.inner.read().await.entries.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable(format!("write of '{key}' refused")));
        }
        let mut inner = self.inner.write().await;
        inner.entries.insert(key.to_owned(), value);
        *inner.writes.entry(key.to_owned()).or_default() += 1;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable(format!("remove of '{key}' refused")));
        }
        self.inner.write().await.entries.remove(key);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// FileStore
// ---------------------------------------------------------------------------

/// File-backed [`KvStore`]: `<root>/<sanitized key>.json`.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

/// `<home>/.stencil/store/`, pure, no I/O.
pub fn store_root_at(home: &Path) -> PathBuf {
    home.join(".stencil").join("store")
}

impl FileStore {
    /// Store rooted at an explicit directory.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Store rooted at `<home>/.stencil/store/`.
    pub fn at(home: &Path) -> Self {
        Self::with_root(store_root_at(home))
    }

    /// Store rooted under the user's home directory.
    pub fn new() -> Result<Self, StoreError> {
        let home = dirs::home_dir().ok_or(StoreError::HomeNotFound)?;
        Ok(Self::at(&home))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// File backing `key`. Characters outside `[A-Za-z0-9._-]` become `_`.
    pub fn path_for(&self, key: &str) -> PathBuf {
        let name: String = key
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.root.join(format!("{name}.json"))
    }
}

#[async_trait]
impl KvStore for FileStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        let path = self.path_for(key);
        let contents = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => contents,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(io_err(key, &path, err)),
        };
        Ok(Some(serde_json::from_str(&contents)?))
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
        let path = self.path_for(key);
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| io_err(key, &self.root, e))?;

        let json = serde_json::to_string_pretty(&value)?;
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json)
            .await
            .map_err(|e| io_err(key, &tmp, e))?;
        if let Err(err) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(io_err(key, &path, err));
        }
        tracing::debug!("stored '{key}' at {}", path.display());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        let path = self.path_for(key);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(io_err(key, &path, err)),
        }
    }
}
