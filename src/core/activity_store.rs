//! Bounded, persisted activity log.
//!
//! The store keeps the most recent `max_items` deliveries in arrival order.
//! The in-memory sequence is the source of truth while the process runs; every
//! append rewrites the whole sequence to durable storage before it returns, so
//! a restart reloads the latest bounded state.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use fs2::FileExt;
use tempfile::NamedTempFile;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, Instrument};

use crate::domain::ActivityLogEntry;

/// File name of the persisted log inside the store directory
pub const ACTIVITY_FILE: &str = "activity.json";

/// File name of the advisory lock inside the store directory
pub const LOCK_FILE: &str = "activity.lock";

/// Errors raised while reading or writing the activity log
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Activity log is corrupt: {0}")]
    Corrupt(String),

    #[error("Activity store at {} is locked by another process", path.display())]
    Locked { path: PathBuf },

    #[error("max_items must be at least 1")]
    InvalidCapacity,
}

/// Durable backing for the activity log.
///
/// Implementations persist an opaque byte blob. `read` returns an empty
/// buffer when nothing has been persisted yet.
#[async_trait]
pub trait ActivityStorage: Send + Sync {
    /// Read the whole persisted state
    async fn read(&self) -> Result<Vec<u8>, StoreError>;

    /// Replace the whole persisted state; must be durable when it returns
    async fn write(&self, bytes: &[u8]) -> Result<(), StoreError>;
}

/// File-backed storage: `<dir>/activity.json`, rewritten atomically.
///
/// Holds an exclusive advisory lock on `<dir>/activity.lock` for its whole
/// lifetime so that only one process owns a store directory.
pub struct FileStorage {
    dir: PathBuf,
    data_path: PathBuf,
    _lock: File,
}

impl FileStorage {
    /// Open (creating if needed) a store directory and take its lock
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;

        let lock_path = dir.join(LOCK_FILE);
        let lock = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&lock_path)?;
        lock.try_lock_exclusive()
            .map_err(|_| StoreError::Locked { path: dir.clone() })?;

        Ok(Self {
            data_path: dir.join(ACTIVITY_FILE),
            dir,
            _lock: lock,
        })
    }

    /// Directory holding the store files
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the persisted log
    pub fn data_path(&self) -> &Path {
        &self.data_path
    }
}

#[async_trait]
impl ActivityStorage for FileStorage {
    async fn read(&self) -> Result<Vec<u8>, StoreError> {
        match tokio::fs::read(&self.data_path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn write(&self, bytes: &[u8]) -> Result<(), StoreError> {
        let dir = self.dir.clone();
        let target = self.data_path.clone();
        let bytes = bytes.to_vec();

        tokio::task::spawn_blocking(move || -> Result<(), StoreError> {
            // Temp file in the same directory so the rename stays atomic
            let mut tmp = NamedTempFile::new_in(&dir)?;
            tmp.write_all(&bytes)?;
            tmp.as_file().sync_all()?;
            tmp.persist(&target).map_err(|e| StoreError::Io(e.error))?;
            Ok(())
        })
        .await
        .map_err(|e| StoreError::Io(std::io::Error::other(e)))?
    }
}

/// Volatile storage, mainly for tests and dry runs
#[derive(Default)]
pub struct MemoryStorage {
    bytes: std::sync::Mutex<Vec<u8>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the storage with previously persisted content
    pub fn with_contents(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: std::sync::Mutex::new(bytes.into()),
        }
    }

    /// Snapshot of the currently persisted bytes
    pub fn contents(&self) -> Vec<u8> {
        self.bytes.lock().map(|b| b.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl ActivityStorage for MemoryStorage {
    async fn read(&self) -> Result<Vec<u8>, StoreError> {
        Ok(self.contents())
    }

    async fn write(&self, bytes: &[u8]) -> Result<(), StoreError> {
        let mut guard = self
            .bytes
            .lock()
            .map_err(|_| StoreError::Corrupt("memory storage lock poisoned".to_string()))?;
        *guard = bytes.to_vec();
        Ok(())
    }
}

#[async_trait]
impl<T: ActivityStorage + ?Sized> ActivityStorage for Arc<T> {
    async fn read(&self) -> Result<Vec<u8>, StoreError> {
        (**self).read().await
    }

    async fn write(&self, bytes: &[u8]) -> Result<(), StoreError> {
        (**self).write(bytes).await
    }
}

/// Bounded activity log with FIFO eviction
pub struct ActivityStore {
    max_items: usize,
    storage: Arc<dyn ActivityStorage>,
    entries: Arc<Mutex<Vec<ActivityLogEntry>>>,
}

impl ActivityStore {
    /// Attach to a storage backend and eagerly load what it holds.
    ///
    /// Empty storage yields an empty store. Content that cannot be decoded is
    /// reported as [`StoreError::Corrupt`].
    pub async fn open(
        storage: impl ActivityStorage + 'static,
        max_items: usize,
    ) -> Result<Self, StoreError> {
        if max_items == 0 {
            return Err(StoreError::InvalidCapacity);
        }

        let storage: Arc<dyn ActivityStorage> = Arc::new(storage);
        let mut entries = decode(&storage.read().await?)?;
        if entries.len() > max_items {
            let excess = entries.len() - max_items;
            info!(excess, max_items, "Trimming reloaded activity to capacity");
            entries.drain(..excess);
        }

        debug!(count = entries.len(), max_items, "Activity store loaded");

        Ok(Self {
            max_items,
            storage,
            entries: Arc::new(Mutex::new(entries)),
        })
    }

    /// Open a file-backed store in `dir`
    pub async fn open_dir(dir: impl AsRef<Path>, max_items: usize) -> Result<Self, StoreError> {
        Self::open(FileStorage::open(dir)?, max_items).await
    }

    /// Append an entry, evicting the oldest entries beyond capacity, and
    /// persist the result. Returns the evicted entries.
    ///
    /// The in-memory log only changes once persistence succeeded. The commit
    /// runs on its own task, so dropping the returned future does not leave
    /// memory and durable state apart.
    #[instrument(skip(self, entry), fields(request_id = %entry.request_id))]
    pub async fn append(&self, entry: ActivityLogEntry) -> Result<Vec<ActivityLogEntry>, StoreError> {
        let storage = Arc::clone(&self.storage);
        let entries = Arc::clone(&self.entries);
        let max_items = self.max_items;

        let commit = tokio::spawn(
            async move {
                let mut entries = entries.lock().await;

                let mut next = Vec::with_capacity(entries.len() + 1);
                next.extend(entries.iter().cloned());
                next.push(entry);
                let mut evicted = Vec::new();
                if next.len() > max_items {
                    let excess = next.len() - max_items;
                    debug!(excess, "Evicting oldest activity entries");
                    evicted.extend(next.drain(..excess));
                }

                let bytes = serde_json::to_vec_pretty(&next)?;
                storage.write(&bytes).await?;

                *entries = next;
                Ok(evicted)
            }
            .in_current_span(),
        );

        commit
            .await
            .map_err(|e| StoreError::Io(std::io::Error::other(e)))?
    }

    /// All entries, oldest first
    pub async fn get_all(&self) -> Vec<ActivityLogEntry> {
        self.entries.lock().await.clone()
    }

    /// Number of entries currently held
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }

    /// Capacity of the log
    pub fn max_items(&self) -> usize {
        self.max_items
    }
}

/// Read the persisted log in `dir` without taking the store lock.
///
/// Used by read-only tooling while a server may hold the store open.
pub async fn read_snapshot(dir: impl AsRef<Path>) -> Result<Vec<ActivityLogEntry>, StoreError> {
    let path = dir.as_ref().join(ACTIVITY_FILE);
    match tokio::fs::read(&path).await {
        Ok(bytes) => decode(&bytes),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(e.into()),
    }
}

fn decode(bytes: &[u8]) -> Result<Vec<ActivityLogEntry>, StoreError> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(Vec::new());
    }
    serde_json::from_slice(bytes).map_err(|e| StoreError::Corrupt(e.to_string()))
}
