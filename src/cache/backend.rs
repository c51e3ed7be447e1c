//! Cache Backend Module
//!
//! Storage seam behind [`CacheStore`](crate::cache::CacheStore). Backends
//! move whole encoded entries around and must be safe under concurrent
//! callers on their own.

use std::collections::HashMap;
use std::fmt;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use crate::cache::{CacheKey, LruTracker};
use crate::error::{CacheError, Result};

/// Extension of entry files written by [`FileBackend`].
pub const ENTRY_FILE_EXTENSION: &str = "json";

/// Scratch file sequence, shared by every `FileBackend` in the process.
static SCRATCH_SEQ: AtomicU64 = AtomicU64::new(0);

// == Backend Trait ==
/// Key-addressed storage for encoded cache entries.
///
/// A `store` replaces the whole entry; a concurrent `load` sees either the
/// previous bytes or the new ones, never a mix.
#[async_trait]
pub trait CacheBackend: Send + Sync + fmt::Debug {
    /// Returns the bytes stored under `key`, if any.
    async fn load(&self, key: &CacheKey) -> Result<Option<Vec<u8>>>;

    /// Stores `bytes` under `key`, returning how many entries were evicted
    /// to make room.
    async fn store(&self, key: &CacheKey, bytes: Vec<u8>) -> Result<usize>;

    /// Removes the entry under `key`, returning whether one existed.
    async fn remove(&self, key: &CacheKey) -> Result<bool>;

    /// Removes the entry under `key` only while it still holds `expected`.
    ///
    /// Returns whether it was removed. An entry stored after `expected` was
    /// read is left in place.
    async fn remove_if(&self, key: &CacheKey, expected: &[u8]) -> Result<bool>;

    /// Lists every stored key.
    async fn keys(&self) -> Result<Vec<CacheKey>>;
}

// == Memory Backend ==
#[derive(Debug)]
struct MemoryState {
    entries: HashMap<CacheKey, Arc<[u8]>>,
    lru: LruTracker,
}

/// In-process backend bounded by an LRU capacity.
#[derive(Debug)]
pub struct MemoryBackend {
    state: RwLock<MemoryState>,
    max_entries: usize,
}

impl MemoryBackend {
    /// Creates a backend holding at most `max_entries` entries (minimum 1).
    pub fn new(max_entries: usize) -> Self {
        Self {
            state: RwLock::new(MemoryState {
                entries: HashMap::new(),
                lru: LruTracker::new(),
            }),
            max_entries: max_entries.max(1),
        }
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl CacheBackend for MemoryBackend {
    async fn load(&self, key: &CacheKey) -> Result<Option<Vec<u8>>> {
        // Write lock: a read updates LRU order
        let mut state = self.state.write().await;
        let bytes = state.entries.get(key).map(|b| b.to_vec());
        if bytes.is_some() {
            state.lru.touch(key);
        }
        Ok(bytes)
    }

    async fn store(&self, key: &CacheKey, bytes: Vec<u8>) -> Result<usize> {
        let mut state = self.state.write().await;
        let mut evicted = 0;

        if !state.entries.contains_key(key) {
            while state.entries.len() >= self.max_entries {
                match state.lru.evict_oldest() {
                    Some(oldest) => {
                        state.entries.remove(&oldest);
                        evicted += 1;
                    }
                    None => {
                        return Err(CacheError::Unavailable(
                            "cache is full and eviction failed".to_string(),
                        ))
                    }
                }
            }
        }

        state.entries.insert(key.clone(), Arc::from(bytes));
        state.lru.touch(key);
        Ok(evicted)
    }

    async fn remove(&self, key: &CacheKey) -> Result<bool> {
        let mut state = self.state.write().await;
        state.lru.remove(key);
        Ok(state.entries.remove(key).is_some())
    }

    async fn remove_if(&self, key: &CacheKey, expected: &[u8]) -> Result<bool> {
        let mut state = self.state.write().await;
        if state.entries.get(key).map(|bytes| &bytes[..]) != Some(expected) {
            return Ok(false);
        }
        state.entries.remove(key);
        state.lru.remove(key);
        Ok(true)
    }

    async fn keys(&self) -> Result<Vec<CacheKey>> {
        Ok(self.state.read().await.entries.keys().cloned().collect())
    }
}

// == File Backend ==
/// One file per entry under a directory.
///
/// Writes land in a uniquely named temporary file first and are then
/// renamed over the target, which is atomic on the same filesystem.
#[derive(Debug)]
pub struct FileBackend {
    dir: PathBuf,
}

impl FileBackend {
    /// Uses `dir`, creating it lazily on first write.
    ///
    /// # Arguments
    /// * `dir` - Directory holding one file per entry; may be shared with
    ///   other backends and processes
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the file holding `key`.
    pub fn entry_path(&self, key: &CacheKey) -> PathBuf {
        self.dir
            .join(format!("{}.{}", key.as_str(), ENTRY_FILE_EXTENSION))
    }

    /// Hidden scratch file next to the entry, unique within this process.
    fn scratch_path(&self, key: &CacheKey, suffix: &str) -> PathBuf {
        let seq = SCRATCH_SEQ.fetch_add(1, Ordering::Relaxed);
        self.dir.join(format!(
            ".{}.{}.{}.{}",
            key.as_str(),
            std::process::id(),
            seq,
            suffix
        ))
    }
}

#[async_trait]
impl CacheBackend for FileBackend {
    async fn load(&self, key: &CacheKey) -> Result<Option<Vec<u8>>> {
        match tokio::fs::read(self.entry_path(key)).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn store(&self, key: &CacheKey, bytes: Vec<u8>) -> Result<usize> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let temp = self.scratch_path(key, "tmp");
        if let Err(e) = tokio::fs::write(&temp, &bytes).await {
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(e.into());
        }
        if let Err(e) = tokio::fs::rename(&temp, self.entry_path(key)).await {
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(e.into());
        }
        debug!(key = %key, dir = %self.dir.display(), "Wrote cache file");
        Ok(0)
    }

    async fn remove(&self, key: &CacheKey) -> Result<bool> {
        match tokio::fs::remove_file(self.entry_path(key)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn remove_if(&self, key: &CacheKey, expected: &[u8]) -> Result<bool> {
        // Park the file first so a concurrent store lands on a fresh path
        let path = self.entry_path(key);
        let parked = self.scratch_path(key, "del");
        match tokio::fs::rename(&path, &parked).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(e.into()),
        }

        let matches = matches!(
            tokio::fs::read(&parked).await,
            Ok(bytes) if bytes.as_slice() == expected
        );
        if !matches {
            // Restore it unless a newer entry already took its place
            match tokio::fs::hard_link(&parked, &path).await {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {}
                Err(_) => {
                    tokio::fs::rename(&parked, &path).await?;
                    return Ok(false);
                }
            }
        }
        let _ = tokio::fs::remove_file(&parked).await;
        debug!(key = %key, removed = matches, "Conditional cache file removal");
        Ok(matches)
    }

    async fn keys(&self) -> Result<Vec<CacheKey>> {
        let mut dir = match tokio::fs::read_dir(&self.dir).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut keys = Vec::new();
        while let Some(item) = dir.next_entry().await? {
            let path = item.path();
            if path.extension().and_then(|e| e.to_str()) != Some(ENTRY_FILE_EXTENSION) {
                continue;
            }
            if let Some(key) = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(CacheKey::from_hex)
            {
                keys.push(key);
            }
        }
        Ok(keys)
    }
}
