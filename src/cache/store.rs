//! Cache Store Module
//!
//! TTL-bound, read-through/write-through cache for scan unit results on top
//! of any [`CacheBackend`]. Nothing here returns an error to the caller:
//! backend and codec failures degrade to a miss on read and to "not cached"
//! on write.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::cache::{CacheBackend, CacheEntry, CacheKey, CacheStats, FileBackend, MemoryBackend};
use crate::config::Config;
use crate::error::CacheError;

/// Default time-to-live for cached scan results
pub const DEFAULT_TTL: Duration = Duration::from_secs(600);

/// What a lookup found before payload decoding.
///
/// Variants that may lead to eviction carry the bytes that were read, so
/// only that exact entry is removed.
enum Lookup {
    Fresh(CacheEntry, Vec<u8>),
    Absent,
    Expired(Vec<u8>),
    Corrupt(CacheError, Vec<u8>),
    Unavailable(CacheError),
}

// == Cache Store ==
/// Shared cache handle used by every scan worker.
#[derive(Debug)]
pub struct CacheStore {
    backend: Arc<dyn CacheBackend>,
    ttl: Duration,
    stats: Mutex<CacheStats>,
}

impl CacheStore {
    // == Constructors ==
    /// Creates a store over `backend` with a uniform `ttl`.
    ///
    /// # Arguments
    /// * `backend` - Storage for encoded entries, shared with other stores if desired
    /// * `ttl` - Lifetime of every entry, measured from when it was stored
    pub fn new(backend: Arc<dyn CacheBackend>, ttl: Duration) -> Self {
        Self {
            backend,
            ttl,
            stats: Mutex::new(CacheStats::new()),
        }
    }

    /// In-process store bounded to `max_entries`.
    ///
    /// # Arguments
    /// * `max_entries` - Capacity before the least recently used entry is evicted
    /// * `ttl` - Lifetime of every entry
    pub fn in_memory(max_entries: usize, ttl: Duration) -> Self {
        Self::new(Arc::new(MemoryBackend::new(max_entries)), ttl)
    }

    /// File-backed store under `dir`.
    pub fn on_disk(dir: impl Into<PathBuf>, ttl: Duration) -> Self {
        Self::new(Arc::new(FileBackend::new(dir)), ttl)
    }

    /// File-backed store using the configured directory and TTL.
    pub fn from_config(config: &Config) -> Self {
        Self::on_disk(config.cache_dir.clone(), config.cache_ttl)
    }

    /// In-process store using the configured capacity and TTL.
    pub fn in_memory_from_config(config: &Config) -> Self {
        Self::in_memory(config.max_cache_entries, config.cache_ttl)
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    // == Get ==
    /// Returns the fresh payload stored under `key`, or `None` on any miss.
    ///
    /// Entries past their TTL, written by another envelope version, or not
    /// decodable as `T` are misses; unreadable ones are evicted best-effort.
    /// Eviction never removes an entry stored after the lookup read it.
    ///
    /// # Returns
    /// The decoded payload, or `None` on a miss of any kind
    pub async fn get<T: DeserializeOwned>(&self, key: &CacheKey) -> Option<T> {
        match self.lookup(key).await {
            Lookup::Fresh(entry, bytes) => match serde_json::from_value::<T>(entry.payload) {
                Ok(payload) => {
                    self.stats.lock().await.record_hit();
                    debug!(key = %key, "Cache hit");
                    Some(payload)
                }
                Err(e) => {
                    self.discard_corrupt(key, &CacheError::from(e), &bytes).await;
                    None
                }
            },
            Lookup::Absent => {
                self.stats.lock().await.record_miss();
                debug!(key = %key, "Cache miss");
                None
            }
            Lookup::Expired(bytes) => {
                self.stats.lock().await.record_expired();
                debug!(key = %key, "Cache entry expired");
                let _ = self.backend.remove_if(key, &bytes).await;
                None
            }
            Lookup::Corrupt(e, bytes) => {
                self.discard_corrupt(key, &e, &bytes).await;
                None
            }
            Lookup::Unavailable(e) => {
                self.stats.lock().await.record_miss();
                warn!(key = %key, error = %e, "Cache read failed, bypassing cache");
                None
            }
        }
    }

    // == Put ==
    /// Stores `payload` under `key`, returning whether it was persisted.
    ///
    /// Concurrent puts for the same key overwrite each other; the last one wins.
    pub async fn put<T: Serialize>(&self, key: &CacheKey, payload: &T) -> bool {
        let encoded = serde_json::to_value(payload)
            .map_err(CacheError::from)
            .and_then(|value| CacheEntry::new(key.clone(), value).encode());

        let bytes = match encoded {
            Ok(bytes) => bytes,
            Err(e) => {
                self.stats.lock().await.record_store_failure();
                warn!(key = %key, error = %e, "Could not encode cache entry");
                return false;
            }
        };

        match self.backend.store(key, bytes).await {
            Ok(evicted) => {
                let mut stats = self.stats.lock().await;
                stats.record_store();
                stats.record_evictions(evicted as u64);
                debug!(key = %key, evicted, "Cache store");
                true
            }
            Err(e) => {
                self.stats.lock().await.record_store_failure();
                warn!(key = %key, error = %e, "Cache write failed, result not cached");
                false
            }
        }
    }

    // == Contains Fresh ==
    /// Returns true when a fresh, readable entry exists. Does not touch stats.
    pub async fn contains_fresh(&self, key: &CacheKey) -> bool {
        matches!(self.lookup(key).await, Lookup::Fresh(..))
    }

    // == Remove ==
    pub async fn remove(&self, key: &CacheKey) -> bool {
        self.backend.remove(key).await.unwrap_or(false)
    }

    // == Purge Expired ==
    /// Removes every expired or unreadable entry, returning how many went.
    pub async fn purge_expired(&self) -> usize {
        let keys = match self.backend.keys().await {
            Ok(keys) => keys,
            Err(e) => {
                warn!(error = %e, "Could not list cache entries");
                return 0;
            }
        };

        let mut removed = 0;
        for key in keys {
            let dead = match self.lookup(&key).await {
                Lookup::Expired(bytes) | Lookup::Corrupt(_, bytes) => bytes,
                _ => continue,
            };
            if self.backend.remove_if(&key, &dead).await.unwrap_or(false) {
                removed += 1;
            }
        }
        removed
    }

    // == Stats ==
    pub async fn stats(&self) -> CacheStats {
        self.stats.lock().await.clone()
    }

    async fn lookup(&self, key: &CacheKey) -> Lookup {
        let bytes = match self.backend.load(key).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return Lookup::Absent,
            Err(e) => return Lookup::Unavailable(e),
        };
        match CacheEntry::decode(&bytes, key) {
            Ok(entry) if entry.is_expired(self.ttl) => Lookup::Expired(bytes),
            Ok(entry) => Lookup::Fresh(entry, bytes),
            Err(e) => Lookup::Corrupt(e, bytes),
        }
    }

    async fn discard_corrupt(&self, key: &CacheKey, error: &CacheError, bytes: &[u8]) {
        self.stats.lock().await.record_decode_failure();
        warn!(key = %key, error = %error, "Discarding unreadable cache entry");
        let _ = self.backend.remove_if(key, bytes).await;
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ResourceKinds;
    use crate::scan::UnitScope;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn key(service: &str) -> CacheKey {
        CacheKey::new("us-east-1", &UnitScope::Service(service.into()), None, None)
    }

    fn kinds() -> ResourceKinds {
        let mut kinds = ResourceKinds::new();
        kinds.insert("instances".into(), vec![json!({"InstanceId": "i-1"})]);
        kinds
    }

    /// Backend that fails every operation.
    #[derive(Debug)]
    struct BrokenBackend;

    #[async_trait]
    impl CacheBackend for BrokenBackend {
        async fn load(&self, _key: &CacheKey) -> crate::error::Result<Option<Vec<u8>>> {
            Err(CacheError::Unavailable("disk gone".into()))
        }
        async fn store(&self, _key: &CacheKey, _bytes: Vec<u8>) -> crate::error::Result<usize> {
            Err(CacheError::Unavailable("disk gone".into()))
        }
        async fn remove(&self, _key: &CacheKey) -> crate::error::Result<bool> {
            Err(CacheError::Unavailable("disk gone".into()))
        }
        async fn remove_if(&self, _key: &CacheKey, _expected: &[u8]) -> crate::error::Result<bool> {
            Err(CacheError::Unavailable("disk gone".into()))
        }
        async fn keys(&self) -> crate::error::Result<Vec<CacheKey>> {
            Err(CacheError::Unavailable("disk gone".into()))
        }
    }

    /// Backend whose first load hands back `stale` bytes while a writer
    /// stores `fresh` ones underneath.
    #[derive(Debug)]
    struct RacingBackend {
        inner: MemoryBackend,
        stale: Vec<u8>,
        fresh: Vec<u8>,
        raced: AtomicBool,
    }

    impl RacingBackend {
        async fn seeded(key: &CacheKey, stale: Vec<u8>, fresh: Vec<u8>) -> Arc<Self> {
            let inner = MemoryBackend::new(10);
            inner.store(key, stale.clone()).await.unwrap();
            Arc::new(Self {
                inner,
                stale,
                fresh,
                raced: AtomicBool::new(false),
            })
        }
    }

    #[async_trait]
    impl CacheBackend for RacingBackend {
        async fn load(&self, key: &CacheKey) -> crate::error::Result<Option<Vec<u8>>> {
            if !self.raced.swap(true, Ordering::SeqCst) {
                self.inner.store(key, self.fresh.clone()).await?;
                return Ok(Some(self.stale.clone()));
            }
            self.inner.load(key).await
        }
        async fn store(&self, key: &CacheKey, bytes: Vec<u8>) -> crate::error::Result<usize> {
            self.inner.store(key, bytes).await
        }
        async fn remove(&self, key: &CacheKey) -> crate::error::Result<bool> {
            self.inner.remove(key).await
        }
        async fn remove_if(&self, key: &CacheKey, expected: &[u8]) -> crate::error::Result<bool> {
            self.inner.remove_if(key, expected).await
        }
        async fn keys(&self) -> crate::error::Result<Vec<CacheKey>> {
            self.inner.keys().await
        }
    }

    fn expired_bytes(key: &CacheKey) -> Vec<u8> {
        CacheEntry::with_timestamp(key.clone(), serde_json::to_value(kinds()).unwrap(), 0)
            .encode()
            .unwrap()
    }

    fn fresh_bytes(key: &CacheKey) -> Vec<u8> {
        CacheEntry::new(key.clone(), serde_json::to_value(kinds()).unwrap())
            .encode()
            .unwrap()
    }

    #[tokio::test]
    async fn test_put_then_get() {
        let store = CacheStore::in_memory(100, DEFAULT_TTL);

        assert!(store.put(&key("ec2"), &kinds()).await);
        let cached: Option<ResourceKinds> = store.get(&key("ec2")).await;

        assert_eq!(cached, Some(kinds()));
        let stats = store.stats().await;
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.stores, 1);
    }

    #[tokio::test]
    async fn test_get_missing_is_miss() {
        let store = CacheStore::in_memory(100, DEFAULT_TTL);

        let cached: Option<ResourceKinds> = store.get(&key("ec2")).await;
        assert!(cached.is_none());
        assert_eq!(store.stats().await.misses, 1);
    }

    #[tokio::test]
    async fn test_expired_entry_is_miss_and_evicted() {
        let store = CacheStore::in_memory(100, Duration::from_millis(50));
        store.put(&key("ec2"), &kinds()).await;

        tokio::time::sleep(Duration::from_millis(80)).await;

        let cached: Option<ResourceKinds> = store.get(&key("ec2")).await;
        assert!(cached.is_none());
        assert_eq!(store.stats().await.expired, 1);
        assert!(!store.remove(&key("ec2")).await, "expired entry already evicted");
    }

    #[tokio::test]
    async fn test_undecodable_payload_is_miss() {
        let store = CacheStore::in_memory(100, DEFAULT_TTL);
        store.put(&key("ec2"), &json!("not a map")).await;

        let cached: Option<ResourceKinds> = store.get(&key("ec2")).await;
        assert!(cached.is_none());
        assert_eq!(store.stats().await.decode_failures, 1);
        assert!(!store.contains_fresh(&key("ec2")).await);
    }

    #[tokio::test]
    async fn test_corrupt_bytes_are_miss() {
        let backend = Arc::new(MemoryBackend::new(10));
        backend
            .store(&key("ec2"), b"{\"version\":1,\"key\":".to_vec())
            .await
            .unwrap();
        let store = CacheStore::new(backend.clone(), DEFAULT_TTL);

        let cached: Option<ResourceKinds> = store.get(&key("ec2")).await;
        assert!(cached.is_none());
        assert!(backend.is_empty().await);
    }

    #[tokio::test]
    async fn test_expired_eviction_spares_concurrent_write() {
        let k = key("ec2");
        let backend = RacingBackend::seeded(&k, expired_bytes(&k), fresh_bytes(&k)).await;
        let store = CacheStore::new(backend, DEFAULT_TTL);

        let first: Option<ResourceKinds> = store.get(&k).await;
        assert!(first.is_none(), "the stale read is still a miss");

        let second: Option<ResourceKinds> = store.get(&k).await;
        assert_eq!(second, Some(kinds()), "the entry written meanwhile survives");
    }

    #[tokio::test]
    async fn test_corrupt_eviction_spares_concurrent_write() {
        let k = key("ec2");
        let backend = RacingBackend::seeded(&k, b"{not json".to_vec(), fresh_bytes(&k)).await;
        let store = CacheStore::new(backend, DEFAULT_TTL);

        assert!(store.get::<ResourceKinds>(&k).await.is_none());
        assert_eq!(store.get::<ResourceKinds>(&k).await, Some(kinds()));
    }

    #[tokio::test]
    async fn test_purge_spares_concurrent_write() {
        let k = key("ec2");
        let backend = RacingBackend::seeded(&k, expired_bytes(&k), fresh_bytes(&k)).await;
        let store = CacheStore::new(backend, DEFAULT_TTL);

        assert_eq!(store.purge_expired().await, 0);
        assert!(store.contains_fresh(&k).await);
    }

    #[tokio::test]
    async fn test_in_memory_from_config() {
        let config = Config {
            max_cache_entries: 2,
            ..Config::default()
        };
        let store = CacheStore::in_memory_from_config(&config);
        assert_eq!(store.ttl(), config.cache_ttl);

        for service in ["ec2", "s3", "vpc"] {
            assert!(store.put(&key(service), &kinds()).await);
        }
        assert!(!store.contains_fresh(&key("ec2")).await);
        assert_eq!(store.stats().await.evictions, 1);
    }

    #[tokio::test]
    async fn test_broken_backend_degrades() {
        let store = CacheStore::new(Arc::new(BrokenBackend), DEFAULT_TTL);

        assert!(!store.put(&key("ec2"), &kinds()).await);
        let cached: Option<ResourceKinds> = store.get(&key("ec2")).await;
        assert!(cached.is_none());
        assert_eq!(store.purge_expired().await, 0);

        let stats = store.stats().await;
        assert_eq!(stats.store_failures, 1);
        assert_eq!(stats.misses, 1);
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let store = CacheStore::in_memory(100, Duration::from_millis(50));
        store.put(&key("ec2"), &kinds()).await;
        tokio::time::sleep(Duration::from_millis(80)).await;
        store.put(&key("s3"), &kinds()).await;

        assert_eq!(store.purge_expired().await, 1);
        assert!(store.contains_fresh(&key("s3")).await);
        assert!(!store.contains_fresh(&key("ec2")).await);
    }

    #[tokio::test]
    async fn test_concurrent_puts_and_gets() {
        let store = Arc::new(CacheStore::in_memory(100, DEFAULT_TTL));
        let mut handles = Vec::new();
        for i in 0..16 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                let mut payload = ResourceKinds::new();
                payload.insert("instances".into(), vec![json!({ "writer": i })]);
                store.put(&key("ec2"), &payload).await;
                store.get::<ResourceKinds>(&key("ec2")).await
            }));
        }

        for handle in handles {
            let seen = handle.await.unwrap().expect("a complete entry is always visible");
            assert_eq!(seen["instances"].len(), 1);
        }
    }
}
