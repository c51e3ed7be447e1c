//! Cache Reaper Task
//!
//! Background task that periodically removes expired cache entries, so a
//! long-lived file cache does not grow without bound.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::cache::CacheStore;

/// Spawns a task that purges expired entries from `cache` every `interval`.
///
/// The task runs until aborted through the returned handle.
///
/// # Arguments
/// * `cache` - Store to purge, shared with the scans using it
/// * `interval` - Pause between purges, usually `Config::reap_interval`
///
/// # Returns
/// Handle used to stop the reaper
///
/// # Example
/// ```ignore
/// let cache = Arc::new(CacheStore::in_memory(1000, Duration::from_secs(600)));
/// let reaper = spawn_reaper_task(cache.clone(), Duration::from_secs(60));
/// // Later, during shutdown:
/// reaper.abort();
/// ```
pub fn spawn_reaper_task(cache: Arc<CacheStore>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(interval_ms = interval.as_millis() as u64, "Starting cache reaper");

        loop {
            tokio::time::sleep(interval).await;

            let removed = cache.purge_expired().await;
            if removed > 0 {
                info!(removed, "Cache reaper purged expired entries");
            } else {
                debug!("Cache reaper found no expired entries");
            }
        }
    })
}
