//! Cache Statistics Module
//!
//! Tracks cache effectiveness and how often the cache had to be bypassed.

use serde::Serialize;

// == Cache Stats ==
/// Counters kept by a [`CacheStore`](crate::cache::CacheStore).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Lookups answered with a fresh entry
    pub hits: u64,
    /// Lookups that found nothing usable
    pub misses: u64,
    /// Misses caused by an entry past its TTL
    pub expired: u64,
    /// Misses caused by an entry that failed to decode
    pub decode_failures: u64,
    /// Entries written
    pub stores: u64,
    /// Writes the backend rejected
    pub store_failures: u64,
    /// Entries evicted by the backend's capacity bound
    pub evictions: u64,
}

impl CacheStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every `get` counts exactly once, as a hit or a miss.
    pub fn lookups(&self) -> u64 {
        self.hits + self.misses
    }

    /// Share of lookups answered from the cache; 0.0 before the first lookup.
    pub fn hit_rate(&self) -> f64 {
        match self.lookups() {
            0 => 0.0,
            lookups => self.hits as f64 / lookups as f64,
        }
    }

    pub fn record_hit(&mut self) {
        self.hits += 1;
    }

    pub fn record_miss(&mut self) {
        self.misses += 1;
    }

    /// Counts a miss caused by expiry.
    pub fn record_expired(&mut self) {
        self.expired += 1;
        self.misses += 1;
    }

    /// Counts a miss caused by an unreadable entry.
    pub fn record_decode_failure(&mut self) {
        self.decode_failures += 1;
        self.misses += 1;
    }

    pub fn record_store(&mut self) {
        self.stores += 1;
    }

    pub fn record_store_failure(&mut self) {
        self.store_failures += 1;
    }

    pub fn record_evictions(&mut self, count: u64) {
        self.evictions += count;
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hit_rate_before_any_lookup() {
        assert_eq!(CacheStats::new().hit_rate(), 0.0);
    }

    #[test]
    fn test_hit_rate_over_lookups() {
        let mut stats = CacheStats::new();
        stats.record_hit();
        stats.record_hit();
        stats.record_hit();
        stats.record_expired();
        assert_eq!(stats.lookups(), 4);
        assert_eq!(stats.hit_rate(), 0.75);
    }

    #[test]
    fn test_expired_and_decode_failures_count_as_misses() {
        let mut stats = CacheStats::new();
        stats.record_expired();
        stats.record_decode_failure();
        assert_eq!(stats.misses, 2);
        assert_eq!(stats.expired, 1);
        assert_eq!(stats.decode_failures, 1);
        assert_eq!(stats.hit_rate(), 0.0);
    }

    #[test]
    fn test_store_counters() {
        let mut stats = CacheStats::new();
        stats.record_store();
        stats.record_store();
        stats.record_store_failure();
        stats.record_evictions(3);
        assert_eq!(stats.stores, 2);
        assert_eq!(stats.store_failures, 1);
        assert_eq!(stats.evictions, 3);
    }
}
