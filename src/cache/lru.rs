//! LRU Tracker Module
//!
//! Recency order for the in-memory backend's capacity bound.

use std::collections::{BTreeMap, HashMap};

use crate::cache::CacheKey;

// == LRU Tracker ==
/// Orders cache keys by last use.
///
/// Every touch stamps the key with a fresh tick; the smallest tick is the
/// least recently used key. Touch, remove and eviction are all logarithmic.
#[derive(Debug, Default)]
pub struct LruTracker {
    next_tick: u64,
    by_tick: BTreeMap<u64, CacheKey>,
    ticks: HashMap<CacheKey, u64>,
}

impl LruTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks `key` as the most recently used, adding it if unknown.
    pub fn touch(&mut self, key: &CacheKey) {
        let tick = self.next_tick;
        self.next_tick += 1;
        if let Some(previous) = self.ticks.insert(key.clone(), tick) {
            self.by_tick.remove(&previous);
        }
        self.by_tick.insert(tick, key.clone());
    }

    pub fn remove(&mut self, key: &CacheKey) {
        if let Some(tick) = self.ticks.remove(key) {
            self.by_tick.remove(&tick);
        }
    }

    // == Eviction ==
    /// Removes and returns the least recently used key.
    pub fn evict_oldest(&mut self) -> Option<CacheKey> {
        let (_, key) = self.by_tick.pop_first()?;
        self.ticks.remove(&key);
        Some(key)
    }

    pub fn peek_oldest(&self) -> Option<&CacheKey> {
        self.by_tick.first_key_value().map(|(_, key)| key)
    }

    pub fn len(&self) -> usize {
        self.ticks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ticks.is_empty()
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.ticks.contains_key(key)
    }
}
