//! Cache Module
//!
//! TTL-bound storage for scan unit results, keyed by a deterministic hash of
//! the unit, over pluggable in-memory or on-disk backends.

mod backend;
mod entry;
mod key;
mod lru;
mod stats;
mod store;

#[cfg(test)]
mod property_tests;

// Re-export public types
pub use backend::{CacheBackend, FileBackend, MemoryBackend, ENTRY_FILE_EXTENSION};
pub use entry::{current_timestamp_ms, CacheEntry, ENTRY_FORMAT_VERSION};
pub use key::{CacheKey, KEY_FORMAT_VERSION, KEY_HEX_LENGTH};
pub use lru::LruTracker;
pub use stats::CacheStats;
pub use store::{CacheStore, DEFAULT_TTL};
