//! Cache Entry Module
//!
//! Defines the versioned envelope every cached payload is stored in.

use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::cache::CacheKey;
use crate::error::{CacheError, Result};

/// Envelope version written by this build. Entries with any other version
/// are treated as misses.
pub const ENTRY_FORMAT_VERSION: u32 = 1;

// == Cache Entry ==
/// Represents a single cache entry with its payload and metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Envelope format version
    pub version: u32,
    /// Key the entry was written under
    pub key: CacheKey,
    /// Storage timestamp (Unix milliseconds)
    pub stored_at: i64,
    /// The scan result, encoded as JSON
    pub payload: serde_json::Value,
}

impl CacheEntry {
    // == Constructor ==
    /// Creates a new entry stamped with the current time.
    pub fn new(key: CacheKey, payload: serde_json::Value) -> Self {
        Self::with_timestamp(key, payload, current_timestamp_ms())
    }

    /// Creates an entry with an explicit storage timestamp.
    pub fn with_timestamp(key: CacheKey, payload: serde_json::Value, stored_at: i64) -> Self {
        Self {
            version: ENTRY_FORMAT_VERSION,
            key,
            stored_at,
            payload,
        }
    }

    // == Is Expired ==
    /// Checks expiry against an explicit clock reading.
    ///
    /// Boundary condition: an entry is expired once `now - stored_at >= ttl`,
    /// so it is dead the instant the TTL has fully elapsed.
    pub fn is_expired_at(&self, now_ms: i64, ttl: Duration) -> bool {
        now_ms.saturating_sub(self.stored_at) >= ttl_ms(ttl)
    }

    /// Checks expiry against the current time.
    pub fn is_expired(&self, ttl: Duration) -> bool {
        self.is_expired_at(current_timestamp_ms(), ttl)
    }

    // == Time To Live ==
    /// Returns remaining lifetime in milliseconds, 0 once expired.
    pub fn ttl_remaining_ms(&self, ttl: Duration) -> u64 {
        let age = current_timestamp_ms().saturating_sub(self.stored_at);
        let remaining = ttl_ms(ttl).saturating_sub(age);
        remaining.max(0) as u64
    }

    // == Codec ==
    /// Encodes the entry as a JSON byte buffer.
    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decodes an entry, rejecting foreign versions and mismatched keys.
    pub fn decode(bytes: &[u8], expected: &CacheKey) -> Result<Self> {
        let raw: serde_json::Value = serde_json::from_slice(bytes)?;
        let found = raw
            .get("version")
            .and_then(serde_json::Value::as_u64)
            .and_then(|version| u32::try_from(version).ok())
            .unwrap_or(0);
        if found != ENTRY_FORMAT_VERSION {
            return Err(CacheError::VersionMismatch {
                found,
                expected: ENTRY_FORMAT_VERSION,
            });
        }

        let entry: CacheEntry = serde_json::from_value(raw)?;
        if &entry.key != expected {
            return Err(CacheError::KeyMismatch {
                expected: expected.to_string(),
                found: entry.key.to_string(),
            });
        }
        Ok(entry)
    }
}

// == Utility Functions ==
/// Returns current Unix timestamp in milliseconds.
pub fn current_timestamp_ms() -> i64 {
    Utc::now().timestamp_millis()
}

fn ttl_ms(ttl: Duration) -> i64 {
    i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX)
}
