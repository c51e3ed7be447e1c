//! Cache Key Module
//!
//! Deterministic 128-bit keys for scan units.
//!
//! A key is the MD5 digest of a canonical, versioned string built from
//! `(region, scope, tag_key, tag_value)`. Every field is length-prefixed and
//! absent tag fields are written as `~`, so no two distinct tuples share a
//! canonical string and "no filter" never collides with "filter on empty
//! string". Both forms are public so external tools can recompute keys.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::scan::UnitScope;

/// Version tag leading every canonical key string.
pub const KEY_FORMAT_VERSION: &str = "v1";

/// Length of a key in hex characters.
pub const KEY_HEX_LENGTH: usize = 32;

// == Cache Key ==
/// Hex-encoded MD5 digest identifying one scan unit.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheKey(String);

impl CacheKey {
    /// Computes the key for a unit.
    pub fn new(
        region: &str,
        scope: &UnitScope,
        tag_key: Option<&str>,
        tag_value: Option<&str>,
    ) -> Self {
        let canonical = Self::canonical(region, scope, tag_key, tag_value);
        Self(format!("{:x}", md5::compute(canonical.as_bytes())))
    }

    /// Builds the canonical string that gets hashed.
    ///
    /// Example: `v1|region=9:us-east-1|scope=service:3:ec2|tag_key=3:Env|tag_value=~`
    pub fn canonical(
        region: &str,
        scope: &UnitScope,
        tag_key: Option<&str>,
        tag_value: Option<&str>,
    ) -> String {
        let scope = match scope {
            UnitScope::Service(name) => format!("service:{}", length_prefixed(name)),
            UnitScope::AllServices => "all-services".to_string(),
        };
        format!(
            "{}|region={}|scope={}|tag_key={}|tag_value={}",
            KEY_FORMAT_VERSION,
            length_prefixed(region),
            scope,
            optional_field(tag_key),
            optional_field(tag_value),
        )
    }

    /// Parses a previously rendered key, e.g. a cache file stem.
    pub fn from_hex(hex: &str) -> Option<Self> {
        let valid = hex.len() == KEY_HEX_LENGTH
            && hex.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
        valid.then(|| Self(hex.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn length_prefixed(value: &str) -> String {
    format!("{}:{}", value.len(), value)
}

fn optional_field(value: Option<&str>) -> String {
    match value {
        Some(v) => length_prefixed(v),
        None => "~".to_string(),
    }
}
