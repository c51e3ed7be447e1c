//! Resource Models
//!
//! Shapes of the data scanners hand back, plus the tag filter they apply.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// One resource as returned by a remote API, kept opaque.
pub type RawRecord = serde_json::Value;

/// Resource kind (e.g. `instances`, `buckets`) to records, for one service.
pub type ResourceKinds = BTreeMap<String, Vec<RawRecord>>;

/// Service name to its resource kinds.
pub type ServiceResources = BTreeMap<String, ResourceKinds>;

/// Counts the records across every kind of one service.
pub fn count_records(kinds: &ResourceKinds) -> usize {
    kinds.values().map(Vec::len).sum()
}

/// Counts the records across every service.
pub fn count_service_records(services: &ServiceResources) -> usize {
    services.values().map(count_records).sum()
}

// == Tag ==
/// A key/value tag in the `{"Key": .., "Value": ..}` shape remote APIs use.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Tag {
    pub key: String,
    #[serde(default)]
    pub value: String,
}

impl Tag {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

// == Tag Filter ==
/// Optional tag key and value a scan is restricted to.
///
/// Matching is three-way:
/// - key and value: some tag must carry exactly that pair
/// - key only: some tag must carry that key, any value
/// - value only: some tag must carry that value, under any key
/// - neither: everything matches
///
/// An empty string is a real filter value, distinct from an absent one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TagFilter {
    pub key: Option<String>,
    pub value: Option<String>,
}

impl TagFilter {
    /// A filter that matches everything.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn new(key: Option<String>, value: Option<String>) -> Self {
        Self { key, value }
    }

    /// Matches resources carrying `key` with exactly `value`.
    pub fn pair(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(Some(key.into()), Some(value.into()))
    }

    /// Matches resources carrying `key` with any value.
    pub fn key(key: impl Into<String>) -> Self {
        Self::new(Some(key.into()), None)
    }

    /// Matches resources carrying `value` under any key.
    pub fn value(value: impl Into<String>) -> Self {
        Self::new(None, Some(value.into()))
    }

    /// Returns true when neither key nor value is set.
    pub fn is_empty(&self) -> bool {
        self.key.is_none() && self.value.is_none()
    }

    /// Applies the filter to a tag list.
    pub fn matches(&self, tags: &[Tag]) -> bool {
        match (self.key.as_deref(), self.value.as_deref()) {
            (Some(key), Some(value)) => tags.iter().any(|t| t.key == key && t.value == value),
            (Some(key), None) => tags.iter().any(|t| t.key == key),
            (None, Some(value)) => tags.iter().any(|t| t.value == value),
            (None, None) => true,
        }
    }

    /// Applies the filter to a raw record's `Tags` array.
    ///
    /// Records without a readable `Tags` array only match an empty filter.
    pub fn matches_record(&self, record: &RawRecord) -> bool {
        if self.is_empty() {
            return true;
        }
        match record.get("Tags") {
            Some(tags) => match serde_json::from_value::<Vec<Tag>>(tags.clone()) {
                Ok(tags) => self.matches(&tags),
                Err(_) => false,
            },
            None => false,
        }
    }
}

impl std::fmt::Display for TagFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (&self.key, &self.value) {
            (Some(k), Some(v)) => write!(f, "{}={}", k, v),
            (Some(k), None) => write!(f, "{}=*", k),
            (None, Some(v)) => write!(f, "*={}", v),
            (None, None) => write!(f, "*"),
        }
    }
}
