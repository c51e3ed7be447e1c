//! Strategy selection between per-service scanning and hybrid discovery.

use serde::{Deserialize, Serialize};

use crate::models::TagFilter;

/// How a region gets scanned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// One unit per requested service, each calling that service's scanner
    Traditional,
    /// One whole-region unit: tag discovery plus the gapped service's scanner
    Hybrid,
}

impl Strategy {
    /// Hybrid whenever any tag filter field is set or everything was asked for.
    pub fn classify(filter: &TagFilter, all_services: bool) -> Self {
        if all_services || !filter.is_empty() {
            Strategy::Hybrid
        } else {
            Strategy::Traditional
        }
    }
}
