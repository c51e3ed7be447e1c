//! Scan units: the smallest cacheable piece of scan work.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::cache::CacheKey;
use crate::models::TagFilter;

/// Label used for the whole-region hybrid unit.
pub const ALL_SERVICES_LABEL: &str = "all-services";

// == Unit Scope ==
/// One service, or every service reachable through tag discovery.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitScope {
    Service(String),
    AllServices,
}

impl fmt::Display for UnitScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnitScope::Service(name) => f.write_str(name),
            UnitScope::AllServices => f.write_str(ALL_SERVICES_LABEL),
        }
    }
}

// == Scan Unit ==
/// A region, scope and tag filter combination.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScanUnit {
    pub region: String,
    pub scope: UnitScope,
    pub filter: TagFilter,
}

impl ScanUnit {
    /// Unit for a single service.
    pub fn service(region: impl Into<String>, service: impl Into<String>, filter: TagFilter) -> Self {
        Self {
            region: region.into(),
            scope: UnitScope::Service(service.into()),
            filter,
        }
    }

    /// Whole-region unit for hybrid discovery.
    pub fn all_services(region: impl Into<String>, filter: TagFilter) -> Self {
        Self {
            region: region.into(),
            scope: UnitScope::AllServices,
            filter,
        }
    }

    pub fn cache_key(&self) -> CacheKey {
        CacheKey::new(
            &self.region,
            &self.scope,
            self.filter.key.as_deref(),
            self.filter.value.as_deref(),
        )
    }

    /// Service name, or the all-services label.
    pub fn label(&self) -> String {
        self.scope.to_string()
    }
}

impl fmt::Display for ScanUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.region, self.scope, self.filter)
    }
}
