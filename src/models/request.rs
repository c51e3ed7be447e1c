//! Scan Request
//!
//! Parameters of one top-level scan run.

use serde::{Deserialize, Serialize};

use crate::config::{clamp_workers, Config, MAX_WORKERS_RANGE, SERVICE_WORKERS_RANGE};
use crate::models::TagFilter;

/// Services scanned when the caller does not name any.
pub const DEFAULT_SERVICES: [&str; 6] = ["ec2", "s3", "ecs", "elb", "vpc", "autoscaling"];

// == Scan Scope ==
/// What to scan in every region.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanScope {
    /// Scan exactly these services
    Services(Vec<String>),
    /// Discover everything through the tagging index
    AllServices,
}

impl ScanScope {
    /// The default service list.
    pub fn default_services() -> Self {
        Self::Services(DEFAULT_SERVICES.iter().map(|s| s.to_string()).collect())
    }

    pub fn is_all_services(&self) -> bool {
        matches!(self, ScanScope::AllServices)
    }
}

// == Scan Request ==
/// Everything the orchestrator needs to run one scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanRequest {
    /// Regions to scan
    pub regions: Vec<String>,
    /// Services to scan in each region
    pub scope: ScanScope,
    /// Optional tag restriction
    #[serde(default)]
    pub filter: TagFilter,
    /// Region worker pool size
    pub max_workers: usize,
    /// Service worker pool size within a region
    pub service_workers: usize,
    /// Read and populate the cache
    pub use_cache: bool,
}

impl ScanRequest {
    /// Creates a request with the default worker counts and caching enabled.
    pub fn new(regions: Vec<String>, scope: ScanScope) -> Self {
        Self::from_config(regions, scope, &Config::default())
    }

    /// Creates a request taking worker counts and caching from `config`.
    pub fn from_config(regions: Vec<String>, scope: ScanScope, config: &Config) -> Self {
        Self {
            regions,
            scope,
            filter: TagFilter::none(),
            max_workers: config.max_workers,
            service_workers: config.service_workers,
            use_cache: config.use_cache,
        }
    }

    pub fn with_filter(mut self, filter: TagFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_workers(mut self, max_workers: usize, service_workers: usize) -> Self {
        self.max_workers = max_workers;
        self.service_workers = service_workers;
        self
    }

    pub fn with_cache(mut self, use_cache: bool) -> Self {
        self.use_cache = use_cache;
        self
    }

    /// Regions with blanks and duplicates removed, first occurrence order kept.
    pub fn unique_regions(&self) -> Vec<String> {
        dedup(&self.regions)
    }

    /// Region worker count clamped to its allowed range.
    pub fn effective_max_workers(&self) -> usize {
        clamp_workers(self.max_workers, MAX_WORKERS_RANGE)
    }

    /// Service worker count clamped to its allowed range.
    pub fn effective_service_workers(&self) -> usize {
        clamp_workers(self.service_workers, SERVICE_WORKERS_RANGE)
    }
}

/// Removes blank entries and duplicates, keeping first occurrence order.
pub(crate) fn dedup(items: &[String]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    items
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .filter(|s| seen.insert(s.to_string()))
        .map(str::to_string)
        .collect()
}
