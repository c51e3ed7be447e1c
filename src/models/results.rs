//! Scan Results
//!
//! Per-region and aggregate outcomes of a scan, including the errors
//! recorded against individual units.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ScannerError;
use crate::models::{count_service_records, ServiceResources};
use crate::scan::Strategy;

// == Unit Error ==
/// Why a unit produced no (or partial) data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitErrorKind {
    /// Scanner returned an error
    Scanner,
    /// Scanner call exceeded the unit timeout
    Timeout,
    /// Scanner call panicked
    Panicked,
    /// No scanner registered for the requested service
    Unregistered,
}

/// Non-fatal failure recorded against one unit of work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitError {
    pub region: String,
    /// Unit label: a service name, or a hybrid sub-task label
    pub unit: String,
    pub kind: UnitErrorKind,
    pub message: String,
}

impl UnitError {
    pub fn new(
        region: impl Into<String>,
        unit: impl Into<String>,
        kind: UnitErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            region: region.into(),
            unit: unit.into(),
            kind,
            message: message.into(),
        }
    }

    /// Records a scanner-reported failure.
    pub fn scanner(region: &str, unit: &str, err: &ScannerError) -> Self {
        Self::new(region, unit, UnitErrorKind::Scanner, err.to_string())
    }
}

impl std::fmt::Display for UnitError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} in {}: {}", self.unit, self.region, self.message)
    }
}

// == Region Result ==
/// Everything learned about one region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionResult {
    pub region: String,
    /// Strategy the region was scanned with
    pub strategy: Strategy,
    /// Service to resource kinds, one key per resolved unit
    pub resources: ServiceResources,
    /// Wall-clock time for the whole region
    pub duration: Duration,
    /// Non-fatal failures, one per failed unit or sub-task
    pub errors: Vec<UnitError>,
    /// Set when the shutdown signal cut the region short
    pub cancelled: bool,
    /// Units answered from the cache
    pub cache_hits: usize,
}

impl RegionResult {
    /// An empty result for `region`.
    pub fn empty(region: impl Into<String>, strategy: Strategy) -> Self {
        Self {
            region: region.into(),
            strategy,
            resources: ServiceResources::new(),
            duration: Duration::ZERO,
            errors: Vec::new(),
            cancelled: false,
            cache_hits: 0,
        }
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Total records across every service in the region.
    pub fn resource_count(&self) -> usize {
        count_service_records(&self.resources)
    }
}

// == Scan State ==
/// Lifecycle of one scan run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanState {
    Idle,
    Running,
    Completed,
    Cancelled,
    PartiallyFailed,
}

impl ScanState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ScanState::Idle | ScanState::Running)
    }
}

/// Terminal state of a finished scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanOutcome {
    /// Every dispatched unit succeeded
    Completed,
    /// Shutdown signal fired before all work was dispatched or resolved
    Cancelled,
    /// At least one unit recorded an error
    PartiallyFailed,
}

impl From<ScanOutcome> for ScanState {
    fn from(outcome: ScanOutcome) -> Self {
        match outcome {
            ScanOutcome::Completed => ScanState::Completed,
            ScanOutcome::Cancelled => ScanState::Cancelled,
            ScanOutcome::PartiallyFailed => ScanState::PartiallyFailed,
        }
    }
}

// == Aggregate Result ==
/// Final output of a scan, keyed by region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateResult {
    pub regions: BTreeMap<String, RegionResult>,
    pub outcome: ScanOutcome,
    /// Number of distinct regions requested
    pub regions_requested: usize,
    pub started_at: DateTime<Utc>,
    pub duration: Duration,
}

impl AggregateResult {
    /// Derives the outcome from collected regions and the cancellation flag.
    pub fn classify(regions: &BTreeMap<String, RegionResult>, cancelled: bool) -> ScanOutcome {
        if cancelled || regions.values().any(|r| r.cancelled) {
            ScanOutcome::Cancelled
        } else if regions.values().any(RegionResult::has_errors) {
            ScanOutcome::PartiallyFailed
        } else {
            ScanOutcome::Completed
        }
    }

    pub fn region(&self, name: &str) -> Option<&RegionResult> {
        self.regions.get(name)
    }

    /// Every unit error across all regions.
    pub fn errors(&self) -> impl Iterator<Item = &UnitError> {
        self.regions.values().flat_map(|r| r.errors.iter())
    }

    /// Total records across all regions.
    pub fn resource_count(&self) -> usize {
        self.regions.values().map(RegionResult::resource_count).sum()
    }

    /// False when the scan was cut short by the shutdown signal.
    pub fn is_complete(&self) -> bool {
        self.outcome != ScanOutcome::Cancelled
    }
}
