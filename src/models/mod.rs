//! Data models shared by the cache and the scan coordinators
//!
//! Resource shapes handed back by scanners, the scan request, and the
//! per-region and aggregate results.

pub mod request;
pub mod resources;
pub mod results;

// Re-export commonly used types
pub use request::{ScanRequest, ScanScope, DEFAULT_SERVICES};
pub use resources::{
    count_records, count_service_records, RawRecord, ResourceKinds, ServiceResources, Tag,
    TagFilter,
};
pub use results::{
    AggregateResult, RegionResult, ScanOutcome, ScanState, UnitError, UnitErrorKind,
};
