//! Scan Module
//!
//! Region and service fan-out, hybrid tag discovery, and the plumbing they
//! share: sessions, scanner contracts, the worker pool and the shutdown signal.

pub mod arn;
mod hybrid;
mod orchestrator;
mod pool;
mod progress;
mod region;
mod scanner;
mod session;
mod signal;
mod strategy;
mod unit;

// Re-export public types
pub use hybrid::{
    merge as merge_hybrid, plural_kind, HybridCoordinator, HybridDiscovery, TAG_DISCOVERY_LABEL,
};
pub use orchestrator::{fresh_units, run_scan, ScanOrchestrator, REGION_TASK_LABEL};
pub use pool::{run_blocking, BlockingFailure, Completion, Dispatch, WorkerPool};
pub use progress::{NoProgress, ProgressObserver, UnitProgress};
pub use region::{RegionPlan, RegionScanner};
pub use scanner::{ScannerRegistry, ServiceScanner, TagDiscoveryScanner, DEFAULT_GAPPED_SERVICE};
pub use session::{Session, SessionPool, DEFAULT_PROFILE};
pub use signal::ShutdownSignal;
pub use strategy::Strategy;
pub use unit::{ScanUnit, UnitScope, ALL_SERVICES_LABEL};
