//! Cloudscan - concurrent multi-region cloud resource discovery
//!
//! Fans scans out over regions and services with bounded worker pools,
//! merges tag-index discovery with per-service scanning, and caches every
//! unit of work behind a TTL-bound store.

pub mod cache;
pub mod config;
pub mod error;
pub mod models;
pub mod scan;
pub mod tasks;

pub use cache::{CacheKey, CacheStore};
pub use config::Config;
pub use error::{CacheError, ScannerError};
pub use models::{AggregateResult, RegionResult, ScanRequest, ScanScope, TagFilter};
pub use scan::{
    run_scan, ScanOrchestrator, ServiceScanner, Session, ShutdownSignal, TagDiscoveryScanner,
};
pub use tasks::{spawn_interrupt_listener, spawn_reaper_task};
