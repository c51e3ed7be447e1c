//! Scanner contracts implemented outside this crate, and the registry the
//! coordinators look them up in.
//!
//! Scanner calls are blocking; coordinators always run them on the blocking
//! thread pool, never on a coordinating task.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::error::ScannerError;
use crate::models::{ResourceKinds, ServiceResources, TagFilter};
use crate::scan::Session;

/// Service the generic tagging index does not cover.
pub const DEFAULT_GAPPED_SERVICE: &str = "autoscaling";

// == Service Scanner ==
/// Lists every resource kind of one service in one region.
pub trait ServiceScanner: Send + Sync {
    /// Service name this scanner answers for, e.g. `ec2`.
    fn service(&self) -> &str;

    /// Returns resource kind to records.
    ///
    /// Scanners for services outside the tagging index must apply `filter`
    /// themselves (see [`TagFilter::matches`]); others may ignore it.
    fn scan(
        &self,
        session: &Session,
        region: &str,
        filter: &TagFilter,
    ) -> Result<ResourceKinds, ScannerError>;
}

// == Tag Discovery Scanner ==
/// Finds tagged resources of every indexed service in one region.
pub trait TagDiscoveryScanner: Send + Sync {
    /// The one service this index leaves out.
    fn gapped_service(&self) -> &str {
        DEFAULT_GAPPED_SERVICE
    }

    /// Returns service to resource kind to records.
    fn discover(
        &self,
        session: &Session,
        region: &str,
        filter: &TagFilter,
    ) -> Result<ServiceResources, ScannerError>;
}

// == Registry ==
/// Service name to scanner.
#[derive(Clone, Default)]
pub struct ScannerRegistry {
    scanners: HashMap<String, Arc<dyn ServiceScanner>>,
}

impl ScannerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `scanner` under its own service name, replacing any previous one.
    pub fn register(&mut self, scanner: Arc<dyn ServiceScanner>) -> &mut Self {
        self.scanners.insert(scanner.service().to_string(), scanner);
        self
    }

    /// Builder form of [`register`](Self::register).
    pub fn with(mut self, scanner: Arc<dyn ServiceScanner>) -> Self {
        self.register(scanner);
        self
    }

    pub fn get(&self, service: &str) -> Option<Arc<dyn ServiceScanner>> {
        self.scanners.get(service).cloned()
    }

    pub fn contains(&self, service: &str) -> bool {
        self.scanners.contains_key(service)
    }

    /// Registered service names, sorted.
    pub fn services(&self) -> Vec<String> {
        let mut names: Vec<String> = self.scanners.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.scanners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scanners.is_empty()
    }
}

impl fmt::Debug for ScannerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScannerRegistry")
            .field("services", &self.services())
            .finish()
    }
}
