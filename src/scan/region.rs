//! Region Scan Coordinator
//!
//! Turns one region of a request into scan units, runs them on a bounded
//! worker pool with cache-through behavior, and folds their outputs into a
//! [`RegionResult`]. A failing unit leaves an empty entry and an error; it
//! never aborts its siblings.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::cache::{CacheKey, CacheStore};
use crate::models::request::dedup;
use crate::models::{
    RegionResult, ResourceKinds, ScanRequest, ScanScope, ServiceResources, TagFilter, UnitError,
    UnitErrorKind,
};
use crate::scan::hybrid::HybridCoordinator;
use crate::scan::pool::{run_blocking, Dispatch, WorkerPool};
use crate::scan::{
    ProgressObserver, ScanUnit, ScannerRegistry, Session, ShutdownSignal, Strategy, UnitProgress,
    UnitScope,
};

// == Region Plan ==
/// The part of a request that applies to every region.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionPlan {
    pub strategy: Strategy,
    /// Requested services, de-duplicated; unused by the hybrid strategy
    pub services: Vec<String>,
    pub filter: TagFilter,
    pub service_workers: usize,
    pub use_cache: bool,
}

impl RegionPlan {
    pub fn from_request(request: &ScanRequest) -> Self {
        let services = match &request.scope {
            ScanScope::Services(services) => dedup(services),
            ScanScope::AllServices => Vec::new(),
        };
        Self {
            strategy: Strategy::classify(&request.filter, request.scope.is_all_services()),
            services,
            filter: request.filter.clone(),
            service_workers: request.effective_service_workers(),
            use_cache: request.use_cache,
        }
    }

    /// Units this plan dispatches in `region`.
    pub fn units(&self, region: &str) -> Vec<ScanUnit> {
        match self.strategy {
            Strategy::Hybrid => vec![ScanUnit::all_services(region, self.filter.clone())],
            Strategy::Traditional => self
                .services
                .iter()
                .map(|service| ScanUnit::service(region, service.as_str(), self.filter.clone()))
                .collect(),
        }
    }
}

/// How one dispatched unit resolved.
#[derive(Debug)]
enum Resolution<T> {
    Cached(T),
    Computed(T, Vec<UnitError>),
    /// Signal fired before the scanner was called
    Cancelled,
}

impl<T> Resolution<T> {
    fn map<U>(self, f: impl FnOnce(T) -> U) -> Resolution<U> {
        match self {
            Resolution::Cached(value) => Resolution::Cached(f(value)),
            Resolution::Computed(value, errors) => Resolution::Computed(f(value), errors),
            Resolution::Cancelled => Resolution::Cancelled,
        }
    }
}

// == Region Scanner ==
/// Scans one region at a time; clones share every collaborator.
#[derive(Clone)]
pub struct RegionScanner {
    session: Session,
    registry: Arc<ScannerRegistry>,
    hybrid: HybridCoordinator,
    cache: Option<Arc<CacheStore>>,
    progress: Arc<dyn ProgressObserver>,
    unit_timeout: Duration,
}

impl RegionScanner {
    pub fn new(
        session: Session,
        registry: Arc<ScannerRegistry>,
        hybrid: HybridCoordinator,
        cache: Option<Arc<CacheStore>>,
        progress: Arc<dyn ProgressObserver>,
        unit_timeout: Duration,
    ) -> Self {
        Self {
            session,
            registry,
            hybrid,
            cache,
            progress,
            unit_timeout,
        }
    }

    // == Scan ==
    /// Produces the result for `region`.
    ///
    /// Returns once every dispatched unit has resolved. When `signal` fires,
    /// no further unit is dispatched, in-flight units are drained, and the
    /// result is marked cancelled.
    pub async fn scan(
        &self,
        region: &str,
        plan: &RegionPlan,
        signal: &ShutdownSignal,
    ) -> RegionResult {
        let started = Instant::now();
        let units = plan.units(region);
        let total = units.len();
        let mut result = RegionResult::empty(region, plan.strategy);
        info!(region, strategy = ?plan.strategy, units = total, "Scanning region");

        let mut pool: WorkerPool<ScanUnit, Resolution<ServiceResources>> =
            WorkerPool::new(plan.service_workers.min(total));
        for unit in units {
            let worker = self.clone();
            let worker_signal = signal.clone();
            let use_cache = plan.use_cache;
            let task_unit = unit.clone();
            let dispatch = pool
                .submit(unit, signal, async move {
                    worker.resolve(&task_unit, use_cache, &worker_signal).await
                })
                .await;
            if dispatch == Dispatch::Cancelled {
                debug!(region, "Shutdown signalled, no further units dispatched");
                result.cancelled = true;
                break;
            }
        }

        let mut completed = 0;
        while let Some((unit, output)) = pool.next_completed().await {
            match output {
                Ok(Resolution::Cached(resources)) => {
                    result.cache_hits += 1;
                    result.resources.extend(resources);
                }
                Ok(Resolution::Computed(resources, errors)) => {
                    result.resources.extend(resources);
                    result.errors.extend(errors);
                }
                Ok(Resolution::Cancelled) => {
                    result.cancelled = true;
                    continue;
                }
                Err(join) => {
                    let label = unit.label();
                    warn!(region, unit = %label, error = %join, "Unit task panicked");
                    if let UnitScope::Service(service) = &unit.scope {
                        result.resources.insert(service.clone(), ResourceKinds::new());
                    }
                    result.errors.push(UnitError::new(
                        region,
                        label,
                        UnitErrorKind::Panicked,
                        join.to_string(),
                    ));
                }
            }

            completed += 1;
            self.progress.unit_completed(&UnitProgress {
                completed,
                total,
                unit: unit.label(),
                region: region.to_string(),
            });
        }

        result.duration = started.elapsed();
        info!(
            region,
            services = result.resources.len(),
            resources = result.resource_count(),
            errors = result.errors.len(),
            cache_hits = result.cache_hits,
            cancelled = result.cancelled,
            elapsed_ms = result.duration.as_millis() as u64,
            "Region scan finished"
        );
        result
    }

    // == Unit Resolution ==
    async fn resolve(
        &self,
        unit: &ScanUnit,
        use_cache: bool,
        signal: &ShutdownSignal,
    ) -> Resolution<ServiceResources> {
        let key = unit.cache_key();
        let cache = self.cache.as_deref().filter(|_| use_cache);

        match &unit.scope {
            UnitScope::Service(service) => self
                .cache_through::<ResourceKinds, _>(
                    &key,
                    cache,
                    signal,
                    self.scan_service(&unit.region, service, &unit.filter),
                )
                .await
                .map(|kinds| ServiceResources::from([(service.clone(), kinds)])),
            UnitScope::AllServices => {
                self.cache_through::<ServiceResources, _>(&key, cache, signal, async {
                    let discovery = self.hybrid.discover(&unit.region, &unit.filter).await;
                    (discovery.resources, discovery.errors)
                })
                .await
            }
        }
    }

    /// Serves `key` from the cache, or runs `compute` and stores its output
    /// when it recorded no error.
    async fn cache_through<T, F>(
        &self,
        key: &CacheKey,
        cache: Option<&CacheStore>,
        signal: &ShutdownSignal,
        compute: F,
    ) -> Resolution<T>
    where
        T: Serialize + DeserializeOwned,
        F: Future<Output = (T, Vec<UnitError>)>,
    {
        if let Some(cache) = cache {
            if let Some(cached) = cache.get::<T>(key).await {
                return Resolution::Cached(cached);
            }
        }

        if signal.is_triggered() {
            return Resolution::Cancelled;
        }

        let (value, errors) = compute.await;
        if errors.is_empty() {
            if let Some(cache) = cache {
                cache.put(key, &value).await;
            }
        }
        Resolution::Computed(value, errors)
    }

    async fn scan_service(
        &self,
        region: &str,
        service: &str,
        filter: &TagFilter,
    ) -> (ResourceKinds, Vec<UnitError>) {
        let Some(scanner) = self.registry.get(service) else {
            warn!(region, service, "No scanner registered");
            let error = UnitError::new(
                region,
                service,
                UnitErrorKind::Unregistered,
                format!("no scanner registered for {}", service),
            );
            return (ResourceKinds::new(), vec![error]);
        };

        let (session, owned_region, owned_filter) =
            (self.session.clone(), region.to_string(), filter.clone());
        let outcome = run_blocking(self.unit_timeout, move || {
            scanner.scan(&session, &owned_region, &owned_filter)
        })
        .await;

        match outcome {
            Ok(kinds) => {
                debug!(region, service, kinds = kinds.len(), "Service scanned");
                (kinds, Vec::new())
            }
            Err(failure) => {
                let error = failure.into_unit_error(region, service);
                warn!(region, service, error = %error.message, "Service scan failed");
                (ResourceKinds::new(), vec![error])
            }
        }
    }
}
