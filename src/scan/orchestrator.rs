//! Scan Orchestrator
//!
//! Top-level entry point: fans regions out over a bounded worker pool,
//! collects their results in completion order and tracks the run state.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::sync::watch;
use tracing::{error, info};

use crate::cache::CacheStore;
use crate::config::Config;
use crate::models::{
    AggregateResult, RegionResult, ScanRequest, ScanScope, ScanState, TagFilter, UnitError,
    UnitErrorKind,
};
use crate::scan::hybrid::HybridCoordinator;
use crate::scan::pool::{Dispatch, WorkerPool};
use crate::scan::region::{RegionPlan, RegionScanner};
use crate::scan::{
    NoProgress, ProgressObserver, ScanUnit, ScannerRegistry, Session, ShutdownSignal,
    TagDiscoveryScanner,
};

/// Unit label recorded when a whole region task dies.
pub const REGION_TASK_LABEL: &str = "region";

// == Scan Orchestrator ==
/// Owns the collaborators shared by every region of a scan.
///
/// Runs are expected one at a time per orchestrator; the published state
/// tracks the latest one.
pub struct ScanOrchestrator {
    session: Session,
    registry: Arc<ScannerRegistry>,
    tag_discovery: Arc<dyn TagDiscoveryScanner>,
    cache: Option<Arc<CacheStore>>,
    progress: Arc<dyn ProgressObserver>,
    unit_timeout: Duration,
    state: watch::Sender<ScanState>,
}

impl ScanOrchestrator {
    /// Creates an orchestrator with no cache and no progress observer.
    pub fn new(
        session: Session,
        registry: ScannerRegistry,
        tag_discovery: Arc<dyn TagDiscoveryScanner>,
    ) -> Self {
        let (state, _) = watch::channel(ScanState::Idle);
        Self {
            session,
            registry: Arc::new(registry),
            tag_discovery,
            cache: None,
            progress: Arc::new(NoProgress),
            unit_timeout: Config::default().unit_timeout,
            state,
        }
    }

    pub fn with_cache(mut self, cache: Arc<CacheStore>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressObserver>) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_unit_timeout(mut self, unit_timeout: Duration) -> Self {
        self.unit_timeout = unit_timeout;
        self
    }

    /// Applies the per-call timeout from `config`.
    pub fn with_config(self, config: &Config) -> Self {
        self.with_unit_timeout(config.unit_timeout)
    }

    pub fn cache(&self) -> Option<&Arc<CacheStore>> {
        self.cache.as_ref()
    }

    /// Current run state.
    pub fn state(&self) -> ScanState {
        *self.state.borrow()
    }

    /// Receiver that sees every state transition from now on.
    pub fn subscribe_state(&self) -> watch::Receiver<ScanState> {
        self.state.subscribe()
    }

    // == Run ==
    /// Scans every requested region and returns the best-effort aggregate.
    ///
    /// Never fails: unit and region failures are recorded in the result.
    /// Once `signal` fires no new region or unit is dispatched; what already
    /// started is collected and the outcome is [`Cancelled`](crate::models::ScanOutcome::Cancelled).
    pub async fn run(&self, request: &ScanRequest, signal: &ShutdownSignal) -> AggregateResult {
        let started_at = Utc::now();
        let started = Instant::now();
        self.state.send_replace(ScanState::Running);

        let regions = request.unique_regions();
        let total = regions.len();
        let plan = Arc::new(RegionPlan::from_request(request));
        let workers = request.effective_max_workers();
        info!(
            regions = total,
            workers,
            strategy = ?plan.strategy,
            filter = %plan.filter,
            use_cache = plan.use_cache && self.cache.is_some(),
            "Starting scan"
        );

        let region_scanner = self.region_scanner();
        let mut pool: WorkerPool<String, RegionResult> = WorkerPool::new(workers);
        let mut cancelled = false;
        for region in regions {
            let scanner = region_scanner.clone();
            let plan = plan.clone();
            let task_signal = signal.clone();
            let task_region = region.clone();
            let dispatch = pool
                .submit(region, signal, async move {
                    scanner.scan(&task_region, &plan, &task_signal).await
                })
                .await;
            if dispatch == Dispatch::Cancelled {
                info!("Shutdown signalled, no further regions dispatched");
                cancelled = true;
                break;
            }
        }

        let mut collected = BTreeMap::new();
        while let Some((region, output)) = pool.next_completed().await {
            let result = output.unwrap_or_else(|join| {
                error!(region = %region, error = %join, "Region task panicked");
                let mut failed = RegionResult::empty(region.as_str(), plan.strategy);
                failed.errors.push(UnitError::new(
                    region.as_str(),
                    REGION_TASK_LABEL,
                    UnitErrorKind::Panicked,
                    join.to_string(),
                ));
                failed
            });
            collected.insert(region.clone(), result);
            self.progress.region_completed(collected.len(), total, &region);
        }

        let outcome = AggregateResult::classify(&collected, cancelled);
        self.state.send_replace(outcome.into());

        let aggregate = AggregateResult {
            regions: collected,
            outcome,
            regions_requested: total,
            started_at,
            duration: started.elapsed(),
        };
        info!(
            outcome = ?aggregate.outcome,
            regions = aggregate.regions.len(),
            resources = aggregate.resource_count(),
            errors = aggregate.errors().count(),
            elapsed_ms = aggregate.duration.as_millis() as u64,
            "Scan finished"
        );
        aggregate
    }

    // == Cached Units ==
    /// Units of `request` that a scan right now would answer from the cache.
    pub async fn cached_units(&self, request: &ScanRequest) -> Vec<ScanUnit> {
        match &self.cache {
            Some(cache) => fresh_units(cache, request).await,
            None => Vec::new(),
        }
    }

    fn region_scanner(&self) -> RegionScanner {
        let hybrid = HybridCoordinator::new(
            self.session.clone(),
            self.tag_discovery.clone(),
            &self.registry,
            self.unit_timeout,
        );
        RegionScanner::new(
            self.session.clone(),
            self.registry.clone(),
            hybrid,
            self.cache.clone(),
            self.progress.clone(),
            self.unit_timeout,
        )
    }
}

/// Units of `request` holding a fresh entry in `cache`, in region then unit order.
pub async fn fresh_units(cache: &CacheStore, request: &ScanRequest) -> Vec<ScanUnit> {
    let plan = RegionPlan::from_request(request);
    let mut fresh = Vec::new();
    for region in request.unique_regions() {
        for unit in plan.units(&region) {
            if cache.contains_fresh(&unit.cache_key()).await {
                fresh.push(unit);
            }
        }
    }
    fresh
}

// == Run Scan ==
/// Single-call entry point over an existing orchestrator.
///
/// `tag_key` and `tag_value` form the tag filter; worker counts are clamped
/// into their allowed ranges.
#[allow(clippy::too_many_arguments)]
pub async fn run_scan(
    orchestrator: &ScanOrchestrator,
    regions: Vec<String>,
    scope: ScanScope,
    tag_key: Option<String>,
    tag_value: Option<String>,
    max_workers: usize,
    service_workers: usize,
    use_cache: bool,
    signal: &ShutdownSignal,
) -> AggregateResult {
    let request = ScanRequest::new(regions, scope)
        .with_filter(TagFilter::new(tag_key, tag_value))
        .with_workers(max_workers, service_workers)
        .with_cache(use_cache);
    orchestrator.run(&request, signal).await
}
