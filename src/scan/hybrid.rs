//! Hybrid Discovery Coordinator
//!
//! Tag discovery covers every indexed service but one. This coordinator runs
//! the index call and the gapped service's own scanner side by side and
//! merges them into one service-organized mapping, so the region costs the
//! slower of the two calls rather than their sum.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::models::{
    count_records, count_service_records, ResourceKinds, ServiceResources, TagFilter, UnitError,
    UnitErrorKind,
};
use crate::scan::pool::{run_blocking, BlockingFailure, Dispatch, WorkerPool};
use crate::scan::{ScannerRegistry, ServiceScanner, Session, ShutdownSignal, TagDiscoveryScanner};

/// Unit label for the tagging index sub-task.
pub const TAG_DISCOVERY_LABEL: &str = "tag-discovery";

/// Merged output of one hybrid run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HybridDiscovery {
    pub resources: ServiceResources,
    /// Failures of either sub-task
    pub errors: Vec<UnitError>,
}

enum Part {
    Index(Result<ServiceResources, BlockingFailure>),
    Gapped(Result<ResourceKinds, BlockingFailure>),
}

// == Hybrid Coordinator ==
#[derive(Clone)]
pub struct HybridCoordinator {
    session: Session,
    tag_discovery: Arc<dyn TagDiscoveryScanner>,
    gapped_service: String,
    gapped_scanner: Option<Arc<dyn ServiceScanner>>,
    unit_timeout: Duration,
}

impl HybridCoordinator {
    /// Resolves the gapped service's scanner from `registry`.
    pub fn new(
        session: Session,
        tag_discovery: Arc<dyn TagDiscoveryScanner>,
        registry: &ScannerRegistry,
        unit_timeout: Duration,
    ) -> Self {
        let gapped_service = tag_discovery.gapped_service().to_string();
        let gapped_scanner = registry.get(&gapped_service);
        Self {
            session,
            tag_discovery,
            gapped_service,
            gapped_scanner,
            unit_timeout,
        }
    }

    pub fn gapped_service(&self) -> &str {
        &self.gapped_service
    }

    // == Discover ==
    /// Runs both sub-tasks for `region` and merges whatever succeeded.
    ///
    /// Never fails: a failed sub-task contributes nothing but an error.
    pub async fn discover(&self, region: &str, filter: &TagFilter) -> HybridDiscovery {
        debug!(region, filter = %filter, gapped = %self.gapped_service, "Starting hybrid discovery");

        let mut errors = Vec::new();
        let mut pool: WorkerPool<&'static str, Part> = WorkerPool::new(2);
        // Sub-tasks of an already dispatched unit always both start
        let signal = ShutdownSignal::new();

        let (session, scanner, owned_region, owned_filter) = (
            self.session.clone(),
            self.tag_discovery.clone(),
            region.to_string(),
            filter.clone(),
        );
        let timeout = self.unit_timeout;
        pool.submit(TAG_DISCOVERY_LABEL, &signal, async move {
            Part::Index(
                run_blocking(timeout, move || {
                    scanner.discover(&session, &owned_region, &owned_filter)
                })
                .await,
            )
        })
        .await;

        match self.gapped_scanner.clone() {
            Some(scanner) => {
                let (session, owned_region, owned_filter) =
                    (self.session.clone(), region.to_string(), filter.clone());
                let dispatch = pool
                    .submit("gapped", &signal, async move {
                        Part::Gapped(
                            run_blocking(timeout, move || {
                                scanner.scan(&session, &owned_region, &owned_filter)
                            })
                            .await,
                        )
                    })
                    .await;
                debug_assert_eq!(dispatch, Dispatch::Accepted);
            }
            None => errors.push(UnitError::new(
                region,
                &self.gapped_service,
                UnitErrorKind::Unregistered,
                format!("no scanner registered for {}", self.gapped_service),
            )),
        }

        let mut index = None;
        let mut gapped = None;
        while let Some((label, output)) = pool.next_completed().await {
            let unit = if label == TAG_DISCOVERY_LABEL {
                TAG_DISCOVERY_LABEL
            } else {
                self.gapped_service.as_str()
            };
            match output {
                Ok(Part::Index(Ok(resources))) => index = Some(resources),
                Ok(Part::Gapped(Ok(kinds))) => gapped = Some(kinds),
                Ok(Part::Index(Err(failure))) | Ok(Part::Gapped(Err(failure))) => {
                    let error = failure.into_unit_error(region, unit);
                    warn!(region, unit, error = %error.message, "Hybrid sub-task failed");
                    errors.push(error);
                }
                Err(join) => errors.push(
                    BlockingFailure::Panicked(join.to_string()).into_unit_error(region, unit),
                ),
            }
        }

        let resources = merge(index, &self.gapped_service, gapped);
        debug!(
            region,
            services = resources.len(),
            resources = count_service_records(&resources),
            errors = errors.len(),
            "Hybrid discovery completed"
        );
        HybridDiscovery { resources, errors }
    }
}

// == Merge ==
/// Combines the index output with the gapped service's own scan.
///
/// Index resource kinds are pluralized. A successful gapped scan replaces
/// whatever the index held for that service, keeping only non-empty kinds;
/// a failed one (`None`) leaves the index entry alone.
pub fn merge(
    index: Option<ServiceResources>,
    gapped_service: &str,
    gapped: Option<ResourceKinds>,
) -> ServiceResources {
    let mut merged = ServiceResources::new();

    for (service, kinds) in index.unwrap_or_default() {
        let target = merged.entry(service).or_default();
        for (kind, records) in kinds {
            target.entry(plural_kind(&kind)).or_default().extend(records);
        }
    }

    if let Some(kinds) = gapped {
        merged.remove(gapped_service);
        let kinds: ResourceKinds = kinds
            .into_iter()
            .filter(|(_, records)| !records.is_empty())
            .collect();
        if count_records(&kinds) > 0 {
            merged.insert(gapped_service.to_string(), kinds);
        }
    }

    merged
}

/// Index resource types are singular (`instance`); results use plural keys.
pub fn plural_kind(kind: &str) -> String {
    if kind.ends_with('s') {
        kind.to_string()
    } else {
        format!("{}s", kind)
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ScannerError;
    use serde_json::json;

    fn kinds(kind: &str, ids: &[&str]) -> ResourceKinds {
        let mut kinds = ResourceKinds::new();
        kinds.insert(
            kind.to_string(),
            ids.iter().map(|id| json!({ "Id": id })).collect(),
        );
        kinds
    }

    struct Index(Result<ServiceResources, ScannerError>);

    impl TagDiscoveryScanner for Index {
        fn discover(
            &self,
            _: &Session,
            _: &str,
            _: &TagFilter,
        ) -> Result<ServiceResources, ScannerError> {
            self.0.clone()
        }
    }

    struct Gapped(Result<ResourceKinds, ScannerError>);

    impl ServiceScanner for Gapped {
        fn service(&self) -> &str {
            "autoscaling"
        }

        fn scan(&self, _: &Session, _: &str, _: &TagFilter) -> Result<ResourceKinds, ScannerError> {
            self.0.clone()
        }
    }

    /// Index and gapped scanner that both sleep before answering.
    struct Sluggish(Duration);

    impl TagDiscoveryScanner for Sluggish {
        fn discover(&self, _: &Session, _: &str, _: &TagFilter) -> Result<ServiceResources, ScannerError> {
            std::thread::sleep(self.0);
            Ok(index_output())
        }
    }

    impl ServiceScanner for Sluggish {
        fn service(&self) -> &str {
            "autoscaling"
        }

        fn scan(&self, _: &Session, _: &str, _: &TagFilter) -> Result<ResourceKinds, ScannerError> {
            std::thread::sleep(self.0);
            Ok(kinds("auto_scaling_groups", &["web"]))
        }
    }

    fn index_output() -> ServiceResources {
        let mut services = ServiceResources::new();
        services.insert("ec2".into(), kinds("instance", &["i-1"]));
        services.insert("s3".into(), kinds("buckets", &["logs"]));
        services
    }

    fn coordinator(
        index: Result<ServiceResources, ScannerError>,
        gapped: Option<Result<ResourceKinds, ScannerError>>,
    ) -> HybridCoordinator {
        let mut registry = ScannerRegistry::new();
        if let Some(result) = gapped {
            registry.register(Arc::new(Gapped(result)));
        }
        HybridCoordinator::new(
            Session::anonymous(),
            Arc::new(Index(index)),
            &registry,
            Duration::from_secs(5),
        )
    }

    #[test]
    fn test_plural_kind() {
        assert_eq!(plural_kind("instance"), "instances");
        assert_eq!(plural_kind("buckets"), "buckets");
    }

    #[test]
    fn test_merge_gapped_is_authoritative() {
        let mut index = index_output();
        index.insert("autoscaling".into(), kinds("stale", &["x"]));

        let mut gapped = kinds("auto_scaling_groups", &["web"]);
        gapped.insert("launch_configurations".into(), vec![]);

        let merged = merge(Some(index), "autoscaling", Some(gapped));
        let autoscaling = &merged["autoscaling"];
        assert_eq!(autoscaling.len(), 1);
        assert_eq!(autoscaling["auto_scaling_groups"].len(), 1);
        assert_eq!(merged["ec2"]["instances"].len(), 1);
    }

    #[test]
    fn test_merge_empty_gapped_removes_entry() {
        let merged = merge(Some(index_output()), "autoscaling", Some(kinds("groups", &[])));
        assert!(!merged.contains_key("autoscaling"));
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn test_merge_failed_gapped_keeps_index_entry() {
        let mut index = index_output();
        index.insert("autoscaling".into(), kinds("group", &["a"]));
        let merged = merge(Some(index), "autoscaling", None);
        assert_eq!(merged["autoscaling"]["groups"].len(), 1);
    }

    #[tokio::test]
    async fn test_discover_merges_both_sources() {
        let hybrid = coordinator(
            Ok(index_output()),
            Some(Ok(kinds("auto_scaling_groups", &["web"]))),
        );

        let result = hybrid.discover("us-east-1", &TagFilter::pair("Env", "Prod")).await;

        assert!(result.errors.is_empty());
        assert_eq!(result.resources.len(), 3);
        assert_eq!(result.resources["ec2"]["instances"][0]["Id"], "i-1");
        assert_eq!(
            result.resources["autoscaling"]["auto_scaling_groups"][0]["Id"],
            "web"
        );
    }

    #[tokio::test]
    async fn test_sub_tasks_run_concurrently() {
        let delay = Duration::from_millis(150);
        let registry = ScannerRegistry::new().with(Arc::new(Sluggish(delay)));
        let hybrid = HybridCoordinator::new(
            Session::anonymous(),
            Arc::new(Sluggish(delay)),
            &registry,
            Duration::from_secs(5),
        );

        let started = std::time::Instant::now();
        let result = hybrid.discover("us-east-1", &TagFilter::key("Env")).await;
        let elapsed = started.elapsed();

        assert!(result.errors.is_empty());
        assert_eq!(result.resources.len(), 3);
        assert!(elapsed >= delay);
        assert!(elapsed < Duration::from_millis(250), "took {:?}", elapsed);
    }

    #[tokio::test]
    async fn test_index_failure_keeps_gapped_output() {
        let hybrid = coordinator(
            Err(ScannerError::remote("AccessDenied", "no tagging access")),
            Some(Ok(kinds("auto_scaling_groups", &["web"]))),
        );

        let result = hybrid.discover("us-east-1", &TagFilter::key("Env")).await;

        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].unit, TAG_DISCOVERY_LABEL);
        assert_eq!(result.resources.keys().collect::<Vec<_>>(), vec!["autoscaling"]);
    }

    #[tokio::test]
    async fn test_gapped_failure_keeps_index_output() {
        let hybrid = coordinator(
            Ok(index_output()),
            Some(Err(ScannerError::Throttled("slow down".into()))),
        );

        let result = hybrid.discover("us-east-1", &TagFilter::value("Prod")).await;

        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].unit, "autoscaling");
        assert_eq!(result.errors[0].kind, UnitErrorKind::Scanner);
        assert_eq!(result.resources.len(), 2);
    }

    #[tokio::test]
    async fn test_both_failures_give_empty_mapping() {
        let hybrid = coordinator(
            Err(ScannerError::Other("index down".into())),
            Some(Err(ScannerError::Other("asg down".into()))),
        );

        let result = hybrid.discover("us-east-1", &TagFilter::key("Env")).await;

        assert!(result.resources.is_empty());
        assert_eq!(result.errors.len(), 2);
    }

    #[tokio::test]
    async fn test_missing_gapped_scanner_is_recorded() {
        let hybrid = coordinator(Ok(index_output()), None);

        let result = hybrid.discover("us-east-1", &TagFilter::key("Env")).await;

        assert_eq!(result.resources.len(), 2);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].kind, UnitErrorKind::Unregistered);
    }
}
