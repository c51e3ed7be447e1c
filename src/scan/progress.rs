//! Progress reporting hooks for an external display.
//!
//! Observers are called from many workers at once; serializing any rendering
//! is the observer's job.

/// One resolved unit within a region.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitProgress {
    /// Units resolved so far in this region
    pub completed: usize,
    /// Units dispatched or about to be dispatched in this region
    pub total: usize,
    /// Service name or the all-services label
    pub unit: String,
    pub region: String,
}

pub trait ProgressObserver: Send + Sync {
    /// Called after each unit resolves (hit, computed or failed).
    fn unit_completed(&self, progress: &UnitProgress);

    /// Called after each region resolves.
    fn region_completed(&self, _completed: usize, _total: usize, _region: &str) {}
}

/// Observer that ignores everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressObserver for NoProgress {
    fn unit_completed(&self, _progress: &UnitProgress) {}
}

impl<F> ProgressObserver for F
where
    F: Fn(&UnitProgress) + Send + Sync,
{
    fn unit_completed(&self, progress: &UnitProgress) {
        self(progress)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_closure_observer() {
        let seen = Mutex::new(Vec::new());
        let observer = |p: &UnitProgress| seen.lock().unwrap().push(p.unit.clone());

        observer.unit_completed(&UnitProgress {
            completed: 1,
            total: 2,
            unit: "ec2".into(),
            region: "us-east-1".into(),
        });
        observer.region_completed(1, 1, "us-east-1");

        assert_eq!(*seen.lock().unwrap(), vec!["ec2"]);
    }
}
