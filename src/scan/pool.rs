//! Bounded worker pool shared by every fan-out site.
//!
//! Regions, services within a region, and the two hybrid sub-tasks all run
//! through [`WorkerPool`], so admission, cancellation and panic handling
//! behave the same at every level.
//!
//! A task's slot, and the slots of every pool task enclosing it, stay taken
//! while a blocking call it started is still running, even after
//! [`run_blocking`] gave up waiting on it.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::{JoinError, JoinSet};

use crate::error::ScannerError;
use crate::models::{UnitError, UnitErrorKind};
use crate::scan::ShutdownSignal;

/// Result of offering a task to the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// The task holds a worker slot and is running
    Accepted,
    /// The shutdown signal fired first; the task was dropped unstarted
    Cancelled,
}

/// Completed task: its label and its output, or the join error if it panicked.
pub type Completion<L, T> = (L, Result<T, JoinError>);

tokio::task_local! {
    static HELD_SLOTS: HeldSlots;
}

/// Worker slots held by the current pool task and the tasks enclosing it.
#[derive(Clone, Default)]
struct HeldSlots(Vec<Arc<OwnedSemaphorePermit>>);

impl HeldSlots {
    fn current() -> Self {
        HELD_SLOTS.try_with(|slots| slots.clone()).unwrap_or_default()
    }

    fn with(mut self, permit: OwnedSemaphorePermit) -> Self {
        self.0.push(Arc::new(permit));
        self
    }
}

// == Worker Pool ==
/// At most `workers` submitted tasks run at once.
///
/// [`submit`](Self::submit) waits for a free slot, racing the shutdown
/// signal, so a full pool applies back-pressure to the submitter.
pub struct WorkerPool<L, T> {
    workers: usize,
    permits: Arc<Semaphore>,
    running: JoinSet<Completion<L, T>>,
}

impl<L, T> WorkerPool<L, T>
where
    L: Send + 'static,
    T: Send + 'static,
{
    /// Creates a pool of `workers` slots (at least one).
    pub fn new(workers: usize) -> Self {
        let workers = workers.max(1);
        Self {
            workers,
            permits: Arc::new(Semaphore::new(workers)),
            running: JoinSet::new(),
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Tasks submitted and not yet collected.
    pub fn in_flight(&self) -> usize {
        self.running.len()
    }

    // == Submit ==
    /// Runs `task` once a slot frees up, unless `signal` fires first.
    ///
    /// The signal is checked again after a slot is granted, so nothing is
    /// started once it has fired.
    ///
    /// # Arguments
    /// * `label` - Returned with the task's output by [`next_completed`](Self::next_completed)
    /// * `signal` - Shutdown signal raced against the wait for a slot
    /// * `task` - Work to run on its own tokio task
    ///
    /// # Returns
    /// [`Dispatch::Accepted`] if the task started, [`Dispatch::Cancelled`] if
    /// it was dropped unstarted
    pub async fn submit<F>(&mut self, label: L, signal: &ShutdownSignal, task: F) -> Dispatch
    where
        F: Future<Output = T> + Send + 'static,
    {
        if signal.is_triggered() {
            return Dispatch::Cancelled;
        }

        let permit = tokio::select! {
            biased;
            _ = signal.cancelled() => return Dispatch::Cancelled,
            permit = self.permits.clone().acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => return Dispatch::Cancelled,
            },
        };

        if signal.is_triggered() {
            return Dispatch::Cancelled;
        }

        let slots = HeldSlots::current().with(permit);
        let handle = tokio::spawn(HELD_SLOTS.scope(slots, task));
        self.running.spawn(async move { (label, handle.await) });
        Dispatch::Accepted
    }

    // == Next Completed ==
    /// Waits for the next task to finish, in completion order.
    ///
    /// Returns `None` once every submitted task has been collected.
    pub async fn next_completed(&mut self) -> Option<Completion<L, T>> {
        loop {
            match self.running.join_next().await? {
                Ok(completion) => return Some(completion),
                // The wrapper only awaits a handle; it fails only if aborted
                Err(_) => continue,
            }
        }
    }
}

// == Blocking Calls ==
/// Why a blocking scanner call produced nothing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockingFailure {
    Scanner(ScannerError),
    Timeout(Duration),
    Panicked(String),
}

impl BlockingFailure {
    /// Records the failure against `unit` in `region`.
    pub fn into_unit_error(self, region: &str, unit: &str) -> UnitError {
        match self {
            BlockingFailure::Scanner(e) => UnitError::scanner(region, unit, &e),
            BlockingFailure::Timeout(after) => UnitError::new(
                region,
                unit,
                UnitErrorKind::Timeout,
                format!("no answer after {:?}", after),
            ),
            BlockingFailure::Panicked(message) => {
                UnitError::new(region, unit, UnitErrorKind::Panicked, message)
            }
        }
    }
}

/// Runs a blocking scanner call on the blocking thread pool, bounded by `timeout`.
///
/// A call that times out keeps running detached and its result is discarded.
/// Called from a pool task, the call keeps that task's worker slots until it
/// returns, so timed-out calls still count against every pool bound.
pub async fn run_blocking<T, F>(timeout: Duration, call: F) -> Result<T, BlockingFailure>
where
    F: FnOnce() -> Result<T, ScannerError> + Send + 'static,
    T: Send + 'static,
{
    let held = HeldSlots::current();
    let blocking = tokio::task::spawn_blocking(move || {
        let output = call();
        drop(held);
        output
    });
    match tokio::time::timeout(timeout, blocking).await {
        Err(_) => Err(BlockingFailure::Timeout(timeout)),
        Ok(Err(join)) => Err(BlockingFailure::Panicked(join.to_string())),
        Ok(Ok(Err(e))) => Err(BlockingFailure::Scanner(e)),
        Ok(Ok(Ok(value))) => Ok(value),
    }
}
