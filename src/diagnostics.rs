//! Unhandled-failure diagnostics.
//!
//! A promise that fails while nobody is listening hands the failure to its
//! [`Diagnostics`] policy. The default policy, [`GracePeriod`], waits a short
//! while before reporting so that code attaching a handler a little later can
//! still claim the failure; the first handler to do so cancels the report.
use std::collections::hash_map::Entry;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, error, trace, warn};

use crate::promise::PromiseId;
use crate::Reason;

/// Grace delay used by [`GracePeriod::default`].
pub const DEFAULT_GRACE: Duration = Duration::from_millis(10);

/// Hooks invoked by promises on their failure path.
pub trait Diagnostics<E>: Send + Sync {
    /// A failure settled with no listener, or reached a reader without a
    /// failure handler.
    fn unobserved(&self, promise: PromiseId, reason: &E);

    /// A failure handler was attached to an already failed promise.
    fn caught(&self, promise: PromiseId);
}

pub type Task = Box<dyn FnOnce() + Send>;

/// Runs a task once `delay` has elapsed.
pub trait Scheduler: Send + Sync {
    fn run_later(&self, delay: Duration, task: Task);
}

/// Sleeps on a dedicated thread per task.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadScheduler;

impl Scheduler for ThreadScheduler {
    fn run_later(&self, delay: Duration, task: Task) {
        // The task is shared so it survives a failed spawn.
        let task = Arc::new(Mutex::new(Some(task)));
        let queued = Arc::clone(&task);
        let spawned = thread::Builder::new()
            .name("promise-diagnostics".into())
            .spawn(move || {
                thread::sleep(delay);
                if let Some(task) = queued.lock().take() {
                    task();
                }
            });
        if let Err(err) = spawned {
            warn!(error = %err, "can't spawn diagnostics thread, running task now");
            if let Some(task) = task.lock().take() {
                task();
            }
        }
    }
}

/// Queues tasks until [`ManualScheduler::run_all`] is called.
///
/// Delays are recorded but not waited on, which makes the grace period
/// deterministic in tests and in hosts that drive their own event loop.
#[derive(Default)]
pub struct ManualScheduler {
    queue: Mutex<VecDeque<(Duration, Task)>>,
}

impl fmt::Debug for ManualScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManualScheduler")
            .field("queued", &self.len())
            .finish()
    }
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Delays of the queued tasks, oldest first.
    pub fn delays(&self) -> Vec<Duration> {
        self.queue.lock().iter().map(|(delay, _)| *delay).collect()
    }

    /// Run every queued task, including ones queued while running. Returns
    /// how many ran.
    pub fn run_all(&self) -> usize {
        let mut ran = 0;
        loop {
            let next = self.queue.lock().pop_front();
            match next {
                Some((_, task)) => {
                    task();
                    ran += 1;
                }
                None => return ran,
            }
        }
    }
}

impl Scheduler for ManualScheduler {
    fn run_later(&self, delay: Duration, task: Task) {
        self.queue.lock().push_back((delay, task));
    }
}

type Report<E> = Arc<dyn Fn(PromiseId, E) + Send + Sync>;

/// Reports unobserved failures after a grace delay unless a handler claims
/// them first.
///
/// At most one report is pending per promise. The default scheduler is
/// [`ThreadScheduler`], which spawns a sleeping thread for every report;
/// hosts that expect many unhandled failures should pass a
/// [`ManualScheduler`] driven from their own loop.
pub struct GracePeriod<E> {
    delay: Duration,
    scheduler: Arc<dyn Scheduler>,
    report: Report<E>,
    // One claim flag per promise with a scheduled report. Whoever flips it
    // first, the report or a late handler, decides whether the report fires.
    scheduled: Arc<Mutex<HashMap<PromiseId, Arc<AtomicBool>>>>,
}

impl<E> fmt::Debug for GracePeriod<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GracePeriod")
            .field("delay", &self.delay)
            .field("scheduled", &self.scheduled.lock().len())
            .finish()
    }
}

impl<E: Reason> Default for GracePeriod<E> {
    fn default() -> Self {
        Self::new(Arc::new(ThreadScheduler))
    }
}

impl<E: Reason> GracePeriod<E> {
    pub fn new(scheduler: Arc<dyn Scheduler>) -> Self {
        Self {
            delay: DEFAULT_GRACE,
            scheduler,
            report: Arc::new(log_unhandled::<E>),
            scheduled: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Replace the default report, which logs the failure at error level.
    pub fn on_report<F>(mut self, report: F) -> Self
    where
        F: Fn(PromiseId, E) + Send + Sync + 'static,
    {
        self.report = Arc::new(report);
        self
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Reports scheduled and not yet fired or cancelled.
    pub fn scheduled(&self) -> usize {
        self.scheduled.lock().len()
    }
}

fn log_unhandled<E: Reason>(promise: PromiseId, reason: E) {
    error!(%promise, reason = ?reason, "unhandled promise failure");
}

impl<E: Reason> Diagnostics<E> for GracePeriod<E> {
    fn unobserved(&self, promise: PromiseId, reason: &E) {
        let claim = Arc::new(AtomicBool::new(false));
        match self.scheduled.lock().entry(promise) {
            Entry::Occupied(_) => {
                trace!(%promise, "unhandled failure report already scheduled");
                return;
            }
            Entry::Vacant(slot) => {
                slot.insert(Arc::clone(&claim));
            }
        }
        debug!(%promise, delay = ?self.delay, "scheduling unhandled failure report");

        let scheduled = Arc::clone(&self.scheduled);
        let report = Arc::clone(&self.report);
        let reason = reason.clone();
        self.scheduler.run_later(
            self.delay,
            Box::new(move || {
                {
                    let mut scheduled = scheduled.lock();
                    if scheduled
                        .get(&promise)
                        .is_some_and(|current| Arc::ptr_eq(current, &claim))
                    {
                        scheduled.remove(&promise);
                    }
                }
                if claim.swap(true, Ordering::AcqRel) {
                    trace!(%promise, "unhandled failure report was cancelled");
                    return;
                }
                report(promise, reason);
            }),
        );
    }

    fn caught(&self, promise: PromiseId) {
        let Some(claim) = self.scheduled.lock().remove(&promise) else {
            return;
        };
        if !claim.swap(true, Ordering::AcqRel) {
            debug!(%promise, "late handler cancelled unhandled failure report");
        }
    }
}
