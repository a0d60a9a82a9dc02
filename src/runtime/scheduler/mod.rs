//! Reference scheduler.
//!
//! Workers share one FIFO [`RunQueue`]. Each pop follows the dispatch
//! rule tasks expect from whoever drives them:
//!
//! - a task that was never run, whose wait condition is ready, or that has
//!   a pending cancellation is re-entered with [`Task::run`];
//! - any other task is pushed back untouched;
//! - a task that reports done leaves the queue for good.
//!
//! A worker that sees a full lap of not-ready tasks sleeps for
//! `idle_backoff` before polling again. [`Scheduler::run`] returns once
//! every spawned task is done, or once `idle_timeout` passes without any
//! task making progress.

mod run_queue;

pub use run_queue::RunQueue;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use parking_lot::Mutex;

use super::config::RuntimeConfig;
use crate::classify::{self, Classifier, RoutineCatalog};
use crate::error::ErrorKind;
use crate::task::{Routine, RunStatus, Task};
use crate::tracing_compat::{debug, error, info, warn};

/// Totals reported when a scheduler run ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerReport {
    /// Tasks that finished during this run.
    pub completed: usize,
    /// Tasks abandoned because `run()` surfaced a fatal error.
    pub failed: usize,
    /// Tasks still not done when the run ended.
    pub pending: usize,
}

impl SchedulerReport {
    /// True if every spawned task finished.
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        self.pending == 0
    }
}

/// Drives spawned tasks to completion on a pool of worker threads.
#[derive(Debug)]
pub struct Scheduler {
    config: RuntimeConfig,
    classifier: Arc<Classifier>,
    queue: RunQueue,
    live: AtomicUsize,
    completed: AtomicUsize,
    failed: AtomicUsize,
    last_progress: Mutex<Instant>,
}

impl Scheduler {
    /// Creates a scheduler over the process-wide catalog.
    ///
    /// Tasks share the process-wide classifier when its configuration
    /// matches `config.classifier`; otherwise they get a classifier of their
    /// own over the same catalog.
    #[must_use]
    pub fn new(mut config: RuntimeConfig) -> Self {
        config.normalize();
        let global = classify::global();
        if global.config() == &config.classifier {
            return Self::with_classifier(config, global);
        }
        debug!("classifier config differs from the process-wide one; building a scheduler-local classifier");
        Self::with_catalog(config, global.catalog())
    }

    /// Creates a scheduler with a classifier built from `config.classifier`.
    #[must_use]
    pub fn with_catalog(mut config: RuntimeConfig, catalog: Arc<dyn RoutineCatalog>) -> Self {
        config.normalize();
        let classifier = Arc::new(Classifier::new(catalog, config.classifier.clone()));
        Self::with_classifier(config, classifier)
    }

    /// Creates a scheduler whose tasks use `classifier`.
    ///
    /// The classifier's own configuration wins over `config.classifier`.
    #[must_use]
    pub fn with_classifier(mut config: RuntimeConfig, classifier: Arc<Classifier>) -> Self {
        config.normalize();
        if classifier.config() != &config.classifier {
            warn!(
                configured = ?config.classifier,
                effective = ?classifier.config(),
                "classifier config ignored; the supplied classifier has its own"
            );
            config.classifier = classifier.config().clone();
        }
        Self {
            config,
            classifier,
            queue: RunQueue::new(),
            live: AtomicUsize::new(0),
            completed: AtomicUsize::new(0),
            failed: AtomicUsize::new(0),
            last_progress: Mutex::new(Instant::now()),
        }
    }

    /// Returns the normalized configuration.
    #[must_use]
    pub const fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Returns the classifier handed to tasks created by [`Scheduler::spawn_routine`].
    #[must_use]
    pub fn classifier(&self) -> Arc<Classifier> {
        Arc::clone(&self.classifier)
    }

    /// Queues an existing task. Done tasks are ignored.
    pub fn spawn(&self, task: Arc<Task>) {
        if task.is_done() {
            return;
        }
        self.live.fetch_add(1, Ordering::SeqCst);
        debug!(task = %task.id(), "task spawned");
        self.queue.push(task);
    }

    /// Creates a task for `entry` and queues it.
    pub fn spawn_routine(&self, entry: impl Routine + 'static) -> Arc<Task> {
        let task = Arc::new(Task::with_classifier(entry, self.classifier()));
        self.spawn(Arc::clone(&task));
        task
    }

    /// Number of spawned tasks that are not done yet.
    #[must_use]
    pub fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    /// Runs every queued task on `worker_threads` threads.
    pub fn run(&self) -> SchedulerReport {
        let workers = self.config.worker_threads;
        info!(workers, tasks = self.live(), "scheduler starting");
        self.begin();
        thread::scope(|scope| {
            let mut spawned = 0_usize;
            for index in 0..workers {
                let builder = thread::Builder::new()
                    .name(format!("{}-{index}", self.config.thread_name_prefix))
                    .stack_size(self.config.thread_stack_size);
                match builder.spawn_scoped(scope, || self.worker_loop()) {
                    Ok(_) => spawned += 1,
                    Err(err) => warn!(index, error = %err, "failed to spawn worker thread"),
                }
            }
            if spawned == 0 {
                warn!("no worker threads available; running on the calling thread");
                self.worker_loop();
            }
        });
        self.report()
    }

    /// Runs every queued task on the calling thread.
    pub fn run_current_thread(&self) -> SchedulerReport {
        info!(workers = 1_usize, tasks = self.live(), "scheduler starting on current thread");
        self.begin();
        self.worker_loop();
        self.report()
    }

    fn begin(&self) {
        self.completed.store(0, Ordering::SeqCst);
        self.failed.store(0, Ordering::SeqCst);
        *self.last_progress.lock() = Instant::now();
    }

    fn report(&self) -> SchedulerReport {
        let report = SchedulerReport {
            completed: self.completed.load(Ordering::SeqCst),
            failed: self.failed.load(Ordering::SeqCst),
            pending: self.live(),
        };
        info!(
            completed = report.completed,
            failed = report.failed,
            pending = report.pending,
            "scheduler stopped"
        );
        report
    }

    fn worker_loop(&self) {
        let mut misses = 0_usize;
        while self.live() > 0 {
            if self.timed_out() {
                debug!(pending = self.live(), "idle timeout reached");
                return;
            }
            let Some(task) = self.queue.pop() else {
                thread::sleep(self.config.idle_backoff);
                continue;
            };
            if self.dispatch(task) {
                misses = 0;
            } else {
                misses += 1;
                if misses > self.queue.len() {
                    misses = 0;
                    thread::sleep(self.config.idle_backoff);
                }
            }
        }
    }

    /// Returns true if the task made progress.
    fn dispatch(&self, task: Arc<Task>) -> bool {
        if task.is_done() {
            self.retire(&self.completed);
            return true;
        }
        if !task.is_ready() {
            self.queue.push(task);
            return false;
        }
        match task.run() {
            Ok(RunStatus::Suspended) => {
                self.progress();
                self.queue.push(task);
            }
            Ok(RunStatus::Done) => {
                self.progress();
                self.retire(&self.completed);
            }
            Err(err) if err.kind() == ErrorKind::TaskDone => {
                self.retire(&self.completed);
            }
            Err(err) if task.is_done() => {
                error!(task = %task.id(), error = %err, "task abandoned");
                self.progress();
                self.retire(&self.failed);
            }
            Err(err) => {
                debug!(task = %task.id(), error = %err, "task busy; requeued");
                self.queue.push(task);
                return false;
            }
        }
        true
    }

    fn retire(&self, counter: &AtomicUsize) {
        counter.fetch_add(1, Ordering::SeqCst);
        self.live.fetch_sub(1, Ordering::SeqCst);
    }

    fn progress(&self) {
        *self.last_progress.lock() = Instant::now();
    }

    fn timed_out(&self) -> bool {
        self.config
            .idle_timeout
            .is_some_and(|timeout| self.last_progress.lock().elapsed() >= timeout)
    }
}
