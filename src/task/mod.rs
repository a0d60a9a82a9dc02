//! Tasks: cooperative logical threads over an explicit frame stack.
//!
//! A [`Task`] owns one [`Fiber`], the wait condition it is currently
//! suspended on, and its entry [`Routine`]. [`Task::run`] is the only
//! entry point a scheduler drives; every call either finishes the task,
//! leaves it suspended, or fails it.
//!
//! # Lifecycle
//!
//! ```text
//! New ──run──▶ Running ──▶ Suspended ──run──▶ Running ──▶ Done
//!                 │                                        ▲
//!                 └────────────────────────────────────────┘
//! ```
//!
//! `Done` is absorbing: the exit result is recorded exactly once and every
//! later `run()` is rejected with [`ErrorKind::TaskDone`].
//!
//! # Concurrency
//!
//! All mutable task state sits behind one lock held for the whole of a
//! `run()`. A second concurrent `run()` is rejected instead of queued.
//! Snapshot accessors such as [`Task::pause_reason`] take the same lock.
//! [`Task::state`], [`Task::is_done`] and [`Task::cancel`] use separate
//! short-lived locks and never wait for a run in progress.

mod cx;

pub use cx::{Called, Cx, Pausable, Suspension, Unwind};

use core::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::classify::{self, Classifier};
use crate::error::{Error, ErrorKind, Result};
use crate::fiber::Fiber;
use crate::pause::PauseReason;
use crate::tracing_compat::{debug, debug_span, error};
use crate::types::{CancelReason, ExitValue, Outcome, PanicPayload, TaskId, TaskOutcome};

/// A suspend-capable entry routine.
pub trait Routine: Send {
    /// Runs (or resumes) the routine inside the task's frame stack.
    fn execute(&mut self, cx: &mut Cx<'_>) -> Pausable<()>;
}

impl<F> Routine for F
where
    F: FnMut(&mut Cx<'_>) -> Pausable<()> + Send,
{
    fn execute(&mut self, cx: &mut Cx<'_>) -> Pausable<()> {
        self(cx)
    }
}

/// Lifecycle state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskState {
    /// Created, never run.
    New,
    /// A `run()` is in progress.
    Running,
    /// Left suspended by the last `run()`.
    Suspended,
    /// Finished; absorbing.
    Done,
}

impl TaskState {
    /// Returns true for [`TaskState::Done`].
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Done)
    }

    /// Returns the lowercase name of the state.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Running => "running",
            Self::Suspended => "suspended",
            Self::Done => "done",
        }
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a successful `run()` left behind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    /// The task is suspended and will resume on a later `run()`.
    Suspended,
    /// The task is done; its exit result is available.
    Done,
}

struct TaskInner {
    fiber: Fiber,
    entry: Box<dyn Routine>,
    reason: Option<PauseReason>,
    exit_result: Option<TaskOutcome>,
}

/// Everything `run()` needs to settle the task once the entry routine returns.
enum Settle {
    Finish(TaskOutcome),
    Fatal(Error),
    ByFiber { unwound: bool },
}

/// A cooperatively scheduled logical thread.
pub struct Task {
    id: TaskId,
    state: Mutex<TaskState>,
    inner: Mutex<TaskInner>,
    cancel: Mutex<Option<CancelReason>>,
    classifier: Arc<Classifier>,
}

impl Task {
    /// Creates a task using the process-wide classifier.
    #[must_use]
    pub fn new(entry: impl Routine + 'static) -> Self {
        Self::with_classifier(entry, classify::global())
    }

    /// Creates a task from a closure.
    #[must_use]
    pub fn from_fn<F>(entry: F) -> Self
    where
        F: FnMut(&mut Cx<'_>) -> Pausable<()> + Send + 'static,
    {
        Self::new(entry)
    }

    /// Creates a task bound to a specific classifier.
    #[must_use]
    pub fn with_classifier(entry: impl Routine + 'static, classifier: Arc<Classifier>) -> Self {
        let id = TaskId::next();
        debug!(task = %id, "task created");
        Self {
            id,
            state: Mutex::new(TaskState::New),
            inner: Mutex::new(TaskInner {
                fiber: Fiber::new(),
                entry: Box::new(entry),
                reason: None,
                exit_result: None,
            }),
            cancel: Mutex::new(None),
            classifier,
        }
    }

    /// Returns the task's process-unique id.
    #[must_use]
    pub const fn id(&self) -> TaskId {
        self.id
    }

    /// Returns the current lifecycle state.
    #[must_use]
    pub fn state(&self) -> TaskState {
        *self.state.lock()
    }

    /// Returns true once the task has finished.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.state().is_terminal()
    }

    /// Returns true while a `run()` is in progress.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.state() == TaskState::Running
    }

    /// Returns the attached wait condition.
    #[must_use]
    pub fn pause_reason(&self) -> Option<PauseReason> {
        self.inner.lock().reason.clone()
    }

    /// Returns the exit result of a finished task.
    #[must_use]
    pub fn exit_result(&self) -> Option<TaskOutcome> {
        self.inner.lock().exit_result.clone()
    }

    /// Requests cooperative cancellation.
    ///
    /// The task observes it at its next resume boundary. Returns false if
    /// the task is already done.
    pub fn cancel(&self, reason: CancelReason) -> bool {
        if self.is_done() {
            return false;
        }
        let mut slot = self.cancel.lock();
        match slot.as_mut() {
            Some(existing) => {
                existing.strengthen(&reason);
            }
            None => *slot = Some(reason),
        }
        debug!(task = %self.id, "cancellation requested");
        true
    }

    /// Returns true if cancellation has been requested.
    #[must_use]
    pub fn is_cancel_requested(&self) -> bool {
        self.cancel.lock().is_some()
    }

    /// Returns true if a scheduler should re-enter this task now.
    ///
    /// A new task is always ready, as is one with a pending cancellation.
    /// A suspended task is ready when its wait condition is.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        match self.state() {
            TaskState::New => true,
            TaskState::Running | TaskState::Done => false,
            TaskState::Suspended => {
                self.is_cancel_requested()
                    || self
                        .inner
                        .lock()
                        .reason
                        .as_ref()
                        .map_or(true, |reason| reason.is_ready(self.id))
            }
        }
    }

    /// Re-enters the task.
    ///
    /// Returns [`RunStatus::Suspended`] if the entry routine left the
    /// fiber suspended and [`RunStatus::Done`] once the task has finished,
    /// whatever its outcome. Failures of the task itself are captured in
    /// [`Task::exit_result`], not returned.
    ///
    /// # Errors
    ///
    /// - [`ErrorKind::TaskDone`] if the task is already done.
    /// - [`ErrorKind::ProtocolViolation`] if another `run()` is in flight.
    /// - Any fatal protocol error raised while running; the task is marked
    ///   done with that error before it is returned.
    pub fn run(&self) -> Result<RunStatus> {
        let Some(mut guard) = self.inner.try_lock() else {
            return Err(Error::protocol("run() is already in flight").with_task(self.id));
        };
        if self.is_done() {
            return Err(Error::new(ErrorKind::TaskDone)
                .with_message("task is done and cannot be re-entered")
                .with_task(self.id));
        }
        let first = self.transition(TaskState::Running) == TaskState::New;
        let span = debug_span!("task_run", task = %self.id, first);
        let _entered = span.enter();
        let inner = &mut *guard;

        let pending = self.cancel.lock().clone();
        if let (true, Some(reason)) = (first, pending) {
            return Ok(self.finish(inner, Outcome::Cancelled(reason)));
        }

        inner.fiber.begin();
        let result = {
            let TaskInner {
                fiber,
                entry,
                reason,
                ..
            } = &mut *inner;
            let mut cx = Cx::new(self.id, fiber, reason, &self.cancel, &self.classifier);
            panic::catch_unwind(AssertUnwindSafe(|| entry.execute(&mut cx)))
        };

        let settle = match result {
            Err(payload) => {
                let payload = PanicPayload::from_panic(payload.as_ref());
                error!(task = %self.id, %payload, "entry routine panicked");
                Settle::Finish(Outcome::Panicked(payload))
            }
            Ok(Err(Unwind::Failed(err))) if err.is_fatal() => Settle::Fatal(err),
            Ok(Err(Unwind::Failed(err))) => Settle::Finish(Outcome::Err(err)),
            Ok(Err(Unwind::Cancelled(reason))) => Settle::Finish(Outcome::Cancelled(reason)),
            Ok(Err(Unwind::Exit)) => Settle::Finish(match inner.reason.take() {
                Some(PauseReason::Done(outcome)) => outcome,
                _ => Outcome::Ok(ExitValue::ok()),
            }),
            Ok(Err(Unwind::Pause)) => Settle::ByFiber { unwound: true },
            Ok(Ok(())) => Settle::ByFiber { unwound: false },
        };

        match settle {
            Settle::Finish(outcome) => Ok(self.finish(inner, outcome)),
            Settle::Fatal(err) => Err(self.fail(inner, err)),
            Settle::ByFiber { unwound } => {
                if inner.fiber.depth() != 1 {
                    let detail = format!(
                        "entry routine returned with {} frames wound",
                        inner.fiber.depth()
                    );
                    return Err(self.fail(inner, Error::protocol(detail)));
                }
                let leftover = inner.fiber.retained();
                let suspended = inner.fiber.end();
                if unwound && !suspended {
                    let err = Error::protocol("entry unwound with Pause but the fiber is not pausing");
                    return Err(self.fail(inner, err));
                }
                if !suspended && leftover > 0 {
                    let err = Error::protocol(format!(
                        "rewind did not reach the suspended frames ({leftover} still retained)"
                    ));
                    return Err(self.fail(inner, err));
                }
                if matches!(inner.reason, Some(PauseReason::Done(_))) {
                    if let Some(PauseReason::Done(outcome)) = inner.reason.take() {
                        return Ok(self.finish(inner, outcome));
                    }
                }
                if suspended {
                    self.transition(TaskState::Suspended);
                    Ok(RunStatus::Suspended)
                } else {
                    Ok(self.finish(inner, Outcome::Ok(ExitValue::ok())))
                }
            }
        }
    }

    fn finish(&self, inner: &mut TaskInner, outcome: TaskOutcome) -> RunStatus {
        inner.fiber.reset();
        inner.reason = Some(PauseReason::Done(outcome.clone()));
        inner.exit_result = Some(outcome);
        self.transition(TaskState::Done);
        RunStatus::Done
    }

    fn fail(&self, inner: &mut TaskInner, err: Error) -> Error {
        let err = if err.context().task_id.is_some() {
            err
        } else {
            err.with_task(self.id)
        };
        error!(task = %self.id, error = %err, "protocol violation; task abandoned");
        self.finish(inner, Outcome::Err(err.clone()));
        err
    }

    fn transition(&self, to: TaskState) -> TaskState {
        let mut state = self.state.lock();
        let from = *state;
        *state = to;
        debug!(task = %self.id, %from, %to, "task transition");
        from
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let running = self.is_running();
        match self.inner.try_lock() {
            Some(inner) => match &inner.reason {
                Some(reason) => write!(f, "{}(running={running}, pr={reason})", self.id),
                None => write!(f, "{}(running={running}, pr=none)", self.id),
            },
            None => write!(f, "{}(running={running}, pr=?)", self.id),
        }
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("state", &self.state())
            .field("cancel_requested", &self.is_cancel_requested())
            .finish_non_exhaustive()
    }
}
