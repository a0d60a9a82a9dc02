//! The in-task capability context.
//!
//! `Cx` is handed to a task's entry routine by [`Task::run`](super::Task::run)
//! and exists only for the duration of that re-entry. Every suspend
//! primitive lives on it, so suspending from outside a task's own
//! execution cannot be expressed.
//!
//! # Writing a suspend-capable routine
//!
//! A routine that may suspend takes `&mut Cx<'_>` and returns
//! [`Pausable<T>`]. It wraps each nested suspend-capable call in
//! [`Cx::call`], and on [`Called::Paused`] hands its locals to
//! [`Cx::suspend`] together with the marker of the call that suspended. On
//! re-entry it reads [`Cx::marker`] to jump back to that call:
//!
//! ```ignore
//! fn greet(cx: &mut Cx<'_>, out: &Log) -> Pausable<()> {
//!     let count: u32 = match cx.marker() {
//!         0 => {
//!             out.push("before yield");
//!             7
//!         }
//!         1 => cx.restore()?,
//!         m => return Err(cx.unknown_marker(m)),
//!     };
//!     if let Called::Paused(s) = cx.yield_now()? {
//!         return Err(cx.suspend(s, 1, count));
//!     }
//!     out.push(format!("after yield {count}"));
//!     Ok(())
//! }
//! ```
//!
//! Locals restored from a marker must not change before the call that
//! suspended is re-issued; a second suspension through the same call keeps
//! the earlier capture.

use core::any::Any;
use core::fmt;

use parking_lot::Mutex;

use super::Routine;
use crate::classify::{CallTrace, Classifier};
use crate::error::{Error, ErrorContext};
use crate::fiber::{Fiber, Up, FRESH};
use crate::pause::PauseReason;
use crate::tracing_compat::debug;
use crate::types::{CancelReason, ExitValue, Outcome, TaskId};

/// Result of a suspend-capable routine.
pub type Pausable<T> = Result<T, Unwind>;

/// Control transfer out of a suspend-capable routine that is not a normal return.
#[derive(Debug, Clone)]
pub enum Unwind {
    /// The fiber is unwinding towards the scheduler; the task will be resumed.
    Pause,
    /// `exit` or `error_exit` was called; the task finishes with the recorded outcome.
    Exit,
    /// Cancellation was observed at a resume boundary.
    Cancelled(CancelReason),
    /// The routine failed.
    Failed(Error),
}

impl Unwind {
    /// Returns the error carried by a failure.
    #[must_use]
    pub const fn error(&self) -> Option<&Error> {
        match self {
            Self::Failed(err) => Some(err),
            _ => None,
        }
    }
}

impl From<Error> for Unwind {
    fn from(err: Error) -> Self {
        Self::Failed(err)
    }
}

impl fmt::Display for Unwind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pause => f.write_str("pause"),
            Self::Exit => f.write_str("exit"),
            Self::Cancelled(reason) => write!(f, "cancelled: {reason}"),
            Self::Failed(err) => write!(f, "failed: {err}"),
        }
    }
}

/// The outcome of a nested suspend-capable call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Called<T> {
    /// The callee returned normally.
    Returned(T),
    /// The callee suspended; the caller must pass this to [`Cx::suspend`].
    Paused(Suspension),
}

impl<T> Called<T> {
    /// Returns true if the callee suspended.
    #[must_use]
    pub const fn is_paused(&self) -> bool {
        matches!(self, Self::Paused(_))
    }
}

/// A suspension propagating through the caller's frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Suspension {
    up: Up,
}

impl Suspension {
    /// Returns true if the caller's frame already holds a valid capture.
    #[must_use]
    pub const fn has_state(&self) -> bool {
        self.up.has_state()
    }

    /// The raw frame-store outcome.
    #[must_use]
    pub const fn up(&self) -> Up {
        self.up
    }
}

/// Capability context for one re-entry of a task.
pub struct Cx<'a> {
    task: TaskId,
    fiber: &'a mut Fiber,
    reason: &'a mut Option<PauseReason>,
    cancel: &'a Mutex<Option<CancelReason>>,
    classifier: &'a Classifier,
}

impl<'a> Cx<'a> {
    pub(super) fn new(
        task: TaskId,
        fiber: &'a mut Fiber,
        reason: &'a mut Option<PauseReason>,
        cancel: &'a Mutex<Option<CancelReason>>,
        classifier: &'a Classifier,
    ) -> Self {
        Self {
            task,
            fiber,
            reason,
            cancel,
            classifier,
        }
    }

    /// Returns the id of the running task.
    #[must_use]
    pub const fn task_id(&self) -> TaskId {
        self.task
    }

    /// Returns the resume marker of the current frame; 0 on first entry.
    #[must_use]
    pub fn marker(&self) -> u32 {
        self.fiber.marker()
    }

    /// Returns the wait condition currently attached to the task.
    #[must_use]
    pub fn pause_reason(&self) -> Option<&PauseReason> {
        self.reason.as_ref()
    }

    /// Read access to the task's frame store.
    #[must_use]
    pub fn fiber(&self) -> &Fiber {
        self.fiber
    }

    /// Direct access to the task's frame store.
    ///
    /// Routines that drive `down`/`up` themselves must keep them matched.
    pub fn fiber_mut(&mut self) -> &mut Fiber {
        self.fiber
    }

    /// Returns a copy of the locals captured at the current frame.
    pub fn restore<S: Any + Clone>(&self) -> Pausable<S> {
        Ok(self.fiber.state::<S>()?.clone())
    }

    /// Runs a nested suspend-capable routine inside its own frame.
    ///
    /// A callee returning `Err(Unwind::Pause)` while the fiber is not
    /// pausing, or returning normally while it is, breaks the protocol and
    /// fails the task.
    pub fn call<T>(&mut self, f: impl FnOnce(&mut Self) -> Pausable<T>) -> Pausable<Called<T>> {
        self.fiber.down();
        let result = f(self);
        let up = self.fiber.up();
        match (result, up.is_pausing()) {
            (Ok(value), false) => Ok(Called::Returned(value)),
            (Err(Unwind::Pause), true) => Ok(Called::Paused(Suspension { up })),
            (Err(Unwind::Pause), false) => Err(self.violation(
                "callee unwound with Pause but the fiber is not pausing",
            )),
            (Ok(_), true) => Err(self.violation(
                "callee returned normally while the fiber is pausing",
            )),
            (Err(other), _) => Err(other),
        }
    }

    /// Resumes or starts a boxed routine, keeping it in this frame while suspended.
    ///
    /// On re-entry the saved routine continues and `routine` is dropped
    /// unused.
    pub fn invoke<R: Routine + 'static>(&mut self, routine: R) -> Pausable<Called<()>> {
        self.call(move |cx| {
            let mut target: Box<dyn Routine> = if cx.fiber.is_rewinding() {
                cx.fiber.take_state::<Box<dyn Routine>>()?
            } else {
                Box::new(routine)
            };
            match cx.call(|cx| target.execute(cx))? {
                Called::Returned(()) => Ok(()),
                Called::Paused(s) => Err(cx.suspend(s, 1, target)),
            }
        })
    }

    /// Captures `locals` under `marker` if the frame needs them and unwinds.
    ///
    /// Use as `return Err(cx.suspend(s, marker, locals))`.
    ///
    /// # Panics
    ///
    /// Panics if `marker` is 0 or `u32::MAX`.
    pub fn suspend<S: Any + Send>(&mut self, suspension: Suspension, marker: u32, locals: S) -> Unwind {
        if !suspension.has_state() {
            self.fiber.set_state(marker, locals);
        }
        Unwind::Pause
    }

    /// Cedes the processor once; resumes transparently on the next run.
    pub fn yield_now(&mut self) -> Pausable<Called<()>> {
        self.pause(PauseReason::Yield)
    }

    /// Suspends until `reason` reports ready.
    ///
    /// Calling this again while a suspension is already propagating does
    /// not attach a second condition or add a frame.
    pub fn pause(&mut self, reason: PauseReason) -> Pausable<Called<()>> {
        if self.fiber.is_pausing() {
            let up = if self.fiber.has_state() {
                Up::PausingHasState
            } else {
                Up::PausingNoState
            };
            return Ok(Called::Paused(Suspension { up }));
        }

        self.fiber.down();
        let rewinding = self.fiber.marker() != FRESH;
        if rewinding {
            *self.reason = None;
        } else {
            debug!(task = %self.task, kind = %reason.kind(), depth = self.fiber.depth(), "suspending");
            *self.reason = Some(reason);
        }
        let toggled = self.fiber.toggle_pause();
        let checked = if rewinding && toggled.is_ok() {
            self.checkpoint()
        } else {
            Ok(())
        };
        let up = self.fiber.up();
        toggled?;
        checked?;
        if up.is_pausing() {
            Ok(Called::Paused(Suspension { up }))
        } else {
            Ok(Called::Returned(()))
        }
    }

    /// Finishes the task with `value`, bypassing every pending return.
    ///
    /// Use as `return Err(cx.exit(value))`.
    pub fn exit<T: Any + Send + Sync>(&mut self, value: T) -> Unwind {
        *self.reason = Some(PauseReason::Done(Outcome::Ok(ExitValue::new(value))));
        Unwind::Exit
    }

    /// Finishes the task with a failure, bypassing every pending return.
    pub fn error_exit(&mut self, err: Error) -> Unwind {
        *self.reason = Some(PauseReason::Done(Outcome::Err(err)));
        Unwind::Exit
    }

    /// Observes a pending cancellation.
    pub fn checkpoint(&self) -> Pausable<()> {
        match self.cancel.lock().as_ref() {
            Some(reason) => {
                debug!(task = %self.task, %reason, "cancellation observed");
                Err(Unwind::Cancelled(reason.clone()))
            }
            None => Ok(()),
        }
    }

    /// Returns true if cancellation has been requested.
    #[must_use]
    pub fn is_cancel_requested(&self) -> bool {
        self.cancel.lock().is_some()
    }

    /// Counts suspend-capable frames between `trace[0]` and this task's re-entry boundary.
    pub fn stack_depth(&self, trace: &CallTrace) -> Pausable<usize> {
        Ok(self.classifier.stack_depth(trace)?)
    }

    /// Re-synchronises the fiber with the frame that owns `trace[0]`.
    ///
    /// For use after a failure abandoned nested frames without `up()`.
    /// Returns that frame's resume marker.
    pub fn recover_depth(&mut self, trace: &CallTrace) -> Pausable<u32> {
        let depth = self.stack_depth(trace)?;
        self.recover_at(depth)
    }

    /// Counts suspend-capable frames between the caller and the boundary on
    /// the physical stack.
    ///
    /// Needs symbolized backtraces; without them the walk fails with
    /// `MissingBoundary`.
    #[inline(never)]
    pub fn current_stack_depth(&self) -> Pausable<usize> {
        let trace = CallTrace::capture();
        Ok(self.classifier.stack_depth(&trace)?)
    }

    /// [`Cx::recover_depth`] over the physical stack of the caller.
    #[inline(never)]
    pub fn recover_current_depth(&mut self) -> Pausable<u32> {
        let trace = CallTrace::capture();
        let depth = self.classifier.stack_depth(&trace)?;
        self.recover_at(depth)
    }

    fn recover_at(&mut self, depth: usize) -> Pausable<u32> {
        let Some(index) = depth.checked_sub(1) else {
            return Err(self.violation("recover_depth: no suspend-capable frame below the boundary"));
        };
        Ok(self.fiber.up_ex(index)?)
    }

    /// The unwind for a resume marker the routine does not recognise.
    pub fn unknown_marker(&self, marker: u32) -> Unwind {
        self.violation(&format!("unknown resume marker {marker}"))
    }

    fn violation(&self, detail: &str) -> Unwind {
        Unwind::Failed(Error::protocol(detail).with_context(ErrorContext {
            task_id: Some(self.task),
            depth: Some(self.fiber.depth()),
        }))
    }
}

impl fmt::Debug for Cx<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cx")
            .field("task", &self.task)
            .field("depth", &self.fiber.depth())
            .field("marker", &self.fiber.marker())
            .field("pausing", &self.fiber.is_pausing())
            .finish_non_exhaustive()
    }
}
