//! Wait conditions: why a task is suspended and when it may resume.
//!
//! Every suspended or finished task carries exactly one [`PauseReason`].
//! The built-in variants are [`PauseReason::Yield`], which is always ready,
//! and [`PauseReason::Done`], which is terminal and never ready. Anything
//! else (timers, locks, message availability) implements [`Readiness`] and
//! is attached with [`PauseReason::Wait`].
//!
//! Readiness is evaluated by whoever drives the task, never by the task.

mod deadline;
mod latch;

pub use deadline::Deadline;
pub use latch::Latch;

use core::fmt;
use std::sync::Arc;

use crate::types::{TaskId, TaskOutcome};

/// A user-defined wait condition.
pub trait Readiness: fmt::Debug + Send + Sync {
    /// Returns true if `task` may be re-entered now.
    fn is_ready(&self, task: TaskId) -> bool;

    /// Short human-readable description used in logs.
    fn describe(&self) -> &str {
        "wait"
    }
}

/// Coarse kind of a [`PauseReason`], for logging and metrics fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PauseKind {
    /// Unconditional yield.
    Yield,
    /// Terminal.
    Done,
    /// User-defined condition.
    Wait,
}

impl PauseKind {
    /// Returns the lowercase name of the kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Yield => "yield",
            Self::Done => "done",
            Self::Wait => "wait",
        }
    }
}

impl fmt::Display for PauseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The wait condition attached to a task.
#[derive(Clone)]
pub enum PauseReason {
    /// Cede the processor; eligible to resume immediately.
    Yield,
    /// The task finished with this outcome. Never ready.
    Done(TaskOutcome),
    /// A user-defined condition.
    Wait(Arc<dyn Readiness>),
}

impl PauseReason {
    /// Wraps a user-defined condition.
    #[must_use]
    pub fn wait(condition: impl Readiness + 'static) -> Self {
        Self::Wait(Arc::new(condition))
    }

    /// Returns true if `task` may be re-entered now.
    #[must_use]
    pub fn is_ready(&self, task: TaskId) -> bool {
        match self {
            Self::Yield => true,
            Self::Done(_) => false,
            Self::Wait(condition) => condition.is_ready(task),
        }
    }

    /// Returns true for the terminal variant.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Done(_))
    }

    /// Returns the kind of this reason.
    #[must_use]
    pub const fn kind(&self) -> PauseKind {
        match self {
            Self::Yield => PauseKind::Yield,
            Self::Done(_) => PauseKind::Done,
            Self::Wait(_) => PauseKind::Wait,
        }
    }

    /// Returns the outcome carried by the terminal variant.
    #[must_use]
    pub const fn outcome(&self) -> Option<&TaskOutcome> {
        match self {
            Self::Done(outcome) => Some(outcome),
            _ => None,
        }
    }
}

impl fmt::Debug for PauseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Yield => write!(f, "Yield"),
            Self::Done(outcome) => f.debug_tuple("Done").field(outcome).finish(),
            Self::Wait(condition) => f.debug_tuple("Wait").field(condition).finish(),
        }
    }
}

impl fmt::Display for PauseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Yield => f.write_str("yield"),
            Self::Done(outcome) => match outcome {
                crate::types::Outcome::Ok(value) => write!(f, "done({value:?})"),
                crate::types::Outcome::Err(err) => write!(f, "done(err: {err})"),
                crate::types::Outcome::Cancelled(reason) => write!(f, "done(cancelled: {reason})"),
                crate::types::Outcome::Panicked(payload) => write!(f, "done({payload})"),
            },
            Self::Wait(condition) => write!(f, "wait({})", condition.describe()),
        }
    }
}
