//! Weft: cooperative suspend/resume for explicitly woven routines.
//!
//! # Overview
//!
//! A [`Task`] runs an entry [`Routine`] on a logical stack kept in its
//! [`Fiber`]. A routine suspends by saving its resume marker and locals into
//! the fiber and unwinding to the task boundary. The next [`Task::run`]
//! replays the same call chain; each frame sees a non-zero marker, restores
//! its locals, and jumps back to the call that suspended. Every wait is
//! described by a [`PauseReason`] that tells the driver when the task is
//! worth re-entering.
//!
//! Which routines may suspend at all is decided by the [`Classifier`], a
//! memoized per-call-site answer resolved against a [`RoutineCatalog`].
//!
//! # Module Structure
//!
//! - [`fiber`]: Per-task frame store for markers and saved locals
//! - [`task`]: Task lifecycle, the routine context, and suspension points
//! - [`pause`]: Wait conditions attached to suspended tasks
//! - [`classify`]: Call-site pausability classification and stack depth
//! - [`runtime`]: Reference scheduler and its configuration
//! - [`types`]: Identifiers, cancellation reasons, outcomes
//! - [`error`]: Error types
//!
//! # Example
//!
//! ```ignore
//! use weft::{Called, Cx, Pausable, Task};
//!
//! let task = Task::from_fn(|cx: &mut Cx<'_>| -> Pausable<()> {
//!     let mut left: u32 = match cx.marker() {
//!         0 => 3,
//!         1 => cx.restore()?,
//!         m => return Err(cx.unknown_marker(m)),
//!     };
//!     while left > 0 {
//!         if let Called::Paused(s) = cx.yield_now()? {
//!             return Err(cx.suspend(s, 1, left));
//!         }
//!         left -= 1;
//!     }
//!     Ok(())
//! });
//! while !task.is_done() {
//!     task.run()?;
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::cast_possible_truncation)]

pub mod classify;
pub mod error;
pub mod fiber;
pub mod pause;
pub mod runtime;
pub mod task;
pub mod tracing_compat;
pub mod types;

#[cfg(test)]
pub mod test_utils;

// Re-exports for convenient access to core types
pub use classify::{
    Ambiguity, CallSite, CallTrace, Catalog, Classification, Classifier, ClassifierConfig,
    RoutineCatalog, RoutineSignature,
};
pub use error::{
    Error, ErrorCategory, ErrorContext, ErrorKind, Recoverability, RecoveryAction, Result,
    ResultExt,
};
pub use fiber::{Fiber, Up};
pub use pause::{Deadline, Latch, PauseKind, PauseReason, Readiness};
pub use runtime::{ConfigError, RuntimeConfig, Scheduler, SchedulerReport};
pub use task::{Called, Cx, Pausable, Routine, RunStatus, Suspension, Task, TaskState, Unwind};
pub use types::{CancelKind, CancelReason, ExitValue, Outcome, PanicPayload, TaskId, TaskOutcome};
