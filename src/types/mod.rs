//! Core types for the weft runtime.
//!
//! - [`id`]: Task identifiers (process-unique, never reused)
//! - [`outcome`]: Four-valued task outcome and the task exit value
//! - [`cancel`]: Cancellation reason and kind types

pub mod cancel;
pub mod id;
pub mod outcome;

pub use cancel::{CancelKind, CancelReason};
pub use id::TaskId;
pub use outcome::{ExitValue, Outcome, OutcomeError, PanicPayload, TaskOutcome};
