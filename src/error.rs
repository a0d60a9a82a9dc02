//! Error types and error handling strategy for weft.
//!
//! Error handling follows these principles:
//!
//! - Errors are explicit and typed (no stringly-typed errors)
//! - Protocol violations are fatal and surface immediately
//! - Task-level failures are captured into the task's exit result, not rethrown
//! - Classification problems are diagnosed and resolved, never thrown to callers
//!
//! # Error Categories
//!
//! - **Protocol**: Frame Store depth/marker mismatch, missing re-entry boundary
//! - **Task**: Lifecycle misuse such as re-entering a done task
//! - **Cancellation**: Cooperative cancellation observed at a resume boundary
//! - **Classification**: Call-site resolution failures (internal to the classifier)
//! - **Config**: Unparseable configuration values
//! - **Internal**: Runtime bugs and invalid states
//! - **User**: Failures raised by task code

use core::fmt;
use std::sync::Arc;

use crate::types::{CancelReason, TaskId};

/// The kind of error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    // === Protocol ===
    /// The frame stack was re-entered along a path that does not match what was recorded.
    ProtocolViolation,
    /// Captured state at a frame is not of the type the re-entered routine expects.
    StateMismatch,
    /// Stack-depth computation never reached the task's re-entry boundary.
    MissingBoundary,

    // === Task lifecycle ===
    /// `run()` was called on a task that is already done.
    TaskDone,

    // === Cancellation ===
    /// The task was cancelled at a resume boundary.
    Cancelled,

    // === Classification ===
    /// A module or routine could not be resolved for classification.
    ResolutionFailed,

    // === Configuration ===
    /// A configuration value could not be parsed or is out of range.
    InvalidConfig,

    // === Internal ===
    /// Internal runtime error (bug).
    Internal,

    // === User ===
    /// User-provided error.
    User,
}

impl ErrorKind {
    /// Returns the error category for this kind.
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::ProtocolViolation | Self::StateMismatch | Self::MissingBoundary => {
                ErrorCategory::Protocol
            }
            Self::TaskDone => ErrorCategory::Task,
            Self::Cancelled => ErrorCategory::Cancellation,
            Self::ResolutionFailed => ErrorCategory::Classification,
            Self::InvalidConfig => ErrorCategory::Config,
            Self::Internal => ErrorCategory::Internal,
            Self::User => ErrorCategory::User,
        }
    }

    /// Returns the recoverability classification for this error kind.
    #[must_use]
    pub const fn recoverability(&self) -> Recoverability {
        match self {
            Self::ProtocolViolation
            | Self::StateMismatch
            | Self::MissingBoundary
            | Self::TaskDone
            | Self::Cancelled
            | Self::InvalidConfig
            | Self::Internal => Recoverability::Permanent,
            Self::ResolutionFailed | Self::User => Recoverability::Unknown,
        }
    }

    /// Returns the recommended recovery action for this error kind.
    #[must_use]
    pub const fn recovery_action(&self) -> RecoveryAction {
        match self {
            // A broken frame stack cannot be resumed; whoever drives the task must stop.
            Self::ProtocolViolation
            | Self::StateMismatch
            | Self::MissingBoundary
            | Self::Internal => RecoveryAction::Escalate,

            Self::TaskDone | Self::Cancelled | Self::InvalidConfig => RecoveryAction::Propagate,

            // The classifier answers with its fallback instead of failing.
            Self::ResolutionFailed => RecoveryAction::Fallback,

            Self::User => RecoveryAction::Custom,
        }
    }
}

/// Classification of error recoverability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Recoverability {
    /// Temporary failure that may succeed on retry.
    Transient,
    /// Permanent failure that will not succeed on retry.
    Permanent,
    /// Recoverability depends on context and cannot be determined
    /// from the error kind alone.
    Unknown,
}

impl Recoverability {
    /// Returns true if this error is safe to retry.
    #[must_use]
    pub const fn should_retry(&self) -> bool {
        matches!(self, Self::Transient)
    }

    /// Returns true if this error should never be retried.
    #[must_use]
    pub const fn is_permanent(&self) -> bool {
        matches!(self, Self::Permanent)
    }
}

/// Recommended recovery action for an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecoveryAction {
    /// Propagate the error to the caller without retry.
    Propagate,
    /// Stop driving the affected task; its frame stack is unusable.
    Escalate,
    /// Answer with a conservative fallback and log the problem.
    Fallback,
    /// Recovery action depends on application-specific context.
    Custom,
}

/// High-level error category for grouping related errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Suspend/resume protocol violations.
    Protocol,
    /// Task lifecycle misuse.
    Task,
    /// Cancellation-related failures.
    Cancellation,
    /// Call-site classification failures.
    Classification,
    /// Configuration failures.
    Config,
    /// Internal runtime errors.
    Internal,
    /// User-originated errors.
    User,
}

/// Diagnostic context for an error.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorContext {
    /// The task where the error originated.
    pub task_id: Option<TaskId>,
    /// Frame depth at which the error was detected, when known.
    pub depth: Option<usize>,
}

/// The main error type for weft operations.
#[derive(Debug, Clone)]
pub struct Error {
    kind: ErrorKind,
    message: Option<String>,
    source: Option<Arc<dyn std::error::Error + Send + Sync>>,
    context: ErrorContext,
}

impl Error {
    /// Creates a new error with the given kind.
    #[must_use]
    pub const fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            message: None,
            source: None,
            context: ErrorContext {
                task_id: None,
                depth: None,
            },
        }
    }

    /// Returns the error kind.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns true if this error represents cancellation.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self.kind, ErrorKind::Cancelled)
    }

    /// Returns true if this error is a fatal suspend/resume protocol violation.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self.kind.category(), ErrorCategory::Protocol)
    }

    /// Adds a message description to the error.
    #[must_use]
    pub fn with_message(mut self, msg: impl Into<String>) -> Self {
        self.message = Some(msg.into());
        self
    }

    /// Adds structured context to the error.
    #[must_use]
    pub fn with_context(mut self, ctx: ErrorContext) -> Self {
        self.context = ctx;
        self
    }

    /// Records the task the error belongs to.
    #[must_use]
    pub fn with_task(mut self, task: TaskId) -> Self {
        self.context.task_id = Some(task);
        self
    }

    /// Adds a source error to the chain.
    #[must_use]
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Arc::new(source));
        self
    }

    /// Creates a cancellation error from a structured reason.
    #[must_use]
    pub fn cancelled(reason: &CancelReason) -> Self {
        Self::new(ErrorKind::Cancelled).with_message(format!("{reason}"))
    }

    /// Creates a protocol violation error.
    #[must_use]
    pub fn protocol(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::ProtocolViolation).with_message(detail)
    }

    /// Creates a user error.
    #[must_use]
    pub fn user(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::User).with_message(detail)
    }

    /// Creates an internal error (runtime bug).
    #[must_use]
    pub fn internal(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal).with_message(detail)
    }

    /// Returns the error category.
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        self.kind.category()
    }

    /// Returns the recoverability classification.
    #[must_use]
    pub const fn recoverability(&self) -> Recoverability {
        self.kind.recoverability()
    }

    /// Returns the recommended recovery action for this error.
    #[must_use]
    pub const fn recovery_action(&self) -> RecoveryAction {
        self.kind.recovery_action()
    }

    /// Returns the error message, if any.
    #[must_use]
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// Returns the error context.
    #[must_use]
    pub fn context(&self) -> &ErrorContext {
        &self.context
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.kind)?;
        if let Some(msg) = &self.message {
            write!(f, ": {msg}")?;
        }
        Ok(())
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|e| e.as_ref() as _)
    }
}

impl From<crate::runtime::ConfigError> for Error {
    fn from(e: crate::runtime::ConfigError) -> Self {
        Self::new(ErrorKind::InvalidConfig)
            .with_message(e.to_string())
            .with_source(e)
    }
}

/// Extension trait for adding context to Results.
#[allow(clippy::result_large_err)]
pub trait ResultExt<T> {
    /// Attach a context message on error.
    fn context(self, msg: impl Into<String>) -> Result<T>;
    /// Attach context message computed lazily on error.
    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T>;
}

impl<T, E: Into<Error>> ResultExt<T> for core::result::Result<T, E> {
    fn context(self, msg: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.into().with_message(msg))
    }

    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T> {
        self.map_err(|e| e.into().with_message(f()))
    }
}

/// A specialized Result type for weft operations.
#[allow(clippy::result_large_err)]
pub type Result<T> = core::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[derive(Debug)]
    struct Underlying;

    impl fmt::Display for Underlying {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "underlying")
        }
    }

    impl std::error::Error for Underlying {}

    #[test]
    fn display_without_message() {
        let err = Error::new(ErrorKind::Internal);
        assert_eq!(err.to_string(), "Internal");
    }

    #[test]
    fn display_with_message() {
        let err = Error::protocol("unknown resume marker 7");
        assert_eq!(err.to_string(), "ProtocolViolation: unknown resume marker 7");
    }

    #[test]
    fn source_chain_is_exposed() {
        let err = Error::user("outer").with_source(Underlying);
        let source = err.source().expect("source missing");
        assert_eq!(source.to_string(), "underlying");
    }

    #[test]
    fn protocol_kinds_are_fatal() {
        assert!(Error::new(ErrorKind::ProtocolViolation).is_fatal());
        assert!(Error::new(ErrorKind::StateMismatch).is_fatal());
        assert!(Error::new(ErrorKind::MissingBoundary).is_fatal());
        assert!(!Error::new(ErrorKind::TaskDone).is_fatal());
        assert!(!Error::user("boom").is_fatal());
    }

    #[test]
    fn resolution_failure_falls_back() {
        let kind = ErrorKind::ResolutionFailed;
        assert_eq!(kind.category(), ErrorCategory::Classification);
        assert_eq!(kind.recovery_action(), RecoveryAction::Fallback);
        assert!(!kind.recoverability().is_permanent());
    }

    #[test]
    fn result_ext_adds_message() {
        let res: core::result::Result<(), Error> = Err(Error::new(ErrorKind::Internal));
        let err = res.context("while winding").expect_err("expected err");
        assert_eq!(err.kind(), ErrorKind::Internal);
        assert_eq!(err.to_string(), "Internal: while winding");
    }

    #[test]
    fn error_context_carries_task() {
        let task = TaskId::next();
        let err = Error::new(ErrorKind::TaskDone).with_task(task);
        assert_eq!(err.context().task_id, Some(task));
        assert!(err.context().depth.is_none());
    }

    #[test]
    fn cancelled_carries_reason() {
        let err = Error::cancelled(&CancelReason::user("stop"));
        assert!(err.is_cancelled());
        assert_eq!(err.category(), ErrorCategory::Cancellation);
    }
}
