//! Outcome types for task completion.
//!
//! A finished task carries exactly one [`TaskOutcome`]:
//!
//! - `Ok(ExitValue)`: The task returned normally or called `exit(value)`
//! - `Err(Error)`: The task failed or called `error_exit(error)`
//! - `Cancelled(CancelReason)`: Cancellation was observed at a resume boundary
//! - `Panicked(PanicPayload)`: The entry routine panicked
//!
//! These form a severity lattice: `Ok < Err < Cancelled < Panicked`

use super::cancel::CancelReason;
use core::any::Any;
use core::fmt;
use std::sync::Arc;

/// The outcome stored on a finished task.
pub type TaskOutcome = Outcome<ExitValue, crate::error::Error>;

/// Payload from a caught panic.
///
/// This wraps the panic value for safe transport across task boundaries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PanicPayload {
    message: String,
}

impl PanicPayload {
    /// Creates a new panic payload with the given message.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Builds a payload from the value returned by `catch_unwind`.
    #[must_use]
    pub fn from_panic(payload: &(dyn Any + Send)) -> Self {
        let message = payload
            .downcast_ref::<&'static str>()
            .map(|s| (*s).to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_string());
        Self { message }
    }

    /// Returns the panic message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for PanicPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "panic: {}", self.message)
    }
}

/// The value a task exits with.
///
/// A task that simply returns from its entry routine exits with
/// [`ExitValue::ok()`]; `exit(value)` can carry any `Send + Sync` value.
#[derive(Clone)]
pub struct ExitValue {
    value: Arc<dyn Any + Send + Sync>,
    type_name: &'static str,
}

impl ExitValue {
    const OK: &'static str = "OK";

    /// The default exit value of a task that completed normally.
    #[must_use]
    pub fn ok() -> Self {
        Self::new(Self::OK)
    }

    /// Wraps an arbitrary exit value.
    #[must_use]
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self {
            value: Arc::new(value),
            type_name: core::any::type_name::<T>(),
        }
    }

    /// Returns true if this is the default "OK" value.
    #[must_use]
    pub fn is_default(&self) -> bool {
        self.downcast_ref::<&'static str>() == Some(&Self::OK)
    }

    /// Returns a reference to the inner value if it is of type `T`.
    #[must_use]
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.value.downcast_ref::<T>()
    }
}

impl Default for ExitValue {
    fn default() -> Self {
        Self::ok()
    }
}

impl fmt::Debug for ExitValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_default() {
            write!(f, "ExitValue(OK)")
        } else {
            write!(f, "ExitValue(<{}>)", self.type_name)
        }
    }
}

/// The four-valued outcome of a task.
///
/// Forms a severity lattice where worse outcomes dominate:
/// `Ok < Err < Cancelled < Panicked`
#[derive(Debug, Clone)]
pub enum Outcome<T, E> {
    /// Success with a value.
    Ok(T),
    /// Application-level error.
    Err(E),
    /// The task was cancelled.
    Cancelled(CancelReason),
    /// The task panicked.
    Panicked(PanicPayload),
}

impl<T, E> Outcome<T, E> {
    /// Returns the severity level of this outcome (0 = Ok, 3 = Panicked).
    #[must_use]
    pub const fn severity(&self) -> u8 {
        match self {
            Self::Ok(_) => 0,
            Self::Err(_) => 1,
            Self::Cancelled(_) => 2,
            Self::Panicked(_) => 3,
        }
    }

    /// Returns true if this outcome is `Ok`.
    #[must_use]
    pub const fn is_ok(&self) -> bool {
        matches!(self, Self::Ok(_))
    }

    /// Returns true if this outcome is `Err`.
    #[must_use]
    pub const fn is_err(&self) -> bool {
        matches!(self, Self::Err(_))
    }

    /// Returns true if this outcome is `Cancelled`.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled(_))
    }

    /// Returns true if this outcome is `Panicked`.
    #[must_use]
    pub const fn is_panicked(&self) -> bool {
        matches!(self, Self::Panicked(_))
    }

    /// Returns true for every outcome that is not `Ok`.
    #[must_use]
    pub const fn is_failure(&self) -> bool {
        !self.is_ok()
    }

    /// Converts this outcome to a standard Result, with cancellation and panic as errors.
    ///
    /// This is how a caller re-raises a captured task failure.
    pub fn into_result(self) -> Result<T, OutcomeError<E>> {
        match self {
            Self::Ok(v) => Ok(v),
            Self::Err(e) => Err(OutcomeError::Err(e)),
            Self::Cancelled(r) => Err(OutcomeError::Cancelled(r)),
            Self::Panicked(p) => Err(OutcomeError::Panicked(p)),
        }
    }

    /// Returns the error value, if this outcome is `Err`.
    #[must_use]
    pub fn err(&self) -> Option<&E> {
        match self {
            Self::Err(e) => Some(e),
            _ => None,
        }
    }

    /// Returns the success value, if this outcome is `Ok`.
    #[must_use]
    pub fn ok(&self) -> Option<&T> {
        match self {
            Self::Ok(v) => Some(v),
            _ => None,
        }
    }
}

impl<T, E> From<Result<T, E>> for Outcome<T, E> {
    fn from(result: Result<T, E>) -> Self {
        match result {
            Ok(v) => Self::Ok(v),
            Err(e) => Self::Err(e),
        }
    }
}

/// Error type for converting Outcome to Result.
#[derive(Debug, Clone)]
pub enum OutcomeError<E> {
    /// Application error.
    Err(E),
    /// Cancellation.
    Cancelled(CancelReason),
    /// Panic.
    Panicked(PanicPayload),
}

impl<E: fmt::Display> fmt::Display for OutcomeError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Err(e) => write!(f, "{e}"),
            Self::Cancelled(r) => write!(f, "cancelled: {r}"),
            Self::Panicked(p) => write!(f, "{p}"),
        }
    }
}

impl<E: fmt::Debug + fmt::Display> std::error::Error for OutcomeError<E> {}
