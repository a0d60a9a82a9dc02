//! A one-shot wait condition released from outside the task.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::Readiness;
use crate::types::TaskId;

/// Ready once [`Latch::release`] has been called on any clone.
///
/// Clones share the same flag, so a task can wait on one clone while another
/// thread keeps a handle to release it.
#[derive(Debug, Clone, Default)]
pub struct Latch {
    released: Arc<AtomicBool>,
}

impl Latch {
    /// Creates a closed latch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens the latch. Idempotent.
    pub fn release(&self) {
        self.released.store(true, Ordering::Release);
    }

    /// Returns true once released.
    #[must_use]
    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }
}

impl Readiness for Latch {
    fn is_ready(&self, _task: TaskId) -> bool {
        self.is_released()
    }

    fn describe(&self) -> &str {
        "latch"
    }
}
