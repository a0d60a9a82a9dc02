//! Identifier types for runtime entities.
//!
//! Task identifiers come from a single process-wide counter that starts at 1
//! when the process starts and is only ever incremented. Identifiers are
//! therefore unique for the lifetime of the process and never reused.

use core::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static TASK_ID_SOURCE: AtomicU64 = AtomicU64::new(1);

/// A unique identifier for a task.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId(u64);

impl TaskId {
    /// Allocates the next task identifier from the process-wide counter.
    #[must_use]
    pub fn next() -> Self {
        Self(TASK_ID_SOURCE.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the raw integer value of this identifier.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Creates a task ID for testing purposes.
    ///
    /// IDs built this way bypass the process counter and may collide with
    /// IDs handed to real tasks.
    #[doc(hidden)]
    #[must_use]
    pub const fn new_for_test(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Debug for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TaskId({})", self.0)
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "T{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::{Arc, Barrier};
    use std::thread;

    #[test]
    fn ids_are_monotonic() {
        let a = TaskId::next();
        let b = TaskId::next();
        assert!(b > a);
        assert_ne!(a, b);
    }

    #[test]
    fn ids_are_unique_across_threads() {
        let barrier = Arc::new(Barrier::new(4));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    (0..256).map(|_| TaskId::next()).collect::<Vec<_>>()
                })
            })
            .collect();

        let mut seen = HashSet::new();
        for handle in handles {
            for id in handle.join().expect("thread panicked") {
                assert!(seen.insert(id), "duplicate id {id}");
            }
        }
        assert_eq!(seen.len(), 1024);
    }

    #[test]
    fn display_format() {
        assert_eq!(TaskId::new_for_test(7).to_string(), "T7");
        assert_eq!(format!("{:?}", TaskId::new_for_test(7)), "TaskId(7)");
    }
}
