//! Shared run queue.
//!
//! A thread-safe unbounded FIFO of tasks waiting to be dispatched by any
//! worker.

use std::sync::Arc;

use crossbeam_queue::SegQueue;

use crate::task::Task;

/// A global run queue.
#[derive(Debug, Default)]
pub struct RunQueue {
    inner: SegQueue<Arc<Task>>,
}

impl RunQueue {
    /// Creates a new run queue.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: SegQueue::new(),
        }
    }

    /// Pushes a task to the back of the queue.
    pub fn push(&self, task: Arc<Task>) {
        self.inner.push(task);
    }

    /// Pops the task at the front of the queue.
    pub fn pop(&self) -> Option<Arc<Task>> {
        self.inner.pop()
    }

    /// Returns the number of queued tasks.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Returns true if the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}
