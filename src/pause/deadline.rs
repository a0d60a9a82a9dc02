//! A wait condition that becomes ready once a monotonic instant has passed.

use std::time::{Duration, Instant};

use super::Readiness;
use crate::types::TaskId;

/// Fallback horizons for delays that overflow `Instant`, longest first.
const FAR_FUTURE: [Duration; 3] = [
    Duration::from_secs(100 * 365 * 24 * 60 * 60),
    Duration::from_secs(365 * 24 * 60 * 60),
    Duration::from_secs(24 * 60 * 60),
];

/// Ready at or after `at`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline {
    at: Instant,
}

impl Deadline {
    /// Ready at `at`.
    #[must_use]
    pub const fn at(at: Instant) -> Self {
        Self { at }
    }

    /// Ready once `delay` has elapsed from now.
    ///
    /// A delay past the platform's `Instant` range is clamped to at most
    /// 100 years from now.
    #[must_use]
    pub fn after(delay: Duration) -> Self {
        let now = Instant::now();
        let at = now
            .checked_add(delay)
            .or_else(|| FAR_FUTURE.iter().find_map(|&far| now.checked_add(far)))
            .unwrap_or(now);
        Self::at(at)
    }

    /// Returns the instant this condition becomes ready.
    #[must_use]
    pub const fn instant(&self) -> Instant {
        self.at
    }

    /// Time left until ready, zero if already passed.
    #[must_use]
    pub fn remaining(&self) -> Duration {
        self.at.saturating_duration_since(Instant::now())
    }
}

impl Readiness for Deadline {
    fn is_ready(&self, _task: TaskId) -> bool {
        Instant::now() >= self.at
    }

    fn describe(&self) -> &str {
        "deadline"
    }
}
