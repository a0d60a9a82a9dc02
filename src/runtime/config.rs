//! Runtime configuration types.
//!
//! # Defaults
//!
//! | Field | Default |
//! |-------|---------|
//! | `worker_threads` | available CPU parallelism |
//! | `thread_stack_size` | 2 MiB |
//! | `thread_name_prefix` | `"weft-worker"` |
//! | `idle_backoff` | 1 ms |
//! | `idle_timeout` | `None` (wait for every task) |
//! | `classifier.runtime_namespace` | `"weft::"` |
//! | `classifier.not_counted_prefixes` | [`DEFAULT_NOT_COUNTED`](crate::classify::DEFAULT_NOT_COUNTED) |

use std::time::Duration;

use crate::classify::ClassifierConfig;

/// Default name prefix of scheduler worker threads.
pub const DEFAULT_THREAD_NAME_PREFIX: &str = "weft-worker";

/// Default stack size of scheduler worker threads.
pub const DEFAULT_THREAD_STACK_SIZE: usize = 2 * 1024 * 1024;

/// Default sleep of an idle worker between polls.
pub const DEFAULT_IDLE_BACKOFF: Duration = Duration::from_millis(1);

/// Errors produced while loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// An environment variable or file field holds an unparseable value.
    #[error("invalid value for {name}: expected {expected}, got {value:?}")]
    InvalidValue {
        /// Variable or field name.
        name: String,
        /// What the value should look like.
        expected: &'static str,
        /// The offending value.
        value: String,
    },
    /// The configuration file could not be read.
    #[error("failed to read config file {path}: {source}")]
    Io {
        /// File path.
        path: String,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
    /// The configuration file is not valid TOML for this schema.
    #[cfg(feature = "config-file")]
    #[error("failed to parse TOML config: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Configuration of the reference scheduler and the classifier it installs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Number of worker threads (default: available parallelism).
    pub worker_threads: usize,
    /// Stack size per worker thread (default: 2 MiB).
    pub thread_stack_size: usize,
    /// Name prefix for worker threads.
    pub thread_name_prefix: String,
    /// How long an idle worker sleeps before polling the run queue again.
    pub idle_backoff: Duration,
    /// Stop once no task has made progress for this long.
    pub idle_timeout: Option<Duration>,
    /// Classifier settings.
    pub classifier: ClassifierConfig,
}

impl RuntimeConfig {
    /// Normalize configuration values to safe defaults.
    pub fn normalize(&mut self) {
        if self.worker_threads == 0 {
            self.worker_threads = 1;
        }
        if self.thread_stack_size == 0 {
            self.thread_stack_size = DEFAULT_THREAD_STACK_SIZE;
        }
        if self.thread_name_prefix.is_empty() {
            self.thread_name_prefix = DEFAULT_THREAD_NAME_PREFIX.to_string();
        }
        if self.idle_backoff.is_zero() {
            self.idle_backoff = DEFAULT_IDLE_BACKOFF;
        }
        if self.classifier.runtime_namespace.is_empty() {
            self.classifier.runtime_namespace = ClassifierConfig::default().runtime_namespace;
        }
        self.classifier.not_counted_prefixes.retain(|p| !p.is_empty());
        self.classifier.not_counted_prefixes.dedup();
    }

    pub(crate) fn default_worker_threads() -> usize {
        std::thread::available_parallelism()
            .map_or(1, std::num::NonZeroUsize::get)
            .max(1)
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            worker_threads: Self::default_worker_threads(),
            thread_stack_size: DEFAULT_THREAD_STACK_SIZE,
            thread_name_prefix: DEFAULT_THREAD_NAME_PREFIX.to_string(),
            idle_backoff: DEFAULT_IDLE_BACKOFF,
            idle_timeout: None,
            classifier: ClassifierConfig::default(),
        }
    }
}
