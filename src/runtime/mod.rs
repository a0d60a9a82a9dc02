//! Reference scheduler and its configuration.
//!
//! - [`config`]: Runtime configuration types
//! - [`env_config`]: Environment variable and TOML file loading
//! - [`scheduler`]: Worker pool that drives tasks to completion
//!
//! Tasks do not depend on this module; any driver that follows the dispatch
//! rule documented on [`Scheduler`] can run them.
//!
//! ```ignore
//! use weft::runtime::{from_env, Scheduler};
//!
//! let scheduler = Scheduler::new(from_env()?);
//! scheduler.spawn_routine(entry);
//! let report = scheduler.run();
//! assert!(report.is_complete());
//! ```

pub mod config;
pub mod env_config;
pub mod scheduler;

pub use config::{
    ConfigError, RuntimeConfig, DEFAULT_IDLE_BACKOFF, DEFAULT_THREAD_NAME_PREFIX,
    DEFAULT_THREAD_STACK_SIZE,
};
#[cfg(feature = "config-file")]
pub use env_config::from_file;
pub use env_config::{apply_env_overrides, from_env};
pub use scheduler::{RunQueue, Scheduler, SchedulerReport};
