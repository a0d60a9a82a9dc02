//! Environment variable and config file support for [`RuntimeConfig`].
//!
//! # Configuration Precedence
//!
//! Settings are resolved in this order (highest priority first):
//!
//! 1. **Programmatic**: fields set on the [`RuntimeConfig`] after loading
//! 2. **Environment variables**: values from `WEFT_*` env vars
//! 3. **Config file**: values loaded from a TOML file (requires `config-file` feature)
//! 4. **Defaults**: built-in defaults from [`RuntimeConfig::default()`]
//!
//! # Supported Environment Variables
//!
//! | Variable | Type | Maps to |
//! |----------|------|---------|
//! | `WEFT_WORKER_THREADS` | `usize` | `worker_threads` |
//! | `WEFT_THREAD_STACK_SIZE` | `usize` | `thread_stack_size` |
//! | `WEFT_THREAD_NAME_PREFIX` | `String` | `thread_name_prefix` |
//! | `WEFT_IDLE_BACKOFF_MS` | `u64` | `idle_backoff` |
//! | `WEFT_IDLE_TIMEOUT_MS` | `u64`, or `none` | `idle_timeout` |
//! | `WEFT_RUNTIME_NAMESPACE` | `String` | `classifier.runtime_namespace` |
//! | `WEFT_NOT_COUNTED_PREFIXES` | comma list | appended to `classifier.not_counted_prefixes` |

use std::time::Duration;

use super::config::{ConfigError, RuntimeConfig};

/// Environment variable name for worker thread count.
pub const ENV_WORKER_THREADS: &str = "WEFT_WORKER_THREADS";
/// Environment variable name for thread stack size.
pub const ENV_THREAD_STACK_SIZE: &str = "WEFT_THREAD_STACK_SIZE";
/// Environment variable name for thread name prefix.
pub const ENV_THREAD_NAME_PREFIX: &str = "WEFT_THREAD_NAME_PREFIX";
/// Environment variable name for the idle backoff in milliseconds.
pub const ENV_IDLE_BACKOFF_MS: &str = "WEFT_IDLE_BACKOFF_MS";
/// Environment variable name for the idle timeout in milliseconds.
pub const ENV_IDLE_TIMEOUT_MS: &str = "WEFT_IDLE_TIMEOUT_MS";
/// Environment variable name for the runtime module namespace.
pub const ENV_RUNTIME_NAMESPACE: &str = "WEFT_RUNTIME_NAMESPACE";
/// Environment variable name for extra not-counted module prefixes.
pub const ENV_NOT_COUNTED_PREFIXES: &str = "WEFT_NOT_COUNTED_PREFIXES";

/// Builds a configuration from defaults and the environment.
pub fn from_env() -> Result<RuntimeConfig, ConfigError> {
    let mut config = RuntimeConfig::default();
    apply_env_overrides(&mut config)?;
    config.normalize();
    Ok(config)
}

/// Builds a configuration from defaults, a TOML file, and the environment.
#[cfg(feature = "config-file")]
pub fn from_file(path: &std::path::Path) -> Result<RuntimeConfig, ConfigError> {
    let mut config = RuntimeConfig::default();
    apply_toml_config(&mut config, &parse_toml_file(path)?);
    apply_env_overrides(&mut config)?;
    config.normalize();
    Ok(config)
}

/// Apply environment variable overrides to a [`RuntimeConfig`].
///
/// Only variables that are set in the environment are applied.
/// Returns an error if a variable is set but contains an unparseable value.
pub fn apply_env_overrides(config: &mut RuntimeConfig) -> Result<(), ConfigError> {
    if let Some(val) = read_env(ENV_WORKER_THREADS) {
        config.worker_threads = parse_usize(ENV_WORKER_THREADS, &val)?;
    }
    if let Some(val) = read_env(ENV_THREAD_STACK_SIZE) {
        config.thread_stack_size = parse_usize(ENV_THREAD_STACK_SIZE, &val)?;
    }
    if let Some(val) = read_env(ENV_THREAD_NAME_PREFIX) {
        config.thread_name_prefix = val;
    }
    if let Some(val) = read_env(ENV_IDLE_BACKOFF_MS) {
        config.idle_backoff = Duration::from_millis(parse_u64(ENV_IDLE_BACKOFF_MS, &val)?);
    }
    if let Some(val) = read_env(ENV_IDLE_TIMEOUT_MS) {
        config.idle_timeout = parse_optional_millis(ENV_IDLE_TIMEOUT_MS, &val)?;
    }
    if let Some(val) = read_env(ENV_RUNTIME_NAMESPACE) {
        config.classifier.runtime_namespace = val;
    }
    if let Some(val) = read_env(ENV_NOT_COUNTED_PREFIXES) {
        config
            .classifier
            .not_counted_prefixes
            .extend(parse_list(&val));
    }
    Ok(())
}

/// Read an environment variable, returning `None` if unset.
fn read_env(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

fn invalid(name: &str, expected: &'static str, value: &str) -> ConfigError {
    ConfigError::InvalidValue {
        name: name.to_string(),
        expected,
        value: value.to_string(),
    }
}

fn parse_usize(var_name: &str, val: &str) -> Result<usize, ConfigError> {
    val.trim()
        .parse::<usize>()
        .map_err(|_| invalid(var_name, "unsigned integer", val))
}

fn parse_u64(var_name: &str, val: &str) -> Result<u64, ConfigError> {
    val.trim()
        .parse::<u64>()
        .map_err(|_| invalid(var_name, "milliseconds as u64", val))
}

fn parse_optional_millis(var_name: &str, val: &str) -> Result<Option<Duration>, ConfigError> {
    match val.trim().to_lowercase().as_str() {
        "" | "none" | "off" => Ok(None),
        _ => parse_u64(var_name, val).map(|ms| Some(Duration::from_millis(ms))),
    }
}

fn parse_list(val: &str) -> impl Iterator<Item = String> + '_ {
    val.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
}

// =========================================================================
// TOML config file support (feature-gated)
// =========================================================================

/// TOML-deserializable runtime configuration.
///
/// ```toml
/// [scheduler]
/// worker_threads = 4
/// thread_stack_size = 2097152
/// thread_name_prefix = "myapp-worker"
/// idle_backoff_ms = 1
/// idle_timeout_ms = 5000
///
/// [classifier]
/// runtime_namespace = "weft::"
/// not_counted_prefixes = ["std::", "core::", "alloc::", "weft::runtime::", "weft::task::cx::Cx::call", "weft::task::Routine::"]
/// ```
#[cfg(feature = "config-file")]
#[derive(serde::Deserialize, Default, Debug)]
pub struct RuntimeTomlConfig {
    /// Scheduler settings.
    #[serde(default)]
    pub scheduler: SchedulerToml,
    /// Classifier settings.
    #[serde(default)]
    pub classifier: ClassifierToml,
}

/// Scheduler section of the TOML config.
#[cfg(feature = "config-file")]
#[derive(serde::Deserialize, Default, Debug)]
pub struct SchedulerToml {
    /// Number of worker threads.
    pub worker_threads: Option<usize>,
    /// Stack size per worker thread in bytes.
    pub thread_stack_size: Option<usize>,
    /// Name prefix for worker threads.
    pub thread_name_prefix: Option<String>,
    /// Idle backoff in milliseconds.
    pub idle_backoff_ms: Option<u64>,
    /// Idle timeout in milliseconds.
    pub idle_timeout_ms: Option<u64>,
}

/// Classifier section of the TOML config.
#[cfg(feature = "config-file")]
#[derive(serde::Deserialize, Default, Debug)]
pub struct ClassifierToml {
    /// Module prefix of the runtime itself.
    pub runtime_namespace: Option<String>,
    /// Replaces the not-counted prefix list.
    pub not_counted_prefixes: Option<Vec<String>>,
}

/// Apply a parsed TOML config to a [`RuntimeConfig`].
///
/// Only fields that are `Some` in the TOML struct override the config.
#[cfg(feature = "config-file")]
pub fn apply_toml_config(config: &mut RuntimeConfig, toml: &RuntimeTomlConfig) {
    if let Some(v) = toml.scheduler.worker_threads {
        config.worker_threads = v;
    }
    if let Some(v) = toml.scheduler.thread_stack_size {
        config.thread_stack_size = v;
    }
    if let Some(ref v) = toml.scheduler.thread_name_prefix {
        config.thread_name_prefix.clone_from(v);
    }
    if let Some(v) = toml.scheduler.idle_backoff_ms {
        config.idle_backoff = Duration::from_millis(v);
    }
    if let Some(v) = toml.scheduler.idle_timeout_ms {
        config.idle_timeout = Some(Duration::from_millis(v));
    }
    if let Some(ref v) = toml.classifier.runtime_namespace {
        config.classifier.runtime_namespace.clone_from(v);
    }
    if let Some(ref v) = toml.classifier.not_counted_prefixes {
        config.classifier.not_counted_prefixes.clone_from(v);
    }
}

/// Parse a TOML string into a [`RuntimeTomlConfig`].
#[cfg(feature = "config-file")]
pub fn parse_toml_str(toml_str: &str) -> Result<RuntimeTomlConfig, ConfigError> {
    Ok(toml::from_str(toml_str)?)
}

/// Read and parse a TOML file into a [`RuntimeTomlConfig`].
#[cfg(feature = "config-file")]
pub fn parse_toml_file(path: &std::path::Path) -> Result<RuntimeTomlConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;
    parse_toml_str(&content)
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_VARS: &[&str] = &[
        ENV_WORKER_THREADS,
        ENV_THREAD_STACK_SIZE,
        ENV_THREAD_NAME_PREFIX,
        ENV_IDLE_BACKOFF_MS,
        ENV_IDLE_TIMEOUT_MS,
        ENV_RUNTIME_NAMESPACE,
        ENV_NOT_COUNTED_PREFIXES,
    ];

    fn with_envs<F, R>(vars: &[(&str, &str)], f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let _guard = crate::test_utils::env_lock();
        for var in ALL_VARS {
            std::env::remove_var(var);
        }
        for (k, v) in vars {
            std::env::set_var(k, v);
        }
        let result = f();
        for (k, _) in vars {
            std::env::remove_var(k);
        }
        result
    }

    // --- parse helpers ---

    #[test]
    fn parse_usize_valid() {
        assert_eq!(super::parse_usize("TEST", "42").unwrap(), 42);
        assert_eq!(super::parse_usize("TEST", " 100 ").unwrap(), 100);
    }

    #[test]
    fn parse_usize_invalid() {
        assert!(super::parse_usize("TEST", "abc").is_err());
        assert!(super::parse_usize("TEST", "-1").is_err());
        assert!(super::parse_usize("TEST", "").is_err());
    }

    #[test]
    fn parse_optional_millis_accepts_none() {
        assert_eq!(super::parse_optional_millis("TEST", "none").unwrap(), None);
        assert_eq!(super::parse_optional_millis("TEST", "OFF").unwrap(), None);
        assert_eq!(
            super::parse_optional_millis("TEST", "250").unwrap(),
            Some(Duration::from_millis(250))
        );
        assert!(super::parse_optional_millis("TEST", "soon").is_err());
    }

    #[test]
    fn parse_list_trims_and_skips_empty() {
        let items: Vec<String> = super::parse_list(" a::, ,b:: ,").collect();
        assert_eq!(items, vec!["a::".to_string(), "b::".to_string()]);
    }

    // --- apply_env_overrides ---

    #[test]
    fn env_overrides_scheduler_fields() {
        with_envs(
            &[
                (ENV_WORKER_THREADS, "8"),
                (ENV_THREAD_NAME_PREFIX, "myapp-worker"),
                (ENV_IDLE_BACKOFF_MS, "5"),
                (ENV_IDLE_TIMEOUT_MS, "2000"),
            ],
            || {
                let mut config = RuntimeConfig::default();
                apply_env_overrides(&mut config).unwrap();
                assert_eq!(config.worker_threads, 8);
                assert_eq!(config.thread_name_prefix, "myapp-worker");
                assert_eq!(config.idle_backoff, Duration::from_millis(5));
                assert_eq!(config.idle_timeout, Some(Duration::from_secs(2)));
            },
        );
    }

    #[test]
    fn env_appends_not_counted_prefixes() {
        with_envs(&[(ENV_NOT_COUNTED_PREFIXES, "glue::,reflect::")], || {
            let mut config = RuntimeConfig::default();
            let before = config.classifier.not_counted_prefixes.len();
            apply_env_overrides(&mut config).unwrap();
            let prefixes = &config.classifier.not_counted_prefixes;
            assert_eq!(prefixes.len(), before + 2);
            assert!(prefixes.iter().any(|p| p == "reflect::"));
        });
    }

    #[test]
    fn env_classifier_settings_reach_the_scheduler() {
        with_envs(
            &[
                (ENV_RUNTIME_NAMESPACE, "myrt::"),
                (ENV_NOT_COUNTED_PREFIXES, "glue::"),
            ],
            || {
                let mut config = RuntimeConfig::default();
                apply_env_overrides(&mut config).unwrap();
                let sched = crate::runtime::Scheduler::new(config.clone());
                assert_eq!(sched.classifier().config(), &config.classifier);
                assert_eq!(sched.classifier().config().runtime_namespace, "myrt::");
            },
        );
    }

    #[test]
    fn env_invalid_value_is_reported() {
        with_envs(&[(ENV_WORKER_THREADS, "many")], || {
            let mut config = RuntimeConfig::default();
            let err = apply_env_overrides(&mut config).unwrap_err();
            assert!(err.to_string().contains(ENV_WORKER_THREADS));
        });
    }

    #[test]
    fn unset_env_leaves_defaults() {
        with_envs(&[], || {
            let mut config = RuntimeConfig::default();
            apply_env_overrides(&mut config).unwrap();
            assert_eq!(config, RuntimeConfig::default());
        });
    }

    #[cfg(feature = "config-file")]
    #[test]
    fn toml_sections_apply() {
        let parsed = parse_toml_str(
            r#"
            [scheduler]
            worker_threads = 3
            idle_timeout_ms = 100

            [classifier]
            runtime_namespace = "rt::"
            not_counted_prefixes = ["std::"]
            "#,
        )
        .unwrap();
        let mut config = RuntimeConfig::default();
        apply_toml_config(&mut config, &parsed);
        assert_eq!(config.worker_threads, 3);
        assert_eq!(config.idle_timeout, Some(Duration::from_millis(100)));
        assert_eq!(config.classifier.runtime_namespace, "rt::");
        assert_eq!(config.classifier.not_counted_prefixes, vec!["std::".to_string()]);
    }

    #[cfg(feature = "config-file")]
    #[test]
    fn toml_rejects_wrong_types() {
        assert!(parse_toml_str("[scheduler]\nworker_threads = \"four\"").is_err());
    }
}
