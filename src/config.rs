//! Configuration types, built from environment variables.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

/// Default address of the task queue service.
pub const DEFAULT_QUEUE_URL: &str = "http://127.0.0.1:5000";

/// Read `key` from the environment and parse it, falling back to `default`
/// when unset or unparseable.
pub(crate) fn env_or<T: FromStr>(key: &str, default: T) -> T {
    let Ok(raw) = std::env::var(key) else {
        return default;
    };
    match raw.trim().parse() {
        Ok(value) => value,
        Err(_) => {
            warn!(key, value = %raw, "Ignoring unparseable environment value, using default");
            default
        }
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}

/// Read a boolean switch such as `CORTEX_DRY_RUN=1`.
pub(crate) fn env_flag(key: &str, default: bool) -> bool {
    let Ok(raw) = std::env::var(key) else {
        return default;
    };
    parse_flag(&raw).unwrap_or_else(|| {
        warn!(key, value = %raw, "Unrecognized boolean, using default");
        default
    })
}

/// Task queue service configuration.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Address the HTTP server binds to.
    pub bind: SocketAddr,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], 5000)),
        }
    }
}

impl QueueConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            bind: env_or("CORTEX_BIND", defaults.bind),
        }
    }
}

/// Executor (desktop agent) configuration.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Base URL of the task queue service.
    pub queue_url: String,
    /// Wait between polls when the queue is reachable.
    pub poll_interval: Duration,
    /// Wait before retrying when the queue is unreachable.
    pub offline_backoff: Duration,
    /// Log actions instead of performing them.
    pub dry_run: bool,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            queue_url: DEFAULT_QUEUE_URL.to_string(),
            poll_interval: Duration::from_secs(3),
            offline_backoff: Duration::from_secs(5),
            dry_run: false,
        }
    }
}

impl ExecutorConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            queue_url: std::env::var("CORTEX_QUEUE_URL").unwrap_or(defaults.queue_url),
            poll_interval: Duration::from_secs(env_or(
                "CORTEX_POLL_INTERVAL_SECS",
                defaults.poll_interval.as_secs(),
            )),
            offline_backoff: Duration::from_secs(env_or(
                "CORTEX_OFFLINE_BACKOFF_SECS",
                defaults.offline_backoff.as_secs(),
            )),
            dry_run: env_flag("CORTEX_DRY_RUN", false),
        }
    }
}

/// Controller (interactive planner loop) configuration.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Base URL of the task queue service.
    pub queue_url: String,
    /// Number of memories fed to the planner as context.
    pub memory_results: usize,
    /// libSQL file holding past interactions.
    pub memory_db_path: PathBuf,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            queue_url: DEFAULT_QUEUE_URL.to_string(),
            memory_results: 2,
            memory_db_path: PathBuf::from("./data/memory.db"),
        }
    }
}

impl ControllerConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            queue_url: std::env::var("CORTEX_QUEUE_URL").unwrap_or(defaults.queue_url),
            memory_results: env_or("CORTEX_MEMORY_RESULTS", defaults.memory_results),
            memory_db_path: std::env::var("CORTEX_MEMORY_DB")
                .map(PathBuf::from)
                .unwrap_or(defaults.memory_db_path),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_behaviour() {
        let exec = ExecutorConfig::default();
        assert_eq!(exec.queue_url, "http://127.0.0.1:5000");
        assert_eq!(exec.poll_interval, Duration::from_secs(3));
        assert_eq!(exec.offline_backoff, Duration::from_secs(5));
        assert!(!exec.dry_run);

        let ctrl = ControllerConfig::default();
        assert_eq!(ctrl.memory_results, 2);

        assert_eq!(QueueConfig::default().bind.port(), 5000);
    }

    #[test]
    fn env_or_falls_back_on_garbage() {
        // Key chosen so no other test touches it.
        let key = "CORTEX_TEST_ENV_OR_GARBAGE";
        assert_eq!(env_or(key, 7u64), 7);
        unsafe { std::env::set_var(key, "not-a-number") };
        assert_eq!(env_or(key, 7u64), 7);
        unsafe { std::env::set_var(key, " 12 ") };
        assert_eq!(env_or(key, 7u64), 12);
        unsafe { std::env::remove_var(key) };
    }

    #[test]
    fn flags_accept_common_spellings() {
        for raw in ["1", "true", "YES", " on "] {
            assert_eq!(parse_flag(raw), Some(true), "{raw}");
        }
        for raw in ["0", "false", "No", "off"] {
            assert_eq!(parse_flag(raw), Some(false), "{raw}");
        }
        assert_eq!(parse_flag("maybe"), None);
    }

    #[test]
    fn dry_run_env_accepts_one() {
        let key = "CORTEX_TEST_FLAG_ONE";
        unsafe { std::env::set_var(key, "1") };
        assert!(env_flag(key, false));
        unsafe { std::env::set_var(key, "bogus") };
        assert!(!env_flag(key, false));
        unsafe { std::env::remove_var(key) };
        assert!(env_flag(key, true));
    }
}
