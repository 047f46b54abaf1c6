//! # Controller Configuration
//!
//! Controller-level settings loaded from environment variables.

use crate::constants::{
    DEFAULT_BACKOFF_MAX_SECS, DEFAULT_BACKOFF_MIN_SECS, DEFAULT_CONFLICT_RETRY_ATTEMPTS,
    DEFAULT_CONTROLLER_NAME, DEFAULT_MAX_CONCURRENT_RECONCILIATIONS, DEFAULT_METRICS_PORT,
    DEFAULT_RESYNC_INTERVAL_SECS, DEFAULT_SERVER_POLL_INTERVAL_MS,
    DEFAULT_SERVER_STARTUP_TIMEOUT_SECS,
};
use std::time::Duration;

/// Controller-level configuration
///
/// All settings have sensible defaults and can be overridden via environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerConfig {
    /// Namespace to watch. `None` watches workloads in every namespace.
    pub watch_namespace: Option<String>,
    /// Requeue interval after a successful reconciliation (seconds).
    /// Zero means wait for the next watch event.
    pub resync_interval_secs: u64,
    /// First retry delay after a failed reconciliation (seconds)
    pub backoff_min_secs: u64,
    /// Maximum retry delay after repeated failures (seconds)
    pub backoff_max_secs: u64,
    /// Read-modify-write attempts on a ConfigMap/Secret before giving up on a conflict
    pub conflict_retry_attempts: u32,
    /// Maximum concurrent reconciliations per workload kind
    pub max_concurrent_reconciliations: u16,
    /// Reporting component name on published events
    pub controller_name: String,
    /// Log format (json, text)
    pub log_format: String,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            watch_namespace: None,
            resync_interval_secs: DEFAULT_RESYNC_INTERVAL_SECS,
            backoff_min_secs: DEFAULT_BACKOFF_MIN_SECS,
            backoff_max_secs: DEFAULT_BACKOFF_MAX_SECS,
            conflict_retry_attempts: DEFAULT_CONFLICT_RETRY_ATTEMPTS,
            max_concurrent_reconciliations: DEFAULT_MAX_CONCURRENT_RECONCILIATIONS,
            controller_name: DEFAULT_CONTROLLER_NAME.to_string(),
            log_format: "text".to_string(),
        }
    }
}

impl ControllerConfig {
    /// Load configuration from environment variables with defaults
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup.
    ///
    /// Unparseable values fall back to their default.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        Self {
            watch_namespace: lookup("WATCH_NAMESPACE").filter(|ns| !ns.trim().is_empty()),
            resync_interval_secs: parse_or(
                &lookup,
                "RESYNC_INTERVAL_SECS",
                defaults.resync_interval_secs,
            ),
            backoff_min_secs: parse_or(&lookup, "BACKOFF_MIN_SECS", defaults.backoff_min_secs),
            backoff_max_secs: parse_or(&lookup, "BACKOFF_MAX_SECS", defaults.backoff_max_secs),
            conflict_retry_attempts: parse_or(
                &lookup,
                "CONFLICT_RETRY_ATTEMPTS",
                defaults.conflict_retry_attempts,
            )
            .max(1),
            max_concurrent_reconciliations: parse_or(
                &lookup,
                "MAX_CONCURRENT_RECONCILIATIONS",
                defaults.max_concurrent_reconciliations,
            ),
            controller_name: lookup("CONTROLLER_NAME").unwrap_or(defaults.controller_name),
            log_format: lookup("LOG_FORMAT")
                .map(|v| v.to_lowercase())
                .unwrap_or(defaults.log_format),
        }
    }

    /// Requeue after a successful reconciliation, if periodic resync is enabled
    pub fn resync_interval(&self) -> Option<Duration> {
        (self.resync_interval_secs > 0).then(|| Duration::from_secs(self.resync_interval_secs))
    }

    /// Whether log lines should be emitted as JSON
    pub fn json_logs(&self) -> bool {
        self.log_format == "json"
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Port serving `/metrics`, `/healthz` and `/readyz`
    pub metrics_port: u16,
    /// How long startup waits for the server to bind
    pub startup_timeout_secs: u64,
    /// Poll interval while waiting for the server to bind
    pub poll_interval_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            metrics_port: DEFAULT_METRICS_PORT,
            startup_timeout_secs: DEFAULT_SERVER_STARTUP_TIMEOUT_SECS,
            poll_interval_ms: DEFAULT_SERVER_POLL_INTERVAL_MS,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let lookup = |key: &str| std::env::var(key).ok();
        Self {
            metrics_port: parse_or(&lookup, "METRICS_PORT", defaults.metrics_port),
            startup_timeout_secs: parse_or(
                &lookup,
                "SERVER_STARTUP_TIMEOUT_SECS",
                defaults.startup_timeout_secs,
            ),
            poll_interval_ms: parse_or(&lookup, "SERVER_POLL_INTERVAL_MS", defaults.poll_interval_ms),
        }
    }
}

/// Read a value through `lookup` or return the default
fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}
