//! # Constants
//!
//! Shared constants used throughout the controller.
//!
//! The annotation keys and the finalizer token form the contract between this
//! controller and the workloads it manages. They are versionless and must never
//! change, otherwise existing workloads lose their fingerprint or keep a
//! finalizer nobody will remove.
//!
//! The `DEFAULT_*` values represent reasonable defaults and can be overridden via
//! environment variables (see [`crate::config`]).

/// Annotation on the workload that opts it in to automatic restarts.
/// Only the value `"true"` enables the controller for a workload.
pub const REQUIRED_ANNOTATION: &str = "wave.pusher.com/update-on-config-change";

/// Annotation on the pod template holding the configuration fingerprint
pub const CONFIG_HASH_ANNOTATION: &str = "wave.pusher.com/config-hash";

/// Finalizer added to managed workloads so owner references can be removed
/// from their children before the workload disappears
pub const FINALIZER: &str = "wave.pusher.com/finalizer";

/// API version of both supported workload kinds
pub const APPS_API_VERSION: &str = "apps/v1";

/// Event reason emitted when the configuration hash changes
pub const REASON_CONFIG_CHANGED: &str = "ConfigChanged";

/// Event reason emitted when owner references could not be updated
pub const REASON_UPDATE_FAILED: &str = "UpdateFailed";

/// Event action attached to every event this controller publishes
pub const ACTION_RECONCILE: &str = "Reconcile";

/// Default event reporting component
pub const DEFAULT_CONTROLLER_NAME: &str = "wave";

/// Default HTTP server port for metrics and health probes
pub const DEFAULT_METRICS_PORT: u16 = 8080;

/// Default HTTP server startup timeout (how long to wait for server to be ready)
pub const DEFAULT_SERVER_STARTUP_TIMEOUT_SECS: u64 = 10;

/// Default HTTP server readiness poll interval
pub const DEFAULT_SERVER_POLL_INTERVAL_MS: u64 = 50;

/// Default requeue interval after a successful reconciliation (seconds).
/// Zero disables periodic resync; the controller then only reacts to watch events.
pub const DEFAULT_RESYNC_INTERVAL_SECS: u64 = 300;

/// Default first retry delay after a failed reconciliation (seconds)
pub const DEFAULT_BACKOFF_MIN_SECS: u64 = 1;

/// Default retry delay cap after repeated failures (seconds)
pub const DEFAULT_BACKOFF_MAX_SECS: u64 = 300;

/// Default number of read-modify-write attempts on a ConfigMap or Secret
/// before a version conflict is surfaced as an error
pub const DEFAULT_CONFLICT_RETRY_ATTEMPTS: u32 = 5;

/// Default number of reconciliations running at once, per workload kind
pub const DEFAULT_MAX_CONCURRENT_RECONCILIATIONS: u16 = 10;
