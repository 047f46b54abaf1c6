//! # Error Policy
//!
//! Error handling and backoff logic for the controller watch loop.
//! This module handles reconciliation errors and watch stream errors.

use crate::controller::reconciler::{Reconciler, ReconcilerError};
use crate::observability;
use crate::workload::{WorkloadKey, WorkloadResource};
use kube_runtime::controller::Action;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Handle reconciliation errors with Fibonacci backoff
///
/// Backoff state is tracked per workload so one failing workload never delays
/// retries for another.
pub fn handle_reconciliation_error<K: WorkloadResource>(
    obj: Arc<K>,
    error: &ReconcilerError,
    ctx: Arc<Reconciler>,
) -> Action {
    let key = WorkloadKey::from_resource(obj.as_ref());

    let error_span = tracing::span!(
        tracing::Level::ERROR,
        "controller.watch.reconciliation_error",
        workload.kind = %key.kind,
        workload.namespace = %key.namespace,
        workload.name = %key.name,
        error = %error
    );
    let _error_guard = error_span.enter();

    if error.is_retryable() {
        warn!("Reconciliation failed for {}: {}", key, error);
    } else {
        error!("Reconciliation failed for {}: {:?}", key, error);
    }
    observability::metrics::increment_reconciliation_errors(error.kind_label());

    let (backoff, error_count) = ctx.next_backoff(&key);
    let next_trigger_time = chrono::Utc::now()
        + chrono::Duration::from_std(backoff).unwrap_or_else(|_| chrono::Duration::zero());

    info!(
        "Retrying {} in {}s (error count: {}, next retry: {})",
        key,
        backoff.as_secs(),
        error_count,
        next_trigger_time.to_rfc3339()
    );

    Action::requeue(backoff)
}

/// Log a watch stream error
///
/// kube-runtime restarts failed watches itself with its own backoff; the error
/// is only classified for the log.
pub fn handle_watch_stream_error(error: &kube_runtime::watcher::Error) {
    let error_string = error.to_string();
    let is_410 = error_string.contains("410") || error_string.contains("too old resource version");
    let is_auth = error_string.contains("401")
        || error_string.contains("403")
        || error_string.contains("Unauthorized")
        || error_string.contains("Forbidden");

    if is_410 {
        warn!("Watch resource version expired (410), watch will restart");
    } else if is_auth {
        error!(
            "Watch not authorized: {} (check RBAC for deployments, statefulsets, configmaps and secrets)",
            error_string
        );
    } else {
        warn!("Watch stream error: {}", error_string);
    }
}
