//! # Reconciler
//!
//! Restarts Deployments and StatefulSets when the ConfigMaps or Secrets they
//! consume change.
//!
//! The reconciler:
//! - Finds every ConfigMap and Secret referenced by a workload's pod template
//! - Keeps an owner reference from each of them back to the workload, so changes
//!   to a child re-enqueue the workload and deletion is tracked
//! - Hashes the children's content into `wave.pusher.com/config-hash` on the pod
//!   template, which triggers the workload's own rolling update
//! - Holds a finalizer on managed workloads so owner references are removed
//!   before the workload disappears
//!
//! ## Modules
//!
//! - `children`: reference extraction and child resolution
//! - `hash`: configuration fingerprint
//! - `owner_references`: owner reference reconciliation on children
//! - `finalizer`: finalizer lifecycle and reconciliation plan
//! - `handler`: one reconciliation, composed from the above
//! - `events`: Kubernetes Events
//! - `types`: errors and shared context

pub mod children;
pub mod events;
pub mod finalizer;
pub mod handler;
pub mod hash;
pub mod owner_references;
pub mod types;

// Re-export public API
pub use handler::{Handler, ReconcileOutcome};
pub use types::{BackoffState, Reconciler, ReconcilerError};

use crate::observability;
use crate::workload::{WorkloadKey, WorkloadResource};
use kube_runtime::controller::Action;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

/// Entry point for the kube-runtime controller.
///
/// Only the workload's identity is taken from the watched object; the handler
/// re-reads everything else from the API server. Errors go to the error policy,
/// which owns the retry backoff.
#[allow(
    clippy::missing_errors_doc,
    reason = "Errors are classified by ReconcilerError"
)]
pub async fn reconcile<K: WorkloadResource>(
    obj: Arc<K>,
    ctx: Arc<Reconciler>,
) -> Result<Action, ReconcilerError> {
    let key = WorkloadKey::from_resource(obj.as_ref());
    let start = Instant::now();
    observability::metrics::increment_reconciliations();

    let result = ctx.handler.handle(&key).await;
    observability::metrics::observe_reconciliation_duration(start.elapsed().as_secs_f64());

    let outcome = result?;
    if ctx.reset_backoff(&key) {
        info!(workload = %key, ?outcome, "Reconciliation recovered after earlier failures");
    }

    Ok(match ctx.config.resync_interval() {
        Some(interval) => Action::requeue(interval),
        None => Action::await_change(),
    })
}
