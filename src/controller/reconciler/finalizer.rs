//! # Finalizer
//!
//! Lifecycle of the cleanup finalizer on a workload, and the decision of what a
//! reconciliation must do with it.
//!
//! ```text
//!             opt in                       deletionTimestamp set
//! Unmanaged ─────────> Managed ───────────────────────> Deleting
//!     ^                   │                                 │
//!     │   opt out:        │                                 │ links removed,
//!     └───────────────────┘ links removed,                  │ finalizer dropped
//!         finalizer dropped                                 v
//!                                                       (gone)
//! ```
//!
//! Only this controller's token is ever added or removed; other finalizers on the
//! workload are preserved in their original order.

use crate::constants::FINALIZER;
use crate::workload::Workload;

/// Where a workload sits in the finalizer lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinalizerState {
    /// No finalizer: never managed, or cleanup already done
    Unmanaged,
    /// Finalizer present, workload alive
    Managed,
    /// Finalizer present, workload marked for deletion
    Deleting,
}

impl FinalizerState {
    pub fn of(workload: &Workload) -> Self {
        match (has_finalizer(workload), to_be_deleted(workload)) {
            (false, _) => FinalizerState::Unmanaged,
            (true, false) => FinalizerState::Managed,
            (true, true) => FinalizerState::Deleting,
        }
    }
}

/// What one reconciliation of a workload has to do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Plan {
    /// Nothing to manage
    Ignore,
    /// Opted in but not yet tracked: add the finalizer, then sync
    Adopt,
    /// Tracked and alive: reconcile owner references and the hash
    Sync,
    /// Opted out while still tracked: remove every link, the finalizer and the hash
    Release,
    /// Being deleted: remove every link, then the finalizer
    Finalize,
}

/// Decide the reconciliation path from the live workload.
///
/// Deletion wins over everything else, so a workload being deleted never has its
/// hash recomputed.
pub fn plan(workload: &Workload) -> Plan {
    match FinalizerState::of(workload) {
        FinalizerState::Deleting => Plan::Finalize,
        // Deleted without our finalizer: the garbage collector owns it now
        _ if to_be_deleted(workload) => Plan::Ignore,
        state if !workload.has_required_annotation() => {
            if state == FinalizerState::Managed || workload.config_hash().is_some() {
                Plan::Release
            } else {
                Plan::Ignore
            }
        }
        FinalizerState::Unmanaged => Plan::Adopt,
        FinalizerState::Managed => Plan::Sync,
    }
}

pub fn has_finalizer(workload: &Workload) -> bool {
    workload.finalizers().iter().any(|f| f == FINALIZER)
}

pub fn to_be_deleted(workload: &Workload) -> bool {
    workload.deletion_timestamp().is_some()
}

/// Append the finalizer. Returns false when it was already present.
pub fn add_finalizer(workload: &mut Workload) -> bool {
    if has_finalizer(workload) {
        return false;
    }
    let mut finalizers = workload.finalizers().to_vec();
    finalizers.push(FINALIZER.to_string());
    workload.set_finalizers(finalizers);
    true
}

/// Drop the finalizer, keeping every other one. Returns whether it was present.
pub fn remove_finalizer(workload: &mut Workload) -> bool {
    if !has_finalizer(workload) {
        return false;
    }
    let finalizers: Vec<String> = workload
        .finalizers()
        .iter()
        .filter(|f| *f != FINALIZER)
        .cloned()
        .collect();
    workload.set_finalizers(finalizers);
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::REQUIRED_ANNOTATION;
    use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, Time};

    fn deletion_time() -> Time {
        serde_json::from_str("\"2024-01-01T00:00:00Z\"").unwrap()
    }

    fn workload(enabled: Option<&str>, finalizers: &[&str], deleting: bool) -> Workload {
        Workload::Deployment(Deployment {
            metadata: ObjectMeta {
                name: Some("web".to_string()),
                namespace: Some("apps".to_string()),
                annotations: enabled
                    .map(|v| [(REQUIRED_ANNOTATION.to_string(), v.to_string())].into()),
                finalizers: Some(finalizers.iter().map(|f| (*f).to_string()).collect()),
                deletion_timestamp: deleting.then(deletion_time),
                ..ObjectMeta::default()
            },
            spec: Some(DeploymentSpec::default()),
            ..Deployment::default()
        })
    }

    #[test]
    fn test_state_from_workload() {
        assert_eq!(
            FinalizerState::of(&workload(Some("true"), &[], false)),
            FinalizerState::Unmanaged
        );
        assert_eq!(
            FinalizerState::of(&workload(Some("true"), &[FINALIZER], false)),
            FinalizerState::Managed
        );
        assert_eq!(
            FinalizerState::of(&workload(Some("true"), &[FINALIZER], true)),
            FinalizerState::Deleting
        );
    }

    #[test]
    fn test_plan_transitions() {
        assert_eq!(plan(&workload(None, &[], false)), Plan::Ignore);
        assert_eq!(plan(&workload(Some("false"), &[], false)), Plan::Ignore);
        assert_eq!(plan(&workload(Some("true"), &[], false)), Plan::Adopt);
        assert_eq!(plan(&workload(Some("true"), &[FINALIZER], false)), Plan::Sync);
        assert_eq!(plan(&workload(None, &[FINALIZER], false)), Plan::Release);
        assert_eq!(plan(&workload(Some("true"), &[FINALIZER], true)), Plan::Finalize);
        // Deletion short-circuits even when the workload opted out
        assert_eq!(plan(&workload(None, &[FINALIZER], true)), Plan::Finalize);
        assert_eq!(plan(&workload(Some("true"), &[], true)), Plan::Ignore);
    }

    #[test]
    fn test_opted_out_workload_with_stale_hash_is_released() {
        let mut w = workload(None, &[], false);
        assert!(w.set_config_hash("abc"));
        assert_eq!(plan(&w), Plan::Release);
    }

    #[test]
    fn test_finalizer_edits_preserve_others() {
        let mut w = workload(Some("true"), &["other/one", "other/two"], false);

        assert!(add_finalizer(&mut w));
        assert!(!add_finalizer(&mut w));
        assert_eq!(w.finalizers(), ["other/one", "other/two", FINALIZER]);

        assert!(remove_finalizer(&mut w));
        assert!(!remove_finalizer(&mut w));
        assert_eq!(w.finalizers(), ["other/one", "other/two"]);
    }
}
