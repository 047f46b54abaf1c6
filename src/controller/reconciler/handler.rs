//! # Handler
//!
//! One reconciliation of one workload, re-derived from live cluster state.
//!
//! ## Flow
//!
//! 1. Fetch the workload; a missing workload is already gone and needs nothing.
//! 2. Pick a [`Plan`] from its annotations, finalizers and deletion timestamp.
//! 3. Run the plan:
//!    - **Adopt**: persist the finalizer first, then continue as Sync
//!    - **Sync**: extract references, resolve children, reconcile owner
//!      references, hash, and write the hash only when it changed
//!    - **Release** / **Finalize**: drop every owner reference this workload
//!      holds, then the finalizer (and, on release, the hash)
//!
//! Every step is idempotent, so a failure at any point is repaired by the next
//! reconciliation.

use crate::cluster::ClusterClient;
use crate::controller::reconciler::children::{extract_references, resolve_children};
use crate::controller::reconciler::events::{
    publish_config_changed, publish_update_failed, EventPublisher,
};
use crate::controller::reconciler::finalizer::{add_finalizer, plan, remove_finalizer, Plan};
use crate::controller::reconciler::hash::calculate_config_hash;
use crate::controller::reconciler::owner_references::{
    reconcile_owner_references, remove_all_owner_references, OwnershipChanges,
};
use crate::controller::reconciler::types::ReconcilerError;
use crate::observability::metrics;
use crate::workload::{Workload, WorkloadKey};
use std::sync::Arc;
use tracing::{debug, info, warn, Instrument};

/// What a reconciliation did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Workload absent or not managed
    Skipped,
    /// Workload being deleted: links removed and finalizer dropped
    Finalized { removed: usize },
    /// Workload opted out: links, finalizer and hash removed
    Released { removed: usize },
    /// Managed workload brought up to date
    Synced {
        hash: String,
        hash_updated: bool,
        ownership: OwnershipChanges,
    },
}

#[derive(Debug, Clone)]
pub struct Handler {
    client: Arc<dyn ClusterClient>,
    events: Arc<dyn EventPublisher>,
    conflict_retry_attempts: u32,
}

impl Handler {
    pub fn new(
        client: Arc<dyn ClusterClient>,
        events: Arc<dyn EventPublisher>,
        conflict_retry_attempts: u32,
    ) -> Self {
        Self {
            client,
            events,
            conflict_retry_attempts: conflict_retry_attempts.max(1),
        }
    }

    /// Reconcile the workload identified by `key`
    pub async fn handle(&self, key: &WorkloadKey) -> Result<ReconcileOutcome, ReconcilerError> {
        let span = tracing::span!(
            tracing::Level::INFO,
            "reconcile",
            workload.kind = %key.kind,
            workload.namespace = %key.namespace,
            workload.name = %key.name,
        );
        self.handle_inner(key).instrument(span).await
    }

    async fn handle_inner(&self, key: &WorkloadKey) -> Result<ReconcileOutcome, ReconcilerError> {
        let Some(workload) = self.client.get_workload(key).await? else {
            debug!("Workload no longer exists");
            return Ok(ReconcileOutcome::Skipped);
        };

        match plan(&workload) {
            Plan::Ignore => Ok(ReconcileOutcome::Skipped),
            Plan::Finalize => self.finalize(workload).await,
            Plan::Release => self.release(workload).await,
            Plan::Adopt => {
                let mut workload = workload;
                add_finalizer(&mut workload);
                let workload = self.client.update_workload(&workload).await?;
                info!("Added finalizer");
                self.sync(workload).await
            }
            Plan::Sync => self.sync(workload).await,
        }
    }

    async fn sync(&self, mut workload: Workload) -> Result<ReconcileOutcome, ReconcilerError> {
        let refs = workload
            .pod_template()
            .map(extract_references)
            .unwrap_or_default();
        debug!(references = refs.len(), "Extracted child references");

        let children = resolve_children(self.client.as_ref(), workload.namespace(), &refs).await?;

        let ownership = match reconcile_owner_references(
            self.client.as_ref(),
            &workload,
            &children,
            self.conflict_retry_attempts,
        )
        .await
        {
            Ok(changes) => changes,
            Err(e) => {
                warn!(error = %e, "Failed to update owner references");
                publish_update_failed(
                    self.events.as_ref(),
                    &workload,
                    format!("Failed to update owner references: {e}"),
                )
                .await;
                return Err(e);
            }
        };

        let hash = calculate_config_hash(&children)?;
        let hash_updated = workload.set_config_hash(&hash);
        if hash_updated {
            let updated = self.client.update_workload(&workload).await?;
            metrics::increment_config_hash_updates();
            info!(hash = %hash, "Updated configuration hash");
            publish_config_changed(self.events.as_ref(), &updated, &hash).await;
        } else {
            debug!(hash = %hash, "Configuration hash unchanged");
        }

        Ok(ReconcileOutcome::Synced {
            hash,
            hash_updated,
            ownership,
        })
    }

    async fn release(&self, workload: Workload) -> Result<ReconcileOutcome, ReconcilerError> {
        let removed = self.remove_links(&workload).await?;

        let mut workload = workload;
        let had_finalizer = remove_finalizer(&mut workload);
        let had_hash = workload.remove_config_hash();
        if had_finalizer || had_hash {
            self.client.update_workload(&workload).await?;
        }
        if had_finalizer {
            metrics::increment_finalizer_cleanups("disabled");
        }
        info!(removed, "Stopped managing workload");

        Ok(ReconcileOutcome::Released { removed })
    }

    async fn finalize(&self, workload: Workload) -> Result<ReconcileOutcome, ReconcilerError> {
        let removed = self.remove_links(&workload).await?;

        let mut workload = workload;
        if remove_finalizer(&mut workload) {
            self.client.update_workload(&workload).await?;
            metrics::increment_finalizer_cleanups("deleted");
        }
        info!(removed, "Cleaned up deleted workload");

        Ok(ReconcileOutcome::Finalized { removed })
    }

    async fn remove_links(&self, workload: &Workload) -> Result<usize, ReconcilerError> {
        match remove_all_owner_references(
            self.client.as_ref(),
            workload,
            self.conflict_retry_attempts,
        )
        .await
        {
            Ok(removed) => Ok(removed.len()),
            Err(e) => {
                warn!(error = %e, "Failed to remove owner references");
                publish_update_failed(
                    self.events.as_ref(),
                    workload,
                    format!("Failed to remove owner references: {e}"),
                )
                .await;
                Err(e)
            }
        }
    }
}
