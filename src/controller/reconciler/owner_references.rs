//! # Owner References
//!
//! Keeps the owner references on ConfigMaps and Secrets in step with what a
//! workload currently references.
//!
//! Children may be shared by several workloads, so only this workload's own
//! reference (matched by UID) is ever added or removed. The set of children that
//! currently point back at the workload is discovered from the cluster on every
//! pass rather than remembered between passes.
//!
//! Every change is a read-modify-write that starts from a fresh read and retries
//! on a resource version conflict, up to the configured number of attempts.

use crate::cluster::ClusterClient;
use crate::controller::reconciler::children::{ChildRef, ConfigKind, ConfigObject, ResolvedChild};
use crate::controller::reconciler::types::ReconcilerError;
use crate::observability::metrics;
use crate::workload::Workload;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use std::collections::BTreeSet;
use tracing::{debug, info, warn};

/// Changes applied during one ownership pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OwnershipChanges {
    pub added: Vec<ChildRef>,
    pub removed: Vec<ChildRef>,
}

impl OwnershipChanges {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// Result of a single guarded child update
#[derive(Debug, Clone, PartialEq)]
pub enum LinkUpdate {
    /// The child does not exist
    Missing,
    /// The child already had the desired links
    Unchanged,
    /// The child was written
    Updated(ConfigObject),
}

pub fn is_owned_by(object: &ConfigObject, uid: &str) -> bool {
    object.owner_references().iter().any(|r| r.uid == uid)
}

/// Append `owner` unless a reference with the same UID is already there
pub fn add_owner_reference(object: &mut ConfigObject, owner: &OwnerReference) -> bool {
    if is_owned_by(object, &owner.uid) {
        return false;
    }
    object
        .meta_mut()
        .owner_references
        .get_or_insert_with(Vec::new)
        .push(owner.clone());
    true
}

/// Drop every reference to `uid`, leaving other owners in place
pub fn remove_owner_reference(object: &mut ConfigObject, uid: &str) -> bool {
    let Some(refs) = object.meta_mut().owner_references.as_mut() else {
        return false;
    };
    let before = refs.len();
    refs.retain(|r| r.uid != uid);
    let removed = refs.len() != before;
    if refs.is_empty() {
        object.meta_mut().owner_references = None;
    }
    removed
}

/// Children that point at `uid` but are no longer wanted
pub fn orphaned_children<'a>(
    existing: &'a BTreeSet<ChildRef>,
    wanted: &'a BTreeSet<ChildRef>,
) -> impl Iterator<Item = &'a ChildRef> {
    existing.difference(wanted)
}

/// Every ConfigMap and Secret in `namespace` carrying a reference to `uid`
pub async fn existing_children(
    client: &dyn ClusterClient,
    namespace: &str,
    uid: &str,
) -> Result<BTreeSet<ChildRef>, ReconcilerError> {
    let mut owned = BTreeSet::new();
    for kind in [ConfigKind::ConfigMap, ConfigKind::Secret] {
        for object in client.list_config_objects(kind, namespace).await? {
            if is_owned_by(&object, uid) {
                owned.insert(object.child_ref());
            }
        }
    }
    Ok(owned)
}

/// Read-modify-write a child, retrying from a fresh read on conflict.
///
/// `mutate` returns whether it changed anything; unchanged objects are not written.
pub async fn update_with_retry<F>(
    client: &dyn ClusterClient,
    namespace: &str,
    child: &ChildRef,
    attempts: u32,
    mutate: F,
) -> Result<LinkUpdate, ReconcilerError>
where
    F: Fn(&mut ConfigObject) -> bool + Send + Sync,
{
    let attempts = attempts.max(1);
    for attempt in 1..=attempts {
        let Some(mut object) = client
            .get_config_object(child.kind, namespace, &child.name)
            .await?
        else {
            return Ok(LinkUpdate::Missing);
        };
        if !mutate(&mut object) {
            return Ok(LinkUpdate::Unchanged);
        }
        match client.update_config_object(&object).await {
            Ok(updated) => return Ok(LinkUpdate::Updated(updated)),
            Err(ReconcilerError::Conflict { .. }) if attempt < attempts => {
                metrics::increment_conflict_retries();
                debug!(
                    child.kind = %child.kind,
                    child.name = %child.name,
                    attempt,
                    "Conflict updating child, retrying from a fresh read"
                );
            }
            Err(ReconcilerError::NotFound { .. }) => return Ok(LinkUpdate::Missing),
            Err(e) => return Err(e),
        }
    }
    Err(ReconcilerError::Conflict {
        kind: child.kind.to_string(),
        namespace: namespace.to_string(),
        name: child.name.clone(),
    })
}

/// Make the owner references pointing at `workload` match `children`.
///
/// Orphans are released first. A missing optional child is skipped; a missing
/// required child fails the pass with `NotFound` once every other child has been
/// linked.
pub async fn reconcile_owner_references(
    client: &dyn ClusterClient,
    workload: &Workload,
    children: &[ResolvedChild],
    attempts: u32,
) -> Result<OwnershipChanges, ReconcilerError> {
    let uid = workload
        .uid()
        .ok_or(ReconcilerError::MissingMetadata("uid"))?;
    let namespace = workload.namespace();
    let owner = workload.owner_reference();

    let existing = existing_children(client, namespace, uid).await?;
    let wanted: BTreeSet<ChildRef> = children.iter().map(|c| c.reference.clone()).collect();

    let mut changes = OwnershipChanges::default();

    for orphan in orphaned_children(&existing, &wanted) {
        let result = update_with_retry(client, namespace, orphan, attempts, |object| {
            remove_owner_reference(object, uid)
        })
        .await?;
        if matches!(result, LinkUpdate::Updated(_)) {
            metrics::increment_owner_reference_updates("remove");
            info!(child.kind = %orphan.kind, child.name = %orphan.name, "Removed owner reference");
            changes.removed.push(orphan.clone());
        }
    }

    let mut missing_required: Option<&ChildRef> = None;
    for child in children {
        let reference = &child.reference;
        let already_linked = child
            .object
            .as_ref()
            .is_some_and(|object| is_owned_by(object, uid));
        let result = if already_linked {
            LinkUpdate::Unchanged
        } else if child.object.is_none() {
            LinkUpdate::Missing
        } else {
            update_with_retry(client, namespace, reference, attempts, |object| {
                add_owner_reference(object, &owner)
            })
            .await?
        };

        match result {
            LinkUpdate::Updated(_) => {
                metrics::increment_owner_reference_updates("add");
                info!(child.kind = %reference.kind, child.name = %reference.name, "Added owner reference");
                changes.added.push(reference.clone());
            }
            LinkUpdate::Unchanged => {}
            LinkUpdate::Missing if child.optional => {
                debug!(child.kind = %reference.kind, child.name = %reference.name, "Optional child missing, skipping");
            }
            LinkUpdate::Missing => {
                warn!(child.kind = %reference.kind, child.name = %reference.name, "Required child missing");
                missing_required.get_or_insert(reference);
            }
        }
    }

    if let Some(reference) = missing_required {
        return Err(ReconcilerError::NotFound {
            kind: reference.kind,
            namespace: namespace.to_string(),
            name: reference.name.clone(),
        });
    }

    Ok(changes)
}

/// Remove every owner reference pointing at `workload`
pub async fn remove_all_owner_references(
    client: &dyn ClusterClient,
    workload: &Workload,
    attempts: u32,
) -> Result<Vec<ChildRef>, ReconcilerError> {
    let uid = workload
        .uid()
        .ok_or(ReconcilerError::MissingMetadata("uid"))?;
    let namespace = workload.namespace();

    let mut removed = Vec::new();
    for child in existing_children(client, namespace, uid).await? {
        let result = update_with_retry(client, namespace, &child, attempts, |object| {
            remove_owner_reference(object, uid)
        })
        .await?;
        if matches!(result, LinkUpdate::Updated(_)) {
            metrics::increment_owner_reference_updates("remove");
            removed.push(child);
        }
    }
    Ok(removed)
}
