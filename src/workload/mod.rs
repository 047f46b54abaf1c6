//! # Workload
//!
//! A kind-agnostic view over the workloads the controller manages.
//!
//! Deployments and StatefulSets both carry a pod template plus the usual object
//! metadata. [`Workload`] wraps either one and exposes the handful of accessors the
//! reconciler needs, so nothing above this module matches on the concrete kind.
//! Supporting another kind means adding a variant here and a
//! [`WorkloadResource`] impl; the rest of the controller is untouched.

use crate::constants::{APPS_API_VERSION, CONFIG_HASH_ANNOTATION, REQUIRED_ANNOTATION};
use k8s_openapi::api::apps::v1::{Deployment, StatefulSet};
use k8s_openapi::api::core::v1::{ObjectReference, PodTemplateSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference, Time};
use k8s_openapi::NamespaceResourceScope;
use kube::{Resource, ResourceExt};
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::fmt;

/// Supported workload kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum WorkloadKind {
    Deployment,
    StatefulSet,
}

impl WorkloadKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkloadKind::Deployment => "Deployment",
            WorkloadKind::StatefulSet => "StatefulSet",
        }
    }
}

impl fmt::Display for WorkloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of a workload: what the event source hands to the reconciler
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WorkloadKey {
    pub kind: WorkloadKind,
    pub namespace: String,
    pub name: String,
}

impl WorkloadKey {
    pub fn new(kind: WorkloadKind, namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind,
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Key for a watched object of a concrete workload type
    pub fn from_resource<K: WorkloadResource>(obj: &K) -> Self {
        Self::new(
            K::KIND,
            obj.namespace().unwrap_or_else(|| "default".to_string()),
            obj.name_any(),
        )
    }
}

impl fmt::Display for WorkloadKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}/{}", self.kind, self.namespace, self.name)
    }
}

/// Concrete Kubernetes types that can be watched as workloads
pub trait WorkloadResource:
    Resource<DynamicType = (), Scope = NamespaceResourceScope>
    + Clone
    + DeserializeOwned
    + fmt::Debug
    + Send
    + Sync
    + 'static
{
    const KIND: WorkloadKind;
}

impl WorkloadResource for Deployment {
    const KIND: WorkloadKind = WorkloadKind::Deployment;
}

impl WorkloadResource for StatefulSet {
    const KIND: WorkloadKind = WorkloadKind::StatefulSet;
}

/// A Deployment or StatefulSet
#[derive(Debug, Clone, PartialEq)]
pub enum Workload {
    Deployment(Deployment),
    StatefulSet(StatefulSet),
}

impl From<Deployment> for Workload {
    fn from(value: Deployment) -> Self {
        Workload::Deployment(value)
    }
}

impl From<StatefulSet> for Workload {
    fn from(value: StatefulSet) -> Self {
        Workload::StatefulSet(value)
    }
}

impl Workload {
    #[must_use]
    pub fn kind(&self) -> WorkloadKind {
        match self {
            Workload::Deployment(_) => WorkloadKind::Deployment,
            Workload::StatefulSet(_) => WorkloadKind::StatefulSet,
        }
    }

    pub fn meta(&self) -> &ObjectMeta {
        match self {
            Workload::Deployment(d) => &d.metadata,
            Workload::StatefulSet(s) => &s.metadata,
        }
    }

    pub fn meta_mut(&mut self) -> &mut ObjectMeta {
        match self {
            Workload::Deployment(d) => &mut d.metadata,
            Workload::StatefulSet(s) => &mut s.metadata,
        }
    }

    pub fn name(&self) -> &str {
        self.meta().name.as_deref().unwrap_or_default()
    }

    pub fn namespace(&self) -> &str {
        self.meta().namespace.as_deref().unwrap_or("default")
    }

    pub fn uid(&self) -> Option<&str> {
        self.meta().uid.as_deref()
    }

    pub fn key(&self) -> WorkloadKey {
        WorkloadKey::new(self.kind(), self.namespace(), self.name())
    }

    pub fn annotations(&self) -> Option<&BTreeMap<String, String>> {
        self.meta().annotations.as_ref()
    }

    pub fn set_annotations(&mut self, annotations: BTreeMap<String, String>) {
        self.meta_mut().annotations = Some(annotations);
    }

    /// Whether the workload opted in to automatic restarts
    pub fn has_required_annotation(&self) -> bool {
        self.annotations()
            .and_then(|a| a.get(REQUIRED_ANNOTATION))
            .is_some_and(|v| v == "true")
    }

    pub fn finalizers(&self) -> &[String] {
        self.meta().finalizers.as_deref().unwrap_or_default()
    }

    pub fn set_finalizers(&mut self, finalizers: Vec<String>) {
        self.meta_mut().finalizers = Some(finalizers);
    }

    pub fn deletion_timestamp(&self) -> Option<&Time> {
        self.meta().deletion_timestamp.as_ref()
    }

    pub fn pod_template(&self) -> Option<&PodTemplateSpec> {
        match self {
            Workload::Deployment(d) => d.spec.as_ref().map(|s| &s.template),
            Workload::StatefulSet(s) => s.spec.as_ref().map(|s| &s.template),
        }
    }

    pub fn pod_template_mut(&mut self) -> Option<&mut PodTemplateSpec> {
        match self {
            Workload::Deployment(d) => d.spec.as_mut().map(|s| &mut s.template),
            Workload::StatefulSet(s) => s.spec.as_mut().map(|s| &mut s.template),
        }
    }

    pub fn set_pod_template(&mut self, template: PodTemplateSpec) {
        if let Some(current) = self.pod_template_mut() {
            *current = template;
        }
    }

    /// The fingerprint currently stored on the pod template
    pub fn config_hash(&self) -> Option<&str> {
        self.pod_template()?
            .metadata
            .as_ref()?
            .annotations
            .as_ref()?
            .get(CONFIG_HASH_ANNOTATION)
            .map(String::as_str)
    }

    /// Store `hash` on the pod template. Returns false when it was already there
    /// or the workload has no spec to carry it.
    pub fn set_config_hash(&mut self, hash: &str) -> bool {
        let Some(template) = self.pod_template_mut() else {
            return false;
        };
        let annotations = template
            .metadata
            .get_or_insert_with(ObjectMeta::default)
            .annotations
            .get_or_insert_with(BTreeMap::new);
        if annotations.get(CONFIG_HASH_ANNOTATION).map(String::as_str) == Some(hash) {
            return false;
        }
        annotations.insert(CONFIG_HASH_ANNOTATION.to_string(), hash.to_string());
        true
    }

    /// Drop the fingerprint from the pod template. Returns whether one was removed.
    pub fn remove_config_hash(&mut self) -> bool {
        self.pod_template_mut()
            .and_then(|t| t.metadata.as_mut())
            .and_then(|m| m.annotations.as_mut())
            .is_some_and(|a| a.remove(CONFIG_HASH_ANNOTATION).is_some())
    }

    /// Owner reference that children carry to point back at this workload.
    ///
    /// Never a controller reference: a ConfigMap can be shared by many workloads.
    pub fn owner_reference(&self) -> OwnerReference {
        OwnerReference {
            api_version: APPS_API_VERSION.to_string(),
            kind: self.kind().as_str().to_string(),
            name: self.name().to_string(),
            uid: self.uid().unwrap_or_default().to_string(),
            block_owner_deletion: Some(true),
            controller: Some(false),
        }
    }

    /// Reference used to attribute events to this workload
    pub fn object_reference(&self) -> ObjectReference {
        match self {
            Workload::Deployment(d) => d.object_ref(&()),
            Workload::StatefulSet(s) => s.object_ref(&()),
        }
    }
}
