//! # Children
//!
//! Discovery of the ConfigMaps and Secrets a workload's pod template depends on.
//!
//! A child is referenced when a container:
//! - mounts a volume backed by a ConfigMap or Secret (directly or via a projected volume)
//! - pulls environment variables from one with `envFrom`
//! - takes a single variable from one with `valueFrom.configMapKeyRef` / `secretKeyRef`
//!
//! Init containers count as containers. Extraction never fails and never talks to
//! the API server; [`resolve_children`] turns the references into live objects.

use crate::cluster::ClusterClient;
use crate::controller::reconciler::types::ReconcilerError;
use k8s_openapi::api::core::v1::{ConfigMap, Container, PodTemplateSpec, Secret, Volume};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use tracing::debug;

/// The two kinds of configuration object a pod can consume
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ConfigKind {
    ConfigMap,
    Secret,
}

impl ConfigKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfigKind::ConfigMap => "ConfigMap",
            ConfigKind::Secret => "Secret",
        }
    }
}

impl fmt::Display for ConfigKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A (kind, name) pair; children always live in the workload's namespace
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChildRef {
    pub kind: ConfigKind,
    pub name: String,
}

impl ChildRef {
    pub fn new(kind: ConfigKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
        }
    }

    pub fn config_map(name: impl Into<String>) -> Self {
        Self::new(ConfigKind::ConfigMap, name)
    }

    pub fn secret(name: impl Into<String>) -> Self {
        Self::new(ConfigKind::Secret, name)
    }
}

impl fmt::Display for ChildRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.name)
    }
}

/// Set of children referenced by a pod template.
///
/// Each entry remembers whether every reference to it was marked `optional`.
/// A child referenced once as required stays required.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReferenceSet {
    refs: BTreeMap<ChildRef, bool>,
}

impl ReferenceSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a reference. References without a name cannot be resolved and are
    /// dropped; returns whether the reference was kept.
    pub fn insert(&mut self, kind: ConfigKind, name: &str, optional: bool) -> bool {
        if name.trim().is_empty() {
            debug!(child.kind = %kind, "Skipping reference with empty name");
            return false;
        }
        self.refs
            .entry(ChildRef::new(kind, name))
            .and_modify(|existing| *existing = *existing && optional)
            .or_insert(optional);
        true
    }

    pub fn contains(&self, child: &ChildRef) -> bool {
        self.refs.contains_key(child)
    }

    /// Whether a missing object may be tolerated for this child
    pub fn is_optional(&self, child: &ChildRef) -> bool {
        self.refs.get(child).copied().unwrap_or(false)
    }

    /// References in (kind, name) order
    pub fn iter(&self) -> impl Iterator<Item = (&ChildRef, bool)> {
        self.refs.iter().map(|(child, optional)| (child, *optional))
    }

    pub fn len(&self) -> usize {
        self.refs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.refs.is_empty()
    }
}

/// Collect every ConfigMap and Secret the pod template references
pub fn extract_references(template: &PodTemplateSpec) -> ReferenceSet {
    let mut refs = ReferenceSet::new();
    let Some(spec) = template.spec.as_ref() else {
        return refs;
    };

    let volumes: HashMap<&str, &Volume> = spec
        .volumes
        .iter()
        .flatten()
        .map(|v| (v.name.as_str(), v))
        .collect();

    let containers = spec
        .containers
        .iter()
        .chain(spec.init_containers.iter().flatten());

    for container in containers {
        collect_volume_references(container, &volumes, &mut refs);
        collect_env_from_references(container, &mut refs);
        collect_env_references(container, &mut refs);
    }

    refs
}

fn collect_volume_references(
    container: &Container,
    volumes: &HashMap<&str, &Volume>,
    refs: &mut ReferenceSet,
) {
    for mount in container.volume_mounts.iter().flatten() {
        let Some(volume) = volumes.get(mount.name.as_str()) else {
            debug!(volume = %mount.name, "Volume mount has no matching volume");
            continue;
        };

        if let Some(cm) = &volume.config_map {
            refs.insert(ConfigKind::ConfigMap, &cm.name, cm.optional.unwrap_or(false));
        }
        if let Some(secret) = &volume.secret {
            refs.insert(
                ConfigKind::Secret,
                secret.secret_name.as_deref().unwrap_or_default(),
                secret.optional.unwrap_or(false),
            );
        }
        if let Some(projected) = &volume.projected {
            for source in projected.sources.iter().flatten() {
                if let Some(cm) = &source.config_map {
                    refs.insert(ConfigKind::ConfigMap, &cm.name, cm.optional.unwrap_or(false));
                }
                if let Some(secret) = &source.secret {
                    refs.insert(ConfigKind::Secret, &secret.name, secret.optional.unwrap_or(false));
                }
            }
        }
    }
}

fn collect_env_from_references(container: &Container, refs: &mut ReferenceSet) {
    for source in container.env_from.iter().flatten() {
        if let Some(cm) = &source.config_map_ref {
            refs.insert(ConfigKind::ConfigMap, &cm.name, cm.optional.unwrap_or(false));
        }
        if let Some(secret) = &source.secret_ref {
            refs.insert(ConfigKind::Secret, &secret.name, secret.optional.unwrap_or(false));
        }
    }
}

fn collect_env_references(container: &Container, refs: &mut ReferenceSet) {
    for var in container.env.iter().flatten() {
        let Some(value_from) = &var.value_from else {
            continue;
        };
        if let Some(key_ref) = &value_from.config_map_key_ref {
            refs.insert(
                ConfigKind::ConfigMap,
                &key_ref.name,
                key_ref.optional.unwrap_or(false),
            );
        }
        if let Some(key_ref) = &value_from.secret_key_ref {
            refs.insert(ConfigKind::Secret, &key_ref.name, key_ref.optional.unwrap_or(false));
        }
    }
}

/// A live ConfigMap or Secret
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigObject {
    ConfigMap(ConfigMap),
    Secret(Secret),
}

impl From<ConfigMap> for ConfigObject {
    fn from(value: ConfigMap) -> Self {
        ConfigObject::ConfigMap(value)
    }
}

impl From<Secret> for ConfigObject {
    fn from(value: Secret) -> Self {
        ConfigObject::Secret(value)
    }
}

impl ConfigObject {
    #[must_use]
    pub fn kind(&self) -> ConfigKind {
        match self {
            ConfigObject::ConfigMap(_) => ConfigKind::ConfigMap,
            ConfigObject::Secret(_) => ConfigKind::Secret,
        }
    }

    pub fn meta(&self) -> &ObjectMeta {
        match self {
            ConfigObject::ConfigMap(cm) => &cm.metadata,
            ConfigObject::Secret(s) => &s.metadata,
        }
    }

    pub fn meta_mut(&mut self) -> &mut ObjectMeta {
        match self {
            ConfigObject::ConfigMap(cm) => &mut cm.metadata,
            ConfigObject::Secret(s) => &mut s.metadata,
        }
    }

    pub fn name(&self) -> &str {
        self.meta().name.as_deref().unwrap_or_default()
    }

    pub fn namespace(&self) -> &str {
        self.meta().namespace.as_deref().unwrap_or("default")
    }

    pub fn child_ref(&self) -> ChildRef {
        ChildRef::new(self.kind(), self.name())
    }

    pub fn owner_references(&self) -> &[OwnerReference] {
        self.meta().owner_references.as_deref().unwrap_or_default()
    }
}

/// A referenced child together with its live object, if it exists
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedChild {
    pub reference: ChildRef,
    pub optional: bool,
    pub object: Option<ConfigObject>,
}

/// Fetch the live object for every reference.
///
/// Missing objects resolve to `None`; whether that is acceptable is decided by
/// the caller, which knows if the reference was optional.
pub async fn resolve_children(
    client: &dyn ClusterClient,
    namespace: &str,
    refs: &ReferenceSet,
) -> Result<Vec<ResolvedChild>, ReconcilerError> {
    let mut resolved = Vec::with_capacity(refs.len());
    for (child, optional) in refs.iter() {
        let object = client
            .get_config_object(child.kind, namespace, &child.name)
            .await?;
        if object.is_none() {
            debug!(
                child.kind = %child.kind,
                child.name = %child.name,
                optional,
                "Referenced child not found"
            );
        }
        resolved.push(ResolvedChild {
            reference: child.clone(),
            optional,
            object,
        });
    }
    Ok(resolved)
}
