//! Common test utilities for reconciler integration tests
//!
//! Provides an in-memory cluster that behaves like the API server where it
//! matters to the reconciler (resource versions, 409 on stale writes,
//! finalizer-gated deletion), a recording event publisher, and fixtures for
//! workloads and their ConfigMaps and Secrets.

#![allow(dead_code, reason = "Each test binary uses a different subset")]

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec, StatefulSet, StatefulSetSpec};
use k8s_openapi::api::core::v1::{
    ConfigMap, ConfigMapEnvSource, ConfigMapVolumeSource, Container, EnvFromSource, EnvVar,
    EnvVarSource, ObjectReference, PodSpec, PodTemplateSpec, Secret, SecretEnvSource,
    SecretKeySelector, SecretVolumeSource, Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference, Time};
use k8s_openapi::ByteString;
use kube::error::ErrorResponse;
use kube::runtime::events::EventType;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use wave_controller::cluster::ClusterClient;
use wave_controller::constants::REQUIRED_ANNOTATION;
use wave_controller::controller::reconciler::children::{ConfigKind, ConfigObject};
use wave_controller::controller::reconciler::events::EventPublisher;
use wave_controller::controller::reconciler::owner_references::add_owner_reference;
use wave_controller::controller::reconciler::{Handler, ReconcilerError};
use wave_controller::workload::{Workload, WorkloadKey, WorkloadKind};

pub const NAMESPACE: &str = "apps";

type ChildKey = (ConfigKind, String, String);

#[derive(Debug, Default)]
struct State {
    workloads: BTreeMap<WorkloadKey, Workload>,
    children: BTreeMap<ChildKey, ConfigObject>,
    version: u64,
    workload_writes: usize,
    child_writes: usize,
    races: BTreeMap<ChildKey, (u32, OwnerReference)>,
    unavailable: bool,
}

impl State {
    fn next_version(&mut self) -> String {
        self.version += 1;
        self.version.to_string()
    }
}

fn api_error(code: u16, message: &str) -> kube::Error {
    kube::Error::Api(ErrorResponse {
        status: "Failure".to_string(),
        message: message.to_string(),
        reason: String::new(),
        code,
    })
}

fn unavailable() -> ReconcilerError {
    api_error(503, "the server is currently unable to handle the request").into()
}

fn child_key(kind: ConfigKind, name: &str) -> ChildKey {
    (kind, NAMESPACE.to_string(), name.to_string())
}

/// In-memory cluster enforcing optimistic concurrency on every write
#[derive(Debug, Default)]
pub struct FakeCluster {
    state: Mutex<State>,
}

impl FakeCluster {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn insert_workload(&self, workload: impl Into<Workload>) -> WorkloadKey {
        let mut workload = workload.into();
        let mut state = self.state.lock().unwrap();
        workload.meta_mut().resource_version = Some(state.next_version());
        let key = workload.key();
        state.workloads.insert(key.clone(), workload);
        key
    }

    pub fn insert_config_map(&self, config_map: ConfigMap) {
        self.insert_child(ConfigObject::ConfigMap(config_map));
    }

    pub fn insert_secret(&self, secret: Secret) {
        self.insert_child(ConfigObject::Secret(secret));
    }

    fn insert_child(&self, mut object: ConfigObject) {
        let mut state = self.state.lock().unwrap();
        object.meta_mut().resource_version = Some(state.next_version());
        let key = (
            object.kind(),
            object.namespace().to_string(),
            object.name().to_string(),
        );
        state.children.insert(key, object);
    }

    pub fn workload(&self, key: &WorkloadKey) -> Option<Workload> {
        self.state.lock().unwrap().workloads.get(key).cloned()
    }

    pub fn child(&self, kind: ConfigKind, name: &str) -> Option<ConfigObject> {
        self.state
            .lock()
            .unwrap()
            .children
            .get(&child_key(kind, name))
            .cloned()
    }

    /// UIDs of every owner reference on a child, in order
    pub fn owner_uids(&self, kind: ConfigKind, name: &str) -> Vec<String> {
        self.child(kind, name)
            .map(|c| c.owner_references().iter().map(|r| r.uid.clone()).collect())
            .unwrap_or_default()
    }

    /// Change a workload the way a user or another controller would
    pub fn modify_workload(&self, key: &WorkloadKey, f: impl FnOnce(&mut Workload)) {
        let mut state = self.state.lock().unwrap();
        let version = state.next_version();
        let workload = state.workloads.get_mut(key).expect("workload exists");
        f(workload);
        workload.meta_mut().resource_version = Some(version);
    }

    /// Change a child the way a user or another controller would
    pub fn modify_child(&self, kind: ConfigKind, name: &str, f: impl FnOnce(&mut ConfigObject)) {
        let mut state = self.state.lock().unwrap();
        let version = state.next_version();
        let child = state
            .children
            .get_mut(&child_key(kind, name))
            .expect("child exists");
        f(child);
        child.meta_mut().resource_version = Some(version);
    }

    pub fn delete_child(&self, kind: ConfigKind, name: &str) {
        self.state
            .lock()
            .unwrap()
            .children
            .remove(&child_key(kind, name));
    }

    /// Make the next `times` writes to a child lose against a concurrent writer
    /// that adds `owner` to it first
    pub fn race_child_updates(&self, kind: ConfigKind, name: &str, times: u32, owner: OwnerReference) {
        self.state
            .lock()
            .unwrap()
            .races
            .insert(child_key(kind, name), (times, owner));
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.state.lock().unwrap().unavailable = unavailable;
    }

    pub fn workload_writes(&self) -> usize {
        self.state.lock().unwrap().workload_writes
    }

    pub fn child_writes(&self) -> usize {
        self.state.lock().unwrap().child_writes
    }

    pub fn total_writes(&self) -> usize {
        let state = self.state.lock().unwrap();
        state.workload_writes + state.child_writes
    }
}

#[async_trait]
impl ClusterClient for FakeCluster {
    async fn get_workload(&self, key: &WorkloadKey) -> Result<Option<Workload>, ReconcilerError> {
        let state = self.state.lock().unwrap();
        if state.unavailable {
            return Err(unavailable());
        }
        Ok(state.workloads.get(key).cloned())
    }

    async fn update_workload(&self, workload: &Workload) -> Result<Workload, ReconcilerError> {
        let mut guard = self.state.lock().unwrap();
        let state = &mut *guard;
        if state.unavailable {
            return Err(unavailable());
        }
        let key = workload.key();
        let Some(stored) = state.workloads.get(&key) else {
            return Err(api_error(404, "workload not found").into());
        };
        if stored.meta().resource_version != workload.meta().resource_version {
            return Err(ReconcilerError::Conflict {
                kind: key.kind.to_string(),
                namespace: key.namespace.clone(),
                name: key.name.clone(),
            });
        }

        let mut updated = workload.clone();
        updated.meta_mut().resource_version = Some(state.next_version());
        state.workload_writes += 1;

        // Finalizers gone on a deleted object: the API server removes it
        if updated.deletion_timestamp().is_some() && updated.finalizers().is_empty() {
            state.workloads.remove(&key);
        } else {
            state.workloads.insert(key, updated.clone());
        }
        Ok(updated)
    }

    async fn get_config_object(
        &self,
        kind: ConfigKind,
        namespace: &str,
        name: &str,
    ) -> Result<Option<ConfigObject>, ReconcilerError> {
        let state = self.state.lock().unwrap();
        if state.unavailable {
            return Err(unavailable());
        }
        Ok(state
            .children
            .get(&(kind, namespace.to_string(), name.to_string()))
            .cloned())
    }

    async fn list_config_objects(
        &self,
        kind: ConfigKind,
        namespace: &str,
    ) -> Result<Vec<ConfigObject>, ReconcilerError> {
        let state = self.state.lock().unwrap();
        if state.unavailable {
            return Err(unavailable());
        }
        Ok(state
            .children
            .iter()
            .filter(|((k, ns, _), _)| *k == kind && ns == namespace)
            .map(|(_, object)| object.clone())
            .collect())
    }

    async fn update_config_object(
        &self,
        object: &ConfigObject,
    ) -> Result<ConfigObject, ReconcilerError> {
        let mut guard = self.state.lock().unwrap();
        let state = &mut *guard;
        if state.unavailable {
            return Err(unavailable());
        }
        let key = (
            object.kind(),
            object.namespace().to_string(),
            object.name().to_string(),
        );

        let racer = state.races.get_mut(&key).and_then(|(remaining, owner)| {
            (*remaining > 0).then(|| {
                *remaining -= 1;
                owner.clone()
            })
        });
        if let Some(owner) = racer {
            let version = state.next_version();
            if let Some(stored) = state.children.get_mut(&key) {
                add_owner_reference(stored, &owner);
                stored.meta_mut().resource_version = Some(version);
            }
        }

        let Some(stored) = state.children.get(&key) else {
            return Err(ReconcilerError::NotFound {
                kind: key.0,
                namespace: key.1,
                name: key.2,
            });
        };
        if stored.meta().resource_version != object.meta().resource_version {
            return Err(ReconcilerError::Conflict {
                kind: key.0.to_string(),
                namespace: key.1,
                name: key.2,
            });
        }

        let mut updated = object.clone();
        updated.meta_mut().resource_version = Some(state.next_version());
        state.child_writes += 1;
        state.children.insert(key, updated.clone());
        Ok(updated)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedEvent {
    pub warning: bool,
    pub reason: String,
    pub note: Option<String>,
    pub object: Option<String>,
}

/// Event publisher that keeps everything it is given
#[derive(Debug, Default)]
pub struct RecordingEvents {
    events: Mutex<Vec<RecordedEvent>>,
}

impl RecordingEvents {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<RecordedEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn with_reason(&self, reason: &str) -> Vec<RecordedEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.reason == reason)
            .collect()
    }
}

#[async_trait]
impl EventPublisher for RecordingEvents {
    async fn publish(
        &self,
        resource_ref: &ObjectReference,
        type_: EventType,
        reason: &str,
        _action: &str,
        note: Option<String>,
    ) {
        self.events.lock().unwrap().push(RecordedEvent {
            warning: matches!(type_, EventType::Warning),
            reason: reason.to_string(),
            note,
            object: resource_ref.name.clone(),
        });
    }
}

/// A handler wired to a fresh in-memory cluster
pub struct Harness {
    pub cluster: Arc<FakeCluster>,
    pub events: Arc<RecordingEvents>,
    pub handler: Handler,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_conflict_attempts(5)
    }

    pub fn with_conflict_attempts(attempts: u32) -> Self {
        let cluster = FakeCluster::new();
        let events = RecordingEvents::new();
        let handler = Handler::new(
            Arc::clone(&cluster) as Arc<dyn ClusterClient>,
            Arc::clone(&events) as Arc<dyn EventPublisher>,
            attempts,
        );
        Self {
            cluster,
            events,
            handler,
        }
    }
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

fn child_meta(name: &str) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_string()),
        namespace: Some(NAMESPACE.to_string()),
        uid: Some(format!("uid-{name}")),
        ..ObjectMeta::default()
    }
}

pub fn config_map(name: &str, data: &[(&str, &str)]) -> ConfigMap {
    ConfigMap {
        metadata: child_meta(name),
        data: Some(
            data.iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect(),
        ),
        ..ConfigMap::default()
    }
}

pub fn secret(name: &str, data: &[(&str, &str)]) -> Secret {
    Secret {
        metadata: child_meta(name),
        data: Some(
            data.iter()
                .map(|(k, v)| ((*k).to_string(), ByteString(v.as_bytes().to_vec())))
                .collect(),
        ),
        ..Secret::default()
    }
}

/// Replace a ConfigMap's data in place
pub fn set_config_map_data(object: &mut ConfigObject, key: &str, value: &str) {
    if let ConfigObject::ConfigMap(cm) = object {
        cm.data
            .get_or_insert_with(BTreeMap::new)
            .insert(key.to_string(), value.to_string());
    }
}

pub fn foreign_owner(uid: &str) -> OwnerReference {
    OwnerReference {
        api_version: "apps/v1".to_string(),
        kind: "Deployment".to_string(),
        name: format!("other-{uid}"),
        uid: uid.to_string(),
        block_owner_deletion: Some(true),
        controller: Some(false),
    }
}

/// Builds a pod template one container at a time
#[derive(Debug, Default)]
pub struct TemplateBuilder {
    containers: Vec<Container>,
    volumes: Vec<Volume>,
}

impl TemplateBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Container `name` mounting ConfigMap `cm` as a volume
    pub fn mounts_config_map(mut self, name: &str, cm: &str) -> Self {
        let volume = format!("{cm}-volume");
        self.volumes.push(Volume {
            name: volume.clone(),
            config_map: Some(ConfigMapVolumeSource {
                name: cm.to_string(),
                ..ConfigMapVolumeSource::default()
            }),
            ..Volume::default()
        });
        self.containers.push(mounting_container(name, &volume));
        self
    }

    /// Container `name` mounting Secret `secret` as a volume
    pub fn mounts_secret(mut self, name: &str, secret: &str) -> Self {
        let volume = format!("{secret}-volume");
        self.volumes.push(Volume {
            name: volume.clone(),
            secret: Some(SecretVolumeSource {
                secret_name: Some(secret.to_string()),
                ..SecretVolumeSource::default()
            }),
            ..Volume::default()
        });
        self.containers.push(mounting_container(name, &volume));
        self
    }

    /// Container `name` importing ConfigMap `cm` with `envFrom`
    pub fn env_from_config_map(mut self, name: &str, cm: &str, optional: bool) -> Self {
        self.containers.push(Container {
            name: name.to_string(),
            env_from: Some(vec![EnvFromSource {
                config_map_ref: Some(ConfigMapEnvSource {
                    name: cm.to_string(),
                    optional: Some(optional),
                }),
                ..EnvFromSource::default()
            }]),
            ..Container::default()
        });
        self
    }

    /// Container `name` importing Secret `secret` with `envFrom`
    pub fn env_from_secret(mut self, name: &str, secret: &str, optional: bool) -> Self {
        self.containers.push(Container {
            name: name.to_string(),
            env_from: Some(vec![EnvFromSource {
                secret_ref: Some(SecretEnvSource {
                    name: secret.to_string(),
                    optional: Some(optional),
                }),
                ..EnvFromSource::default()
            }]),
            ..Container::default()
        });
        self
    }

    /// Container `name` reading one key of Secret `secret`
    pub fn secret_key_ref(mut self, name: &str, secret: &str, key: &str) -> Self {
        self.containers.push(Container {
            name: name.to_string(),
            env: Some(vec![EnvVar {
                name: key.to_uppercase(),
                value_from: Some(EnvVarSource {
                    secret_key_ref: Some(SecretKeySelector {
                        name: secret.to_string(),
                        key: key.to_string(),
                        optional: None,
                    }),
                    ..EnvVarSource::default()
                }),
                ..EnvVar::default()
            }]),
            ..Container::default()
        });
        self
    }

    pub fn build(self) -> PodTemplateSpec {
        PodTemplateSpec {
            metadata: None,
            spec: Some(PodSpec {
                containers: self.containers,
                volumes: (!self.volumes.is_empty()).then_some(self.volumes),
                ..PodSpec::default()
            }),
        }
    }
}

fn mounting_container(name: &str, volume: &str) -> Container {
    Container {
        name: name.to_string(),
        volume_mounts: Some(vec![VolumeMount {
            name: volume.to_string(),
            mount_path: format!("/etc/{volume}"),
            ..VolumeMount::default()
        }]),
        ..Container::default()
    }
}

fn workload_meta(name: &str, uid: &str, enabled: bool) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_string()),
        namespace: Some(NAMESPACE.to_string()),
        uid: Some(uid.to_string()),
        annotations: enabled
            .then(|| [(REQUIRED_ANNOTATION.to_string(), "true".to_string())].into()),
        ..ObjectMeta::default()
    }
}

pub fn stateful_set(name: &str, uid: &str, template: PodTemplateSpec, enabled: bool) -> StatefulSet {
    StatefulSet {
        metadata: workload_meta(name, uid, enabled),
        spec: Some(StatefulSetSpec {
            template,
            ..StatefulSetSpec::default()
        }),
        ..StatefulSet::default()
    }
}

pub fn deployment(name: &str, uid: &str, template: PodTemplateSpec, enabled: bool) -> Deployment {
    Deployment {
        metadata: workload_meta(name, uid, enabled),
        spec: Some(DeploymentSpec {
            template,
            ..DeploymentSpec::default()
        }),
        ..Deployment::default()
    }
}

pub fn key(kind: WorkloadKind, name: &str) -> WorkloadKey {
    WorkloadKey::new(kind, NAMESPACE, name)
}

pub fn set_enabled(workload: &mut Workload, enabled: bool) {
    let mut annotations = workload.annotations().cloned().unwrap_or_default();
    if enabled {
        annotations.insert(REQUIRED_ANNOTATION.to_string(), "true".to_string());
    } else {
        annotations.remove(REQUIRED_ANNOTATION);
    }
    workload.set_annotations(annotations);
}

/// Mark a workload for deletion the way the API server does
pub fn mark_deleted(workload: &mut Workload) {
    let timestamp: Time =
        serde_json::from_str("\"2024-01-01T00:00:00Z\"").expect("valid RFC 3339 timestamp");
    workload.meta_mut().deletion_timestamp = Some(timestamp);
}

/// Drop every container whose name matches
pub fn remove_container(workload: &mut Workload, name: &str) {
    if let Some(spec) = workload.pod_template_mut().and_then(|t| t.spec.as_mut()) {
        spec.containers.retain(|c| c.name != name);
    }
}
