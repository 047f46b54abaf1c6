//! # Cluster
//!
//! The slice of the Kubernetes API the reconciler consumes.
//!
//! Everything the reconciler reads or writes goes through [`ClusterClient`] so the
//! orchestration logic can be exercised against an in-memory cluster in tests.
//! [`KubeClusterClient`] is the production implementation on top of `kube::Api`.
//!
//! Writes are full-object replaces carrying the `resourceVersion` that was read,
//! so a concurrent writer surfaces as [`ReconcilerError::Conflict`] rather than
//! a lost update.

use crate::controller::reconciler::children::{ConfigKind, ConfigObject};
use crate::controller::reconciler::types::ReconcilerError;
use crate::workload::{Workload, WorkloadKey, WorkloadKind};
use async_trait::async_trait;
use k8s_openapi::api::apps::v1::{Deployment, StatefulSet};
use k8s_openapi::api::core::v1::{ConfigMap, Secret};
use kube::api::{ListParams, PostParams};
use kube::{Api, Client};
use std::fmt;

#[async_trait]
pub trait ClusterClient: Send + Sync + fmt::Debug {
    /// Fetch a workload. `Ok(None)` when it does not exist.
    async fn get_workload(&self, key: &WorkloadKey) -> Result<Option<Workload>, ReconcilerError>;

    /// Replace a workload, returning the stored object
    async fn update_workload(&self, workload: &Workload) -> Result<Workload, ReconcilerError>;

    /// Fetch a ConfigMap or Secret. `Ok(None)` when it does not exist.
    async fn get_config_object(
        &self,
        kind: ConfigKind,
        namespace: &str,
        name: &str,
    ) -> Result<Option<ConfigObject>, ReconcilerError>;

    /// All ConfigMaps or Secrets in a namespace
    async fn list_config_objects(
        &self,
        kind: ConfigKind,
        namespace: &str,
    ) -> Result<Vec<ConfigObject>, ReconcilerError>;

    /// Replace a ConfigMap or Secret, returning the stored object
    async fn update_config_object(
        &self,
        object: &ConfigObject,
    ) -> Result<ConfigObject, ReconcilerError>;
}

/// [`ClusterClient`] backed by the Kubernetes API server
#[derive(Clone)]
pub struct KubeClusterClient {
    client: Client,
}

impl fmt::Debug for KubeClusterClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KubeClusterClient").finish_non_exhaustive()
    }
}

impl KubeClusterClient {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

/// Map a 404 on read to `None`
fn found<T>(result: Result<T, kube::Error>) -> Result<Option<T>, ReconcilerError> {
    match result {
        Ok(obj) => Ok(Some(obj)),
        Err(kube::Error::Api(api_err)) if api_err.code == 404 => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Map write failures onto the reconciler's taxonomy
fn write_error(err: kube::Error, kind: &str, namespace: &str, name: &str) -> ReconcilerError {
    match err {
        kube::Error::Api(api_err) if api_err.code == 409 => ReconcilerError::Conflict {
            kind: kind.to_string(),
            namespace: namespace.to_string(),
            name: name.to_string(),
        },
        kube::Error::Api(api_err) if api_err.code == 404 => match kind {
            "ConfigMap" => ReconcilerError::NotFound {
                kind: ConfigKind::ConfigMap,
                namespace: namespace.to_string(),
                name: name.to_string(),
            },
            "Secret" => ReconcilerError::NotFound {
                kind: ConfigKind::Secret,
                namespace: namespace.to_string(),
                name: name.to_string(),
            },
            _ => kube::Error::Api(api_err).into(),
        },
        e => e.into(),
    }
}

#[async_trait]
impl ClusterClient for KubeClusterClient {
    async fn get_workload(&self, key: &WorkloadKey) -> Result<Option<Workload>, ReconcilerError> {
        match key.kind {
            WorkloadKind::Deployment => {
                let api: Api<Deployment> = Api::namespaced(self.client.clone(), &key.namespace);
                Ok(found(api.get(&key.name).await)?.map(Workload::from))
            }
            WorkloadKind::StatefulSet => {
                let api: Api<StatefulSet> = Api::namespaced(self.client.clone(), &key.namespace);
                Ok(found(api.get(&key.name).await)?.map(Workload::from))
            }
        }
    }

    async fn update_workload(&self, workload: &Workload) -> Result<Workload, ReconcilerError> {
        let namespace = workload.namespace();
        let name = workload.name();
        let kind = workload.kind().as_str();
        let pp = PostParams::default();
        match workload {
            Workload::Deployment(d) => {
                let api: Api<Deployment> = Api::namespaced(self.client.clone(), namespace);
                api.replace(name, &pp, d)
                    .await
                    .map(Workload::from)
                    .map_err(|e| write_error(e, kind, namespace, name))
            }
            Workload::StatefulSet(s) => {
                let api: Api<StatefulSet> = Api::namespaced(self.client.clone(), namespace);
                api.replace(name, &pp, s)
                    .await
                    .map(Workload::from)
                    .map_err(|e| write_error(e, kind, namespace, name))
            }
        }
    }

    async fn get_config_object(
        &self,
        kind: ConfigKind,
        namespace: &str,
        name: &str,
    ) -> Result<Option<ConfigObject>, ReconcilerError> {
        match kind {
            ConfigKind::ConfigMap => {
                let api: Api<ConfigMap> = Api::namespaced(self.client.clone(), namespace);
                Ok(found(api.get(name).await)?.map(ConfigObject::from))
            }
            ConfigKind::Secret => {
                let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
                Ok(found(api.get(name).await)?.map(ConfigObject::from))
            }
        }
    }

    async fn list_config_objects(
        &self,
        kind: ConfigKind,
        namespace: &str,
    ) -> Result<Vec<ConfigObject>, ReconcilerError> {
        let lp = ListParams::default();
        match kind {
            ConfigKind::ConfigMap => {
                let api: Api<ConfigMap> = Api::namespaced(self.client.clone(), namespace);
                let list = api.list(&lp).await?;
                Ok(list.items.into_iter().map(ConfigObject::from).collect())
            }
            ConfigKind::Secret => {
                let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
                let list = api.list(&lp).await?;
                Ok(list.items.into_iter().map(ConfigObject::from).collect())
            }
        }
    }

    async fn update_config_object(
        &self,
        object: &ConfigObject,
    ) -> Result<ConfigObject, ReconcilerError> {
        let namespace = object.namespace();
        let name = object.name();
        let kind = object.kind().as_str();
        let pp = PostParams::default();
        match object {
            ConfigObject::ConfigMap(cm) => {
                let api: Api<ConfigMap> = Api::namespaced(self.client.clone(), namespace);
                api.replace(name, &pp, cm)
                    .await
                    .map(ConfigObject::from)
                    .map_err(|e| write_error(e, kind, namespace, name))
            }
            ConfigObject::Secret(s) => {
                let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
                api.replace(name, &pp, s)
                    .await
                    .map(ConfigObject::from)
                    .map_err(|e| write_error(e, kind, namespace, name))
            }
        }
    }
}
