//! # Watch Loop
//!
//! Runs one kube-runtime `Controller` per workload kind. Each controller also
//! watches ConfigMaps and Secrets and maps them back to the workloads named in
//! their owner references, so a change to a linked child re-enqueues every
//! workload consuming it.

use crate::config::ControllerConfig;
use crate::controller::reconciler::{reconcile, Reconciler, ReconcilerError};
use crate::controller::server::ServerState;
use crate::runtime::error_policy::{handle_reconciliation_error, handle_watch_stream_error};
use crate::workload::WorkloadResource;
use futures::StreamExt;
use k8s_openapi::api::apps::v1::{Deployment, StatefulSet};
use k8s_openapi::api::core::v1::{ConfigMap, Secret};
use k8s_openapi::NamespaceResourceScope;
use kube::api::Api;
use kube::{Client, Resource};
use kube_runtime::controller::{self, Action};
use kube_runtime::reflector::ObjectRef;
use kube_runtime::{watcher, Controller};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Run the Deployment and StatefulSet controllers until a shutdown signal
pub async fn run_watch_loop(
    client: Client,
    reconciler: Arc<Reconciler>,
    server_state: Arc<ServerState>,
    config: Arc<ControllerConfig>,
) -> Result<(), anyhow::Error> {
    match config.watch_namespace.as_deref() {
        Some(ns) => info!("Starting controllers for namespace {}", ns),
        None => info!("Starting controllers for all namespaces"),
    }

    let deployments = workload_controller::<Deployment>(
        client.clone(),
        Arc::clone(&reconciler),
        &config,
    );
    let statefulsets = workload_controller::<StatefulSet>(client, reconciler, &config);

    futures::join!(deployments, statefulsets);

    server_state.set_ready(false);
    info!("Controller stopped gracefully");
    Ok(())
}

fn api_for<K>(client: Client, namespace: Option<&str>) -> Api<K>
where
    K: Resource<DynamicType = (), Scope = NamespaceResourceScope>,
{
    match namespace {
        Some(ns) => Api::namespaced(client, ns),
        None => Api::all(client),
    }
}

async fn workload_controller<K: WorkloadResource>(
    client: Client,
    reconciler: Arc<Reconciler>,
    config: &ControllerConfig,
) {
    let namespace = config.watch_namespace.as_deref();
    let workloads: Api<K> = api_for(client.clone(), namespace);
    let config_maps: Api<ConfigMap> = api_for(client.clone(), namespace);
    let secrets: Api<Secret> = api_for(client, namespace);

    let controller_config =
        controller::Config::default().concurrency(config.max_concurrent_reconciliations);

    Controller::new(workloads, watcher::Config::default())
        .owns(config_maps, watcher::Config::default())
        .owns(secrets, watcher::Config::default())
        .with_config(controller_config)
        .shutdown_on_signal()
        .run(
            reconcile::<K>,
            handle_reconciliation_error::<K>,
            reconciler,
        )
        .for_each(|result| async move { log_result::<K>(result) })
        .await;

    info!("{} controller stopped", K::KIND);
}

fn log_result<K: WorkloadResource>(
    result: Result<
        (ObjectRef<K>, Action),
        controller::Error<ReconcilerError, watcher::Error>,
    >,
) {
    match result {
        Ok((obj, _)) => debug!("Reconciled {} {}", K::KIND, obj),
        // Already logged and backed off by the error policy
        Err(controller::Error::ReconcilerFailed(_, obj)) => {
            debug!("Reconciliation of {} will be retried", obj);
        }
        Err(controller::Error::QueueError(e)) => handle_watch_stream_error(&e),
        Err(e) => warn!("{} controller error: {}", K::KIND, e),
    }
}
