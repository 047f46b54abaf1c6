//! # Events
//!
//! Kubernetes Events attributed to a workload, visible via `kubectl describe`.
//!
//! Publishing is fire-and-forget: failures are logged and never fail a
//! reconciliation.

use crate::constants::{ACTION_RECONCILE, REASON_CONFIG_CHANGED, REASON_UPDATE_FAILED};
use crate::workload::Workload;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::ObjectReference;
use kube::runtime::events::{Event, EventType, Recorder, Reporter};
use kube::Client;
use std::fmt;
use tracing::warn;

#[async_trait]
pub trait EventPublisher: Send + Sync + fmt::Debug {
    /// Publish an event on `resource_ref`. Never returns an error.
    async fn publish(
        &self,
        resource_ref: &ObjectReference,
        type_: EventType,
        reason: &str,
        action: &str,
        note: Option<String>,
    );
}

/// Production publisher wrapping `kube::runtime::events::Recorder`
pub struct KubeEventPublisher {
    recorder: Recorder,
}

impl fmt::Debug for KubeEventPublisher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KubeEventPublisher").finish_non_exhaustive()
    }
}

impl KubeEventPublisher {
    /// `controller_name` appears as the reporting component on events
    pub fn new(client: Client, controller_name: &str) -> Self {
        let reporter = Reporter {
            controller: controller_name.to_string(),
            instance: None,
        };
        Self {
            recorder: Recorder::new(client, reporter),
        }
    }
}

#[async_trait]
impl EventPublisher for KubeEventPublisher {
    async fn publish(
        &self,
        resource_ref: &ObjectReference,
        type_: EventType,
        reason: &str,
        action: &str,
        note: Option<String>,
    ) {
        let event = Event {
            type_,
            reason: reason.to_string(),
            note,
            action: action.to_string(),
            secondary: None,
        };
        if let Err(e) = self.recorder.publish(&event, resource_ref).await {
            warn!(
                reason,
                action,
                error = %e,
                "Failed to publish Kubernetes event"
            );
        }
    }
}

/// Publisher that drops every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopEventPublisher;

#[async_trait]
impl EventPublisher for NoopEventPublisher {
    async fn publish(
        &self,
        _resource_ref: &ObjectReference,
        _type_: EventType,
        _reason: &str,
        _action: &str,
        _note: Option<String>,
    ) {
    }
}

/// Human-readable note recorded when a workload's fingerprint changes
pub fn config_changed_note(hash: &str) -> String {
    format!("Configuration hash updated to {hash}")
}

pub async fn publish_config_changed(events: &dyn EventPublisher, workload: &Workload, hash: &str) {
    events
        .publish(
            &workload.object_reference(),
            EventType::Normal,
            REASON_CONFIG_CHANGED,
            ACTION_RECONCILE,
            Some(config_changed_note(hash)),
        )
        .await;
}

pub async fn publish_update_failed(
    events: &dyn EventPublisher,
    workload: &Workload,
    message: String,
) {
    events
        .publish(
            &workload.object_reference(),
            EventType::Warning,
            REASON_UPDATE_FAILED,
            ACTION_RECONCILE,
            Some(message),
        )
        .await;
}
