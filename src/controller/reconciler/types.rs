//! # Types
//!
//! Core types for the reconciler: the error taxonomy, the shared context handed to
//! every reconciliation, and per-workload backoff bookkeeping.

use crate::config::ControllerConfig;
use crate::controller::backoff::FibonacciBackoff;
use crate::controller::reconciler::children::ConfigKind;
use crate::controller::reconciler::handler::Handler;
use crate::workload::WorkloadKey;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReconcilerError {
    /// A required ConfigMap or Secret vanished between discovery and fetch
    #[error("{kind} {namespace}/{name} not found")]
    NotFound {
        kind: ConfigKind,
        namespace: String,
        name: String,
    },

    /// A write kept losing against concurrent writers
    #[error("conflict updating {kind} {namespace}/{name}: object was modified concurrently")]
    Conflict {
        kind: String,
        namespace: String,
        name: String,
    },

    /// Kubernetes API unavailable or returned an unexpected error
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    /// The hash source document could not be serialized
    #[error("failed to serialize configuration for hashing: {0}")]
    Hash(#[from] serde_json::Error),

    /// The object lacks metadata the controller depends on
    #[error("object is missing required metadata field `{0}`")]
    MissingMetadata(&'static str),
}

impl ReconcilerError {
    /// Whether a later attempt can succeed without anyone changing the workload.
    ///
    /// Everything is retried by the event source; this only decides how loudly
    /// a failure is reported.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        !matches!(self, ReconcilerError::MissingMetadata(_) | ReconcilerError::Hash(_))
    }

    /// Short label for metrics
    #[must_use]
    pub fn kind_label(&self) -> &'static str {
        match self {
            ReconcilerError::NotFound { .. } => "not_found",
            ReconcilerError::Conflict { .. } => "conflict",
            ReconcilerError::Kube(_) => "kube",
            ReconcilerError::Hash(_) => "hash",
            ReconcilerError::MissingMetadata(_) => "missing_metadata",
        }
    }
}

/// Backoff state for a specific workload
/// Tracks error count and backoff calculator for progressive retries
#[derive(Debug, Clone)]
pub struct BackoffState {
    pub backoff: FibonacciBackoff,
    pub error_count: u32,
}

impl BackoffState {
    #[must_use]
    pub fn new(min_seconds: u64, max_seconds: u64) -> Self {
        Self {
            backoff: FibonacciBackoff::new(min_seconds, max_seconds),
            error_count: 0,
        }
    }

    pub fn increment_error(&mut self) {
        self.error_count += 1;
    }

    pub fn reset(&mut self) {
        self.error_count = 0;
        self.backoff.reset();
    }
}

/// Shared context for every reconciliation
#[derive(Debug)]
pub struct Reconciler {
    pub handler: Handler,
    pub config: Arc<ControllerConfig>,
    // Keyed by workload identity so one failing workload never slows another
    pub backoff_states: Arc<Mutex<HashMap<WorkloadKey, BackoffState>>>,
}

impl Reconciler {
    #[must_use]
    pub fn new(handler: Handler, config: Arc<ControllerConfig>) -> Self {
        Self {
            handler,
            config,
            backoff_states: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Next retry delay for `key`, advancing its backoff
    pub fn next_backoff(&self, key: &WorkloadKey) -> (std::time::Duration, u32) {
        let min = self.config.backoff_min_secs;
        let max = self.config.backoff_max_secs;
        match self.backoff_states.lock() {
            Ok(mut states) => {
                let state = states
                    .entry(key.clone())
                    .or_insert_with(|| BackoffState::new(min, max));
                state.increment_error();
                (state.backoff.next_backoff(), state.error_count)
            }
            // A poisoned lock only loses backoff history, never correctness
            Err(_) => (std::time::Duration::from_secs(min.max(1)), 0),
        }
    }

    /// Forget any backoff for `key`. Returns whether it had been failing.
    pub fn reset_backoff(&self, key: &WorkloadKey) -> bool {
        self.backoff_states
            .lock()
            .ok()
            .and_then(|mut states| states.remove(key))
            .is_some_and(|state| state.error_count > 0)
    }
}
