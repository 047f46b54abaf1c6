//! # Prelude
//!
//! Re-exports commonly used types and traits for convenience.
//!
//! ## Usage
//!
//! ```rust
//! use wave_controller::prelude::*;
//! ```

// Workload abstraction
pub use crate::workload::{Workload, WorkloadKey, WorkloadKind, WorkloadResource};

// Cluster access
pub use crate::cluster::{ClusterClient, KubeClusterClient};

// Reconciler types - core controller functionality
pub use crate::controller::reconciler::children::{ChildRef, ConfigKind, ConfigObject};
pub use crate::controller::reconciler::events::EventPublisher;
pub use crate::controller::reconciler::{
    reconcile, BackoffState, Handler, ReconcileOutcome, Reconciler, ReconcilerError,
};

// Config types - for configuration management
pub use crate::config::{ControllerConfig, ServerConfig};
