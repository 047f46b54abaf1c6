//! Wave Controller Library
//!
//! Restarts Deployments and StatefulSets whenever a ConfigMap or Secret they
//! consume changes. Workloads opt in with the
//! `wave.pusher.com/update-on-config-change: "true"` annotation.
//!
//! ## Quick Start
//!
//! ```rust
//! use wave_controller::prelude::*;
//! ```
//!
//! This brings commonly used types and traits into scope. For more specific imports,
//! use the individual modules.

pub mod cluster;
pub mod config;
pub mod constants;
pub mod controller;
pub mod observability;
pub mod prelude;
pub mod runtime;
pub mod workload;
