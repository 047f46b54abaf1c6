//! # Runtime
//!
//! Process wiring around the reconciler.
//!
//! - `initialization`: rustls, tracing, metrics, HTTP server and client setup
//! - `watch_loop`: kube-runtime controllers for each workload kind
//! - `error_policy`: per-workload retry backoff and watch error logging

pub mod error_policy;
pub mod initialization;
pub mod watch_loop;
