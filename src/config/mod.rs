//! # Configuration
//!
//! Controller and HTTP server settings, loaded once at startup from environment
//! variables. Every setting has a default in [`crate::constants`].

mod controller;

pub use controller::{ControllerConfig, ServerConfig};
