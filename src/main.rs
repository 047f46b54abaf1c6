//! # Wave Controller
//!
//! A Kubernetes controller that triggers a rolling update of a Deployment or
//! StatefulSet whenever a ConfigMap or Secret mounted into its pods changes.
//!
//! ## Overview
//!
//! For every workload annotated with `wave.pusher.com/update-on-config-change: "true"`:
//!
//! 1. **Finds its configuration** - ConfigMaps and Secrets referenced by volumes,
//!    `envFrom` and `valueFrom` in the pod template
//! 2. **Tracks ownership** - adds an owner reference from each child back to the
//!    workload so child changes re-trigger reconciliation
//! 3. **Fingerprints it** - writes a SHA-256 of the children's content to the pod
//!    template annotation `wave.pusher.com/config-hash`
//! 4. **Cleans up** - a finalizer guarantees owner references are removed before
//!    the workload is deleted
//!
//! ## Configuration
//!
//! All settings come from environment variables; see `wave_controller::config`.

use anyhow::Result;
use wave_controller::runtime::{initialization::initialize, watch_loop::run_watch_loop};

#[tokio::main]
async fn main() -> Result<()> {
    let init_result = initialize().await?;

    run_watch_loop(
        init_result.client,
        init_result.reconciler,
        init_result.server_state,
        init_result.controller_config,
    )
    .await?;

    Ok(())
}
