//! # Initialization
//!
//! Controller initialization logic including rustls setup, tracing, metrics,
//! server startup, and Kubernetes client setup.

use crate::cluster::KubeClusterClient;
use crate::config::{ControllerConfig, ServerConfig};
use crate::controller::reconciler::events::KubeEventPublisher;
use crate::controller::reconciler::{Handler, Reconciler};
use crate::controller::server::{start_server, ServerState};
use crate::observability;
use anyhow::{Context, Result};
use kube::Client;
use std::sync::Arc;
use tracing::{error, info};

/// Initialization result containing all necessary components for the controller
pub struct InitializationResult {
    /// Kubernetes client
    pub client: Client,
    /// Reconciler context
    pub reconciler: Arc<Reconciler>,
    /// Server state for health checks
    pub server_state: Arc<ServerState>,
    /// Controller configuration
    pub controller_config: Arc<ControllerConfig>,
}

impl std::fmt::Debug for InitializationResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InitializationResult")
            .field("server_ready", &self.server_state.is_ready())
            .field("controller_config", &self.controller_config)
            .finish_non_exhaustive()
    }
}

/// Initialize the controller runtime
///
/// This function handles:
/// - rustls crypto provider setup
/// - Tracing subscriber setup
/// - Metrics registration
/// - HTTP server startup
/// - Kubernetes client creation
/// - Reconciler setup
pub async fn initialize() -> Result<InitializationResult> {
    // Required for rustls 0.23+ when no default provider is set via features
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|existing| {
            anyhow::anyhow!("Failed to install rustls crypto provider: {existing:?} already set")
        })?;

    let controller_config = Arc::new(ControllerConfig::from_env());
    let server_config = ServerConfig::from_env();

    init_tracing(&controller_config);

    info!("Starting wave controller");
    info!(
        "Build info: datetime={}, git_hash={}",
        env!("BUILD_DATETIME"),
        env!("BUILD_GIT_HASH")
    );
    info!(?controller_config, "Loaded configuration");

    observability::metrics::register_metrics()?;

    let server_state = Arc::new(ServerState::default());

    // Start server in background task
    let server_state_clone = Arc::clone(&server_state);
    let server_port = server_config.metrics_port;
    let server_handle = tokio::spawn(async move {
        if let Err(e) = start_server(server_port, server_state_clone).await {
            error!("HTTP server error: {}", e);
        }
    });

    // Wait for the server before anything reconciles so probes pass immediately
    wait_for_server_ready(&server_state, &server_handle, &server_config).await?;

    let client = Client::try_default()
        .await
        .context("Failed to create Kubernetes client")?;

    let handler = Handler::new(
        Arc::new(KubeClusterClient::new(client.clone())),
        Arc::new(KubeEventPublisher::new(
            client.clone(),
            &controller_config.controller_name,
        )),
        controller_config.conflict_retry_attempts,
    );
    let reconciler = Arc::new(Reconciler::new(handler, Arc::clone(&controller_config)));

    info!("Controller initialized, starting watch loop...");

    Ok(InitializationResult {
        client,
        reconciler,
        server_state,
        controller_config,
    })
}

/// Install the tracing subscriber. `RUST_LOG` overrides the default filter.
fn init_tracing(config: &ControllerConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "wave_controller=info".into());

    if config.json_logs() {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_current_span(true)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

/// Wait for the HTTP server to become ready
async fn wait_for_server_ready(
    server_state: &Arc<ServerState>,
    server_handle: &tokio::task::JoinHandle<()>,
    server_config: &ServerConfig,
) -> Result<()> {
    let startup_timeout = std::time::Duration::from_secs(server_config.startup_timeout_secs);
    let poll_interval = std::time::Duration::from_millis(server_config.poll_interval_ms);
    let start_time = std::time::Instant::now();

    loop {
        // Check if server task crashed
        if server_handle.is_finished() {
            return Err(anyhow::anyhow!("HTTP server failed to start"));
        }

        if server_state.is_ready() {
            info!("HTTP server is ready and accepting connections");
            break;
        }

        if start_time.elapsed() > startup_timeout {
            return Err(anyhow::anyhow!(
                "HTTP server failed to become ready within {} seconds",
                startup_timeout.as_secs()
            ));
        }

        tokio::time::sleep(poll_interval).await;
    }

    Ok(())
}
