// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Simbed Server - Simulation Admission and Supervision Daemon
//!
//! Hosts the admission coordinator, the per-run workers, and the deadline
//! watchdog. The transport that feeds admission requests and status queries
//! is attached by external plumbing through the library API.

use std::sync::Arc;

use tracing::{info, warn};

use simbed_server::config::Config;
use simbed_server::process::{ProcessServices, ProcessStateMachineManager};
use simbed_server::resolver::FsExperimentResolver;
use simbed_server::runtime::ServerRuntime;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "simbed_server=info,simbed_core=info".into()),
        )
        .init();

    // Load .env file if present
    if let Err(e) = dotenvy::dotenv() {
        warn!("No .env file loaded: {}", e);
    }

    // Load configuration
    let config = Config::from_env()?;

    info!(
        models_dir = %config.models_dir.display(),
        experiments_dir = %config.experiments_dir.display(),
        default_timeout_secs = config.default_timeout.as_secs(),
        "Starting Simbed Server"
    );

    let resolver = Arc::new(FsExperimentResolver::new(
        config.experiments_dir.clone(),
        config.models_dir.clone(),
    ));
    let state_machines = Arc::new(ProcessStateMachineManager::new());
    let services = Arc::new(ProcessServices::new());

    // Start the runtime
    let runtime = ServerRuntime::builder()
        .resolver(resolver)
        .state_machines(state_machines)
        .services(services)
        .config(&config)
        .build()?
        .start();

    info!(version = runtime.coordinator().version(), "Simbed Server ready");

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");

    // Graceful shutdown
    runtime.shutdown().await;

    info!("Simbed Server shut down");

    Ok(())
}
