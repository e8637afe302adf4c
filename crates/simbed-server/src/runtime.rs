// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Embeddable runtime for simbed-server.
//!
//! This module provides [`ServerRuntime`] which allows embedding the
//! admission coordinator and its deadline watchdog into an existing tokio
//! application instead of running the standalone binary.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use simbed_server::process::{ProcessServices, ProcessStateMachineManager};
//! use simbed_server::resolver::FsExperimentResolver;
//! use simbed_server::runtime::ServerRuntime;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let runtime = ServerRuntime::builder()
//!         .resolver(Arc::new(FsExperimentResolver::new("/srv/experiments", "/srv/models")))
//!         .state_machines(Arc::new(ProcessStateMachineManager::new()))
//!         .services(Arc::new(ProcessServices::new()))
//!         .build()?
//!         .start();
//!
//!     // ... feed admission requests to runtime.coordinator() ...
//!
//!     runtime.shutdown().await;
//!     Ok(())
//! }
//! ```

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{error, info};

use simbed_core::resolver::ExperimentResolver;
use simbed_core::services::{SimulationServices, StateMachineManager};

use crate::config::Config;
use crate::coordinator::SimulationCoordinator;
use crate::watchdog::{DeadlineWatchdog, DeadlineWatchdogConfig};

/// Builder for creating a [`ServerRuntime`].
pub struct ServerRuntimeBuilder {
    resolver: Option<Arc<dyn ExperimentResolver>>,
    state_machines: Option<Arc<dyn StateMachineManager>>,
    services: Option<Arc<dyn SimulationServices>>,
    default_timeout: Duration,
    teardown_wait: Duration,
    deadline_poll_interval: Duration,
}

impl std::fmt::Debug for ServerRuntimeBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerRuntimeBuilder")
            .field("resolver", &self.resolver.as_ref().map(|_| "..."))
            .field("state_machines", &self.state_machines.as_ref().map(|_| "..."))
            .field("services", &self.services.as_ref().map(|_| "..."))
            .field("default_timeout", &self.default_timeout)
            .field("teardown_wait", &self.teardown_wait)
            .field("deadline_poll_interval", &self.deadline_poll_interval)
            .finish()
    }
}

impl Default for ServerRuntimeBuilder {
    fn default() -> Self {
        Self {
            resolver: None,
            state_machines: None,
            services: None,
            default_timeout: Duration::from_secs(600),
            teardown_wait: Duration::from_secs(60),
            deadline_poll_interval: Duration::from_secs(5),
        }
    }
}

impl ServerRuntimeBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the experiment resolver (required).
    pub fn resolver(mut self, resolver: Arc<dyn ExperimentResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Set the state machine manager (required).
    pub fn state_machines(mut self, state_machines: Arc<dyn StateMachineManager>) -> Self {
        self.state_machines = Some(state_machines);
        self
    }

    /// Set the child service launcher (required).
    pub fn services(mut self, services: Arc<dyn SimulationServices>) -> Self {
        self.services = Some(services);
        self
    }

    /// Apply the duration settings from a loaded [`Config`].
    pub fn config(mut self, config: &Config) -> Self {
        self.default_timeout = config.default_timeout;
        self.teardown_wait = config.teardown_wait;
        self.deadline_poll_interval = config.deadline_poll_interval;
        self
    }

    /// Timeout applied to runs whose request carries none.
    ///
    /// Default: 600 seconds.
    pub fn default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// How long an admission waits for a previous run's teardown.
    ///
    /// Default: 60 seconds.
    pub fn teardown_wait(mut self, wait: Duration) -> Self {
        self.teardown_wait = wait;
        self
    }

    /// How often the watchdog checks the active run's kill deadline.
    ///
    /// Default: 5 seconds.
    pub fn deadline_poll_interval(mut self, interval: Duration) -> Self {
        self.deadline_poll_interval = interval;
        self
    }

    /// Build the runtime configuration.
    ///
    /// Returns an error if a required collaborator is missing.
    pub fn build(self) -> Result<ServerRuntimeConfig> {
        let resolver = self
            .resolver
            .ok_or_else(|| anyhow::anyhow!("resolver is required"))?;
        let state_machines = self
            .state_machines
            .ok_or_else(|| anyhow::anyhow!("state_machines is required"))?;
        let services = self
            .services
            .ok_or_else(|| anyhow::anyhow!("services is required"))?;

        Ok(ServerRuntimeConfig {
            resolver,
            state_machines,
            services,
            default_timeout: self.default_timeout,
            teardown_wait: self.teardown_wait,
            deadline_poll_interval: self.deadline_poll_interval,
        })
    }
}

/// Configuration for a [`ServerRuntime`].
pub struct ServerRuntimeConfig {
    resolver: Arc<dyn ExperimentResolver>,
    state_machines: Arc<dyn StateMachineManager>,
    services: Arc<dyn SimulationServices>,
    default_timeout: Duration,
    teardown_wait: Duration,
    deadline_poll_interval: Duration,
}

impl std::fmt::Debug for ServerRuntimeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerRuntimeConfig")
            .field("default_timeout", &self.default_timeout)
            .field("teardown_wait", &self.teardown_wait)
            .field("deadline_poll_interval", &self.deadline_poll_interval)
            .finish()
    }
}

impl ServerRuntimeConfig {
    /// Start the runtime, spawning the deadline watchdog task.
    pub fn start(self) -> ServerRuntime {
        let coordinator = Arc::new(SimulationCoordinator::new(
            self.resolver,
            self.state_machines,
            self.services,
            self.default_timeout,
            self.teardown_wait,
        ));

        let watchdog = DeadlineWatchdog::new(
            coordinator.clone(),
            DeadlineWatchdogConfig {
                poll_interval: self.deadline_poll_interval,
            },
        );
        let watchdog_shutdown = watchdog.shutdown_handle();
        let watchdog_handle = tokio::spawn(async move { watchdog.run().await });

        info!(version = coordinator.version(), "ServerRuntime started");

        ServerRuntime {
            coordinator,
            watchdog_shutdown,
            watchdog_handle,
        }
    }
}

/// A running simbed server that can be embedded in an application.
///
/// Holds the admission coordinator and the deadline watchdog. Call
/// [`shutdown`](Self::shutdown) for graceful termination.
pub struct ServerRuntime {
    coordinator: Arc<SimulationCoordinator>,
    watchdog_shutdown: Arc<Notify>,
    watchdog_handle: JoinHandle<()>,
}

impl ServerRuntime {
    /// Create a new builder for configuring the runtime.
    pub fn builder() -> ServerRuntimeBuilder {
        ServerRuntimeBuilder::new()
    }

    /// The admission coordinator, for wiring into the control plane.
    pub fn coordinator(&self) -> &Arc<SimulationCoordinator> {
        &self.coordinator
    }

    /// Gracefully shut down the runtime.
    ///
    /// Stops the active run (if any), waits for its teardown, and stops the
    /// watchdog.
    pub async fn shutdown(self) {
        info!("ServerRuntime shutting down...");

        self.coordinator.shutdown().await;

        self.watchdog_shutdown.notify_one();
        if let Err(e) = self.watchdog_handle.await {
            error!(error = %e, "Deadline watchdog task panicked");
        }

        info!("ServerRuntime shutdown complete");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use simbed_core::mock::{MockResolver, MockServices, MockStateMachineManager};

    #[test]
    fn test_builder_default() {
        let builder = ServerRuntimeBuilder::default();
        assert!(builder.resolver.is_none());
        assert_eq!(builder.default_timeout, Duration::from_secs(600));
        assert_eq!(builder.teardown_wait, Duration::from_secs(60));
    }

    #[test]
    fn test_builder_missing_collaborator() {
        let result = ServerRuntimeBuilder::new()
            .resolver(Arc::new(MockResolver::new()))
            .build();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("state_machines"));
    }

    #[test]
    fn test_builder_debug_hides_collaborators() {
        let builder = ServerRuntimeBuilder::new().resolver(Arc::new(MockResolver::new()));
        let debug_str = format!("{:?}", builder);
        assert!(debug_str.contains("ServerRuntimeBuilder"));
        assert!(debug_str.contains("..."));
    }

    #[tokio::test]
    async fn test_runtime_start_and_shutdown() {
        let config = ServerRuntimeBuilder::new()
            .resolver(Arc::new(MockResolver::new()))
            .state_machines(Arc::new(MockStateMachineManager::new()))
            .services(Arc::new(MockServices::new()))
            .default_timeout(Duration::from_secs(5))
            .teardown_wait(Duration::from_secs(1))
            .deadline_poll_interval(Duration::from_millis(50))
            .build()
            .unwrap();

        let runtime = config.start();
        assert!(!runtime.coordinator().is_running());
        assert_eq!(runtime.coordinator().version(), env!("CARGO_PKG_VERSION"));

        runtime.shutdown().await;
    }
}
