// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Background worker enforcing wall-clock kill deadlines.
//!
//! The lifecycle controller arms a kill deadline on `initialize` and never
//! polls timers itself. This watchdog periodically reads the active run's
//! published status and, once the deadline has elapsed, requests an
//! ordinary `fail` transition through the coordinator. The request
//! serializes through the worker's command channel, so a run that is inside
//! a slow hook is failed as soon as that hook returns.
//!
//! Simulation-time deadlines are not enforced here; those belong to the
//! physics collaborator.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tracing::info;

use crate::coordinator::SimulationCoordinator;

/// Configuration for the deadline watchdog.
#[derive(Debug, Clone)]
pub struct DeadlineWatchdogConfig {
    /// How often to check the active run's deadline.
    pub poll_interval: Duration,
}

impl Default for DeadlineWatchdogConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
        }
    }
}

/// Background worker that fails runs past their kill deadline.
pub struct DeadlineWatchdog {
    coordinator: Arc<SimulationCoordinator>,
    config: DeadlineWatchdogConfig,
    shutdown: Arc<Notify>,
}

impl DeadlineWatchdog {
    /// Create a watchdog observing `coordinator`.
    pub fn new(coordinator: Arc<SimulationCoordinator>, config: DeadlineWatchdogConfig) -> Self {
        Self {
            coordinator,
            config,
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// Get a handle that can be used to signal shutdown.
    pub fn shutdown_handle(&self) -> Arc<Notify> {
        self.shutdown.clone()
    }

    /// Run the watchdog loop until the shutdown signal is received.
    pub async fn run(&self) {
        info!(
            poll_interval_secs = self.config.poll_interval.as_secs(),
            "Deadline watchdog started"
        );

        loop {
            tokio::select! {
                biased;

                _ = self.shutdown.notified() => {
                    info!("Deadline watchdog received shutdown signal");
                    break;
                }

                _ = tokio::time::sleep(self.config.poll_interval) => {
                    let _ = self.coordinator.enforce_deadline().await;
                }
            }
        }

        info!("Deadline watchdog stopped");
    }
}
