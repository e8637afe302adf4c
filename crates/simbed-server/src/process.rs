// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Process-backed collaborator implementations.
//!
//! [`ProcessServices`] and [`ProcessStateMachineManager`] run child services
//! and subordinate state machines as plain OS processes. Spawned children
//! use `kill_on_drop` so nothing outlives the server even on abnormal exit.

use std::collections::{BTreeMap, HashMap};
use std::process::Stdio;

use async_trait::async_trait;
use chrono::Utc;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use simbed_core::error::HookError;
use simbed_core::resolver::{ServiceSpec, StateMachineSpec};
use simbed_core::run::{RunId, ServiceHandle, SimulationRun};
use simbed_core::services::{
    SimulationServices, StateMachineManager, StateMachineOutcome,
};

/// Launches child services as OS processes.
#[derive(Default)]
pub struct ProcessServices {
    children: Mutex<HashMap<String, Child>>,
}

impl ProcessServices {
    /// Create a launcher with no running children.
    pub fn new() -> Self {
        Self::default()
    }

    async fn kill_child(children: &mut HashMap<String, Child>, service_id: &str) {
        if let Some(mut child) = children.remove(service_id) {
            if let Err(e) = child.kill().await {
                warn!(service_id = %service_id, error = %e, "Could not kill child service");
            }
        }
    }
}

#[async_trait]
impl SimulationServices for ProcessServices {
    async fn launch(
        &self,
        run: &SimulationRun,
        specs: &[ServiceSpec],
    ) -> Result<Vec<ServiceHandle>, HookError> {
        let mut children = self.children.lock().await;
        let mut handles: Vec<ServiceHandle> = Vec::with_capacity(specs.len());

        for spec in specs {
            let spawned = Command::new(&spec.command)
                .args(&spec.args)
                .envs(&spec.env)
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .kill_on_drop(true)
                .spawn();

            let child = match spawned {
                Ok(child) => child,
                Err(e) => {
                    // roll back whatever we already launched for this run
                    for handle in &handles {
                        Self::kill_child(&mut children, &handle.service_id).await;
                    }
                    return Err(HookError::services(format!(
                        "failed to launch service '{}' ({}): {}",
                        spec.name, spec.command, e
                    )));
                }
            };

            let service_id = format!("svc-{}-{}", run.id(), spec.name);
            let handle = ServiceHandle {
                service_id: service_id.clone(),
                name: spec.name.clone(),
                pid: child.id(),
                started_at: Utc::now(),
            };
            info!(
                run_id = %run.id(),
                service = %spec.name,
                pid = ?handle.pid,
                "Launched child service"
            );
            children.insert(service_id, child);
            handles.push(handle);
        }

        Ok(handles)
    }

    async fn shutdown(&self, handles: &[ServiceHandle]) -> Result<(), HookError> {
        let mut children = self.children.lock().await;
        for handle in handles {
            debug!(service = %handle.name, pid = ?handle.pid, "Stopping child service");
            Self::kill_child(&mut children, &handle.service_id).await;
        }
        Ok(())
    }
}

/// Runs subordinate state machines as OS processes.
///
/// `load_all` validates and registers the sources; `start_all` spawns one
/// process per machine; termination records the exit status as the
/// machine's outcome.
#[derive(Default)]
pub struct ProcessStateMachineManager {
    loaded: Mutex<Vec<StateMachineSpec>>,
    running: Mutex<HashMap<String, Child>>,
    outcomes: Mutex<BTreeMap<String, Option<String>>>,
}

impl ProcessStateMachineManager {
    /// Create a manager with nothing loaded.
    pub fn new() -> Self {
        Self::default()
    }

    async fn terminate_running(&self) {
        let mut running = self.running.lock().await;
        let mut outcomes = self.outcomes.lock().await;
        for (id, mut child) in running.drain() {
            let outcome = match child.try_wait() {
                Ok(Some(status)) => format!("exited: {}", status),
                Ok(None) => {
                    if let Err(e) = child.kill().await {
                        warn!(state_machine = %id, error = %e, "Could not kill state machine");
                    }
                    "terminated".to_string()
                }
                Err(e) => {
                    warn!(state_machine = %id, error = %e, "Could not reap state machine");
                    "unknown".to_string()
                }
            };
            debug!(state_machine = %id, outcome = %outcome, "State machine terminated");
            outcomes.insert(id, Some(outcome));
        }
    }
}

#[async_trait]
impl StateMachineManager for ProcessStateMachineManager {
    async fn load_all(&self, run_id: RunId, specs: &[StateMachineSpec]) -> Result<(), HookError> {
        for spec in specs {
            tokio::fs::metadata(&spec.src).await.map_err(|e| {
                HookError::state_machines(format!(
                    "state machine '{}' source '{}' is not accessible: {}",
                    spec.id,
                    spec.src.display(),
                    e
                ))
            })?;
        }

        let mut loaded = self.loaded.lock().await;
        let mut outcomes = self.outcomes.lock().await;
        outcomes.clear();
        for spec in specs {
            outcomes.insert(spec.id.clone(), None);
        }
        *loaded = specs.to_vec();
        info!(run_id = %run_id, count = specs.len(), "State machines loaded");
        Ok(())
    }

    async fn start_all(&self) -> Result<(), HookError> {
        let loaded = self.loaded.lock().await;
        let mut running = self.running.lock().await;

        for spec in loaded.iter() {
            if running.contains_key(&spec.id) {
                continue;
            }
            let child = Command::new(&spec.src)
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .kill_on_drop(true)
                .spawn()
                .map_err(|e| {
                    HookError::state_machines(format!(
                        "failed to start state machine '{}': {}",
                        spec.id, e
                    ))
                })?;
            debug!(state_machine = %spec.id, pid = ?child.id(), "State machine started");
            running.insert(spec.id.clone(), child);
        }
        Ok(())
    }

    async fn terminate_all(&self) -> Result<(), HookError> {
        self.terminate_running().await;
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), HookError> {
        self.terminate_running().await;
        self.loaded.lock().await.clear();
        Ok(())
    }

    async fn outcomes(&self) -> Vec<StateMachineOutcome> {
        self.outcomes
            .lock()
            .await
            .iter()
            .map(|(id, result)| StateMachineOutcome {
                id: id.clone(),
                result: result.clone(),
            })
            .collect()
    }
}
