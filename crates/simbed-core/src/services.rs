// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Subordinate state machine and child service collaborator seams.
//!
//! Both collaborators are dispatched from phase hooks and from the
//! unconditional cleanup set. They are pure execution seams: the lifecycle
//! engine never inspects what a state machine or service actually does.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::HookError;
use crate::resolver::{ServiceSpec, StateMachineSpec};
use crate::run::{RunId, ServiceHandle, SimulationRun};

/// Final outcome of one subordinate state machine, reported at stop/reset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateMachineOutcome {
    /// The state machine's identifier.
    pub id: String,
    /// Outcome string, or `None` if it never ran to completion.
    pub result: Option<String>,
}

/// Manages the experiment's subordinate state machines.
///
/// `terminate_all` and `shutdown` are part of the unconditional cleanup set:
/// they must be safe to call in any order, repeatedly, and after failures.
#[async_trait]
pub trait StateMachineManager: Send + Sync {
    /// Register and initialize all state machines for the given run.
    async fn load_all(&self, run_id: RunId, specs: &[StateMachineSpec]) -> Result<(), HookError>;

    /// Start every loaded state machine.
    async fn start_all(&self) -> Result<(), HookError>;

    /// Terminate every running state machine, leaving them loaded.
    async fn terminate_all(&self) -> Result<(), HookError>;

    /// Terminate and unload everything.
    async fn shutdown(&self) -> Result<(), HookError>;

    /// Final outcomes of the state machines seen so far.
    async fn outcomes(&self) -> Vec<StateMachineOutcome>;
}

/// Launches and tears down the child services a run depends on.
#[async_trait]
pub trait SimulationServices: Send + Sync {
    /// Launch every service in `specs` for the given run, returning one
    /// handle per service. On error, anything already launched must have
    /// been rolled back by the implementation.
    async fn launch(
        &self,
        run: &SimulationRun,
        specs: &[ServiceSpec],
    ) -> Result<Vec<ServiceHandle>, HookError>;

    /// Tear down previously launched services. Best-effort; the caller
    /// logs and suppresses errors.
    async fn shutdown(&self, handles: &[ServiceHandle]) -> Result<(), HookError>;
}
