// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! The phase hook capability trait.
//!
//! One method per lifecycle edge plus the unconditional cleanup set. Using a
//! trait makes the hook table complete by construction; there is no runtime
//! registration step that could leave an edge without a callback.

use async_trait::async_trait;

use crate::error::HookError;
use crate::run::SimulationRun;

/// Callbacks dispatched by the
/// [`LifecycleController`](crate::controller::LifecycleController) as part
/// of each transition.
///
/// Every method receives the run with `run.state()` still at the
/// pre-transition state; the controller commits the target state only after
/// the hook returns `Ok`. A hook error aborts the requested transition,
/// commits `failed` instead, and is re-raised to the transition caller.
///
/// Hooks run on the worker task and may block for arbitrarily long on slow
/// external calls; the control plane never waits on them past the
/// initialization rendezvous.
#[async_trait]
pub trait PhaseHooks: Send + Sync {
    /// `initialize` edge: resolve the experiment, load subordinate state
    /// machines, launch child services, and fill in the run's resolved
    /// fields (`timeout`, `root_folder`, `models_path`, `child_resources`).
    async fn initialize(&self, run: &mut SimulationRun) -> Result<(), HookError>;

    /// `start` edge, from both `initialized` (first start) and `paused`
    /// (resume).
    async fn start(&self, run: &mut SimulationRun) -> Result<(), HookError>;

    /// `pause` edge.
    async fn pause(&self, run: &mut SimulationRun) -> Result<(), HookError>;

    /// `stop` edge. Release of shared resources belongs in [`cleanup`],
    /// which the controller runs on every path into a terminal state; this
    /// hook is for stop-specific work only.
    ///
    /// [`cleanup`]: PhaseHooks::cleanup
    async fn stop(&self, run: &mut SimulationRun) -> Result<(), HookError>;

    /// `fail` edge, requested explicitly (e.g. by the deadline watchdog).
    /// Hook failures on other edges do NOT dispatch this hook; they route
    /// through [`cleanup`](PhaseHooks::cleanup) directly.
    async fn fail(&self, run: &mut SimulationRun) -> Result<(), HookError>;

    /// `reset` edge, for callers that reuse a terminal run object.
    async fn reset(&self, run: &mut SimulationRun) -> Result<(), HookError>;

    /// The unconditional cleanup set: terminate subordinate state machines,
    /// shut down managers, remove temporary folders.
    ///
    /// Runs exactly once per run, on every path into `stopped` or `failed`,
    /// before any hook failure is propagated. Errors are logged by the
    /// controller and suppressed; cleanup must be best-effort and must not
    /// block the next admission.
    async fn cleanup(&self, run: &mut SimulationRun) -> Result<(), HookError>;
}
