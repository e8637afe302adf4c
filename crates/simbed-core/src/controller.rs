// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! The per-run transition engine.
//!
//! A [`LifecycleController`] owns one [`SimulationRun`] and is itself owned
//! by the run's worker task. Every transition follows the same algorithm:
//!
//! 1. Validate the edge against the state table.
//! 2. Dispatch the hook for that edge with the pre-transition state.
//! 3. On hook success, commit the target state.
//! 4. On hook failure, commit `failed` instead and re-raise the error.
//! 5. The cleanup set runs exactly once, on every path into `stopped` or
//!    `failed`, before any failure is propagated.
//!
//! The controller performs no timer polling. It arms the kill deadline on
//! `initialize` and clears it on `stop`/`fail`; enforcement belongs to an
//! external watchdog issuing an ordinary `fail` request.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::error::{HookError, LifecycleError, Result};
use crate::hooks::PhaseHooks;
use crate::run::{RunStatus, SimulationRun};
use crate::state::{SimState, Transition};

/// Drives one run through the lifecycle state machine.
pub struct LifecycleController {
    run: SimulationRun,
    hooks: Arc<dyn PhaseHooks>,
    status_tx: watch::Sender<RunStatus>,
    cleanup_done: bool,
}

impl std::fmt::Debug for LifecycleController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecycleController")
            .field("run", &self.run)
            .field("hooks", &"...")
            .field("cleanup_done", &self.cleanup_done)
            .finish()
    }
}

impl LifecycleController {
    /// Create a controller owning `run`, dispatching to `hooks`.
    pub fn new(run: SimulationRun, hooks: Arc<dyn PhaseHooks>) -> Self {
        let (status_tx, _) = watch::channel(run.status());
        Self {
            run,
            hooks,
            status_tx,
            cleanup_done: false,
        }
    }

    /// Subscribe to status snapshots. The channel receives one update per
    /// committed transition; the control plane and the deadline watchdog
    /// read it without ever touching the worker-owned run.
    pub fn status_watch(&self) -> watch::Receiver<RunStatus> {
        self.status_tx.subscribe()
    }

    /// Current committed state.
    pub fn state(&self) -> SimState {
        self.run.state()
    }

    /// The owned run.
    pub fn run(&self) -> &SimulationRun {
        &self.run
    }

    /// Consume the controller, handing the run back to the caller.
    pub fn into_run(self) -> SimulationRun {
        self.run
    }

    /// Request the `initialize` transition.
    pub async fn initialize(&mut self) -> Result<SimState> {
        self.apply(Transition::Initialize).await
    }

    /// Request the `start` transition (first start or resume).
    pub async fn start(&mut self) -> Result<SimState> {
        self.apply(Transition::Start).await
    }

    /// Request the `pause` transition.
    pub async fn pause(&mut self) -> Result<SimState> {
        self.apply(Transition::Pause).await
    }

    /// Request the `stop` transition.
    pub async fn stop(&mut self) -> Result<SimState> {
        self.apply(Transition::Stop).await
    }

    /// Request the `fail` transition.
    pub async fn fail(&mut self) -> Result<SimState> {
        self.apply(Transition::Fail).await
    }

    /// Request the `reset` transition.
    pub async fn reset(&mut self) -> Result<SimState> {
        self.apply(Transition::Reset).await
    }

    /// Apply one transition request.
    ///
    /// Returns the committed state on success. On a hook failure the run is
    /// committed to `failed`, the cleanup set has run, and the hook's error
    /// is returned wrapped in [`LifecycleError::HookFailed`]. An edge not in
    /// the state table returns [`LifecycleError::InvalidTransition`] without
    /// dispatching any hook or mutating any state.
    pub async fn apply(&mut self, transition: Transition) -> Result<SimState> {
        let from = self.run.state();
        let Some(target) = from.transition_target(transition) else {
            debug!(
                run_id = %self.run.id(),
                from = %from,
                transition = %transition,
                "Rejected invalid transition request"
            );
            return Err(LifecycleError::InvalidTransition {
                from,
                requested: transition,
            });
        };

        match self.dispatch_hook(transition).await {
            Ok(()) => {
                if target.is_terminal() {
                    self.run.set_kill_deadline(None);
                    self.run_cleanup().await;
                }
                if transition == Transition::Initialize {
                    self.arm_deadline();
                }
                if transition == Transition::Reset {
                    self.run.clear_scratch();
                    self.cleanup_done = false;
                }
                self.commit(from, transition, target, false);
                Ok(target)
            }
            Err(source) => {
                self.run.set_kill_deadline(None);
                self.run_cleanup().await;
                self.commit(from, transition, SimState::Failed, true);
                Err(LifecycleError::HookFailed { transition, source })
            }
        }
    }

    async fn dispatch_hook(&mut self, transition: Transition) -> std::result::Result<(), HookError> {
        let hooks = Arc::clone(&self.hooks);
        match transition {
            Transition::Initialize => hooks.initialize(&mut self.run).await,
            Transition::Start => hooks.start(&mut self.run).await,
            Transition::Pause => hooks.pause(&mut self.run).await,
            Transition::Stop => hooks.stop(&mut self.run).await,
            Transition::Fail => hooks.fail(&mut self.run).await,
            Transition::Reset => hooks.reset(&mut self.run).await,
        }
    }

    /// Arm the kill deadline from the run's effective timeout.
    ///
    /// A timeout too large for the calendar arithmetic leaves the run
    /// without a deadline, which the watchdog treats as unlimited.
    fn arm_deadline(&mut self) {
        let deadline = chrono::Duration::from_std(self.run.timeout)
            .ok()
            .and_then(|d| Utc::now().checked_add_signed(d));
        if deadline.is_none() {
            warn!(
                run_id = %self.run.id(),
                timeout_secs = self.run.timeout.as_secs(),
                "Run timeout not representable as a deadline, run is unbounded"
            );
        }
        self.run.set_kill_deadline(deadline);
    }

    /// Run the cleanup set if it has not run for this attempt yet.
    ///
    /// Errors are logged and suppressed: cleanup is best-effort and must
    /// never block the transition outcome or the next admission.
    async fn run_cleanup(&mut self) {
        if self.cleanup_done {
            return;
        }
        self.cleanup_done = true;
        let hooks = Arc::clone(&self.hooks);
        if let Err(e) = hooks.cleanup(&mut self.run).await {
            warn!(
                run_id = %self.run.id(),
                error = %e,
                "Cleanup failed, continuing teardown"
            );
        }
    }

    fn commit(&mut self, from: SimState, transition: Transition, target: SimState, hook_failed: bool) {
        self.run.set_state(target);
        self.status_tx.send_replace(self.run.status());
        if hook_failed {
            warn!(
                run_id = %self.run.id(),
                from = %from,
                transition = %transition,
                "Run failed: hook error during transition"
            );
        } else {
            info!(
                run_id = %self.run.id(),
                from = %from,
                to = %target,
                transition = %transition,
                "Lifecycle transition committed"
            );
        }
    }
}
