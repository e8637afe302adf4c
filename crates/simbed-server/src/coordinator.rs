// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! The admission coordinator.
//!
//! One [`SimulationCoordinator`] per process, constructed explicitly at
//! startup and shared by `Arc`. It admits at most one simulation at a time:
//! a request is rejected while a run is active, queued behind an in-flight
//! teardown (bounded), and otherwise spawns a dedicated worker that owns the
//! run. The submitter blocks only until the worker signals that
//! initialization resolved - success or failure - never until the run ends.
//!
//! Health reporting is observational only; it never gates admission.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{Mutex as AsyncMutex, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use simbed_core::error::{HookError, LifecycleError};
use simbed_core::hooks::PhaseHooks;
use simbed_core::resolver::ExperimentResolver;
use simbed_core::run::{RunId, RunStatus, SimulationRun, TimeoutKind};
use simbed_core::services::{SimulationServices, StateMachineManager};
use simbed_core::state::{SimState, Transition};

use crate::phases::ExperimentPhases;
use crate::worker::{self, TransitionCommand};

/// A well-formed request to start a new simulation run.
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize, Serialize)]
pub struct AdmissionRequest {
    /// Experiment descriptor, resolved by the experiment resolver.
    pub experiment: String,
    /// Host the simulation backend runs on.
    pub execution_host: String,
    /// Resource reservation tag, if the cluster requires one.
    #[serde(default)]
    pub reservation: Option<String>,
    /// Number of subordinate processes the experiment requests.
    #[serde(default = "default_process_count")]
    pub process_count: u32,
    /// Run timeout in seconds; overrides the experiment's configured
    /// timeout. Falls back to the server default when both are absent.
    #[serde(default)]
    pub timeout_seconds: Option<u64>,
    /// Which clock the timeout is measured against.
    #[serde(default = "default_timeout_kind")]
    pub timeout_kind: TimeoutKind,
}

fn default_process_count() -> u32 {
    1
}

fn default_timeout_kind() -> TimeoutKind {
    TimeoutKind::RealTime
}

/// Typed admission rejection.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum AdmissionError {
    /// A run is active; retry after it terminates.
    #[error("a simulation is already running")]
    AlreadyRunning,

    /// The previous run's teardown outlasted the bounded wait.
    #[error("the previous simulation is still terminating")]
    StillTerminating,

    /// The `initialize` hook failed; carries the hook's own error.
    #[error("simulation initialization failed: {0}")]
    InitializationFailure(#[from] HookError),
}

/// Errors from transition requests issued through a [`RunHandle`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum ControlError {
    /// The state machine rejected the transition or its hook failed.
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    /// The run's worker has already exited.
    #[error("the run has already terminated")]
    Terminated,
}

/// Coarse server health derived from the failure counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HealthStatus {
    /// No failed simulations recorded.
    Ok,
    /// Failures recorded, but no more than half of all attempts.
    Warning,
    /// More failures than half of all attempts.
    Critical,
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            HealthStatus::Ok => "OK",
            HealthStatus::Warning => "WARNING",
            HealthStatus::Critical => "CRITICAL",
        })
    }
}

/// Health report exposed to the management surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Health {
    /// Coarse status.
    pub status: HealthStatus,
    /// Human-readable counts.
    pub detail: String,
}

/// Monotonic attempt/failure counters, shared with the workers.
#[derive(Debug, Default)]
pub struct RunCounters {
    attempts: AtomicU64,
    failures: AtomicU64,
}

impl RunCounters {
    /// Record an admitted attempt.
    pub(crate) fn record_attempt(&self) {
        self.attempts.fetch_add(1, Ordering::SeqCst);
    }

    /// Record a failed run. Each failed run is counted exactly once:
    /// init failures by the admission path, later failures by the worker.
    pub(crate) fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::SeqCst);
    }

    /// `(attempts, failures)` snapshot.
    pub fn snapshot(&self) -> (u64, u64) {
        (
            self.attempts.load(Ordering::SeqCst),
            self.failures.load(Ordering::SeqCst),
        )
    }
}

/// Handle to an admitted run, returned by [`SimulationCoordinator::submit`].
///
/// Cloneable; all clones feed the same worker command channel, so transition
/// requests stay totally ordered no matter who issues them.
#[derive(Debug, Clone)]
pub struct RunHandle {
    run_id: RunId,
    command_tx: mpsc::Sender<TransitionCommand>,
    status_rx: watch::Receiver<RunStatus>,
}

impl RunHandle {
    /// The run's identifier.
    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    /// Latest committed status snapshot.
    pub fn status(&self) -> RunStatus {
        *self.status_rx.borrow()
    }

    /// Request a transition and wait for its outcome.
    ///
    /// The request queues behind whatever hook the worker is currently
    /// inside; there is no pre-emption.
    pub async fn request(&self, transition: Transition) -> Result<SimState, ControlError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.command_tx
            .send(TransitionCommand {
                transition,
                reply: Some(reply_tx),
            })
            .await
            .map_err(|_| ControlError::Terminated)?;
        reply_rx
            .await
            .map_err(|_| ControlError::Terminated)?
            .map_err(ControlError::from)
    }

    /// Request `start` (initial start or resume).
    pub async fn start(&self) -> Result<SimState, ControlError> {
        self.request(Transition::Start).await
    }

    /// Request `pause`.
    pub async fn pause(&self) -> Result<SimState, ControlError> {
        self.request(Transition::Pause).await
    }

    /// Request `stop`.
    pub async fn stop(&self) -> Result<SimState, ControlError> {
        self.request(Transition::Stop).await
    }

    /// Request `fail`.
    pub async fn fail(&self) -> Result<SimState, ControlError> {
        self.request(Transition::Fail).await
    }
}

/// Book-keeping for the currently admitted run.
struct ActiveRun {
    run_id: RunId,
    command_tx: mpsc::Sender<TransitionCommand>,
    status_rx: watch::Receiver<RunStatus>,
    terminating: Arc<std::sync::atomic::AtomicBool>,
    teardown_rx: Option<oneshot::Receiver<()>>,
    join: JoinHandle<()>,
}

impl ActiveRun {
    fn worker_alive(&self) -> bool {
        !self.join.is_finished()
    }

    fn is_terminating(&self) -> bool {
        self.terminating.load(Ordering::SeqCst)
    }
}

/// Process-wide admission gatekeeper. See the module docs.
pub struct SimulationCoordinator {
    /// Serializes admissions end to end; only one is processed at a time.
    admission: AsyncMutex<()>,
    active: std::sync::Mutex<Option<ActiveRun>>,
    counters: Arc<RunCounters>,
    next_run_id: AtomicU64,
    resolver: Arc<dyn ExperimentResolver>,
    state_machines: Arc<dyn StateMachineManager>,
    services: Arc<dyn SimulationServices>,
    default_timeout: Duration,
    teardown_wait: Duration,
    start_time: std::time::Instant,
    version: String,
}

impl std::fmt::Debug for SimulationCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulationCoordinator")
            .field("counters", &self.counters)
            .field("default_timeout", &self.default_timeout)
            .field("teardown_wait", &self.teardown_wait)
            .field("version", &self.version)
            .finish()
    }
}

impl SimulationCoordinator {
    /// Create a coordinator with the given collaborators.
    pub fn new(
        resolver: Arc<dyn ExperimentResolver>,
        state_machines: Arc<dyn StateMachineManager>,
        services: Arc<dyn SimulationServices>,
        default_timeout: Duration,
        teardown_wait: Duration,
    ) -> Self {
        debug!("Creating simulation coordinator");
        Self {
            admission: AsyncMutex::new(()),
            active: std::sync::Mutex::new(None),
            counters: Arc::new(RunCounters::default()),
            next_run_id: AtomicU64::new(1),
            resolver,
            state_machines,
            services,
            default_timeout,
            teardown_wait,
            start_time: std::time::Instant::now(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    /// Submit an admission request.
    ///
    /// Blocks until the new run's `initialize` resolved either way (the
    /// initialization rendezvous), never until the run completes. A request
    /// arriving while the previous run is mid-teardown waits for that
    /// teardown, bounded by the configured wait.
    pub async fn submit(&self, request: AdmissionRequest) -> Result<RunHandle, AdmissionError> {
        let _admission = self.admission.lock().await;
        info!(experiment = %request.experiment, host = %request.execution_host,
              "New simulation request");

        if let Some(mut teardown_rx) = self.teardown_gate()? {
            info!("Waiting for previous simulation to terminate");
            match tokio::time::timeout(self.teardown_wait, &mut teardown_rx).await {
                // a closed channel means the worker is gone as well
                Ok(_) => self.clear_active(),
                Err(_) => {
                    warn!(
                        wait_secs = self.teardown_wait.as_secs(),
                        "Previous simulation still terminating after bounded wait"
                    );
                    self.restore_teardown_rx(teardown_rx);
                    return Err(AdmissionError::StillTerminating);
                }
            }
        }

        let run_id = RunId(self.next_run_id.fetch_add(1, Ordering::SeqCst));
        self.counters.record_attempt();

        let timeout = request
            .timeout_seconds
            .map(Duration::from_secs)
            .unwrap_or(self.default_timeout);
        let run = SimulationRun::new(run_id, timeout, request.timeout_kind);

        let hooks: Arc<dyn PhaseHooks> = Arc::new(ExperimentPhases::new(
            request,
            self.resolver.clone(),
            self.state_machines.clone(),
            self.services.clone(),
        ));

        let spawned =
            worker::spawn_run_worker(run, hooks, self.services.clone(), self.counters.clone());
        info!(run_id = %run_id, "Spawned run worker, awaiting initialization");

        let handle = RunHandle {
            run_id,
            command_tx: spawned.command_tx.clone(),
            status_rx: spawned.status_rx.clone(),
        };

        {
            let mut slot = self.active.lock().unwrap();
            *slot = Some(ActiveRun {
                run_id,
                command_tx: spawned.command_tx,
                status_rx: spawned.status_rx,
                terminating: spawned.terminating,
                teardown_rx: Some(spawned.teardown_rx),
                join: spawned.join,
            });
        }

        match spawned.init_rx.await {
            Ok(Ok(())) => {
                info!(run_id = %run_id, "Simulation initialized");
                Ok(handle)
            }
            Ok(Err(hook_error)) => {
                self.counters.record_failure();
                error!(run_id = %run_id, error = %hook_error, "Initialization failed");
                Err(AdmissionError::InitializationFailure(hook_error))
            }
            Err(_) => {
                self.counters.record_failure();
                error!(run_id = %run_id, "Run worker terminated before initialization completed");
                Err(AdmissionError::InitializationFailure(HookError::other(
                    "run worker terminated before initialization completed",
                )))
            }
        }
    }

    /// Non-blocking: true iff a run's worker task is alive, whatever
    /// lifecycle state the run is in.
    pub fn is_running(&self) -> bool {
        self.active
            .lock()
            .unwrap()
            .as_ref()
            .map(ActiveRun::worker_alive)
            .unwrap_or(false)
    }

    /// Latest status snapshot of the admitted run, if any worker is alive.
    pub fn active_status(&self) -> Option<RunStatus> {
        let slot = self.active.lock().unwrap();
        slot.as_ref()
            .filter(|active| active.worker_alive())
            .map(|active| *active.status_rx.borrow())
    }

    /// Health derived from the failure counters.
    ///
    /// OK with zero failures, WARNING while failures stay within half of the
    /// attempts, CRITICAL beyond. Never gates admission.
    pub fn health(&self) -> Health {
        let (attempts, failures) = self.counters.snapshot();
        let status = if failures == 0 {
            HealthStatus::Ok
        } else if failures <= attempts / 2 {
            HealthStatus::Warning
        } else {
            HealthStatus::Critical
        };
        Health {
            status,
            detail: format!("{} error(s) in {} simulations", failures, attempts),
        }
    }

    /// Server version string.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Time since the coordinator was constructed.
    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// If the active run's wall-clock kill deadline has elapsed, request
    /// `fail` on it and wait for the outcome. Returns the run id when a
    /// fail request was issued.
    ///
    /// Called by the deadline watchdog; the request serializes through the
    /// worker's command channel like any other transition.
    pub async fn enforce_deadline(&self) -> Option<RunId> {
        let overdue = {
            let slot = self.active.lock().unwrap();
            slot.as_ref().and_then(|active| {
                if !active.worker_alive() {
                    return None;
                }
                let status = *active.status_rx.borrow();
                if status.state.is_terminal() || status.timeout_kind != TimeoutKind::RealTime {
                    return None;
                }
                let deadline = status.kill_deadline?;
                if chrono::Utc::now() < deadline {
                    return None;
                }
                Some((active.run_id, deadline, active.command_tx.clone()))
            })
        };

        let (run_id, deadline, command_tx) = overdue?;
        warn!(run_id = %run_id, deadline = %deadline, "Run exceeded its kill deadline, requesting fail");

        let (reply_tx, reply_rx) = oneshot::channel();
        let command = TransitionCommand {
            transition: Transition::Fail,
            reply: Some(reply_tx),
        };
        if command_tx.send(command).await.is_err() {
            debug!(run_id = %run_id, "Worker already gone, no fail needed");
            return Some(run_id);
        }
        match reply_rx.await {
            Ok(Ok(state)) => info!(run_id = %run_id, state = %state, "Overdue run failed"),
            Ok(Err(e)) => debug!(run_id = %run_id, error = %e, "Fail request rejected"),
            Err(_) => debug!(run_id = %run_id, "Worker exited before answering the fail request"),
        }
        Some(run_id)
    }

    /// Gracefully terminate the active run, if any: request `stop` (falling
    /// back to `fail`), then wait for the teardown rendezvous, bounded by
    /// the teardown wait.
    pub async fn shutdown(&self) {
        let _admission = self.admission.lock().await;

        let active_parts = {
            let mut slot = self.active.lock().unwrap();
            match slot.as_mut() {
                Some(active) if active.worker_alive() => Some((
                    active.run_id,
                    active.command_tx.clone(),
                    active.teardown_rx.take(),
                )),
                _ => {
                    *slot = None;
                    None
                }
            }
        };
        let Some((run_id, command_tx, teardown_rx)) = active_parts else {
            return;
        };

        info!(run_id = %run_id, "Shutting down active simulation");
        for transition in [Transition::Stop, Transition::Fail] {
            let (reply_tx, reply_rx) = oneshot::channel();
            let command = TransitionCommand {
                transition,
                reply: Some(reply_tx),
            };
            if command_tx.send(command).await.is_err() {
                break;
            }
            match reply_rx.await {
                Ok(Ok(_)) => break,
                Ok(Err(e)) => {
                    debug!(run_id = %run_id, transition = %transition, error = %e,
                           "Shutdown transition rejected, trying next");
                }
                Err(_) => break,
            }
        }

        if let Some(teardown_rx) = teardown_rx {
            if tokio::time::timeout(self.teardown_wait, teardown_rx)
                .await
                .is_err()
            {
                warn!(run_id = %run_id, "Teardown did not finish within the bounded wait");
            }
        }
        self.clear_active();
    }

    /// Decide how to treat the previous run, if any.
    ///
    /// `Ok(None)`: slot free, admit. `Ok(Some(rx))`: previous run is done or
    /// unwinding, wait on its teardown first. `Err(AlreadyRunning)`: a run
    /// is active.
    fn teardown_gate(&self) -> Result<Option<oneshot::Receiver<()>>, AdmissionError> {
        let mut slot = self.active.lock().unwrap();
        match slot.as_mut() {
            None => Ok(None),
            Some(active) => {
                // a run whose terminal state is already published counts as
                // terminating even if the worker has not flagged it yet
                let state = active.status_rx.borrow().state;
                if active.worker_alive() && !active.is_terminating() && !state.is_terminal() {
                    warn!(
                        run_id = %active.run_id,
                        state = %state,
                        "Rejecting admission: previous simulation has not terminated"
                    );
                    return Err(AdmissionError::AlreadyRunning);
                }
                match active.teardown_rx.take() {
                    Some(rx) => Ok(Some(rx)),
                    // teardown already awaited elsewhere and the worker is
                    // done; free the slot
                    None => {
                        *slot = None;
                        Ok(None)
                    }
                }
            }
        }
    }

    fn clear_active(&self) {
        *self.active.lock().unwrap() = None;
    }

    fn restore_teardown_rx(&self, teardown_rx: oneshot::Receiver<()>) {
        if let Some(active) = self.active.lock().unwrap().as_mut() {
            active.teardown_rx = Some(teardown_rx);
        }
    }
}
