// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Per-run worker task.
//!
//! The worker owns the run's [`LifecycleController`] for the run's whole
//! life. It drives `initialize`, fires the initialization rendezvous either
//! way, then serves transition requests from its command channel one at a
//! time until the run reaches a terminal state. Afterwards it tears down the
//! run's child services and fires the teardown rendezvous the coordinator
//! gates the next admission on.
//!
//! Hooks run on this task and may block for arbitrarily long; a `fail`
//! requested mid-hook (e.g. by the watchdog) simply queues behind the hook
//! in the command channel.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use simbed_core::controller::LifecycleController;
use simbed_core::error::{HookError, LifecycleError};
use simbed_core::hooks::PhaseHooks;
use simbed_core::run::{RunId, RunStatus, SimulationRun};
use simbed_core::services::SimulationServices;
use simbed_core::state::{SimState, Transition};

use crate::coordinator::RunCounters;

/// One transition request travelling from the control plane to the worker.
#[derive(Debug)]
pub struct TransitionCommand {
    /// The transition to apply.
    pub transition: Transition,
    /// Where to send the outcome, if the requester is waiting on it.
    pub reply: Option<oneshot::Sender<Result<SimState, LifecycleError>>>,
}

/// Channel ends and handles produced by [`spawn_run_worker`].
pub struct SpawnedWorker {
    /// Sends transition requests to the worker.
    pub command_tx: mpsc::Sender<TransitionCommand>,
    /// Status snapshots published by the controller.
    pub status_rx: watch::Receiver<RunStatus>,
    /// Initialization rendezvous: fires exactly once, after `initialize`
    /// resolved either way.
    pub init_rx: oneshot::Receiver<Result<(), HookError>>,
    /// Teardown rendezvous: fires exactly once, after all cleanup finished.
    pub teardown_rx: oneshot::Receiver<()>,
    /// True while the worker is unwinding after a terminal transition.
    pub terminating: Arc<AtomicBool>,
    /// The worker task itself.
    pub join: JoinHandle<()>,
}

/// Spawn the worker task owning `run`.
pub fn spawn_run_worker(
    run: SimulationRun,
    hooks: Arc<dyn PhaseHooks>,
    services: Arc<dyn SimulationServices>,
    counters: Arc<RunCounters>,
) -> SpawnedWorker {
    let (command_tx, command_rx) = mpsc::channel(16);
    let (init_tx, init_rx) = oneshot::channel();
    let (teardown_tx, teardown_rx) = oneshot::channel();
    let terminating = Arc::new(AtomicBool::new(false));

    let controller = LifecycleController::new(run, hooks);
    let status_rx = controller.status_watch();

    let join = tokio::spawn(run_worker(
        controller,
        command_rx,
        init_tx,
        teardown_tx,
        services,
        counters,
        terminating.clone(),
    ));

    SpawnedWorker {
        command_tx,
        status_rx,
        init_rx,
        teardown_rx,
        terminating,
        join,
    }
}

async fn run_worker(
    mut controller: LifecycleController,
    mut commands: mpsc::Receiver<TransitionCommand>,
    init_tx: oneshot::Sender<Result<(), HookError>>,
    teardown_tx: oneshot::Sender<()>,
    services: Arc<dyn SimulationServices>,
    counters: Arc<RunCounters>,
    terminating: Arc<AtomicBool>,
) {
    let run_id = controller.run().id();

    let init_result = controller.initialize().await;
    let initialized = init_result.is_ok();
    let ack = init_result.map(|_| ()).map_err(|err| match err {
        LifecycleError::HookFailed { source, .. } => source,
        other => HookError::other(other.to_string()),
    });
    if init_tx.send(ack).is_err() {
        warn!(
            run_id = %run_id,
            "Admission caller went away before the initialization rendezvous"
        );
    }

    if initialized {
        info!(run_id = %run_id, "Initialization done, serving transition requests");
        serve_commands(&mut controller, &mut commands, run_id).await;
        // init failures are counted by the admission caller
        if controller.state() == SimState::Failed {
            counters.record_failure();
        }
    }

    // Unwinding: the run is terminal, release child services before letting
    // the coordinator admit the next run.
    terminating.store(true, Ordering::SeqCst);
    commands.close();

    let run = controller.into_run();
    if !run.child_resources.is_empty() {
        debug!(
            run_id = %run_id,
            services = run.child_resources.len(),
            "Shutting down child services"
        );
        if let Err(e) = services.shutdown(&run.child_resources).await {
            warn!(run_id = %run_id, error = %e, "Child service teardown failed");
        }
    }

    if teardown_tx.send(()).is_err() {
        debug!(run_id = %run_id, "No admission waiting on the teardown rendezvous");
    }
    info!(run_id = %run_id, final_state = %run.state(), "Run worker exiting");
}

async fn serve_commands(
    controller: &mut LifecycleController,
    commands: &mut mpsc::Receiver<TransitionCommand>,
    run_id: RunId,
) {
    while !controller.state().is_terminal() {
        match commands.recv().await {
            Some(command) => {
                let result = controller.apply(command.transition).await;
                if let Err(e) = &result {
                    debug!(run_id = %run_id, error = %e, "Transition request failed");
                }
                if let Some(reply) = command.reply {
                    // requester may have stopped waiting; that's fine
                    let _ = reply.send(result);
                }
            }
            None => {
                warn!(
                    run_id = %run_id,
                    "All control handles dropped with the run still active, failing the run"
                );
                if let Err(e) = controller.fail().await {
                    warn!(run_id = %run_id, error = %e, "Failing the abandoned run also failed");
                }
                break;
            }
        }
    }
}
