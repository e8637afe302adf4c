// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Phase hook wiring.
//!
//! [`ExperimentPhases`] implements the lifecycle hooks for one admitted run
//! by dispatching to the injected collaborators: the experiment resolver,
//! the subordinate state machine manager, and the child service launcher.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, error, info, warn};

use simbed_core::error::HookError;
use simbed_core::hooks::PhaseHooks;
use simbed_core::resolver::ExperimentResolver;
use simbed_core::run::SimulationRun;
use simbed_core::services::{SimulationServices, StateMachineManager, StateMachineOutcome};

use crate::coordinator::AdmissionRequest;

/// Hooks for one run, parameterized by its admission request.
pub struct ExperimentPhases {
    request: AdmissionRequest,
    resolver: Arc<dyn ExperimentResolver>,
    state_machines: Arc<dyn StateMachineManager>,
    services: Arc<dyn SimulationServices>,
}

impl ExperimentPhases {
    /// Wire hooks for the run admitted by `request`.
    pub fn new(
        request: AdmissionRequest,
        resolver: Arc<dyn ExperimentResolver>,
        state_machines: Arc<dyn StateMachineManager>,
        services: Arc<dyn SimulationServices>,
    ) -> Self {
        Self {
            request,
            resolver,
            state_machines,
            services,
        }
    }

    async fn log_outcomes(&self, run: &SimulationRun) {
        let outcomes = self.state_machines.outcomes().await;
        if !outcomes.is_empty() {
            info!(
                run_id = %run.id(),
                outcomes = %format_outcomes(&outcomes),
                "State machine outcomes"
            );
        }
    }
}

fn format_outcomes(outcomes: &[StateMachineOutcome]) -> String {
    outcomes
        .iter()
        .map(|o| format!("{}: {}", o.id, o.result.as_deref().unwrap_or("-")))
        .collect::<Vec<_>>()
        .join(", ")
}

#[async_trait]
impl PhaseHooks for ExperimentPhases {
    async fn initialize(&self, run: &mut SimulationRun) -> Result<(), HookError> {
        let plan = self.resolver.resolve(&self.request.experiment).await?;
        info!(
            run_id = %run.id(),
            experiment = %self.request.experiment,
            host = %self.request.execution_host,
            reservation = ?self.request.reservation,
            processes = self.request.process_count,
            root = %plan.root_folder.display(),
            "Preparing new simulation"
        );

        run.root_folder = plan.root_folder.clone();
        run.models_path = plan.model_root.clone();
        // the request's explicit timeout wins over the experiment's
        if self.request.timeout_seconds.is_none()
            && let Some(secs) = plan.timeout_secs
        {
            run.timeout = std::time::Duration::from_secs(secs);
        }

        self.state_machines
            .load_all(run.id(), &plan.state_machines)
            .await?;

        run.child_resources = self.services.launch(run, &plan.services).await?;
        info!(
            run_id = %run.id(),
            services = run.child_resources.len(),
            state_machines = plan.state_machines.len(),
            "Simulation initialized"
        );
        Ok(())
    }

    async fn start(&self, run: &mut SimulationRun) -> Result<(), HookError> {
        info!(run_id = %run.id(), "Starting state machines");
        // state machine trouble surfaces through its own error channel and
        // must not take the simulation down
        if let Err(e) = self.state_machines.start_all().await {
            error!(run_id = %run.id(), error = %e, "Starting state machines failed");
        }
        Ok(())
    }

    async fn pause(&self, run: &mut SimulationRun) -> Result<(), HookError> {
        debug!(run_id = %run.id(), "Pausing simulation");
        self.state_machines.terminate_all().await?;
        Ok(())
    }

    async fn stop(&self, run: &mut SimulationRun) -> Result<(), HookError> {
        self.log_outcomes(run).await;
        Ok(())
    }

    async fn fail(&self, run: &mut SimulationRun) -> Result<(), HookError> {
        warn!(run_id = %run.id(), "Simulation failed");
        self.state_machines.terminate_all().await?;
        Ok(())
    }

    async fn reset(&self, run: &mut SimulationRun) -> Result<(), HookError> {
        self.log_outcomes(run).await;
        self.state_machines.terminate_all().await?;
        info!(run_id = %run.id(), "Simulation reset");
        Ok(())
    }

    async fn cleanup(&self, run: &mut SimulationRun) -> Result<(), HookError> {
        let mut first_error = None;

        if let Err(e) = self.state_machines.terminate_all().await {
            first_error.get_or_insert(e);
        }
        if let Err(e) = self.state_machines.shutdown().await {
            first_error.get_or_insert(e);
        }

        // configuration folders cloned into the temp dir are per-run scratch
        if !run.root_folder.as_os_str().is_empty() && run.root_folder.starts_with(std::env::temp_dir())
        {
            debug!(
                run_id = %run.id(),
                folder = %run.root_folder.display(),
                "Removing cloned configuration folder"
            );
            if let Err(e) = tokio::fs::remove_dir_all(&run.root_folder).await {
                warn!(
                    run_id = %run.id(),
                    error = %e,
                    "Could not remove cloned configuration folder"
                );
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use simbed_core::mock::{MockResolver, MockServices, MockStateMachineManager};
    use simbed_core::resolver::{ExperimentPlan, ServiceSpec};
    use simbed_core::run::{RunId, TimeoutKind};

    fn request() -> AdmissionRequest {
        AdmissionRequest {
            experiment: "exp_0/experiment.json".to_string(),
            execution_host: "local".to_string(),
            reservation: None,
            process_count: 1,
            timeout_seconds: None,
            timeout_kind: TimeoutKind::RealTime,
        }
    }

    fn run() -> SimulationRun {
        SimulationRun::new(RunId(5), Duration::from_secs(600), TimeoutKind::RealTime)
    }

    fn phases(
        resolver: Arc<MockResolver>,
        manager: Arc<MockStateMachineManager>,
        services: Arc<MockServices>,
    ) -> ExperimentPhases {
        ExperimentPhases::new(request(), resolver, manager, services)
    }

    #[tokio::test]
    async fn test_initialize_fills_run_from_plan() {
        let plan = ExperimentPlan {
            root_folder: "/srv/experiments/exp_0".into(),
            model_root: "/srv/models".into(),
            timeout_secs: Some(42),
            state_machines: vec![],
            services: vec![ServiceSpec {
                name: "gzserver".to_string(),
                command: "gzserver".to_string(),
                args: vec![],
                env: Default::default(),
            }],
        };
        let resolver = Arc::new(MockResolver::with_plan(plan));
        let manager = Arc::new(MockStateMachineManager::new());
        let services = Arc::new(MockServices::new());
        let hooks = phases(resolver.clone(), manager.clone(), services.clone());

        let mut run = run();
        hooks.initialize(&mut run).await.unwrap();

        assert_eq!(run.root_folder, std::path::PathBuf::from("/srv/experiments/exp_0"));
        assert_eq!(run.models_path, std::path::PathBuf::from("/srv/models"));
        // request carried no timeout, so the experiment's wins
        assert_eq!(run.timeout, Duration::from_secs(42));
        assert_eq!(run.child_resources.len(), 1);
        assert_eq!(resolver.resolve_count(), 1);
        assert_eq!(manager.load_count(), 1);
    }

    #[tokio::test]
    async fn test_request_timeout_overrides_experiment_timeout() {
        let plan = ExperimentPlan {
            timeout_secs: Some(42),
            ..Default::default()
        };
        let resolver = Arc::new(MockResolver::with_plan(plan));
        let manager = Arc::new(MockStateMachineManager::new());
        let services = Arc::new(MockServices::new());
        let mut request = request();
        request.timeout_seconds = Some(7);
        let hooks = ExperimentPhases::new(request, resolver, manager, services);

        let mut run = SimulationRun::new(RunId(5), Duration::from_secs(7), TimeoutKind::RealTime);
        hooks.initialize(&mut run).await.unwrap();
        assert_eq!(run.timeout, Duration::from_secs(7));
    }

    #[tokio::test]
    async fn test_initialize_propagates_resolver_failure() {
        let resolver = Arc::new(MockResolver::new());
        resolver.fail_with(HookError::configuration("experiment not found"));
        let manager = Arc::new(MockStateMachineManager::new());
        let services = Arc::new(MockServices::new());
        let hooks = phases(resolver, manager.clone(), services);

        let mut run = run();
        let err = hooks.initialize(&mut run).await.unwrap_err();
        assert_eq!(err, HookError::configuration("experiment not found"));
        // nothing further was attempted
        assert_eq!(manager.load_count(), 0);
    }

    #[tokio::test]
    async fn test_start_swallows_state_machine_failure() {
        let resolver = Arc::new(MockResolver::new());
        let manager = Arc::new(MockStateMachineManager::new());
        manager.fail_on_start(HookError::state_machines("sm_0 invalid"));
        let services = Arc::new(MockServices::new());
        let hooks = phases(resolver, manager.clone(), services);

        let mut run = run();
        assert!(hooks.start(&mut run).await.is_ok());
        assert_eq!(manager.start_count(), 1);
    }

    #[tokio::test]
    async fn test_cleanup_terminates_and_shuts_down_state_machines() {
        let resolver = Arc::new(MockResolver::new());
        let manager = Arc::new(MockStateMachineManager::new());
        let services = Arc::new(MockServices::new());
        let hooks = phases(resolver, manager.clone(), services);

        let mut run = run();
        hooks.cleanup(&mut run).await.unwrap();
        assert_eq!(manager.terminate_count(), 1);
        assert_eq!(manager.shutdown_count(), 1);
    }

    #[tokio::test]
    async fn test_cleanup_removes_cloned_temp_folder() {
        let resolver = Arc::new(MockResolver::new());
        let manager = Arc::new(MockStateMachineManager::new());
        let services = Arc::new(MockServices::new());
        let hooks = phases(resolver, manager, services);

        let scratch = tempfile::tempdir().unwrap();
        let cloned = scratch.path().join("exp_0");
        tokio::fs::create_dir_all(&cloned).await.unwrap();

        let mut run = run();
        run.root_folder = cloned.clone();
        hooks.cleanup(&mut run).await.unwrap();

        assert!(!cloned.exists());
        // keep the tempdir guard alive until after the assertion
        drop(scratch);
    }
}
