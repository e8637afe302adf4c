// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Mock collaborators for tests.
//!
//! Simple implementations of the collaborator seams that record calls and
//! fail on demand, without touching the filesystem or spawning processes.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;

use crate::error::HookError;
use crate::hooks::PhaseHooks;
use crate::resolver::{ExperimentPlan, ExperimentResolver, ServiceSpec, StateMachineSpec};
use crate::run::{RunId, ServiceHandle, SimulationRun};
use crate::services::{SimulationServices, StateMachineManager, StateMachineOutcome};
use crate::state::SimState;

/// Phase hooks that record every dispatch and fail on demand.
///
/// Hook names are the transition names plus `"cleanup"`.
#[derive(Default)]
pub struct RecordingHooks {
    calls: std::sync::Mutex<Vec<(&'static str, SimState)>>,
    fail_on: std::sync::Mutex<HashMap<&'static str, HookError>>,
    cleanup_calls: AtomicUsize,
    /// Delay applied inside every hook, to widen race windows in tests.
    pub hook_delay: Option<Duration>,
}

impl RecordingHooks {
    /// Create hooks that succeed on every dispatch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create hooks with a fixed per-hook delay.
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            hook_delay: Some(delay),
            ..Self::default()
        }
    }

    /// Make the named hook fail with `error` on every subsequent dispatch.
    pub fn fail_on(&self, hook: &'static str, error: HookError) {
        self.fail_on.lock().unwrap().insert(hook, error);
    }

    /// Dispatched transition hooks, as `(hook name, pre-transition state)`.
    /// Cleanup dispatches are counted separately.
    pub fn calls(&self) -> Vec<(&'static str, SimState)> {
        self.calls.lock().unwrap().clone()
    }

    /// How many times the cleanup set ran.
    pub fn cleanup_count(&self) -> usize {
        self.cleanup_calls.load(Ordering::SeqCst)
    }

    async fn record(&self, hook: &'static str, run: &SimulationRun) -> Result<(), HookError> {
        if let Some(delay) = self.hook_delay {
            tokio::time::sleep(delay).await;
        }
        self.calls.lock().unwrap().push((hook, run.state()));
        match self.fail_on.lock().unwrap().get(hook) {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl PhaseHooks for RecordingHooks {
    async fn initialize(&self, run: &mut SimulationRun) -> Result<(), HookError> {
        self.record("initialize", run).await
    }

    async fn start(&self, run: &mut SimulationRun) -> Result<(), HookError> {
        self.record("start", run).await
    }

    async fn pause(&self, run: &mut SimulationRun) -> Result<(), HookError> {
        self.record("pause", run).await
    }

    async fn stop(&self, run: &mut SimulationRun) -> Result<(), HookError> {
        self.record("stop", run).await
    }

    async fn fail(&self, run: &mut SimulationRun) -> Result<(), HookError> {
        self.record("fail", run).await
    }

    async fn reset(&self, run: &mut SimulationRun) -> Result<(), HookError> {
        self.record("reset", run).await
    }

    async fn cleanup(&self, run: &mut SimulationRun) -> Result<(), HookError> {
        self.cleanup_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.hook_delay {
            tokio::time::sleep(delay).await;
        }
        match self.fail_on.lock().unwrap().get("cleanup") {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }
}

/// Resolver returning a configurable plan.
#[derive(Default)]
pub struct MockResolver {
    plan: std::sync::Mutex<ExperimentPlan>,
    fail_with: std::sync::Mutex<Option<HookError>>,
    resolve_calls: AtomicUsize,
}

impl MockResolver {
    /// Create a resolver returning an empty plan.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a resolver returning `plan`.
    pub fn with_plan(plan: ExperimentPlan) -> Self {
        Self {
            plan: std::sync::Mutex::new(plan),
            ..Self::default()
        }
    }

    /// Make every subsequent resolve fail with `error`.
    pub fn fail_with(&self, error: HookError) {
        *self.fail_with.lock().unwrap() = Some(error);
    }

    /// Make subsequent resolves succeed again.
    pub fn clear_failure(&self) {
        *self.fail_with.lock().unwrap() = None;
    }

    /// Number of resolve calls seen.
    pub fn resolve_count(&self) -> usize {
        self.resolve_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ExperimentResolver for MockResolver {
    async fn resolve(&self, _experiment: &str) -> Result<ExperimentPlan, HookError> {
        self.resolve_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self.fail_with.lock().unwrap().clone() {
            return Err(error);
        }
        Ok(self.plan.lock().unwrap().clone())
    }
}

/// State machine manager counting every operation.
#[derive(Default)]
pub struct MockStateMachineManager {
    loads: AtomicUsize,
    starts: AtomicUsize,
    terminates: AtomicUsize,
    shutdowns: AtomicUsize,
    fail_on_load: std::sync::Mutex<Option<HookError>>,
    fail_on_start: std::sync::Mutex<Option<HookError>>,
    outcomes: Mutex<Vec<StateMachineOutcome>>,
}

impl MockStateMachineManager {
    /// Create a manager that succeeds on every operation.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `load_all` fail with `error`.
    pub fn fail_on_load(&self, error: HookError) {
        *self.fail_on_load.lock().unwrap() = Some(error);
    }

    /// Make `start_all` fail with `error`.
    pub fn fail_on_start(&self, error: HookError) {
        *self.fail_on_start.lock().unwrap() = Some(error);
    }

    /// Seed the outcomes reported by [`StateMachineManager::outcomes`].
    pub async fn set_outcomes(&self, outcomes: Vec<StateMachineOutcome>) {
        *self.outcomes.lock().await = outcomes;
    }

    /// Number of `load_all` calls.
    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    /// Number of `start_all` calls.
    pub fn start_count(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    /// Number of `terminate_all` calls.
    pub fn terminate_count(&self) -> usize {
        self.terminates.load(Ordering::SeqCst)
    }

    /// Number of `shutdown` calls.
    pub fn shutdown_count(&self) -> usize {
        self.shutdowns.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StateMachineManager for MockStateMachineManager {
    async fn load_all(&self, _run_id: RunId, _specs: &[StateMachineSpec]) -> Result<(), HookError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        match self.fail_on_load.lock().unwrap().clone() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    async fn start_all(&self) -> Result<(), HookError> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        match self.fail_on_start.lock().unwrap().clone() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    async fn terminate_all(&self) -> Result<(), HookError> {
        self.terminates.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), HookError> {
        self.shutdowns.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn outcomes(&self) -> Vec<StateMachineOutcome> {
        self.outcomes.lock().await.clone()
    }
}

/// Child service launcher handing out synthetic handles.
#[derive(Default)]
pub struct MockServices {
    launched: Arc<Mutex<Vec<ServiceHandle>>>,
    shutdown_calls: AtomicUsize,
    fail_on_launch: std::sync::Mutex<Option<HookError>>,
}

impl MockServices {
    /// Create a launcher that succeeds on every operation.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `launch` fail with `error`.
    pub fn fail_on_launch(&self, error: HookError) {
        *self.fail_on_launch.lock().unwrap() = Some(error);
    }

    /// Handles launched so far.
    pub async fn launched(&self) -> Vec<ServiceHandle> {
        self.launched.lock().await.clone()
    }

    /// Number of `shutdown` calls.
    pub fn shutdown_count(&self) -> usize {
        self.shutdown_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SimulationServices for MockServices {
    async fn launch(
        &self,
        run: &SimulationRun,
        specs: &[ServiceSpec],
    ) -> Result<Vec<ServiceHandle>, HookError> {
        if let Some(error) = self.fail_on_launch.lock().unwrap().clone() {
            return Err(error);
        }
        let handles: Vec<ServiceHandle> = specs
            .iter()
            .map(|spec| ServiceHandle {
                service_id: format!("mock-{}-{}", run.id(), spec.name),
                name: spec.name.clone(),
                pid: None,
                started_at: Utc::now(),
            })
            .collect();
        self.launched.lock().await.extend(handles.iter().cloned());
        Ok(handles)
    }

    async fn shutdown(&self, _handles: &[ServiceHandle]) -> Result<(), HookError> {
        self.shutdown_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::run::TimeoutKind;

    #[tokio::test]
    async fn test_recording_hooks_record_pre_transition_state() {
        let hooks = RecordingHooks::new();
        let mut run = SimulationRun::new(RunId(9), Duration::from_secs(1), TimeoutKind::RealTime);
        hooks.initialize(&mut run).await.unwrap();
        assert_eq!(hooks.calls(), vec![("initialize", SimState::Created)]);
    }

    #[tokio::test]
    async fn test_recording_hooks_fail_on() {
        let hooks = RecordingHooks::new();
        hooks.fail_on("pause", HookError::other("nope"));
        let mut run = SimulationRun::new(RunId(9), Duration::from_secs(1), TimeoutKind::RealTime);
        assert!(hooks.start(&mut run).await.is_ok());
        assert_eq!(
            hooks.pause(&mut run).await.unwrap_err(),
            HookError::other("nope")
        );
    }

    #[tokio::test]
    async fn test_mock_resolver_counts_and_fails() {
        let resolver = MockResolver::new();
        assert!(resolver.resolve("exp_0").await.is_ok());
        resolver.fail_with(HookError::configuration("missing"));
        assert!(resolver.resolve("exp_0").await.is_err());
        assert_eq!(resolver.resolve_count(), 2);
    }

    #[tokio::test]
    async fn test_mock_services_launch_one_handle_per_spec() {
        let services = MockServices::new();
        let run = SimulationRun::new(RunId(3), Duration::from_secs(1), TimeoutKind::RealTime);
        let specs = vec![
            ServiceSpec {
                name: "gzserver".to_string(),
                command: "gzserver".to_string(),
                args: vec![],
                env: HashMap::new(),
            },
            ServiceSpec {
                name: "gzweb".to_string(),
                command: "gzweb".to_string(),
                args: vec![],
                env: HashMap::new(),
            },
        ];
        let handles = services.launch(&run, &specs).await.unwrap();
        assert_eq!(handles.len(), 2);
        assert_eq!(handles[0].service_id, "mock-3-gzserver");
        assert_eq!(services.launched().await.len(), 2);
    }
}
