// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Run identity, bookkeeping fields, and status snapshots.
//!
//! A [`SimulationRun`] is owned exclusively by its worker while it is alive;
//! the control plane observes it through [`RunStatus`] snapshots published
//! on a watch channel by the controller.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::state::SimState;

/// Monotonic run identifier, unique for the lifetime of the process.
///
/// Ids are assigned by the admission coordinator and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(
    /// Raw monotonic value.
    pub u64,
);

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which clock the run timeout is measured against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeoutKind {
    /// Wall-clock time; enforced by the deadline watchdog.
    RealTime,
    /// Simulated time; enforcement belongs to the physics collaborator.
    SimulationTime,
}

/// Handle to a child service spawned during `initialize`.
///
/// Opaque to the lifecycle engine; the launching collaborator interprets it
/// during teardown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceHandle {
    /// Identifier scoped to the launching collaborator.
    pub service_id: String,
    /// Service name from the experiment plan.
    pub name: String,
    /// PID of the spawned process, when the collaborator tracks one.
    pub pid: Option<u32>,
    /// When the service was launched.
    pub started_at: DateTime<Utc>,
}

/// One simulation execution attempt.
///
/// Created by the admission coordinator in `created` state and mutated only
/// by its owning worker through the
/// [`LifecycleController`](crate::controller::LifecycleController). Hooks
/// receive `&mut SimulationRun` to fill in the fields their phase resolves;
/// the state and kill deadline are committed by the controller alone.
#[derive(Debug)]
pub struct SimulationRun {
    id: RunId,
    state: SimState,
    kill_deadline: Option<DateTime<Utc>>,
    /// Effective run timeout. Seeded from the admission request or server
    /// default; the `initialize` hook may refine it from the resolved
    /// experiment before the deadline is computed.
    pub timeout: Duration,
    /// Which clock `timeout` is measured against.
    pub timeout_kind: TimeoutKind,
    /// Root folder of the resolved experiment. Set during `initialize`.
    pub root_folder: PathBuf,
    /// Model library path the simulation loads assets from. Set during
    /// `initialize`.
    pub models_path: PathBuf,
    /// Handles to child services spawned during `initialize`, torn down by
    /// the worker after the run reaches a terminal state.
    pub child_resources: Vec<ServiceHandle>,
}

impl SimulationRun {
    /// Create a run in `created` state with the given timeout budget.
    pub fn new(id: RunId, timeout: Duration, timeout_kind: TimeoutKind) -> Self {
        Self {
            id,
            state: SimState::Created,
            kill_deadline: None,
            timeout,
            timeout_kind,
            root_folder: PathBuf::new(),
            models_path: PathBuf::new(),
            child_resources: Vec::new(),
        }
    }

    /// The run's identifier.
    pub fn id(&self) -> RunId {
        self.id
    }

    /// Current lifecycle state. Inside a hook this is the pre-transition
    /// state; the controller commits the target only after the hook returns.
    pub fn state(&self) -> SimState {
        self.state
    }

    /// Absolute wall-clock instant after which the run must be failed, if a
    /// deadline is armed. Set on `initialize`, cleared on `stop` and `fail`.
    pub fn kill_deadline(&self) -> Option<DateTime<Utc>> {
        self.kill_deadline
    }

    /// Snapshot for watch-channel publication.
    pub fn status(&self) -> RunStatus {
        RunStatus {
            id: self.id,
            state: self.state,
            kill_deadline: self.kill_deadline,
            timeout_kind: self.timeout_kind,
        }
    }

    pub(crate) fn set_state(&mut self, state: SimState) {
        self.state = state;
    }

    pub(crate) fn set_kill_deadline(&mut self, deadline: Option<DateTime<Utc>>) {
        self.kill_deadline = deadline;
    }

    /// Clear per-attempt scratch state after a `reset` commit, for callers
    /// that reuse the object rather than admitting a fresh run.
    pub(crate) fn clear_scratch(&mut self) {
        self.kill_deadline = None;
        self.child_resources.clear();
        self.root_folder = PathBuf::new();
    }
}

/// Point-in-time view of a run, published by the controller on every commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RunStatus {
    /// The run's identifier.
    pub id: RunId,
    /// Committed lifecycle state.
    pub state: SimState,
    /// Armed kill deadline, if any.
    pub kill_deadline: Option<DateTime<Utc>>,
    /// Which clock the deadline is measured against.
    pub timeout_kind: TimeoutKind,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_run_is_created_with_no_deadline() {
        let run = SimulationRun::new(
            RunId(7),
            Duration::from_secs(300),
            TimeoutKind::RealTime,
        );
        assert_eq!(run.id(), RunId(7));
        assert_eq!(run.state(), SimState::Created);
        assert_eq!(run.kill_deadline(), None);
        assert!(run.child_resources.is_empty());
    }

    #[test]
    fn test_status_snapshot_tracks_fields() {
        let mut run = SimulationRun::new(
            RunId(1),
            Duration::from_secs(60),
            TimeoutKind::SimulationTime,
        );
        run.set_state(SimState::Initialized);
        let deadline = Utc::now();
        run.set_kill_deadline(Some(deadline));

        let status = run.status();
        assert_eq!(status.id, RunId(1));
        assert_eq!(status.state, SimState::Initialized);
        assert_eq!(status.kill_deadline, Some(deadline));
    }

    #[test]
    fn test_clear_scratch_resets_per_attempt_fields() {
        let mut run = SimulationRun::new(RunId(2), Duration::from_secs(60), TimeoutKind::RealTime);
        run.set_kill_deadline(Some(Utc::now()));
        run.root_folder = PathBuf::from("/tmp/exp_0");
        run.child_resources.push(ServiceHandle {
            service_id: "svc-1".to_string(),
            name: "gzserver".to_string(),
            pid: Some(4242),
            started_at: Utc::now(),
        });

        run.clear_scratch();

        assert_eq!(run.kill_deadline(), None);
        assert!(run.child_resources.is_empty());
        assert_eq!(run.root_folder, PathBuf::new());
    }

    #[test]
    fn test_run_id_display() {
        assert_eq!(RunId(42).to_string(), "42");
    }
}
