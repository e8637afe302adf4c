// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Experiment resolution collaborator seam and plan records.
//!
//! Parsing of experiment descriptors (XML in the reference deployment) is
//! not owned by this crate; the resolver returns an already-interpreted
//! [`ExperimentPlan`].

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::HookError;

/// Descriptor of one subordinate state machine attached to an experiment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateMachineSpec {
    /// Identifier unique within the experiment.
    pub id: String,
    /// Resolved source path of the state machine program.
    pub src: PathBuf,
}

/// Descriptor of one child service the simulation needs running.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceSpec {
    /// Service name, e.g. `gzserver`.
    pub name: String,
    /// Executable to launch.
    pub command: String,
    /// Arguments passed to the executable.
    #[serde(default)]
    pub args: Vec<String>,
    /// Extra environment variables, applied over the inherited environment.
    #[serde(default)]
    pub env: HashMap<String, String>,
}

/// Everything the `initialize` phase needs to know about an experiment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperimentPlan {
    /// Root folder of the experiment's resolved configuration.
    pub root_folder: PathBuf,
    /// Model library path for simulation assets.
    pub model_root: PathBuf,
    /// Timeout in seconds configured by the experiment, if any. An explicit
    /// timeout in the admission request takes precedence.
    pub timeout_secs: Option<u64>,
    /// Subordinate state machines to load before the run starts.
    pub state_machines: Vec<StateMachineSpec>,
    /// Child services to launch during `initialize`.
    pub services: Vec<ServiceSpec>,
}

/// Resolves an experiment descriptor into an [`ExperimentPlan`].
///
/// Invoked once per run, during the `initialize` hook, on the worker task.
#[async_trait]
pub trait ExperimentResolver: Send + Sync {
    /// Resolve `experiment` (an identifier or relative descriptor path)
    /// into a plan.
    async fn resolve(&self, experiment: &str) -> Result<ExperimentPlan, HookError>;
}
