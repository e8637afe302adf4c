// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Filesystem-backed experiment resolver.
//!
//! Resolves an experiment descriptor to a plan file under the configured
//! experiments directory. Descriptors are JSON renditions of
//! [`ExperimentPlan`]; richer formats (the reference deployment uses XML)
//! belong to external tooling that emits the same plan shape.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use simbed_core::error::HookError;
use simbed_core::resolver::{ExperimentPlan, ExperimentResolver};

/// Resolver reading JSON plan files relative to an experiments directory.
#[derive(Debug, Clone)]
pub struct FsExperimentResolver {
    experiments_dir: PathBuf,
    models_dir: PathBuf,
}

impl FsExperimentResolver {
    /// Create a resolver rooted at `experiments_dir`, with `models_dir` as
    /// the default model root for plans that leave it unset.
    pub fn new(experiments_dir: impl Into<PathBuf>, models_dir: impl Into<PathBuf>) -> Self {
        Self {
            experiments_dir: experiments_dir.into(),
            models_dir: models_dir.into(),
        }
    }

    fn absolutize(base: &Path, path: PathBuf) -> PathBuf {
        if path.is_absolute() {
            path
        } else {
            base.join(path)
        }
    }
}

#[async_trait]
impl ExperimentResolver for FsExperimentResolver {
    async fn resolve(&self, experiment: &str) -> Result<ExperimentPlan, HookError> {
        let descriptor = self.experiments_dir.join(experiment);
        debug!(descriptor = %descriptor.display(), "Resolving experiment");

        let raw = tokio::fs::read(&descriptor).await.map_err(|e| {
            HookError::configuration(format!(
                "could not read experiment descriptor '{}': {}",
                descriptor.display(),
                e
            ))
        })?;

        let mut plan: ExperimentPlan = serde_json::from_slice(&raw).map_err(|e| {
            HookError::configuration(format!(
                "could not parse experiment descriptor '{}': {}",
                descriptor.display(),
                e
            ))
        })?;

        let descriptor_dir = descriptor
            .parent()
            .unwrap_or(&self.experiments_dir)
            .to_path_buf();

        if plan.root_folder.as_os_str().is_empty() {
            plan.root_folder = descriptor_dir.clone();
        } else {
            plan.root_folder = Self::absolutize(&descriptor_dir, plan.root_folder);
        }
        if plan.model_root.as_os_str().is_empty() {
            plan.model_root = self.models_dir.clone();
        }
        for sm in &mut plan.state_machines {
            sm.src = Self::absolutize(&plan.root_folder, std::mem::take(&mut sm.src));
        }

        Ok(plan)
    }
}
