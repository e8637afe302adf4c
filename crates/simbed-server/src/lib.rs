// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Simbed Server - Simulation Admission and Supervision
//!
//! One simulation at a time: the [`coordinator`] gatekeeps admission, spawns
//! a dedicated worker per accepted run, and blocks the submitter only until
//! the run finishes initializing. The worker owns the run's
//! [`LifecycleController`](simbed_core::controller::LifecycleController) and
//! serializes all transition requests through a command channel; the
//! [`watchdog`] enforces wall-clock kill deadlines by issuing ordinary
//! `fail` requests.
//!
//! The transport that feeds admission requests and status queries (ROS/REST
//! in the reference deployment) is an external collaborator. Embed the
//! server through [`runtime::ServerRuntime`] or run the `simbed-server`
//! binary and attach your own plumbing.

/// Server configuration from environment variables.
pub mod config;

/// The admission coordinator: one-run-at-a-time gatekeeping, health
/// accounting, and run handles.
pub mod coordinator;

/// Phase hook wiring for resolver, state machines, and child services.
pub mod phases;

/// Process-backed collaborator implementations.
pub mod process;

/// Filesystem-backed experiment resolver.
pub mod resolver;

/// Embeddable runtime: coordinator plus deadline watchdog.
pub mod runtime;

/// Wall-clock deadline enforcement for the active run.
pub mod watchdog;

/// Per-run worker task and its command channel.
pub mod worker;
