// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Simbed Core - Simulation Lifecycle Engine
//!
//! This crate provides the per-run lifecycle engine for simbed. It owns the
//! phase state machine, dispatches user-supplied phase hooks, and guarantees
//! that teardown runs exactly once on every path out of an active run.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         External Control Plane                           │
//! │                  (REST/RPC plumbing, not part of simbed)                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//!                                    │
//!                                    ▼
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          simbed-server                                   │
//! │        (Admission Coordinator, Run Worker, Deadline Watchdog)            │
//! └─────────────────────────────────────────────────────────────────────────┘
//!                                    │ owns one per run
//!                                    ▼
//! ┌───────────────────────┐                    ┌─────────────────────────────┐
//! │    simbed-core        │───────────────────►│   Phase Hook Collaborators  │
//! │  (This Crate)         │    PhaseHooks      │  (resolver, state machines, │
//! │  LifecycleController  │                    │   child services)           │
//! └───────────────────────┘                    └─────────────────────────────┘
//! ```
//!
//! # Run State Machine
//!
//! ```text
//!                  ┌─────────┐
//!                  │ CREATED │◄────────────────────┐
//!                  └────┬────┘                     │
//!                       │ initialize               │ reset
//!                       ▼                          │
//!                  ┌─────────────┐                 │
//!          ┌───────│ INITIALIZED │────────┐        │
//!          │       └──────┬──────┘        │        │
//!      start│             │stop           │fail    │
//!          ▼              │               │        │
//!     ┌─────────┐         │               │        │
//!     │ STARTED │◄──┐     │               │        │
//!     └────┬────┘   │     │               │        │
//!     pause│   start│     │               │        │
//!          ▼        │     │               │        │
//!     ┌─────────┐   │     │               │        │
//!     │ PAUSED  │───┘     │               │        │
//!     └────┬────┘         │               │        │
//!          │stop          │               │        │
//!          ▼              ▼               ▼        │
//!     ┌─────────┐    ┌─────────┐    ┌─────────┐   │
//!     │ STOPPED │    │ STOPPED │    │ FAILED  │───┤
//!     └────┬────┘    └─────────┘    └─────────┘   │
//!          └──────────────────────────────────────┘
//! ```
//!
//! Every non-terminal state additionally has a `fail` edge to FAILED. A hook
//! failure on any transition commits FAILED instead of the requested target,
//! runs the cleanup set, and re-raises the hook's error to the caller.
//!
//! # Cleanup Guarantee
//!
//! The cleanup set (subordinate state machines, child services, temporary
//! folders) runs exactly once per run, on every path into STOPPED or FAILED -
//! hook success, hook failure, or externally requested `fail`. Cleanup errors
//! are logged and suppressed; they never block the next admission.
//!
//! # Modules
//!
//! - [`controller`]: The per-run transition engine
//! - [`error`]: Hook and lifecycle error types
//! - [`hooks`]: The phase hook capability trait
//! - [`mock`]: Mock collaborators for tests
//! - [`resolver`]: Experiment resolution collaborator seam
//! - [`run`]: Run bookkeeping records
//! - [`services`]: State machine and child service collaborator seams
//! - [`state`]: States, transitions, and the edge table

#![deny(missing_docs)]

/// The per-run transition engine with cleanup and deadline bookkeeping.
pub mod controller;

/// Error types for hooks and lifecycle transitions.
pub mod error;

/// The phase hook capability trait dispatched on every transition.
pub mod hooks;

/// Mock collaborators and recording hooks for tests.
pub mod mock;

/// Experiment resolution collaborator seam and plan records.
pub mod resolver;

/// Run identity, bookkeeping fields, and status snapshots.
pub mod run;

/// Subordinate state machine and child service collaborator seams.
pub mod services;

/// Lifecycle states, transitions, and the edge table.
pub mod state;
