// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for hooks and lifecycle transitions.
//!
//! Hook errors cross the worker/control-plane boundary by value: they are
//! cloneable and compare by kind and message, so the error the admission
//! caller observes is the same error the hook raised, not a rewrap.

use std::fmt;

use thiserror::Error;

use crate::state::{SimState, Transition};

/// Result type using LifecycleError.
pub type Result<T> = std::result::Result<T, LifecycleError>;

/// Classification of a phase hook failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum HookErrorKind {
    /// Experiment configuration could not be resolved or was invalid.
    Configuration,
    /// Filesystem or other local resources were unavailable.
    Resources,
    /// A child service failed to launch or respond.
    Services,
    /// The subordinate state machine manager reported a failure.
    StateMachines,
    /// Anything else.
    Other,
}

impl HookErrorKind {
    /// Stable uppercase code for logs and management responses.
    pub fn code(self) -> &'static str {
        match self {
            HookErrorKind::Configuration => "CONFIGURATION",
            HookErrorKind::Resources => "RESOURCES",
            HookErrorKind::Services => "SERVICES",
            HookErrorKind::StateMachines => "STATE_MACHINES",
            HookErrorKind::Other => "OTHER",
        }
    }
}

impl fmt::Display for HookErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Failure raised by a phase hook.
///
/// Carries the kind and message only. The original call stack stays in the
/// worker's logs; propagation across the rendezvous preserves identity by
/// value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct HookError {
    /// Failure classification.
    pub kind: HookErrorKind,
    /// Human-readable detail from the failure site.
    pub message: String,
}

impl HookError {
    /// Create a hook error with an explicit kind.
    pub fn new(kind: HookErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Configuration resolution failure.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(HookErrorKind::Configuration, message)
    }

    /// Local resource failure.
    pub fn resources(message: impl Into<String>) -> Self {
        Self::new(HookErrorKind::Resources, message)
    }

    /// Child service failure.
    pub fn services(message: impl Into<String>) -> Self {
        Self::new(HookErrorKind::Services, message)
    }

    /// Subordinate state machine failure.
    pub fn state_machines(message: impl Into<String>) -> Self {
        Self::new(HookErrorKind::StateMachines, message)
    }

    /// Unclassified failure.
    pub fn other(message: impl Into<String>) -> Self {
        Self::new(HookErrorKind::Other, message)
    }
}

impl From<std::io::Error> for HookError {
    fn from(err: std::io::Error) -> Self {
        HookError::resources(err.to_string())
    }
}

/// Errors from lifecycle transition requests.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum LifecycleError {
    /// The requested transition is not an edge from the current state.
    /// The state is left unchanged.
    #[error("invalid transition '{requested}' from state '{from}'")]
    InvalidTransition {
        /// State the run was in when the request arrived.
        from: SimState,
        /// The transition that was requested.
        requested: Transition,
    },

    /// The transition's hook failed; the run was committed to `failed`.
    #[error("{transition} hook failed: {source}")]
    HookFailed {
        /// The transition whose hook failed.
        transition: Transition,
        /// The failure the hook raised.
        source: HookError,
    },
}

impl LifecycleError {
    /// The underlying hook error, if this is a hook failure.
    pub fn hook_error(&self) -> Option<&HookError> {
        match self {
            LifecycleError::HookFailed { source, .. } => Some(source),
            LifecycleError::InvalidTransition { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hook_error_display() {
        let err = HookError::configuration("experiment 'exp_0' not found");
        assert_eq!(
            err.to_string(),
            "CONFIGURATION: experiment 'exp_0' not found"
        );

        let err = HookError::services("gzserver exited with code 1");
        assert_eq!(err.to_string(), "SERVICES: gzserver exited with code 1");
    }

    #[test]
    fn test_hook_error_equality_survives_clone() {
        let original = HookError::state_machines("sm_1 failed to load");
        let propagated = original.clone();
        assert_eq!(original, propagated);
    }

    #[test]
    fn test_hook_error_from_io() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "no such directory");
        let err = HookError::from(io);
        assert_eq!(err.kind, HookErrorKind::Resources);
        assert!(err.message.contains("no such directory"));
    }

    #[test]
    fn test_invalid_transition_display() {
        let err = LifecycleError::InvalidTransition {
            from: SimState::Stopped,
            requested: Transition::Stop,
        };
        assert_eq!(
            err.to_string(),
            "invalid transition 'stop' from state 'stopped'"
        );
    }

    #[test]
    fn test_hook_failed_exposes_source() {
        let source = HookError::other("boom");
        let err = LifecycleError::HookFailed {
            transition: Transition::Initialize,
            source: source.clone(),
        };
        assert_eq!(err.hook_error(), Some(&source));
        assert_eq!(err.to_string(), "initialize hook failed: OTHER: boom");
    }

    #[test]
    fn test_kind_codes() {
        assert_eq!(HookErrorKind::Configuration.code(), "CONFIGURATION");
        assert_eq!(HookErrorKind::StateMachines.code(), "STATE_MACHINES");
    }
}
