// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Lifecycle states, transitions, and the edge table.
//!
//! The edge table is the single source of truth for which transitions are
//! legal from which state. Anything not listed fails with
//! [`InvalidTransition`](crate::error::LifecycleError::InvalidTransition)
//! and leaves the state untouched.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle state of a simulation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SimState {
    /// Run accepted but not yet initialized.
    Created,
    /// Resources resolved and child services launched, not yet executing.
    Initialized,
    /// Simulation executing.
    Started,
    /// Simulation suspended, resumable via `start`.
    Paused,
    /// Run ended normally. Terminal.
    Stopped,
    /// Run ended with an error. Terminal.
    Failed,
}

impl SimState {
    /// Whether this state is terminal for the run instance.
    ///
    /// Terminal states only permit `reset`.
    pub fn is_terminal(self) -> bool {
        matches!(self, SimState::Stopped | SimState::Failed)
    }

    /// Whether the run holds live external resources in this state.
    pub fn is_active(self) -> bool {
        matches!(self, SimState::Started | SimState::Paused)
    }

    /// The state a transition commits on hook success, or `None` if the
    /// transition is not legal from this state.
    pub fn transition_target(self, transition: Transition) -> Option<SimState> {
        use SimState::*;
        use Transition as T;
        match (self, transition) {
            (Created, T::Initialize) => Some(Initialized),
            (Initialized, T::Start) => Some(Started),
            (Started, T::Pause) => Some(Paused),
            // resume
            (Paused, T::Start) => Some(Started),
            (Initialized | Started | Paused, T::Stop) => Some(Stopped),
            (s, T::Fail) if !s.is_terminal() => Some(Failed),
            (Stopped | Failed, T::Reset) => Some(Created),
            _ => None,
        }
    }

    /// Lowercase name, matching the serialized form.
    pub fn as_str(self) -> &'static str {
        match self {
            SimState::Created => "created",
            SimState::Initialized => "initialized",
            SimState::Started => "started",
            SimState::Paused => "paused",
            SimState::Stopped => "stopped",
            SimState::Failed => "failed",
        }
    }
}

impl fmt::Display for SimState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A named lifecycle transition request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transition {
    /// `created` → `initialized`; resolves resources and launches services.
    Initialize,
    /// `initialized`/`paused` → `started`; also serves as resume.
    Start,
    /// `started` → `paused`.
    Pause,
    /// `initialized`/`started`/`paused` → `stopped`; releases all resources.
    Stop,
    /// Any non-terminal state → `failed`; releases all resources.
    Fail,
    /// `stopped`/`failed` → `created`, for callers that reuse the object.
    Reset,
}

impl Transition {
    /// Lowercase name, matching the serialized form.
    pub fn as_str(self) -> &'static str {
        match self {
            Transition::Initialize => "initialize",
            Transition::Start => "start",
            Transition::Pause => "pause",
            Transition::Stop => "stop",
            Transition::Fail => "fail",
            Transition::Reset => "reset",
        }
    }

    /// All transitions, in edge-table order.
    pub const ALL: [Transition; 6] = [
        Transition::Initialize,
        Transition::Start,
        Transition::Pause,
        Transition::Stop,
        Transition::Fail,
        Transition::Reset,
    ];
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_STATES: [SimState; 6] = [
        SimState::Created,
        SimState::Initialized,
        SimState::Started,
        SimState::Paused,
        SimState::Stopped,
        SimState::Failed,
    ];

    #[test]
    fn test_happy_path_edges() {
        assert_eq!(
            SimState::Created.transition_target(Transition::Initialize),
            Some(SimState::Initialized)
        );
        assert_eq!(
            SimState::Initialized.transition_target(Transition::Start),
            Some(SimState::Started)
        );
        assert_eq!(
            SimState::Started.transition_target(Transition::Pause),
            Some(SimState::Paused)
        );
        assert_eq!(
            SimState::Paused.transition_target(Transition::Start),
            Some(SimState::Started)
        );
    }

    #[test]
    fn test_stop_edges() {
        for from in [SimState::Initialized, SimState::Started, SimState::Paused] {
            assert_eq!(
                from.transition_target(Transition::Stop),
                Some(SimState::Stopped),
                "stop should be legal from {}",
                from
            );
        }
        assert_eq!(SimState::Created.transition_target(Transition::Stop), None);
        assert_eq!(SimState::Stopped.transition_target(Transition::Stop), None);
        assert_eq!(SimState::Failed.transition_target(Transition::Stop), None);
    }

    #[test]
    fn test_fail_reachable_from_every_non_terminal_state() {
        for from in ALL_STATES {
            let target = from.transition_target(Transition::Fail);
            if from.is_terminal() {
                assert_eq!(target, None, "fail should be illegal from {}", from);
            } else {
                assert_eq!(target, Some(SimState::Failed));
            }
        }
    }

    #[test]
    fn test_reset_only_from_terminal_states() {
        for from in ALL_STATES {
            let target = from.transition_target(Transition::Reset);
            if from.is_terminal() {
                assert_eq!(target, Some(SimState::Created));
            } else {
                assert_eq!(target, None, "reset should be illegal from {}", from);
            }
        }
    }

    #[test]
    fn test_terminal_states_only_permit_reset() {
        for from in [SimState::Stopped, SimState::Failed] {
            for transition in Transition::ALL {
                let target = from.transition_target(transition);
                if transition == Transition::Reset {
                    assert!(target.is_some());
                } else {
                    assert_eq!(
                        target, None,
                        "{} should be illegal from terminal state {}",
                        transition, from
                    );
                }
            }
        }
    }

    #[test]
    fn test_is_active() {
        assert!(SimState::Started.is_active());
        assert!(SimState::Paused.is_active());
        assert!(!SimState::Created.is_active());
        assert!(!SimState::Initialized.is_active());
        assert!(!SimState::Stopped.is_active());
        assert!(!SimState::Failed.is_active());
    }

    #[test]
    fn test_display_names() {
        assert_eq!(SimState::Initialized.to_string(), "initialized");
        assert_eq!(SimState::Paused.to_string(), "paused");
        assert_eq!(Transition::Initialize.to_string(), "initialize");
        assert_eq!(Transition::Reset.to_string(), "reset");
    }
}
