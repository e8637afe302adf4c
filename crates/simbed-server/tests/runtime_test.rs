// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Tests for the embeddable runtime - watchdog enforcement and graceful
//! shutdown of the active run.

use std::sync::Arc;
use std::time::Duration;

use simbed_core::mock::{MockResolver, MockServices, MockStateMachineManager};
use simbed_core::run::TimeoutKind;
use simbed_core::state::SimState;
use simbed_server::coordinator::AdmissionRequest;
use simbed_server::runtime::ServerRuntime;

fn request(timeout_seconds: Option<u64>) -> AdmissionRequest {
    AdmissionRequest {
        experiment: "exp_0".to_string(),
        execution_host: "localhost".to_string(),
        reservation: None,
        process_count: 1,
        timeout_seconds,
        timeout_kind: TimeoutKind::RealTime,
    }
}

fn started_runtime(deadline_poll: Duration) -> ServerRuntime {
    ServerRuntime::builder()
        .resolver(Arc::new(MockResolver::new()))
        .state_machines(Arc::new(MockStateMachineManager::new()))
        .services(Arc::new(MockServices::new()))
        .default_timeout(Duration::from_secs(600))
        .teardown_wait(Duration::from_secs(1))
        .deadline_poll_interval(deadline_poll)
        .build()
        .unwrap()
        .start()
}

#[tokio::test]
async fn test_watchdog_fails_overdue_run() {
    let runtime = started_runtime(Duration::from_millis(20));

    let handle = runtime
        .coordinator()
        .submit(request(Some(0)))
        .await
        .unwrap();
    handle.start().await.unwrap();

    // the watchdog notices the elapsed deadline within a few polls
    let mut state = handle.status().state;
    for _ in 0..100 {
        state = handle.status().state;
        if state == SimState::Failed {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(state, SimState::Failed);

    runtime.shutdown().await;
}

#[tokio::test]
async fn test_shutdown_stops_active_run() {
    let runtime = started_runtime(Duration::from_secs(5));

    let handle = runtime
        .coordinator()
        .submit(request(Some(60)))
        .await
        .unwrap();
    handle.start().await.unwrap();
    assert!(runtime.coordinator().is_running());

    runtime.shutdown().await;
    assert_eq!(handle.status().state, SimState::Stopped);
}

#[tokio::test]
async fn test_shutdown_with_no_active_run_is_quiet() {
    let runtime = started_runtime(Duration::from_secs(5));
    assert!(!runtime.coordinator().is_running());
    runtime.shutdown().await;
}
