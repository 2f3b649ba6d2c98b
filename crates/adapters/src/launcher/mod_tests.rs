// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[yare::parameterized(
    success    = { Some(0), WorkerStatus::Stopped },
    checkpoint = { Some(64), WorkerStatus::Checkpointing },
    failure    = { Some(1), WorkerStatus::Crashed },
    signal     = { None, WorkerStatus::Crashed },
)]
fn exit_codes_classify(code: Option<i32>, expected: WorkerStatus) {
    assert_eq!(classify_exit(code), expected);
}

#[yare::parameterized(
    subprocess = { "subprocess", LauncherMode::Subprocess },
    container  = { "container", LauncherMode::Container },
    auto       = { "auto", LauncherMode::Auto },
)]
fn mode_parses(input: &str, expected: LauncherMode) {
    assert_eq!(LauncherMode::parse(input).unwrap(), expected);
    assert_eq!(expected.as_str(), input);
}

#[test]
fn unknown_mode_is_rejected() {
    assert!(matches!(
        LauncherMode::parse("vm"),
        Err(LauncherError::UnsupportedMode(_))
    ));
}

#[tokio::test]
async fn explicit_modes_resolve_to_themselves() {
    assert_eq!(
        detect_launcher_mode(LauncherMode::Subprocess).await,
        LauncherMode::Subprocess
    );
    assert_eq!(
        detect_launcher_mode(LauncherMode::Container).await,
        LauncherMode::Container
    );
}

#[test]
fn spawn_result_constructors() {
    let handle = WorkerHandle {
        worker_id: 1,
        pid: Some(42),
        container_id: None,
    };
    let ok = SpawnResult::ok(handle.clone());
    assert!(ok.success);
    assert_eq!(ok.handle, Some(handle));
    let failed = SpawnResult::failed("no binary");
    assert!(!failed.success);
    assert_eq!(failed.error.as_deref(), Some("no binary"));
}
