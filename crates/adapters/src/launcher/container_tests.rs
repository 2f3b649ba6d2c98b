// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn container_names_embed_feature_and_slot() {
    assert_eq!(
        ContainerLauncher::container_name("auth-api", 3),
        "zerg-auth-api-worker-3"
    );
}

#[yare::parameterized(
    running      = { "running:0", WorkerStatus::Running },
    created      = { "created:0", WorkerStatus::Initializing },
    restarting   = { "restarting:0", WorkerStatus::Initializing },
    paused       = { "paused:0", WorkerStatus::Stalled },
    clean_exit   = { "exited:0", WorkerStatus::Stopped },
    checkpoint   = { "exited:64", WorkerStatus::Checkpointing },
    crash        = { "exited:137", WorkerStatus::Crashed },
    dead         = { "dead:1", WorkerStatus::Crashed },
    unknown      = { "removing:0", WorkerStatus::Stopped },
)]
fn inspect_output_classifies(output: &str, expected: WorkerStatus) {
    assert_eq!(ContainerLauncher::classify_inspect(output), expected);
}

#[test]
fn unknown_worker_has_no_handle() {
    let launcher = ContainerLauncher::new(
        LauncherConfig {
            worker_program: "/usr/local/bin/zerg".into(),
            worker_args: vec!["worker".into()],
            log_dir: ".zerg/logs".into(),
            stall_timeout: std::time::Duration::from_secs(120),
            stall_cooldown: std::time::Duration::from_secs(10),
        },
        "zerg-worker",
        "4g",
        2.0,
        "/repo",
    );
    assert!(launcher.get_handle(0).is_none());
    assert_eq!(launcher.mode(), LauncherMode::Container);
}
