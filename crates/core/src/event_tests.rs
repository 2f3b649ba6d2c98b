// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn event_serializes_with_type_tag() {
    let event = Event::LevelStarted { level: 1, tasks: 3 };
    let json = serde_json::to_value(&event).unwrap();
    assert_eq!(json["type"], "level:started");
    assert_eq!(json["level"], 1);
    assert_eq!(json["tasks"], 3);
}

#[test]
fn event_round_trips() {
    let events = vec![
        Event::RushStarted {
            workers: 4,
            total_tasks: 12,
        },
        Event::TaskClaimed {
            task_id: TaskId::new("t1"),
            worker_id: 0,
        },
        Event::TaskRetryScheduled {
            task_id: TaskId::new("t1"),
            retry_count: 2,
            kind: FailureKind::Transient,
            ready_at_ms: 123_456,
        },
        Event::MergeComplete {
            level: 2,
            merge_commit: "abc123".into(),
        },
        Event::RushStopped { force: false },
    ];
    for event in events {
        let json = serde_json::to_string(&event).unwrap();
        let back: Event = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }
}

#[test]
fn kind_matches_wire_tag() {
    let event = Event::WorkerCrashed {
        worker_id: 2,
        task_id: Some(TaskId::new("t9")),
    };
    let json = serde_json::to_value(&event).unwrap();
    assert_eq!(json["type"], event.kind());
}

#[test]
fn optional_fields_are_omitted() {
    let event = Event::WorkerStarted {
        worker_id: 1,
        port: None,
        container_id: None,
        mode: "subprocess".into(),
    };
    let json = serde_json::to_value(&event).unwrap();
    assert!(json.get("port").is_none());
    assert!(json.get("container_id").is_none());
}
