// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[tokio::test]
async fn subscribers_receive_published_events() {
    let bus = EventBus::default();
    let mut rx = bus.subscribe();
    bus.publish(Event::LevelStarted { level: 1, tasks: 4 });
    let event = rx.recv().await.unwrap();
    assert_eq!(event.kind(), "level:started");
}

#[tokio::test]
async fn publish_without_subscribers_does_not_block_or_panic() {
    let bus = EventBus::default();
    bus.publish(Event::RushResumed);
    assert_eq!(bus.subscriber_count(), 0);
}

#[tokio::test]
async fn multiple_subscribers_each_get_events() {
    let bus = EventBus::default();
    let mut a = bus.subscribe();
    let mut b = bus.subscribe();
    bus.publish(Event::RushStopped { force: false });
    assert_eq!(a.recv().await.unwrap().kind(), "rush:stopped");
    assert_eq!(b.recv().await.unwrap().kind(), "rush:stopped");
}

#[tokio::test]
async fn slow_subscriber_lags_instead_of_blocking_publisher() {
    let bus = EventBus::new(2);
    let mut rx = bus.subscribe();
    for i in 0..5 {
        bus.publish(Event::LevelStarted { level: i, tasks: 0 });
    }
    // The first recv reports the lag; later events are still delivered
    let first = rx.recv().await;
    assert!(matches!(
        first,
        Err(tokio::sync::broadcast::error::RecvError::Lagged(_))
    ));
    assert!(rx.recv().await.is_ok());
}
