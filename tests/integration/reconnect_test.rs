//! Integration tests for channel failure, reconnection, and teardown.

mod helpers;

use std::sync::Arc;

use serde_json::json;

use helpers::{TestPeer, wait_for_metrics, wait_for_state, wait_for_view};
use pulseboard_core::config::PresenceConfig;
use pulseboard_core::types::{PresenceStatus, Scope, UserId};
use pulseboard_realtime::{ConnectionState, MemoryHub};

fn small_buffer(size: usize) -> PresenceConfig {
    PresenceConfig {
        event_buffer_size: size,
        ..helpers::test_config()
    }
}

#[tokio::test(start_paused = true)]
async fn test_failed_connects_retry_until_connected() {
    let hub = MemoryHub::new();
    let scope = Scope::Global;
    let channel = Arc::new(hub.channel(&scope, "alice"));
    channel.fail_next_connects(2);

    let alice = TestPeer::start_on(channel, &scope, "alice");
    wait_for_state(&alice.tracker, ConnectionState::Connected).await;

    let metrics = alice.tracker.metrics();
    assert_eq!(metrics.connect_attempts, 3);
    assert_eq!(metrics.connection_failures, 2);
    assert_eq!(alice.tracker.local_status().status, PresenceStatus::Online);
}

#[tokio::test(start_paused = true)]
async fn test_local_state_survives_connect_failure() {
    let hub = MemoryHub::new();
    let scope = Scope::Global;
    let channel = Arc::new(hub.channel(&scope, "alice"));
    channel.fail_next_connects(1);

    let alice = TestPeer::start_on(channel, &scope, "alice");
    wait_for_state(&alice.tracker, ConnectionState::Error).await;
    assert!(alice.tracker.peers().is_empty());

    wait_for_state(&alice.tracker, ConnectionState::Connected).await;
}

#[tokio::test(start_paused = true)]
async fn test_severed_channel_reconnects_and_resyncs() {
    let hub = MemoryHub::new();
    let scope = Scope::Global;
    let alice = TestPeer::join(&hub, &scope, "alice").await;
    let bob = TestPeer::join(&hub, &scope, "bob").await;
    wait_for_view(&alice.tracker, |v| v.total_count == 1).await;
    alice.tracker.set_status(PresenceStatus::Busy);
    wait_for_view(&bob.tracker, |v| v.counts_by_status.busy == 1).await;

    alice.channel.sever();

    wait_for_view(&bob.tracker, |v| v.is_empty()).await;
    wait_for_state(&alice.tracker, ConnectionState::Error).await;
    assert!(alice.tracker.peers().is_empty());

    wait_for_state(&alice.tracker, ConnectionState::Connected).await;
    let view = wait_for_view(&alice.tracker, |v| v.total_count == 1).await;
    assert_eq!(view.peers[0].user_id, UserId::from("bob"));

    // The local status carries over the reconnect.
    let view = wait_for_view(&bob.tracker, |v| v.total_count == 1).await;
    assert_eq!(view.peers[0].status, PresenceStatus::Busy);
    assert_eq!(alice.tracker.metrics().connection_failures, 1);
}

#[tokio::test(start_paused = true)]
async fn test_queue_overflow_forces_resync_and_keeps_failures() {
    let hub = MemoryHub::new();
    let scope = Scope::Global;
    let channel = Arc::new(hub.channel(&scope, "alice"));
    let alice = TestPeer::start_with(channel, &scope, "alice", small_buffer(4));
    wait_for_state(&alice.tracker, ConnectionState::Connected).await;
    let bob = TestPeer::join(&hub, &scope, "bob").await;
    wait_for_view(&alice.tracker, |v| v.total_count == 1).await;

    for n in 0..6 {
        hub.inject_broadcast(
            "global",
            "activity_update",
            json!({ "userId": "bob", "activity": format!("step-{n}"), "timestamp": 1_700_000_000_000_i64 }),
        );
    }
    alice.channel.sever();

    let metrics = wait_for_metrics(&alice.tracker, |m| m.connection_failures >= 1).await;
    assert!(metrics.events_overflowed >= 2);
    assert_ne!(alice.tracker.connection_state(), ConnectionState::Connected);
    assert!(alice.tracker.peers().is_empty());

    wait_for_state(&alice.tracker, ConnectionState::Connected).await;
    let view = wait_for_view(&alice.tracker, |v| v.total_count == 1).await;
    assert_eq!(view.peers[0].user_id, UserId::from("bob"));
    wait_for_view(&bob.tracker, |v| v.total_count == 1).await;
}

#[tokio::test(start_paused = true)]
async fn test_single_slot_queue_still_converges() {
    let hub = MemoryHub::new();
    let scope = Scope::Global;
    let channel = Arc::new(hub.channel(&scope, "alice"));
    let alice = TestPeer::start_with(channel, &scope, "alice", small_buffer(1));
    let _bob = TestPeer::join(&hub, &scope, "bob").await;
    let _carol = TestPeer::join(&hub, &scope, "carol").await;

    wait_for_view(&alice.tracker, |v| v.total_count == 2).await;
    wait_for_state(&alice.tracker, ConnectionState::Connected).await;
}

#[tokio::test]
async fn test_manual_reconnect_is_noop_while_connected() {
    let hub = MemoryHub::new();
    let alice = TestPeer::join(&hub, &Scope::Global, "alice").await;

    alice.tracker.reconnect();
    alice.tracker.set_status(PresenceStatus::Busy);
    helpers::wait_for_local(&alice.tracker, |r| r.status == PresenceStatus::Busy).await;

    assert_eq!(alice.tracker.metrics().connect_attempts, 1);
    assert_eq!(alice.tracker.connection_state(), ConnectionState::Connected);
}

#[tokio::test(start_paused = true)]
async fn test_backoff_grows_between_attempts() {
    let hub = MemoryHub::new();
    let scope = Scope::Global;
    let channel = Arc::new(hub.channel(&scope, "alice"));
    channel.fail_next_connects(4);

    let started = tokio::time::Instant::now();
    let alice = TestPeer::start_on(channel, &scope, "alice");
    wait_for_state(&alice.tracker, ConnectionState::Connected).await;

    // 100 + 200 + 400 + 800 ms of retry delays.
    assert!(started.elapsed() >= std::time::Duration::from_millis(1_500));
    wait_for_metrics(&alice.tracker, |m| m.connect_attempts == 5).await;
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_when_never_connected() {
    let hub = MemoryHub::new();
    let scope = Scope::Global;
    let channel = Arc::new(hub.channel(&scope, "alice"));
    channel.fail_next_connects(u32::MAX);
    let bob = TestPeer::join(&hub, &scope, "bob").await;

    let alice = TestPeer::start_on(channel, &scope, "alice");
    wait_for_state(&alice.tracker, ConnectionState::Error).await;

    alice.tracker.shutdown().await;
    alice.tracker.shutdown().await;

    assert_eq!(alice.tracker.connection_state(), ConnectionState::Disconnected);
    assert_eq!(alice.tracker.local_status().status, PresenceStatus::Offline);
    assert!(bob.tracker.peers().is_empty());
    assert_eq!(hub.member_count("global"), 1);
}

#[tokio::test]
async fn test_start_rejects_mismatched_channel() {
    let hub = MemoryHub::new();
    let channel = Arc::new(hub.channel(&Scope::Global, "alice"));
    let identity = pulseboard_realtime::LocalIdentity::new("alice", "Alice", "member");

    let result = pulseboard_realtime::PresenceTracker::start(
        identity,
        Scope::Project("42".to_string()),
        channel,
        helpers::test_config(),
    );
    assert!(result.is_err());
}
