//! Integration tests for presence propagation between peers.

mod helpers;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use serde_json::{Value, json};

use helpers::{TestPeer, wait_for_local, wait_for_metrics, wait_for_view};
use pulseboard_core::traits::ChannelPort;
use pulseboard_core::types::{Activity, PresenceRecord, PresenceStatus, Scope, UserId};
use pulseboard_realtime::InteractionSignal;

fn project_42() -> Scope {
    Scope::parse("project_42").expect("valid scope")
}

#[tokio::test]
async fn test_peers_see_each_other_but_not_themselves() {
    let hub = pulseboard_realtime::MemoryHub::new();
    let scope = project_42();
    let alice = TestPeer::join(&hub, &scope, "alice").await;
    let bob = TestPeer::join(&hub, &scope, "bob").await;

    let view = wait_for_view(&alice.tracker, |v| v.total_count == 1).await;
    assert_eq!(view.peers[0].user_id, UserId::from("bob"));
    assert_eq!(view.peers[0].status, PresenceStatus::Online);
    assert_eq!(view.peers[0].activity, Activity::Browsing);
    assert_eq!(view.peers[0].scope, "project_42");

    let view = wait_for_view(&bob.tracker, |v| v.total_count == 1).await;
    assert_eq!(view.peers[0].user_id, UserId::from("alice"));

    assert!(alice.tracker.is_online(&UserId::from("bob")));
    assert!(alice.tracker.is_online(&UserId::from("alice")));
    assert!(alice.tracker.view().get(&UserId::from("alice")).is_none());
    assert_eq!(alice.tracker.local_status().status, PresenceStatus::Online);
}

#[tokio::test]
async fn test_status_change_reaches_peers() {
    let hub = pulseboard_realtime::MemoryHub::new();
    let scope = project_42();
    let alice = TestPeer::join(&hub, &scope, "alice").await;
    let bob = TestPeer::join(&hub, &scope, "bob").await;
    wait_for_view(&alice.tracker, |v| v.total_count == 1).await;

    bob.tracker.set_status(PresenceStatus::Busy);

    let view = wait_for_view(&alice.tracker, |v| v.counts_by_status.busy == 1).await;
    assert_eq!(view.counts_by_status.online, 0);
    assert_eq!(
        alice.tracker.status_of(&UserId::from("bob")),
        PresenceStatus::Busy
    );
}

#[tokio::test]
async fn test_activity_update_reaches_peers() {
    let hub = pulseboard_realtime::MemoryHub::new();
    let scope = project_42();
    let alice = TestPeer::join(&hub, &scope, "alice").await;
    let bob = TestPeer::join(&hub, &scope, "bob").await;
    wait_for_view(&alice.tracker, |v| v.total_count == 1).await;

    bob.tracker
        .set_activity(Activity::Editing, Some("/projects/42/spec".to_string()));

    let view = wait_for_view(&alice.tracker, |v| {
        v.peers
            .first()
            .is_some_and(|p| p.activity == Activity::Editing)
    })
    .await;
    assert_eq!(view.peers[0].location.as_deref(), Some("/projects/42/spec"));
    assert_eq!(view.peers[0].status, PresenceStatus::Online);
}

#[tokio::test]
async fn test_shutdown_removes_peer_from_others() {
    let hub = pulseboard_realtime::MemoryHub::new();
    let scope = project_42();
    let alice = TestPeer::join(&hub, &scope, "alice").await;
    let bob = TestPeer::join(&hub, &scope, "bob").await;
    wait_for_view(&alice.tracker, |v| v.total_count == 1).await;

    bob.tracker.shutdown().await;

    wait_for_view(&alice.tracker, |v| v.is_empty()).await;
    assert!(!alice.tracker.is_online(&UserId::from("bob")));
    assert_eq!(bob.tracker.local_status().status, PresenceStatus::Offline);
    assert!(bob.tracker.peers().is_empty());
    assert!(!bob.channel.is_connected());

    // A second shutdown is a no-op.
    bob.tracker.shutdown().await;
}

#[tokio::test]
async fn test_dropping_tracker_leaves_scope() {
    let hub = pulseboard_realtime::MemoryHub::new();
    let scope = project_42();
    let alice = TestPeer::join(&hub, &scope, "alice").await;
    let bob = TestPeer::join(&hub, &scope, "bob").await;
    wait_for_view(&alice.tracker, |v| v.total_count == 1).await;

    drop(bob);

    wait_for_view(&alice.tracker, |v| v.is_empty()).await;
}

#[tokio::test]
async fn test_transport_failure_keeps_local_state() {
    let hub = pulseboard_realtime::MemoryHub::new();
    let scope = project_42();
    let alice = TestPeer::join(&hub, &scope, "alice").await;
    let bob = TestPeer::join(&hub, &scope, "bob").await;
    wait_for_view(&alice.tracker, |v| v.total_count == 1).await;

    bob.channel.set_fail_publishes(true);
    bob.tracker.set_status(PresenceStatus::Busy);

    let local = wait_for_local(&bob.tracker, |r| r.status == PresenceStatus::Busy).await;
    assert_eq!(local.status, PresenceStatus::Busy);
    wait_for_metrics(&bob.tracker, |m| m.transport_failures >= 2).await;

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(
        alice.tracker.status_of(&UserId::from("bob")),
        PresenceStatus::Online
    );
}

#[tokio::test]
async fn test_malformed_payloads_are_dropped() {
    let hub = pulseboard_realtime::MemoryHub::new();
    let scope = project_42();
    let alice = TestPeer::join(&hub, &scope, "alice").await;
    let bob = TestPeer::join(&hub, &scope, "bob").await;
    wait_for_view(&alice.tracker, |v| v.total_count == 1).await;

    hub.inject_broadcast("project_42", "status_change", json!({ "status": "busy" }));
    hub.inject_broadcast(
        "project_42",
        "status_change",
        json!({ "userId": "bob", "status": "asleep", "timestamp": 1_700_000_000_000_i64 }),
    );
    bob.tracker.set_status(PresenceStatus::Away);

    wait_for_view(&alice.tracker, |v| v.counts_by_status.away == 1).await;
    let metrics = alice.tracker.metrics();
    assert!(metrics.events_malformed >= 2);
}

#[tokio::test]
async fn test_stale_broadcast_is_ignored() {
    let hub = pulseboard_realtime::MemoryHub::new();
    let scope = project_42();
    let alice = TestPeer::join(&hub, &scope, "alice").await;
    let _bob = TestPeer::join(&hub, &scope, "bob").await;
    wait_for_view(&alice.tracker, |v| v.total_count == 1).await;

    hub.inject_broadcast(
        "project_42",
        "status_change",
        json!({ "userId": "bob", "status": "busy", "timestamp": "2001-01-01T00:00:00Z" }),
    );

    wait_for_metrics(&alice.tracker, |m| m.updates_stale >= 1).await;
    assert_eq!(
        alice.tracker.status_of(&UserId::from("bob")),
        PresenceStatus::Online
    );
}

#[tokio::test]
async fn test_scopes_are_isolated() {
    let hub = pulseboard_realtime::MemoryHub::new();
    let project = project_42();
    let other = Scope::Project("7".to_string());
    let alice = TestPeer::join(&hub, &project, "alice").await;
    let bob = TestPeer::join(&hub, &project, "bob").await;
    let carol = TestPeer::join(&hub, &other, "carol").await;

    wait_for_view(&alice.tracker, |v| v.total_count == 1).await;
    carol.tracker.set_status(PresenceStatus::Busy);
    bob.tracker.set_status(PresenceStatus::Busy);
    wait_for_view(&alice.tracker, |v| v.counts_by_status.busy == 1).await;

    assert!(!alice.tracker.is_online(&UserId::from("carol")));
    assert!(carol.tracker.peers().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_idle_peer_goes_away_and_comes_back() {
    let hub = pulseboard_realtime::MemoryHub::new();
    let scope = project_42();
    let alice = TestPeer::join(&hub, &scope, "alice").await;
    let bob = TestPeer::join(&hub, &scope, "bob").await;
    wait_for_view(&alice.tracker, |v| v.total_count == 1).await;

    bob.tracker
        .set_activity(Activity::Viewing, Some("/projects/42".to_string()));
    wait_for_view(&alice.tracker, |v| {
        v.peers
            .first()
            .is_some_and(|p| p.activity == Activity::Viewing)
    })
    .await;

    // Keep alice busy so only bob idles out.
    alice.tracker.set_status(PresenceStatus::Busy);
    tokio::time::sleep(Duration::from_secs(301)).await;

    let view = wait_for_view(&alice.tracker, |v| v.counts_by_status.away == 1).await;
    assert_eq!(view.peers[0].activity, Activity::Idle);
    assert_eq!(bob.tracker.local_status().status, PresenceStatus::Away);

    bob.tracker.record_signal(InteractionSignal::Key);

    let view = wait_for_view(&alice.tracker, |v| v.counts_by_status.online == 1).await;
    assert_eq!(view.peers[0].activity, Activity::Viewing);
}

#[tokio::test(start_paused = true)]
async fn test_idle_sends_one_away_broadcast() {
    let hub = pulseboard_realtime::MemoryHub::new();
    let scope = project_42();
    let bob = TestPeer::join(&hub, &scope, "bob").await;

    // A bare subscriber that counts what bob puts on the wire.
    let listener = hub.channel(&scope, "listener");
    let status_changes = Arc::new(AtomicUsize::new(0));
    let away_heartbeats = Arc::new(AtomicUsize::new(0));
    let counter = status_changes.clone();
    listener.subscribe_broadcast(
        "status_change",
        Box::new(move |payload: Value| {
            if payload["userId"] == "bob" {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        }),
    );
    let counter = away_heartbeats.clone();
    listener.subscribe_join(Box::new(move |joined: Vec<Value>| {
        for record in joined {
            if record["userId"] == "bob" && record["status"] == "away" {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        }
    }));
    listener.connect().await.expect("listener connects");

    // Idle out, then sit through several more heartbeats.
    tokio::time::sleep(Duration::from_secs(301 + 150)).await;
    wait_for_local(&bob.tracker, |r| r.status == PresenceStatus::Away).await;
    tokio::time::timeout(helpers::WAIT, async {
        while away_heartbeats.load(Ordering::SeqCst) < 5 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("away heartbeats");

    assert_eq!(status_changes.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_silent_peer_is_pruned_without_leave() {
    let hub = pulseboard_realtime::MemoryHub::new();
    let scope = project_42();
    let alice = TestPeer::join(&hub, &scope, "alice").await;
    let bob = TestPeer::join(&hub, &scope, "bob").await;

    // Advertises once with a record already older than the peer timeout,
    // then never speaks again.
    let ghost = hub.channel(&scope, "ghost");
    ghost.connect().await.expect("ghost connects");
    let mut record =
        PresenceRecord::connected(UserId::from("ghost"), "Ghost", "member", "project_42");
    record.last_active -= chrono::Duration::seconds(120);
    ghost.publish_presence(&record).await.expect("ghost publishes");

    wait_for_view(&alice.tracker, |v| v.total_count == 2).await;

    tokio::time::sleep(Duration::from_secs(31)).await;

    let view = wait_for_view(&alice.tracker, |v| v.total_count == 1).await;
    assert_eq!(view.peers[0].user_id, UserId::from("bob"));
    assert!(!alice.tracker.is_online(&UserId::from("ghost")));
    assert!(alice.tracker.metrics().peers_pruned >= 1);

    // The ghost never left the channel.
    assert!(ghost.is_connected());
    assert_eq!(hub.member_count("project_42"), 3);
    assert!(bob.tracker.metrics().peers_pruned >= 1);
}

#[tokio::test]
async fn test_offline_request_is_rejected() {
    let hub = pulseboard_realtime::MemoryHub::new();
    let alice = TestPeer::join(&hub, &Scope::Global, "alice").await;

    alice.tracker.set_status(PresenceStatus::Offline);
    alice.tracker.set_status(PresenceStatus::Away);

    let local = wait_for_local(&alice.tracker, |r| r.status == PresenceStatus::Away).await;
    assert_eq!(local.status, PresenceStatus::Away);
}
