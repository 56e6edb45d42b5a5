// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::test_channel::test_channel;
use super::*;
use hive_core::test_support::WorkerBuilder;
use hive_core::FakeClock;

struct Harness {
    store: DurableStore,
    manager: Arc<ConnectionManager<FakeClock>>,
    events: tokio::sync::mpsc::Receiver<ConnEvent>,
}

fn harness() -> Harness {
    let store = DurableStore::new();
    let clock = FakeClock::new();
    let kv = KvStore::new(clock.clone());
    let (events_tx, events) = tokio::sync::mpsc::channel(64);
    let manager =
        Arc::new(ConnectionManager::new(store.clone(), kv, clock, events_tx, 30_000));
    Harness { store, manager, events }
}

fn seed_worker(store: &DurableStore, id: &str) {
    store
        .insert_worker(WorkerBuilder::new(id).status(WorkerStatus::Online).build())
        .unwrap();
}

#[tokio::test]
async fn accept_marks_idle_and_emits_connected() {
    let mut h = harness();
    seed_worker(&h.store, "wk-1");
    let (_handle, sink, _source) = test_channel();

    h.manager.accept("wk-1".into(), Box::new(sink)).await;

    assert!(h.manager.is_connected(&"wk-1".into()));
    assert_eq!(h.manager.count(), 1);
    assert_eq!(h.store.worker(&"wk-1".into()).unwrap().status, WorkerStatus::Idle);
    assert_eq!(h.events.recv().await, Some(ConnEvent::Connected("wk-1".into())));
}

#[tokio::test]
async fn second_connection_supersedes_first() {
    let mut h = harness();
    seed_worker(&h.store, "wk-1");
    let (first_handle, first_sink, _s1) = test_channel();
    let (_second_handle, second_sink, _s2) = test_channel();

    h.manager.accept("wk-1".into(), Box::new(first_sink)).await;
    h.manager.accept("wk-1".into(), Box::new(second_sink)).await;

    // old channel closed with "superseded"; still exactly one connection
    assert_eq!(
        first_handle.closed(),
        Some((close_code::NORMAL, REASON_SUPERSEDED.to_string()))
    );
    assert_eq!(h.manager.count(), 1);

    // both events were Connected; no Disconnected for the superseded one
    assert_eq!(h.events.recv().await, Some(ConnEvent::Connected("wk-1".into())));
    assert_eq!(h.events.recv().await, Some(ConnEvent::Connected("wk-1".into())));
}

#[tokio::test]
async fn send_delivers_and_records_frame() {
    let h = harness();
    seed_worker(&h.store, "wk-1");
    let (handle, sink, _source) = test_channel();
    h.manager.accept("wk-1".into(), Box::new(sink)).await;

    let delivered = h.manager.send(&"wk-1".into(), ServerFrame::Ping {}).await;
    assert!(delivered);
    assert_eq!(handle.sent(), vec![ServerFrame::Ping {}]);
}

#[tokio::test]
async fn send_to_unconnected_worker_is_undelivered() {
    let h = harness();
    assert!(!h.manager.send(&"wk-ghost".into(), ServerFrame::Ping {}).await);
}

#[tokio::test]
async fn write_failure_tears_down_connection() {
    let mut h = harness();
    seed_worker(&h.store, "wk-1");
    let (handle, sink, _source) = test_channel();
    h.manager.accept("wk-1".into(), Box::new(sink)).await;
    let _ = h.events.recv().await;

    handle.break_pipe();
    let delivered = h.manager.send(&"wk-1".into(), ServerFrame::Ping {}).await;

    assert!(!delivered);
    assert!(!h.manager.is_connected(&"wk-1".into()));
    assert_eq!(h.events.recv().await, Some(ConnEvent::Disconnected("wk-1".into())));
}

#[tokio::test]
async fn broadcast_skips_excluded_and_counts_delivered() {
    let h = harness();
    for id in ["wk-1", "wk-2", "wk-3"] {
        seed_worker(&h.store, id);
        let (_handle, sink, _source) = test_channel();
        h.manager.accept(id.into(), Box::new(sink)).await;
    }

    let exclude: HashSet<WorkerId> = [WorkerId::new("wk-2")].into_iter().collect();
    let delivered = h
        .manager
        .broadcast(ServerFrame::Notification(serde_json::json!({"hello": 1})), &exclude)
        .await;
    assert_eq!(delivered, 2);
}

#[tokio::test]
async fn teardown_by_id_closes_with_code() {
    let h = harness();
    seed_worker(&h.store, "wk-1");
    let (handle, sink, _source) = test_channel();
    h.manager.accept("wk-1".into(), Box::new(sink)).await;

    h.manager.teardown(&"wk-1".into(), close_code::WORKER_DELETED, "worker-already-deleted").await;

    assert!(!h.manager.is_connected(&"wk-1".into()));
    assert_eq!(
        handle.closed(),
        Some((close_code::WORKER_DELETED, "worker-already-deleted".to_string()))
    );
}

#[tokio::test]
async fn connected_ids_reflect_the_map() {
    let h = harness();
    for id in ["wk-1", "wk-2"] {
        seed_worker(&h.store, id);
        let (_handle, sink, _source) = test_channel();
        h.manager.accept(id.into(), Box::new(sink)).await;
    }
    let mut ids = h.manager.connected_worker_ids();
    ids.sort();
    assert_eq!(ids, vec![WorkerId::new("wk-1"), WorkerId::new("wk-2")]);
}
