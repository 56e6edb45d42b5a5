// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use hive_core::test_support::checkpoint;
use hive_core::{CheckpointId, FakeClock, SubtaskId};
use std::time::Duration;

fn kv() -> (KvStore<FakeClock>, FakeClock) {
    let clock = FakeClock::new();
    (KvStore::new(clock.clone()), clock)
}

#[test]
fn current_task_expires_with_ttl() {
    let (kv, clock) = kv();
    kv.set_worker_current_task(&"wk-1".into(), &"st-1".into(), 60_000);
    assert_eq!(kv.worker_current_task(&"wk-1".into()), Some("st-1".into()));

    clock.advance(Duration::from_secs(61));
    assert_eq!(kv.worker_current_task(&"wk-1".into()), None);
}

#[test]
fn clear_current_task() {
    let (kv, _clock) = kv();
    kv.set_worker_current_task(&"wk-1".into(), &"st-1".into(), 60_000);
    kv.clear_worker_current_task(&"wk-1".into());
    assert_eq!(kv.worker_current_task(&"wk-1".into()), None);
}

#[test]
fn queue_orders_by_priority_then_age() {
    let (kv, _clock) = kv();
    kv.queue_push(&"st-low".into(), 2, 10);
    kv.queue_push(&"st-high-new".into(), 9, 50);
    kv.queue_push(&"st-high-old".into(), 9, 20);

    assert_eq!(
        kv.queue_snapshot(),
        vec![
            SubtaskId::from("st-high-old"),
            SubtaskId::from("st-high-new"),
            SubtaskId::from("st-low"),
        ]
    );
}

#[test]
fn queue_push_is_idempotent_per_id() {
    let (kv, _clock) = kv();
    kv.queue_push(&"st-1".into(), 2, 10);
    kv.queue_push(&"st-1".into(), 7, 10);
    assert_eq!(kv.queue_len(), 1);

    kv.queue_remove(&"st-1".into());
    assert_eq!(kv.queue_len(), 0);
}

#[test]
fn in_progress_set() {
    let (kv, _clock) = kv();
    kv.mark_in_progress(&"st-1".into());
    assert!(kv.in_progress().contains(&SubtaskId::from("st-1")));
    kv.clear_in_progress(&"st-1".into());
    assert!(kv.in_progress().is_empty());
}

#[test]
fn review_mirror_round_trips() {
    let (kv, _clock) = kv();
    let cp = checkpoint("cp-1", "wf-1", "node-h");
    kv.put_review(&cp);

    assert_eq!(kv.review(&"cp-1".into()), Some(cp));
    assert_eq!(kv.review_queue(), vec![CheckpointId::from("cp-1")]);

    kv.drop_review(&"cp-1".into());
    assert!(kv.review(&"cp-1".into()).is_none());
    assert!(kv.review_queue().is_empty());
}

#[test]
fn review_queue_is_oldest_first_and_filters_by_user() {
    let (kv, _clock) = kv();
    let mut newer = checkpoint("cp-new", "wf-1", "node-a");
    newer.created_at_ms = 2_000;
    newer.assignee = Some("alice".to_string());
    let mut older = checkpoint("cp-old", "wf-1", "node-b");
    older.created_at_ms = 1_000;
    kv.put_review(&newer);
    kv.put_review(&older);

    assert_eq!(
        kv.review_queue(),
        vec![CheckpointId::from("cp-old"), CheckpointId::from("cp-new")]
    );
    assert_eq!(kv.reviews_for_user("alice"), vec![CheckpointId::from("cp-new")]);
    assert!(kv.reviews_for_user("bob").is_empty());
}

#[test]
fn token_blacklist_honors_ttl() {
    let (kv, clock) = kv();
    let blacklist = TokenBlacklist::new(kv);
    blacklist.revoke("jti-1", 1_000);
    assert!(blacklist.contains("jti-1"));

    clock.advance(Duration::from_secs(2));
    assert!(!blacklist.contains("jti-1"));
}
