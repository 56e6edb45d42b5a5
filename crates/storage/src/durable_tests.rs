// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use hive_core::test_support::{edge, task_node, workflow, SubtaskBuilder, WorkerBuilder};
use hive_core::{SubtaskId, SubtaskStatus, WorkerStatus};

fn store_with_workflow() -> DurableStore {
    let store = DurableStore::new();
    store
        .create_workflow(
            workflow("wf-1"),
            vec![task_node("wf-1", "a", "claude_code"), task_node("wf-1", "b", "claude_code")],
            vec![edge("wf-1", "a", "b")],
        )
        .unwrap();
    store
}

#[test]
fn create_workflow_counts_nodes() {
    let store = store_with_workflow();
    let wf = store.workflow(&"wf-1".into()).unwrap();
    assert_eq!(wf.total_nodes, 2);
    assert!(store.graph(&"wf-1".into()).is_ok());
}

#[test]
fn cyclic_workflow_persists_nothing() {
    let store = DurableStore::new();
    let err = store
        .create_workflow(
            workflow("wf-cyc"),
            vec![
                task_node("wf-cyc", "a", "claude_code"),
                task_node("wf-cyc", "b", "claude_code"),
            ],
            vec![edge("wf-cyc", "a", "b"), edge("wf-cyc", "b", "a")],
        )
        .unwrap_err();
    match err {
        StoreError::Invalid(core) => assert_eq!(core.kind(), "cycle-detected"),
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(store.workflow(&"wf-cyc".into()).is_none());
    assert!(store.node(&"a".into()).is_none());
}

#[test]
fn update_subtask_checks_version() {
    let store = DurableStore::new();
    store.insert_subtask(SubtaskBuilder::new("st-1").build()).unwrap();

    store
        .update_subtask(&"st-1".into(), 1, |s| s.status = SubtaskStatus::InProgress)
        .unwrap();

    // stale writer loses
    let err = store
        .update_subtask(&"st-1".into(), 1, |s| s.status = SubtaskStatus::Pending)
        .unwrap_err();
    assert!(err.is_stale());

    let subtask = store.subtask(&"st-1".into()).unwrap();
    assert_eq!(subtask.status, SubtaskStatus::InProgress);
    assert_eq!(subtask.version, 2);
}

#[test]
fn ready_subtasks_respect_dependencies() {
    let store = DurableStore::new();
    store.insert_subtask(SubtaskBuilder::new("st-a").priority(3).build()).unwrap();
    store
        .insert_subtask(SubtaskBuilder::new("st-b").depends_on(&["st-a"]).priority(9).build())
        .unwrap();

    // only st-a is ready while st-b's dependency is incomplete
    let ready: Vec<_> = store.ready_subtasks().into_iter().map(|s| s.id).collect();
    assert_eq!(ready, vec![SubtaskId::from("st-a")]);

    store
        .rmw_subtask(&"st-a".into(), |s| {
            s.status = SubtaskStatus::Completed;
            Ok(())
        })
        .unwrap();
    let ready: Vec<_> = store.ready_subtasks().into_iter().map(|s| s.id).collect();
    assert_eq!(ready, vec![SubtaskId::from("st-b")]);
}

#[test]
fn ready_subtasks_sorted_by_priority_then_age() {
    let store = DurableStore::new();
    store
        .insert_subtask(SubtaskBuilder::new("st-old-low").priority(2).created_at_ms(10).build())
        .unwrap();
    store
        .insert_subtask(SubtaskBuilder::new("st-new-high").priority(9).created_at_ms(50).build())
        .unwrap();
    store
        .insert_subtask(SubtaskBuilder::new("st-old-high").priority(9).created_at_ms(20).build())
        .unwrap();

    let ready: Vec<_> = store.ready_subtasks().into_iter().map(|s| s.id).collect();
    assert_eq!(
        ready,
        vec![
            SubtaskId::from("st-old-high"),
            SubtaskId::from("st-new-high"),
            SubtaskId::from("st-old-low"),
        ]
    );
}

#[test]
fn cyclic_subtask_dependencies_are_rejected_as_they_land() {
    let store = DurableStore::new();
    // forward reference is allowed while the batch is still landing
    store
        .insert_subtask(SubtaskBuilder::new("st-a").depends_on(&["st-b"]).build())
        .unwrap();
    // closing the cycle is not
    let err = store
        .insert_subtask(SubtaskBuilder::new("st-b").depends_on(&["st-a"]).build())
        .unwrap_err();
    match err {
        StoreError::Invalid(core) => assert_eq!(core.kind(), "cycle-detected"),
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(store.subtask(&"st-b".into()).is_none());
}

#[test]
fn subtasks_held_by_worker() {
    let store = DurableStore::new();
    let mut held = SubtaskBuilder::new("st-1").build();
    held.status = SubtaskStatus::InProgress;
    held.assigned_worker = Some("wk-1".into());
    store.insert_subtask(held).unwrap();
    store.insert_subtask(SubtaskBuilder::new("st-2").build()).unwrap();

    let held = store.subtasks_held_by(&"wk-1".into());
    assert_eq!(held.len(), 1);
    assert_eq!(held[0].id, "st-1");
}

#[test]
fn worker_lookup_by_machine_and_key_hash() {
    let store = DurableStore::new();
    let mut worker = WorkerBuilder::new("wk-1").build();
    worker.api_key_hash = "deadbeef".to_string();
    store.insert_worker(worker).unwrap();

    assert_eq!(store.worker_by_machine("machine-wk-1").unwrap().id, "wk-1");
    assert_eq!(store.worker_by_key_hash("deadbeef").unwrap().id, "wk-1");
    assert!(store.worker_by_key_hash("nope").is_none());
}

#[test]
fn txn_composes_multi_row_commit() {
    let store = DurableStore::new();
    store.insert_subtask(SubtaskBuilder::new("st-1").build()).unwrap();
    store.insert_worker(WorkerBuilder::new("wk-1").build()).unwrap();

    store
        .txn(|t| {
            t.update_subtask(&"st-1".into(), 1, |s| {
                s.status = SubtaskStatus::InProgress;
                s.assigned_worker = Some("wk-1".into());
            })?;
            t.update_worker(&"wk-1".into(), 1, |w| w.status = WorkerStatus::Busy)?;
            Ok(())
        })
        .unwrap();

    assert_eq!(store.subtask(&"st-1".into()).unwrap().status, SubtaskStatus::InProgress);
    assert_eq!(store.worker(&"wk-1".into()).unwrap().status, WorkerStatus::Busy);
}

#[test]
fn delete_workflow_cascades() {
    let store = store_with_workflow();
    store.insert_subtask(SubtaskBuilder::new("st-1").workflow("wf-1").build()).unwrap();

    store.delete_workflow(&"wf-1".into()).unwrap();

    assert!(store.workflow(&"wf-1".into()).is_none());
    assert!(store.node(&"a".into()).is_none());
    assert!(store.subtask(&"st-1".into()).is_none());
}

#[test]
fn expired_checkpoints_query() {
    let store = DurableStore::new();
    let mut cp = hive_core::test_support::checkpoint("cp-1", "wf-1", "node-h");
    cp.expires_at_ms = Some(5_000);
    store.insert_checkpoint(cp).unwrap();

    assert!(store.expired_checkpoints(4_000).is_empty());
    assert_eq!(store.expired_checkpoints(6_000).len(), 1);
}
