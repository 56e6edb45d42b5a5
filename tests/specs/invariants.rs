// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! State invariants observed across the control plane, beyond the
//! concrete scenarios.

use crate::prelude::*;
use hive_core::test_support::SubtaskBuilder;
use hive_core::SubtaskId;
use proptest::prelude::*;
use std::collections::HashSet;

/// The ready set always equals {s : pending ∧ every dependency
/// completed}, computed independently of the store's own query.
#[test]
fn ready_set_matches_its_definition() {
    let hive = hive();
    let store = hive.orchestrator.store();
    store.insert_subtask(SubtaskBuilder::new("st-a").workflow("wf-1").build()).unwrap();
    store
        .insert_subtask(
            SubtaskBuilder::new("st-b").workflow("wf-1").depends_on(&["st-a"]).build(),
        )
        .unwrap();
    store
        .insert_subtask(
            SubtaskBuilder::new("st-c").workflow("wf-1").depends_on(&["st-a", "st-b"]).build(),
        )
        .unwrap();

    let brute_force = |hive: &crate::prelude::Hive| -> HashSet<SubtaskId> {
        let store = hive.orchestrator.store();
        store.with(|t| {
            t.subtasks
                .values()
                .filter(|s| s.status == SubtaskStatus::Pending)
                .filter(|s| {
                    s.dependencies.iter().all(|d| {
                        t.subtasks
                            .get(d)
                            .is_some_and(|dep| dep.status == SubtaskStatus::Completed)
                    })
                })
                .map(|s| s.id.clone())
                .collect()
        })
    };

    let observed: HashSet<SubtaskId> =
        store.ready_subtasks().into_iter().map(|s| s.id).collect();
    assert_eq!(observed, brute_force(&hive));
    assert_eq!(observed, ["st-a".into()].into_iter().collect());

    // completing st-a promotes exactly st-b
    store
        .rmw_subtask(&"st-a".into(), |s| {
            s.status = SubtaskStatus::Completed;
            Ok(())
        })
        .unwrap();
    let observed: HashSet<SubtaskId> =
        store.ready_subtasks().into_iter().map(|s| s.id).collect();
    assert_eq!(observed, brute_force(&hive));
    assert_eq!(observed, ["st-b".into()].into_iter().collect());
}

/// Invariants hold at every observation point while two workflows run
/// concurrently against one worker pool.
#[tokio::test]
async fn invariants_hold_under_concurrent_workflows() {
    let hive = hive();
    let w1 = hive.connect_worker("m-1", &["claude_code"]).await;
    let w2 = hive.connect_worker("m-2", &["claude_code"]).await;

    for wf in ["wf-1", "wf-2"] {
        hive.orchestrator
            .create_workflow(
                workflow(wf),
                vec![task_node(wf, &format!("{wf}-a"), "claude_code"),
                     task_node(wf, &format!("{wf}-b"), "claude_code")],
                vec![edge(wf, &format!("{wf}-a"), &format!("{wf}-b"))],
            )
            .unwrap();
    }
    let runs: Vec<_> = ["wf-1", "wf-2"]
        .into_iter()
        .map(|wf| {
            let o = hive.orchestrator.clone();
            let id: hive_core::WorkflowId = wf.into();
            tokio::spawn(async move { o.run_workflow(&id).await })
        })
        .collect();

    // workers drain whatever arrives; invariants are checked after
    // every completion
    let workers = [&w1, &w2];
    for _ in 0..4 {
        let mut assignment = None;
        hive.drive_until(|| {
            if assignment.is_none() {
                for worker in workers {
                    if let Some((subtask, _)) = worker.next_assignment() {
                        assignment = Some((subtask, worker.worker.id.clone()));
                        break;
                    }
                }
            }
            assignment.is_some()
        })
        .await;
        hive.assert_invariants();

        let (subtask, worker_id) = assignment.unwrap();
        let worker = workers
            .iter()
            .find(|w| w.worker.id == worker_id)
            .expect("assignment from unknown worker");
        worker.upload_result(&hive, &subtask, serde_json::json!("ok")).await;
        hive.assert_invariants();
    }

    for run in runs {
        assert_eq!(run.await.unwrap().unwrap(), hive_engine::ExecutionOutcome::Completed);
    }
    hive.assert_invariants();

    let store = hive.orchestrator.store();
    for wf in ["wf-1", "wf-2"] {
        let workflow = store.workflow(&wf.into()).unwrap();
        assert_eq!(workflow.status, WorkflowStatus::Completed);
        assert_eq!(workflow.completed_nodes, workflow.total_nodes);
    }
}

proptest! {
    /// Monotone progress: any report sequence observed through the
    /// store never decreases until completion forces 100.
    #[test]
    fn observed_progress_is_monotone(reports in proptest::collection::vec(0u8..=110, 1..24)) {
        let hive = hive();
        let store = hive.orchestrator.store();
        let mut subtask = SubtaskBuilder::new("st-p").build();
        subtask.status = SubtaskStatus::InProgress;
        subtask.assigned_worker = Some("wk-1".into());
        store.insert_subtask(subtask).unwrap();

        let mut last = 0u8;
        for report in reports {
            store
                .rmw_subtask(&"st-p".into(), |s| {
                    s.apply_progress(report);
                    Ok(())
                })
                .unwrap();
            let observed = store.subtask(&"st-p".into()).unwrap().progress;
            prop_assert!(observed >= last);
            prop_assert!(observed <= 100);
            last = observed;
        }

        store
            .rmw_subtask(&"st-p".into(), |s| {
                s.complete(serde_json::json!("out"), &hive.clock);
                Ok(())
            })
            .unwrap();
        prop_assert_eq!(store.subtask(&"st-p".into()).unwrap().progress, 100);
    }
}
