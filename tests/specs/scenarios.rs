// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The literal end-to-end scenarios: sequential chains, parallel
//! diamonds, worker death, condition skips, review gates, and cycle
//! rejection.

use crate::prelude::*;
use hive_core::{DecisionKind, JoinStrategy};
use hive_engine::{DecisionRequest, ExecutionOutcome};
use std::time::Duration;

/// Sequential A→B→C: each node dispatches only after its predecessor
/// completes; final outputs land in the workflow context.
#[tokio::test]
async fn sequential_chain() {
    let hive = crate::prelude::hive();
    let worker = hive.connect_worker("m-1", &["claude_code"]).await;

    hive.orchestrator
        .create_workflow(
            workflow("wf-seq"),
            vec![
                task_node("wf-seq", "A", "claude_code"),
                task_node("wf-seq", "B", "claude_code"),
                task_node("wf-seq", "C", "claude_code"),
            ],
            vec![edge("wf-seq", "A", "B"), edge("wf-seq", "B", "C")],
        )
        .unwrap();
    let run = {
        let o = hive.orchestrator.clone();
        tokio::spawn(async move { o.run_workflow(&"wf-seq".into()).await })
    };

    for output in ["oa", "ob", "oc"] {
        worker.work_once(&hive, serde_json::json!(output)).await;
        hive.assert_invariants();
    }

    assert_eq!(run.await.unwrap().unwrap(), ExecutionOutcome::Completed);
    let wf = hive.orchestrator.store().workflow(&"wf-seq".into()).unwrap();
    assert_eq!(wf.status, WorkflowStatus::Completed);
    assert_eq!(wf.context["A"], "oa");
    assert_eq!(wf.context["B"], "ob");
    assert_eq!(wf.context["C"], "oc");
}

/// Diamond with a parallel join: S forks A and B, J merges both with
/// strategy `all`, then E runs.
#[tokio::test]
async fn diamond_with_parallel_join() {
    let hive = crate::prelude::hive();
    let w1 = hive.connect_worker("m-1", &["claude_code"]).await;
    let w2 = hive.connect_worker("m-2", &["claude_code"]).await;

    hive.orchestrator
        .create_workflow(
            workflow("wf-dia"),
            vec![
                split_node("wf-dia", "S", &["A", "B"], "J"),
                task_node("wf-dia", "A", "claude_code"),
                task_node("wf-dia", "B", "claude_code"),
                join_node("wf-dia", "J", JoinStrategy::All),
                task_node("wf-dia", "E", "claude_code"),
            ],
            vec![
                edge("wf-dia", "S", "A"),
                edge("wf-dia", "S", "B"),
                edge("wf-dia", "A", "J"),
                edge("wf-dia", "B", "J"),
                edge("wf-dia", "J", "E"),
            ],
        )
        .unwrap();
    let run = {
        let o = hive.orchestrator.clone();
        tokio::spawn(async move { o.run_workflow(&"wf-dia".into()).await })
    };

    // A and B run in parallel on two workers
    let mut first = None;
    let mut second = None;
    hive.drive_until(|| {
        if first.is_none() {
            first = w1.next_assignment();
        }
        if second.is_none() {
            second = w2.next_assignment();
        }
        first.is_some() && second.is_some()
    })
    .await;
    hive.assert_invariants();

    let store = hive.orchestrator.store();
    let name_of = |id: &hive_core::SubtaskId| store.subtask(id).unwrap().name;
    let (first, _) = first.unwrap();
    let (second, _) = second.unwrap();
    let output_for = |id: &hive_core::SubtaskId| match name_of(id).as_str() {
        "A" => serde_json::json!("oa"),
        "B" => serde_json::json!("ob"),
        other => panic!("unexpected parallel subtask {other}"),
    };
    w1.upload_result(&hive, &first, output_for(&first)).await;
    w2.upload_result(&hive, &second, output_for(&second)).await;

    // E runs after the join, on whichever worker frees up first
    let mut e_assignment: Option<(hive_core::SubtaskId, &crate::prelude::SimWorker)> = None;
    hive.drive_until(|| {
        if e_assignment.is_none() {
            if let Some((subtask, _)) = w1.next_assignment() {
                e_assignment = Some((subtask, &w1));
            } else if let Some((subtask, _)) = w2.next_assignment() {
                e_assignment = Some((subtask, &w2));
            }
        }
        e_assignment.is_some()
    })
    .await;
    let (e_subtask, e_worker) = e_assignment.unwrap();
    assert_eq!(name_of(&e_subtask), "E");
    e_worker.upload_result(&hive, &e_subtask, serde_json::json!("oe")).await;

    assert_eq!(run.await.unwrap().unwrap(), ExecutionOutcome::Completed);
    let join = store.node(&"J".into()).unwrap();
    assert_eq!(join.output.unwrap(), serde_json::json!({"A": "oa", "B": "ob"}));
    let wf = store.workflow(&"wf-dia".into()).unwrap();
    assert_eq!(wf.status, WorkflowStatus::Completed);
    hive.assert_invariants();
}

/// Worker dies mid-subtask: the reaper recovers the work and a second
/// worker finishes it.
#[tokio::test]
async fn worker_death_and_recovery() {
    let hive = crate::prelude::hive();
    let w1 = hive.connect_worker("m-1", &["claude_code"]).await;

    hive.orchestrator
        .create_workflow(
            workflow("wf-dead"),
            vec![task_node("wf-dead", "A", "claude_code")],
            vec![],
        )
        .unwrap();
    let run = {
        let o = hive.orchestrator.clone();
        tokio::spawn(async move { o.run_workflow(&"wf-dead".into()).await })
    };

    // w1 takes the subtask and reports progress, then goes silent
    let mut assignment = None;
    hive.drive_until(|| {
        if assignment.is_none() {
            assignment = w1.next_assignment();
        }
        assignment.is_some()
    })
    .await;
    let (subtask, _) = assignment.unwrap();
    w1.report_progress(&hive, &subtask, 40).await;
    assert_eq!(
        hive.orchestrator.store().subtask(&subtask).unwrap().progress,
        40
    );

    // silence past the dead threshold; the reaper recovers the subtask
    hive.clock.advance(Duration::from_secs(301));
    hive.orchestrator.reaper().sweep().await;

    let recovered = hive.orchestrator.store().subtask(&subtask).unwrap();
    assert_eq!(recovered.status, SubtaskStatus::Pending);
    assert!(recovered.assigned_worker.is_none());
    assert_eq!(recovered.recovery_count, 1);
    assert_eq!(
        hive.orchestrator.store().worker(&w1.worker.id).unwrap().status,
        WorkerStatus::Offline
    );
    hive.assert_invariants();

    // a fresh worker picks it up and completes the workflow
    let w2 = hive.connect_worker("m-2", &["claude_code"]).await;
    let completed = w2.work_once(&hive, serde_json::json!("done by w2")).await;
    assert_eq!(completed, subtask);

    assert_eq!(run.await.unwrap().unwrap(), ExecutionOutcome::Completed);
    let wf = hive.orchestrator.store().workflow(&"wf-dead".into()).unwrap();
    assert_eq!(wf.status, WorkflowStatus::Completed);
    assert_eq!(wf.context["A"], "done by w2");
    hive.assert_invariants();
}

/// Condition skip: `x > 10` with x=5 skips the true branch and runs the
/// false branch.
#[tokio::test]
async fn condition_skip() {
    let hive = crate::prelude::hive();
    let worker = hive.connect_worker("m-1", &["claude_code"]).await;

    let mut wf = workflow("wf-cond");
    wf.context.insert("x".to_string(), serde_json::json!(5));
    hive.orchestrator
        .create_workflow(
            wf,
            vec![
                condition_node("wf-cond", "C", "x > 10"),
                task_node("wf-cond", "T", "claude_code"),
                task_node("wf-cond", "F", "claude_code"),
            ],
            vec![
                labeled_edge("wf-cond", "C", "T", "true"),
                labeled_edge("wf-cond", "C", "F", "false"),
            ],
        )
        .unwrap();
    let run = {
        let o = hive.orchestrator.clone();
        tokio::spawn(async move { o.run_workflow(&"wf-cond".into()).await })
    };

    let completed = worker.work_once(&hive, serde_json::json!("of")).await;
    assert_eq!(hive.orchestrator.store().subtask(&completed).unwrap().name, "F");

    assert_eq!(run.await.unwrap().unwrap(), ExecutionOutcome::Completed);
    let store = hive.orchestrator.store();
    assert_eq!(store.node(&"T".into()).unwrap().status, NodeStatus::Skipped);
    assert_eq!(store.node(&"F".into()).unwrap().status, NodeStatus::Completed);
    hive.assert_invariants();
}

/// Human-review approve path: the workflow pauses at H, the decision
/// enqueues the approve branch and skips the reject branch.
#[tokio::test]
async fn human_review_approve_path() {
    let hive = crate::prelude::hive();
    let worker = hive.connect_worker("m-1", &["claude_code"]).await;

    hive.orchestrator
        .create_workflow(
            workflow("wf-rev"),
            vec![
                review_node("wf-rev", "H", Some("P"), Some("R")),
                task_node("wf-rev", "P", "claude_code"),
                task_node("wf-rev", "R", "claude_code"),
            ],
            vec![
                labeled_edge("wf-rev", "H", "P", "approve"),
                labeled_edge("wf-rev", "H", "R", "reject"),
            ],
        )
        .unwrap();

    let outcome = hive.orchestrator.run_workflow(&"wf-rev".into()).await.unwrap();
    assert_eq!(outcome, ExecutionOutcome::Paused { node: Some("H".into()) });
    assert_eq!(
        hive.orchestrator.store().workflow(&"wf-rev".into()).unwrap().status,
        WorkflowStatus::Paused
    );
    assert_eq!(
        hive.orchestrator.store().node(&"H".into()).unwrap().status,
        NodeStatus::Waiting
    );

    let pending = hive.orchestrator.reviews().pending();
    assert_eq!(pending.len(), 1);

    // resume with approval while a worker stands by for P
    let resume = {
        let o = hive.orchestrator.clone();
        let checkpoint = pending[0].id.clone();
        tokio::spawn(async move {
            o.submit_review(
                &checkpoint,
                DecisionRequest {
                    kind: DecisionKind::Approve,
                    comments: Some("looks right".to_string()),
                    modifications: None,
                    reviewer: Some("alice".to_string()),
                },
            )
            .await
        })
    };
    let completed = worker.work_once(&hive, serde_json::json!("op")).await;
    assert_eq!(hive.orchestrator.store().subtask(&completed).unwrap().name, "P");

    assert_eq!(resume.await.unwrap().unwrap(), ExecutionOutcome::Completed);
    let store = hive.orchestrator.store();
    assert_eq!(store.node(&"P".into()).unwrap().status, NodeStatus::Completed);
    assert_eq!(store.node(&"R".into()).unwrap().status, NodeStatus::Skipped);
    assert_eq!(store.workflow(&"wf-rev".into()).unwrap().status, WorkflowStatus::Completed);
    hive.assert_invariants();
}

/// Cycle rejected: creation fails with `cycle-detected` and persists
/// nothing.
#[tokio::test]
async fn cycle_rejected_at_creation() {
    let hive = crate::prelude::hive();
    let err = hive
        .orchestrator
        .create_workflow(
            workflow("wf-cyc"),
            vec![
                task_node("wf-cyc", "A", "claude_code"),
                task_node("wf-cyc", "B", "claude_code"),
            ],
            vec![edge("wf-cyc", "A", "B"), edge("wf-cyc", "B", "A")],
        )
        .unwrap_err();

    match err {
        hive_storage::StoreError::Invalid(core) => assert_eq!(core.kind(), "cycle-detected"),
        other => panic!("unexpected error: {other:?}"),
    }
    let store = hive.orchestrator.store();
    assert!(store.workflow(&"wf-cyc".into()).is_none());
    assert!(store.node(&"A".into()).is_none());
    assert!(store.node(&"B".into()).is_none());
}

/// Round-trip law: assign → cancel → re-assign bumps the attempt
/// counter and lands on a (possibly new) worker.
#[tokio::test]
async fn cancel_then_reassign_bumps_attempt() {
    let hive = crate::prelude::hive();
    let worker = hive.connect_worker("m-1", &["claude_code"]).await;

    hive.orchestrator
        .create_workflow(
            workflow("wf-re"),
            vec![task_node("wf-re", "A", "claude_code")],
            vec![],
        )
        .unwrap();
    let run = {
        let o = hive.orchestrator.clone();
        tokio::spawn(async move { o.run_workflow(&"wf-re".into()).await })
    };

    let mut assignment = None;
    hive.drive_until(|| {
        if assignment.is_none() {
            assignment = worker.next_assignment();
        }
        assignment.is_some()
    })
    .await;
    let (subtask, _) = assignment.unwrap();
    assert_eq!(hive.orchestrator.store().subtask(&subtask).unwrap().attempt, 1);

    // worker declines; the subtask returns to the queue and is handed
    // out again with a bumped attempt counter
    hive.orchestrator
        .ingest()
        .handle(
            &worker.worker.id,
            hive_wire::WorkerFrame::TaskRejected {
                task_id: subtask.to_string(),
                reason: "busy elsewhere".to_string(),
            },
        )
        .await
        .unwrap();

    let completed = worker.work_once(&hive, serde_json::json!("second try")).await;
    assert_eq!(completed, subtask);
    let row = hive.orchestrator.store().subtask(&subtask).unwrap();
    assert_eq!(row.attempt, 2);

    assert_eq!(run.await.unwrap().unwrap(), ExecutionOutcome::Completed);
}
