// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::auth::{register_worker, Registration};
use crate::connection::test_channel::{test_channel, ChannelHandle};
use hive_core::test_support as ts;
use hive_core::{FakeClock, SeqIdGen, SubtaskId, WorkerStatus, WorkflowStatus};
use hive_engine::testing::{FakeRouter, RecordingNotifier};
use hive_wire::{ServerFrame, TaskResultData, WorkerFrame};

fn orchestrator() -> Arc<Orchestrator<FakeClock>> {
    let collaborators = Collaborators {
        router: Arc::new(FakeRouter::always("default")),
        templates: Arc::new(StaticTemplateRegistry::new()),
        notifier: Arc::new(RecordingNotifier::new()),
        id_gen: Arc::new(SeqIdGen::default()),
    };
    Arc::new(Orchestrator::new(Config::default(), FakeClock::new(), collaborators))
}

fn register(o: &Orchestrator<FakeClock>, machine: &str) -> Worker {
    let (worker, _key) = register_worker(
        o.store(),
        &SeqIdGen::default(),
        &FakeClock::new(),
        Registration {
            machine_id: machine.to_string(),
            machine_name: machine.to_string(),
            tools: vec!["claude_code".to_string()],
            system_info: Default::default(),
        },
    )
    .unwrap();
    worker
}

async fn connect(o: &Orchestrator<FakeClock>, worker: &WorkerId) -> ChannelHandle {
    let (handle, sink, _source) = test_channel();
    o.connections().accept(worker.clone(), Box::new(sink)).await;
    handle
}

#[tokio::test]
async fn single_task_workflow_runs_end_to_end() {
    let o = orchestrator();
    let worker = register(&o, "m-1");
    let handle = connect(&o, &worker.id).await;

    o.create_workflow(
        ts::workflow("wf-1"),
        vec![ts::task_node("wf-1", "A", "claude_code")],
        vec![],
    )
    .unwrap();

    let run = {
        let o = o.clone();
        tokio::spawn(async move { o.run_workflow(&"wf-1".into()).await })
    };

    // allocator pairs the subtask with the idle worker
    let mut subtask_id: Option<SubtaskId> = None;
    for _ in 0..50 {
        tokio::task::yield_now().await;
        o.allocator().cycle().await;
        let assignments: Vec<_> = handle
            .sent()
            .into_iter()
            .filter_map(|f| match f {
                ServerFrame::TaskAssignment { subtask_id, .. } => Some(subtask_id),
                _ => None,
            })
            .collect();
        if let Some(id) = assignments.first() {
            subtask_id = Some(SubtaskId::new(id.clone()));
            break;
        }
    }
    let subtask_id = subtask_id.expect("assignment was never pushed");

    // the worker reports progress and uploads the result
    o.ingest()
        .handle(
            &worker.id,
            WorkerFrame::TaskProgress {
                task_id: subtask_id.to_string(),
                progress: 40,
                message: None,
            },
        )
        .await
        .unwrap();
    o.ingest()
        .handle(
            &worker.id,
            WorkerFrame::TaskResult {
                task_id: subtask_id.to_string(),
                result: TaskResultData {
                    output: serde_json::json!("oa"),
                    metadata: Default::default(),
                    execution_time: Some(3.2),
                },
            },
        )
        .await
        .unwrap();

    let outcome = run.await.unwrap().unwrap();
    assert_eq!(outcome, hive_engine::ExecutionOutcome::Completed);

    let workflow = o.store().workflow(&"wf-1".into()).unwrap();
    assert_eq!(workflow.status, WorkflowStatus::Completed);
    assert_eq!(workflow.context["A"], "oa");
    assert_eq!(o.store().worker(&worker.id).unwrap().status, WorkerStatus::Idle);
}

#[tokio::test]
async fn cancel_worker_cancels_its_assignment_and_goes_offline() {
    let o = orchestrator();
    let worker = register(&o, "m-1");
    let handle = connect(&o, &worker.id).await;

    o.create_workflow(
        ts::workflow("wf-1"),
        vec![ts::task_node("wf-1", "A", "claude_code")],
        vec![],
    )
    .unwrap();
    let run = {
        let o = o.clone();
        tokio::spawn(async move { o.run_workflow(&"wf-1".into()).await })
    };
    for _ in 0..50 {
        tokio::task::yield_now().await;
        o.allocator().cycle().await;
        if !o.store().subtasks_held_by(&worker.id).is_empty() {
            break;
        }
    }
    assert!(!o.store().subtasks_held_by(&worker.id).is_empty());

    o.cancel_worker(&worker.id).await.unwrap();

    assert_eq!(o.store().worker(&worker.id).unwrap().status, WorkerStatus::Offline);
    assert!(!o.connections().is_connected(&worker.id));
    assert!(handle
        .sent()
        .iter()
        .any(|f| matches!(f, ServerFrame::TaskCancel { .. })));
    assert!(o.store().subtasks_held_by(&worker.id).is_empty());
    run.abort();
}

#[tokio::test]
async fn delete_worker_closes_with_4409() {
    let o = orchestrator();
    let worker = register(&o, "m-1");
    let handle = connect(&o, &worker.id).await;

    o.delete_worker(&worker.id).await.unwrap();

    assert!(o.store().worker(&worker.id).is_none());
    assert_eq!(
        handle.closed(),
        Some((hive_wire::close_code::WORKER_DELETED, "worker-already-deleted".to_string()))
    );
}

#[tokio::test]
async fn cyclic_workflow_is_rejected_at_creation() {
    let o = orchestrator();
    let err = o
        .create_workflow(
            ts::workflow("wf-cyc"),
            vec![
                ts::task_node("wf-cyc", "a", "claude_code"),
                ts::task_node("wf-cyc", "b", "claude_code"),
            ],
            vec![ts::edge("wf-cyc", "a", "b"), ts::edge("wf-cyc", "b", "a")],
        )
        .unwrap_err();
    assert!(matches!(err, StoreError::Invalid(_)));
    assert!(o.store().workflow(&"wf-cyc".into()).is_none());
}
