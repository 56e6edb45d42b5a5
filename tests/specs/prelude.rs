// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared harness for the workspace specs: an orchestrator on a fake
//! clock plus scripted in-process workers.

use hive_core::test_support as ts;
use hive_core::{FakeClock, SeqIdGen, SubtaskId, Worker, WorkerId};
use hive_daemon::auth::{register_worker, Registration};
use hive_daemon::connection::test_channel::{test_channel, ChannelHandle};
use hive_daemon::orchestrator::Collaborators;
use hive_daemon::{Config, Orchestrator};
use hive_engine::testing::{FakeRouter, RecordingNotifier};
use hive_engine::StaticTemplateRegistry;
use hive_wire::{ServerFrame, TaskResultData, WorkerFrame};
use std::sync::Arc;

pub use hive_core::{NodeStatus, SubtaskStatus, WorkerStatus, WorkflowStatus};
pub use ts::{
    condition_node, edge, join_node, labeled_edge, review_node, split_node, task_node, workflow,
};

pub struct Hive {
    pub orchestrator: Arc<Orchestrator<FakeClock>>,
    pub clock: FakeClock,
    id_gen: Arc<SeqIdGen>,
}

pub fn hive() -> Hive {
    let clock = FakeClock::new();
    let id_gen = Arc::new(SeqIdGen::default());
    let collaborators = Collaborators {
        router: Arc::new(FakeRouter::always("default")),
        templates: Arc::new(StaticTemplateRegistry::new()),
        notifier: Arc::new(RecordingNotifier::new()),
        id_gen: id_gen.clone(),
    };
    let orchestrator = Arc::new(Orchestrator::new(Config::default(), clock.clone(), collaborators));
    Hive { orchestrator, clock, id_gen }
}

/// A connected worker driven by the test, frame by frame.
pub struct SimWorker {
    pub worker: Worker,
    pub handle: ChannelHandle,
    seen_assignments: std::cell::RefCell<usize>,
}

impl Hive {
    pub async fn connect_worker(&self, machine: &str, tools: &[&str]) -> SimWorker {
        let (worker, _key) = register_worker(
            self.orchestrator.store(),
            self.id_gen.as_ref(),
            &self.clock,
            Registration {
                machine_id: machine.to_string(),
                machine_name: format!("Machine {machine}"),
                tools: tools.iter().map(|t| t.to_string()).collect(),
                system_info: Default::default(),
            },
        )
        .expect("registration failed");
        let (handle, sink, _source) = test_channel();
        self.orchestrator
            .connections()
            .accept(worker.id.clone(), Box::new(sink))
            .await;
        SimWorker { worker, handle, seen_assignments: std::cell::RefCell::new(0) }
    }

    /// Yield to spawned executors and run allocation until `done` holds
    /// (or the budget runs out).
    pub async fn drive_until(&self, mut done: impl FnMut() -> bool) {
        for _ in 0..500 {
            if done() {
                return;
            }
            tokio::task::yield_now().await;
            self.orchestrator.allocator().cycle().await;
        }
        assert!(done(), "condition not reached within the driving budget");
    }

    /// Assert the §8 state invariants over every stored row.
    pub fn assert_invariants(&self) {
        let store = self.orchestrator.store();
        let mut holders: std::collections::HashMap<WorkerId, Vec<SubtaskId>> = Default::default();
        store.with(|t| {
            for subtask in t.subtasks.values() {
                assert!(
                    subtask.assignment_consistent(),
                    "subtask {} violates (assigned ⇔ in-progress): {:?} {:?}",
                    subtask.id,
                    subtask.status,
                    subtask.assigned_worker,
                );
                if let Some(worker) = &subtask.assigned_worker {
                    holders.entry(worker.clone()).or_default().push(subtask.id.clone());
                }
                assert!(subtask.progress <= 100);
            }
            for (worker, held) in &holders {
                assert!(
                    held.len() <= 1,
                    "worker {worker} holds more than one subtask: {held:?}"
                );
            }
            for workflow in t.workflows.values() {
                assert!(
                    workflow.completed_nodes <= workflow.total_nodes,
                    "workflow {} counters out of range",
                    workflow.id
                );
                if workflow.status == WorkflowStatus::Completed {
                    assert_eq!(workflow.completed_nodes, workflow.total_nodes);
                }
            }
        });
    }
}

impl SimWorker {
    /// Next unseen assignment pushed to this worker.
    pub fn next_assignment(&self) -> Option<(SubtaskId, String)> {
        let assignments: Vec<(SubtaskId, String)> = self
            .handle
            .sent()
            .into_iter()
            .filter_map(|frame| match frame {
                ServerFrame::TaskAssignment { subtask_id, assigned_tool, .. } => {
                    Some((SubtaskId::new(subtask_id), assigned_tool))
                }
                _ => None,
            })
            .collect();
        let mut seen = self.seen_assignments.borrow_mut();
        if assignments.len() > *seen {
            let next = assignments[*seen].clone();
            *seen += 1;
            Some(next)
        } else {
            None
        }
    }

    pub async fn report_progress(&self, hive: &Hive, subtask: &SubtaskId, progress: u8) {
        hive.orchestrator
            .ingest()
            .handle(
                &self.worker.id,
                WorkerFrame::TaskProgress {
                    task_id: subtask.to_string(),
                    progress,
                    message: None,
                },
            )
            .await
            .expect("progress rejected");
    }

    pub async fn upload_result(&self, hive: &Hive, subtask: &SubtaskId, output: serde_json::Value) {
        hive.orchestrator
            .ingest()
            .handle(
                &self.worker.id,
                WorkerFrame::TaskResult {
                    task_id: subtask.to_string(),
                    result: TaskResultData {
                        output,
                        metadata: Default::default(),
                        execution_time: Some(1.0),
                    },
                },
            )
            .await
            .expect("result rejected");
    }

    /// Wait for the next assignment and complete it with `output`.
    pub async fn work_once(&self, hive: &Hive, output: serde_json::Value) -> SubtaskId {
        let mut assignment = None;
        hive.drive_until(|| {
            if assignment.is_none() {
                assignment = self.next_assignment();
            }
            assignment.is_some()
        })
        .await;
        let (subtask, _tool) = assignment.expect("no assignment arrived");
        self.upload_result(hive, &subtask, output).await;
        subtask
    }
}
