// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Typed handlers for worker → server frames.

use super::ConnectionManager;
use crate::hub::ResultHub;
use hive_core::{Clock, ResourceMetrics, SubtaskId, SubtaskStatus, WorkerId, WorkerStatus};
use hive_engine::SubtaskOutcome;
use hive_storage::{DurableStore, KvStore};
use hive_wire::{ServerFrame, TaskResultData, WorkerFrame};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Notify;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("unknown worker: {0}")]
    UnknownWorker(String),

    #[error("unknown subtask: {0}")]
    UnknownSubtask(String),

    #[error("subtask {subtask} is not held by worker {worker}")]
    NotHolder { subtask: String, worker: String },
}

/// Collaborators of the frame ingest.
pub struct IngestDeps<C: Clock> {
    pub store: DurableStore,
    pub kv: KvStore<C>,
    pub hub: Arc<ResultHub>,
    pub conns: Arc<ConnectionManager<C>>,
    pub allocator_kick: Arc<Notify>,
}

/// Applies worker frames to the stores and wakes interested parties.
pub struct FrameIngest<C: Clock> {
    store: DurableStore,
    kv: KvStore<C>,
    hub: Arc<ResultHub>,
    conns: Arc<ConnectionManager<C>>,
    allocator_kick: Arc<Notify>,
    clock: C,
}

impl<C: Clock> FrameIngest<C> {
    pub fn new(deps: IngestDeps<C>, clock: C) -> Self {
        Self {
            store: deps.store,
            kv: deps.kv,
            hub: deps.hub,
            conns: deps.conns,
            allocator_kick: deps.allocator_kick,
            clock,
        }
    }

    pub async fn handle(&self, worker: &WorkerId, frame: WorkerFrame) -> Result<(), IngestError> {
        match frame {
            WorkerFrame::Register { machine_id, machine_name, tools, system_info } => {
                self.handle_register(worker, machine_id, machine_name, tools, system_info)
                    .await
            }
            WorkerFrame::Heartbeat {
                status,
                cpu_percent,
                memory_percent,
                disk_percent,
                current_task,
            } => {
                self.handle_heartbeat(
                    worker,
                    status,
                    cpu_percent,
                    memory_percent,
                    disk_percent,
                    current_task,
                )
                .await
            }
            WorkerFrame::TaskProgress { task_id, progress, message } => {
                self.handle_progress(worker, &SubtaskId::new(task_id), progress, message)
            }
            WorkerFrame::TaskResult { task_id, result } => {
                self.handle_result(worker, &SubtaskId::new(task_id), result)
            }
            WorkerFrame::TaskFailed { task_id, error } => {
                self.handle_failed(worker, &SubtaskId::new(task_id), error)
            }
            WorkerFrame::TaskRejected { task_id, reason } => {
                self.handle_rejected(worker, &SubtaskId::new(task_id), reason)
            }
            WorkerFrame::Pong {} => Ok(()),
        }
    }

    async fn handle_register(
        &self,
        worker: &WorkerId,
        machine_id: String,
        machine_name: String,
        tools: Vec<String>,
        system_info: std::collections::HashMap<String, serde_json::Value>,
    ) -> Result<(), IngestError> {
        let now = self.clock.epoch_ms();
        self.store
            .rmw_worker(worker, |w| {
                w.machine_id = machine_id;
                w.machine_name = machine_name;
                w.tools = tools;
                w.system_info = system_info;
                w.last_heartbeat_ms = now;
                if w.status == WorkerStatus::Offline {
                    w.status = WorkerStatus::Idle;
                }
                Ok(())
            })
            .map_err(|_| IngestError::UnknownWorker(worker.to_string()))?;

        self.conns
            .send(
                worker,
                ServerFrame::RegisterAck {
                    worker_id: worker.to_string(),
                    status: "registered".to_string(),
                },
            )
            .await;
        self.allocator_kick.notify_one();
        Ok(())
    }

    async fn handle_heartbeat(
        &self,
        worker: &WorkerId,
        reported: WorkerStatus,
        cpu_percent: Option<f64>,
        memory_percent: Option<f64>,
        disk_percent: Option<f64>,
        current_task: Option<String>,
    ) -> Result<(), IngestError> {
        let now = self.clock.epoch_ms();
        let holds_assignment = !self.store.subtasks_held_by(worker).is_empty();
        let effective = self
            .store
            .rmw_worker(worker, |w| {
                w.last_heartbeat_ms = now;
                if let (Some(cpu), Some(memory), Some(disk)) =
                    (cpu_percent, memory_percent, disk_percent)
                {
                    w.metrics = Some(ResourceMetrics {
                        cpu_percent: cpu,
                        memory_percent: memory,
                        disk_percent: disk,
                    });
                }
                // a heartbeat never downgrades a worker that still holds
                // an assignment; only the allocator/reaper release it
                w.status = if holds_assignment { WorkerStatus::Busy } else { reported };
                Ok(w.status)
            })
            .map_err(|_| IngestError::UnknownWorker(worker.to_string()))?;

        self.kv.set_worker_status(worker, effective);
        if let Some(task) = current_task {
            tracing::trace!(worker = %worker, task = %task, "heartbeat carries current task");
        }
        self.conns
            .send(worker, ServerFrame::HeartbeatAck { status: "ok".to_string() })
            .await;
        if effective == WorkerStatus::Idle {
            self.allocator_kick.notify_one();
        }
        Ok(())
    }

    fn handle_progress(
        &self,
        worker: &WorkerId,
        subtask: &SubtaskId,
        progress: u8,
        message: Option<String>,
    ) -> Result<(), IngestError> {
        self.store
            .rmw_subtask(subtask, |s| {
                if s.assigned_worker.as_ref() == Some(worker) {
                    // out-of-order reports are kept monotone
                    s.apply_progress(progress);
                }
                Ok(())
            })
            .map_err(|_| IngestError::UnknownSubtask(subtask.to_string()))?;
        if let Some(message) = message {
            tracing::debug!(subtask = %subtask, progress, %message, "progress");
        }
        Ok(())
    }

    /// Terminal result upload. Idempotent: an already-terminal row
    /// ignores re-uploads (at-least-once delivery).
    fn handle_result(
        &self,
        worker: &WorkerId,
        subtask: &SubtaskId,
        result: TaskResultData,
    ) -> Result<(), IngestError> {
        let row = self
            .store
            .subtask(subtask)
            .ok_or_else(|| IngestError::UnknownSubtask(subtask.to_string()))?;
        if row.is_terminal() {
            tracing::debug!(subtask = %subtask, "duplicate result upload ignored");
            return Ok(());
        }
        if row.assigned_worker.as_ref() != Some(worker) {
            return Err(IngestError::NotHolder {
                subtask: subtask.to_string(),
                worker: worker.to_string(),
            });
        }

        let now = self.clock.epoch_ms();
        let output = result.output.clone();
        let _ = self.store.rmw_subtask(subtask, |s| {
            s.status = SubtaskStatus::Completed;
            s.progress = 100;
            s.output = Some(result.output.clone());
            s.assigned_worker = None;
            s.completed_at_ms = Some(now);
            Ok(())
        });
        self.release_worker(worker);
        self.kv.clear_in_progress(subtask);
        self.hub.publish(subtask, SubtaskOutcome::Completed { output });
        self.allocator_kick.notify_one();
        tracing::info!(subtask = %subtask, worker = %worker, "subtask completed");
        Ok(())
    }

    fn handle_failed(
        &self,
        worker: &WorkerId,
        subtask: &SubtaskId,
        error: String,
    ) -> Result<(), IngestError> {
        let row = self
            .store
            .subtask(subtask)
            .ok_or_else(|| IngestError::UnknownSubtask(subtask.to_string()))?;
        if row.is_terminal() {
            return Ok(());
        }
        if row.assigned_worker.as_ref() != Some(worker) {
            return Err(IngestError::NotHolder {
                subtask: subtask.to_string(),
                worker: worker.to_string(),
            });
        }

        let now = self.clock.epoch_ms();
        let _ = self.store.rmw_subtask(subtask, |s| {
            s.status = SubtaskStatus::Failed;
            s.error = Some(error.clone());
            s.assigned_worker = None;
            s.completed_at_ms = Some(now);
            Ok(())
        });
        self.release_worker(worker);
        self.kv.clear_in_progress(subtask);
        self.hub.publish(subtask, SubtaskOutcome::Failed { error: error.clone() });
        self.allocator_kick.notify_one();
        tracing::warn!(subtask = %subtask, worker = %worker, %error, "subtask failed");
        Ok(())
    }

    /// The worker declined the assignment: run the release path so the
    /// subtask goes straight back to the queue.
    fn handle_rejected(
        &self,
        worker: &WorkerId,
        subtask: &SubtaskId,
        reason: String,
    ) -> Result<(), IngestError> {
        let row = self
            .store
            .subtask(subtask)
            .ok_or_else(|| IngestError::UnknownSubtask(subtask.to_string()))?;
        if row.status != SubtaskStatus::InProgress
            || row.assigned_worker.as_ref() != Some(worker)
        {
            return Ok(());
        }

        let _ = self.store.rmw_subtask(subtask, |s| {
            s.status = SubtaskStatus::Pending;
            s.assigned_worker = None;
            Ok(())
        });
        self.release_worker(worker);
        self.kv.clear_in_progress(subtask);
        self.kv.queue_push(subtask, row.priority, row.created_at_ms);
        self.allocator_kick.notify_one();
        tracing::info!(subtask = %subtask, worker = %worker, %reason, "assignment rejected");
        Ok(())
    }

    fn release_worker(&self, worker: &WorkerId) {
        let _ = self.store.rmw_worker(worker, |w| {
            if w.status == WorkerStatus::Busy {
                w.status = WorkerStatus::Idle;
            }
            Ok(())
        });
        self.kv.clear_worker_current_task(worker);
        self.kv.set_worker_status(worker, WorkerStatus::Idle);
    }
}

#[cfg(test)]
#[path = "ingest_tests.rs"]
mod tests;
