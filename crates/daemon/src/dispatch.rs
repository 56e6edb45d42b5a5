// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The daemon's implementation of the engine dispatch seam.
//!
//! `submit` feeds the allocator; `await_result` bridges to the
//! completion hub with a fast path over the durable row (resume and
//! re-attach); `cancel` pushes a `task_cancel` frame and releases the
//! holding worker.

use crate::connection::ConnectionManager;
use crate::hub::ResultHub;
use async_trait::async_trait;
use hive_core::{Clock, Subtask, SubtaskId, SubtaskStatus, WorkerStatus};
use hive_engine::{DispatchError, SubtaskDispatch, SubtaskOutcome};
use hive_storage::{DurableStore, KvStore};
use hive_wire::ServerFrame;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

pub struct DaemonDispatch<C: Clock> {
    store: DurableStore,
    kv: KvStore<C>,
    hub: Arc<ResultHub>,
    conns: Arc<ConnectionManager<C>>,
    allocator_kick: Arc<Notify>,
}

impl<C: Clock> DaemonDispatch<C> {
    pub fn new(
        store: DurableStore,
        kv: KvStore<C>,
        hub: Arc<ResultHub>,
        conns: Arc<ConnectionManager<C>>,
        allocator_kick: Arc<Notify>,
    ) -> Self {
        Self { store, kv, hub, conns, allocator_kick }
    }

    /// Terminal observation from the durable row, if any.
    fn terminal_outcome(row: &Subtask) -> Option<SubtaskOutcome> {
        match row.status {
            SubtaskStatus::Completed => Some(SubtaskOutcome::Completed {
                output: row.output.clone().unwrap_or(serde_json::Value::Null),
            }),
            SubtaskStatus::Failed => Some(SubtaskOutcome::Failed {
                error: row.error.clone().unwrap_or_else(|| "subtask failed".to_string()),
            }),
            SubtaskStatus::Cancelled => Some(SubtaskOutcome::Cancelled),
            _ => None,
        }
    }
}

#[async_trait]
impl<C: Clock + 'static> SubtaskDispatch for DaemonDispatch<C> {
    async fn submit(&self, subtask: &Subtask) -> Result<(), DispatchError> {
        // a fresh attempt must not observe the previous attempt's
        // retained outcome
        self.hub.forget(&subtask.id);
        self.kv.queue_push(&subtask.id, subtask.priority, subtask.created_at_ms);
        self.allocator_kick.notify_one();
        tracing::debug!(subtask = %subtask.id, priority = subtask.priority, "subtask queued");
        Ok(())
    }

    async fn await_result(
        &self,
        subtask: &SubtaskId,
        timeout: Duration,
    ) -> Result<SubtaskOutcome, DispatchError> {
        let row = self.store.subtask(subtask).ok_or(DispatchError::ChannelClosed)?;
        if let Some(outcome) = Self::terminal_outcome(&row) {
            return Ok(outcome);
        }
        match self.hub.wait(subtask, timeout).await {
            Some(outcome) => Ok(outcome),
            None => {
                // the hub gave up; re-check the row before declaring a
                // timeout (upload vs. deadline race)
                let row = self.store.subtask(subtask).ok_or(DispatchError::ChannelClosed)?;
                Ok(Self::terminal_outcome(&row).unwrap_or(SubtaskOutcome::TimedOut))
            }
        }
    }

    async fn cancel(&self, subtask: &SubtaskId, reason: &str) -> Result<(), DispatchError> {
        let Some(row) = self.store.subtask(subtask) else {
            return Ok(());
        };
        if let Some(worker) = &row.assigned_worker {
            self.conns
                .send(
                    worker,
                    ServerFrame::TaskCancel {
                        subtask_id: subtask.to_string(),
                        reason: reason.to_string(),
                    },
                )
                .await;
            let _ = self.store.rmw_worker(worker, |w| {
                if w.status == WorkerStatus::Busy {
                    w.status = WorkerStatus::Idle;
                }
                Ok(())
            });
            self.kv.clear_worker_current_task(worker);
            self.kv.set_worker_status(worker, WorkerStatus::Idle);
        }
        self.kv.queue_remove(subtask);
        self.kv.clear_in_progress(subtask);
        self.hub.publish(subtask, SubtaskOutcome::Cancelled);
        self.allocator_kick.notify_one();
        tracing::info!(subtask = %subtask, reason, "subtask cancel requested");
        Ok(())
    }
}
