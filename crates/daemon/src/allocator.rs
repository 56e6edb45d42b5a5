// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Task allocator: pairs ready subtasks with idle workers.
//!
//! A cycle snapshots ready subtasks (priority-ordered) and idle
//! connected workers, greedily picks the best-scoring worker per
//! subtask, and commits each pairing through the durable store's
//! optimistic locks. KV writes are a mirror: failures are tolerated and
//! re-done on the next cycle. An undelivered assignment runs the
//! release path, restoring both rows.

use crate::connection::ConnectionManager;
use hive_core::{Clock, PrivacyLevel, Subtask, SubtaskId, SubtaskStatus, Worker, WorkerId, WorkerStatus};
use hive_storage::{DurableStore, KvStore, StoreError};
use hive_wire::ServerFrame;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Error)]
pub enum AllocError {
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Write failed between commit and worker ack; the pairing was
    /// rolled back and the subtask re-queued.
    #[error("assignment undelivered")]
    Undelivered,
}

/// Weighted scoring policy. Weights are normalized to sum 1.
#[derive(Debug, Clone)]
pub struct ScoringPolicy {
    pub tool_weight: f64,
    pub resource_weight: f64,
    pub privacy_weight: f64,
    /// Pairings scoring below this stay queued.
    pub min_score: f64,
}

impl Default for ScoringPolicy {
    fn default() -> Self {
        Self { tool_weight: 0.5, resource_weight: 0.3, privacy_weight: 0.2, min_score: 0.3 }
    }
}

impl ScoringPolicy {
    fn normalized(&self) -> (f64, f64, f64) {
        let sum = self.tool_weight + self.resource_weight + self.privacy_weight;
        if sum <= 0.0 {
            return (0.5, 0.3, 0.2);
        }
        (self.tool_weight / sum, self.resource_weight / sum, self.privacy_weight / sum)
    }
}

/// Matches ready subtasks to idle workers and owns the commit/release
/// protocol for assignments.
pub struct TaskAllocator<C: Clock> {
    store: DurableStore,
    kv: KvStore<C>,
    conns: Arc<ConnectionManager<C>>,
    clock: C,
    policy: ScoringPolicy,
    subtask_timeout_ms: u64,
    kick: Arc<Notify>,
}

impl<C: Clock> TaskAllocator<C> {
    pub fn new(
        store: DurableStore,
        kv: KvStore<C>,
        conns: Arc<ConnectionManager<C>>,
        clock: C,
        policy: ScoringPolicy,
        subtask_timeout_ms: u64,
        kick: Arc<Notify>,
    ) -> Self {
        Self { store, kv, conns, clock, policy, subtask_timeout_ms, kick }
    }

    /// Wake the allocator outside its fallback cadence.
    pub fn kick(&self) {
        self.kick.notify_one();
    }

    // -- scoring ---------------------------------------------------------

    fn tool_score(subtask: &Subtask, worker: &Worker) -> f64 {
        if worker.tools.iter().any(|t| *t == subtask.recommended_tool) {
            1.0
        } else if subtask.require_exact_tool || worker.tools.is_empty() {
            0.0
        } else {
            0.5
        }
    }

    fn resource_score(worker: &Worker) -> f64 {
        let Some(metrics) = &worker.metrics else { return 0.5 };
        let free = |pct: f64| 1.0 - (pct / 100.0).clamp(0.0, 1.0);
        0.4 * free(metrics.cpu_percent)
            + 0.4 * free(metrics.memory_percent)
            + 0.2 * free(metrics.disk_percent)
    }

    fn privacy_score(subtask: &Subtask, worker: &Worker) -> f64 {
        match subtask.privacy {
            PrivacyLevel::Normal => 1.0,
            PrivacyLevel::Sensitive => match (worker.has_local_tool(), worker.has_cloud_tool()) {
                (true, false) => 1.0,
                (true, true) => 0.8,
                _ => 0.5,
            },
        }
    }

    /// Weighted pairing score in `0.0..=1.0`.
    pub fn score(&self, subtask: &Subtask, worker: &Worker) -> f64 {
        let (tool_w, resource_w, privacy_w) = self.policy.normalized();
        tool_w * Self::tool_score(subtask, worker)
            + resource_w * Self::resource_score(worker)
            + privacy_w * Self::privacy_score(subtask, worker)
    }

    // -- allocation cycle ------------------------------------------------

    /// One allocation pass. Returns the number of committed pairings.
    pub async fn cycle(&self) -> usize {
        let ready = self.store.ready_subtasks();
        if ready.is_empty() {
            return 0;
        }
        let idle: Vec<Worker> = self
            .store
            .workers()
            .into_iter()
            .filter(|w| w.status.is_available() && self.conns.is_connected(&w.id))
            .collect();
        if idle.is_empty() {
            return 0;
        }

        let mut taken: HashSet<WorkerId> = HashSet::new();
        let mut committed = 0;
        for subtask in ready {
            let best = idle
                .iter()
                .filter(|w| !taken.contains(&w.id))
                .map(|w| (self.score(&subtask, w), w))
                .filter(|(score, _)| *score >= self.policy.min_score)
                .max_by(|(a, _), (b, _)| a.total_cmp(b));
            let Some((score, worker)) = best else { continue };

            match self.commit(&subtask, worker).await {
                Ok(()) => {
                    tracing::info!(subtask = %subtask.id, worker = %worker.id, score,
                        "subtask assigned");
                    taken.insert(worker.id.clone());
                    committed += 1;
                }
                Err(error) => {
                    // lost a race or the push failed; next cycle retries
                    tracing::debug!(subtask = %subtask.id, worker = %worker.id, %error,
                        "pairing skipped");
                    taken.insert(worker.id.clone());
                }
            }
        }
        committed
    }

    /// Commit protocol: reload both rows under the table lock, flip
    /// them together, mirror to KV, then push the assignment frame.
    async fn commit(&self, subtask: &Subtask, worker: &Worker) -> Result<(), AllocError> {
        let now = self.clock.epoch_ms();
        self.store.txn(|t| {
            let current = t
                .subtasks
                .get(&subtask.id)
                .ok_or_else(|| StoreError::not_found("subtask", &subtask.id))?;
            if current.status != SubtaskStatus::Pending {
                return Err(StoreError::Conflict(format!(
                    "subtask {} is {}",
                    subtask.id, current.status
                )));
            }
            let current_worker = t
                .workers
                .get(&worker.id)
                .ok_or_else(|| StoreError::not_found("worker", &worker.id))?;
            if !current_worker.status.is_available() {
                return Err(StoreError::Conflict(format!(
                    "worker {} is {}",
                    worker.id, current_worker.status
                )));
            }
            let worker_version = current_worker.version;

            t.update_subtask(&subtask.id, subtask.version, |s| {
                s.status = SubtaskStatus::InProgress;
                s.assigned_worker = Some(worker.id.clone());
                s.attempt += 1;
                s.started_at_ms = Some(now);
            })?;
            t.update_worker(&worker.id, worker_version, |w| {
                w.status = WorkerStatus::Busy;
            })?;
            Ok(())
        })?;

        // KV mirror; the durable store stays the source of truth
        self.kv.set_worker_current_task(&worker.id, &subtask.id, self.subtask_timeout_ms);
        self.kv.mark_in_progress(&subtask.id);
        self.kv.queue_remove(&subtask.id);
        self.kv.set_worker_status(&worker.id, WorkerStatus::Busy);

        let frame = ServerFrame::TaskAssignment {
            subtask_id: subtask.id.to_string(),
            description: subtask.description.clone(),
            assigned_tool: self.assigned_tool(subtask, worker),
            context: self.assignment_context(subtask),
            timeout_seconds: self.subtask_timeout_ms / 1_000,
        };
        if !self.conns.send(&worker.id, frame).await {
            self.release(&subtask.id, &worker.id).await;
            return Err(AllocError::Undelivered);
        }
        Ok(())
    }

    fn assigned_tool(&self, subtask: &Subtask, worker: &Worker) -> String {
        if worker.tools.iter().any(|t| *t == subtask.recommended_tool) {
            subtask.recommended_tool.clone()
        } else {
            worker
                .tools
                .first()
                .cloned()
                .unwrap_or_else(|| subtask.recommended_tool.clone())
        }
    }

    fn assignment_context(
        &self,
        subtask: &Subtask,
    ) -> std::collections::HashMap<String, serde_json::Value> {
        let Some(workflow) = self.store.workflow(&subtask.workflow_id) else {
            return Default::default();
        };
        // forward the context keys the task node asked for
        let Some(node) = self.store.node(&subtask.node_id) else {
            return Default::default();
        };
        let keys = match &node.config {
            hive_core::NodeConfig::Task(config) => config.context_keys.clone(),
            _ => Vec::new(),
        };
        keys.into_iter()
            .filter_map(|key| workflow.context.get(&key).map(|v| (key, v.clone())))
            .collect()
    }

    /// Release path: reverse the commit on undelivered assignment,
    /// worker disconnect, or explicit cancellation.
    pub async fn release(&self, subtask: &SubtaskId, worker: &WorkerId) {
        let requeue = self.store.txn(|t| {
            let mut requeue = None;
            if let Some(s) = t.subtasks.get(subtask) {
                if s.status == SubtaskStatus::InProgress
                    && s.assigned_worker.as_ref() == Some(worker)
                {
                    t.rmw_subtask(subtask, |s| {
                        s.status = SubtaskStatus::Pending;
                        s.assigned_worker = None;
                        Ok(())
                    })?;
                    if let Some(s) = t.subtasks.get(subtask) {
                        requeue = Some((s.priority, s.created_at_ms));
                    }
                }
            }
            if let Some(w) = t.workers.get(worker) {
                if w.status == WorkerStatus::Busy {
                    t.rmw_worker(worker, |w| {
                        w.status = WorkerStatus::Idle;
                        Ok(())
                    })?;
                }
            }
            Ok(requeue)
        });

        self.kv.clear_worker_current_task(worker);
        self.kv.clear_in_progress(subtask);
        self.kv.set_worker_status(worker, WorkerStatus::Idle);
        if let Ok(Some((priority, created_at_ms))) = requeue {
            self.kv.queue_push(subtask, priority, created_at_ms);
        }
        tracing::info!(subtask = %subtask, worker = %worker, "assignment released");
        self.kick.notify_one();
    }

    /// Allocation loop: runs a cycle on every kick and on the fallback
    /// cadence.
    pub async fn run(&self, cancel: CancellationToken, interval: Duration) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = self.kick.notified() => {}
                _ = tokio::time::sleep(interval) => {}
            }
            let committed = self.cycle().await;
            if committed > 0 {
                tracing::debug!(committed, "allocation cycle");
            }
        }
    }
}

#[cfg(test)]
#[path = "allocator_tests.rs"]
mod tests;
