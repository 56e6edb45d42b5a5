// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Review coordinator: the paused-node registry.
//!
//! Checkpoints are persisted in the durable store (source of truth) and
//! mirrored into the KV review queue for fast listing by assignee,
//! workflow, and urgency. Decisions resolve the paused workflow through
//! `resume_after_review`; expiry is swept by the reaper.

use crate::dispatch::{Notifier, NotifyEvent, SubtaskDispatch};
use crate::error::EngineError;
use crate::executor::{DagExecutor, ExecutionOutcome};
use hive_core::{
    Checkpoint, CheckpointId, CheckpointStatus, Clock, DecisionKind, ReviewDecision, ReviewType,
    WorkflowId,
};
use hive_storage::{DurableStore, KvStore};
use serde_json::Value;
use std::sync::Arc;

/// A reviewer's submitted decision.
#[derive(Debug, Clone, PartialEq)]
pub struct DecisionRequest {
    pub kind: DecisionKind,
    pub comments: Option<String>,
    /// Field values for input-type reviews; merged into the workflow
    /// context on modify decisions.
    pub modifications: Option<Value>,
    pub reviewer: Option<String>,
}

/// Registry and resolution point for human-review checkpoints.
pub struct ReviewCoordinator<D, C>
where
    D: SubtaskDispatch,
    C: Clock,
{
    store: DurableStore,
    kv: KvStore<C>,
    executor: Arc<DagExecutor<D, C>>,
    notifier: Arc<dyn Notifier>,
    clock: C,
}

impl<D, C> ReviewCoordinator<D, C>
where
    D: SubtaskDispatch,
    C: Clock + 'static,
{
    pub fn new(
        store: DurableStore,
        kv: KvStore<C>,
        executor: Arc<DagExecutor<D, C>>,
        notifier: Arc<dyn Notifier>,
        clock: C,
    ) -> Self {
        Self { store, kv, executor, notifier, clock }
    }

    pub fn executor(&self) -> &Arc<DagExecutor<D, C>> {
        &self.executor
    }

    /// Open checkpoints ordered by urgency (highest first), then age.
    pub fn pending(&self) -> Vec<Checkpoint> {
        let mut pending: Vec<Checkpoint> = self
            .store
            .with(|t| t.checkpoints.values().filter(|c| c.status.is_open()).cloned().collect());
        pending.sort_by(|a, b| {
            b.urgency.cmp(&a.urgency).then(a.created_at_ms.cmp(&b.created_at_ms))
        });
        pending
    }

    /// Fast queue listing from the KV mirror, oldest first. Falls back
    /// to the durable store when the mirror is empty (cache loss).
    pub fn queue(&self) -> Vec<CheckpointId> {
        let mirrored = self.kv.review_queue();
        if !mirrored.is_empty() {
            return mirrored;
        }
        let mut pending = self.pending();
        pending.sort_by_key(|c| c.created_at_ms);
        pending.into_iter().map(|c| c.id).collect()
    }

    pub fn checkpoint(&self, id: &CheckpointId) -> Option<Checkpoint> {
        self.store.checkpoint(id)
    }

    /// Record a decision and resume the paused workflow.
    pub async fn submit_decision(
        &self,
        id: &CheckpointId,
        request: DecisionRequest,
    ) -> Result<ExecutionOutcome, EngineError> {
        let checkpoint = self
            .store
            .checkpoint(id)
            .ok_or_else(|| hive_storage::StoreError::not_found("checkpoint", id))?;
        if !checkpoint.status.is_open() {
            return Err(EngineError::CheckpointClosed(id.to_string()));
        }

        // input-type reviews must carry every required field
        if checkpoint.review_type == ReviewType::Input
            && request.kind != DecisionKind::Reject
        {
            let supplied = request.modifications.as_ref().and_then(|m| m.as_object());
            let missing: Vec<String> = checkpoint
                .required_fields
                .iter()
                .filter(|field| !supplied.is_some_and(|m| m.contains_key(*field)))
                .cloned()
                .collect();
            if !missing.is_empty() {
                return Err(EngineError::MissingReviewFields { fields: missing });
            }
        }

        let status = match request.kind {
            DecisionKind::Approve => CheckpointStatus::Approved,
            DecisionKind::Modify => CheckpointStatus::Modified,
            DecisionKind::Reject => CheckpointStatus::Rejected,
        };
        let decision = ReviewDecision {
            kind: request.kind,
            comments: request.comments.clone(),
            modifications: request.modifications.clone(),
            reviewer: request.reviewer.clone(),
            decided_at_ms: self.clock.epoch_ms(),
        };
        self.store.update_checkpoint(id, checkpoint.version, |c| {
            c.status = status;
            c.decision = Some(decision.clone());
        })?;
        self.kv.drop_review(id);

        tracing::info!(checkpoint = %id, workflow = %checkpoint.workflow_id,
            decision = %request.kind, "review decision recorded");
        self.executor
            .resume_after_review(
                &checkpoint.workflow_id,
                &checkpoint.node_id,
                request.kind,
                request.modifications,
            )
            .await
    }

    /// Close every open checkpoint of a cancelled workflow.
    pub fn cancel_for_workflow(&self, workflow: &WorkflowId) {
        for checkpoint in self.store.checkpoints_for_workflow(workflow) {
            if checkpoint.status.is_open() {
                let _ = self.store.update_checkpoint(&checkpoint.id, checkpoint.version, |c| {
                    c.status = CheckpointStatus::Cancelled;
                });
                self.kv.drop_review(&checkpoint.id);
            }
        }
    }

    /// Expire overdue checkpoints (reaper path). Returns the expired set.
    pub async fn expire_due(&self) -> Vec<Checkpoint> {
        let now = self.clock.epoch_ms();
        let mut expired = Vec::new();
        for checkpoint in self.store.expired_checkpoints(now) {
            let updated = self.store.update_checkpoint(&checkpoint.id, checkpoint.version, |c| {
                c.status = CheckpointStatus::Expired;
            });
            if updated.is_err() {
                // concurrent decision won the race; leave it be
                continue;
            }
            self.kv.drop_review(&checkpoint.id);
            self.notifier
                .notify(NotifyEvent::ReviewExpired {
                    checkpoint: checkpoint.id.clone(),
                    workflow: checkpoint.workflow_id.clone(),
                })
                .await;
            tracing::info!(checkpoint = %checkpoint.id, "checkpoint expired");
            expired.push(checkpoint);
        }
        expired
    }
}

#[cfg(test)]
#[path = "review_tests.rs"]
mod tests;
