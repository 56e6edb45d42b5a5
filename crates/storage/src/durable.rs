// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Durable store: source of truth with optimistic concurrency.
//!
//! All tables live under a single lock; a [`DurableStore::txn`] closure
//! observes and publishes atomically. Closures must validate before
//! mutating: an `Err` return does not roll back writes already made.

use crate::error::StoreError;
use hive_core::{
    Checkpoint, CheckpointId, CoreError, Edge, EdgeId, Evaluation, Node, NodeId, Subtask,
    SubtaskId, SubtaskStatus, Worker, WorkerId, Workflow, WorkflowGraph, WorkflowId,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// Row tables. Public fields so [`DurableStore::txn`] closures can
/// compose multi-row commits; single-row access goes through the typed
/// helpers which enforce the version discipline.
#[derive(Debug, Default)]
pub struct Tables {
    pub workflows: HashMap<WorkflowId, Workflow>,
    pub nodes: HashMap<NodeId, Node>,
    pub edges: HashMap<EdgeId, Edge>,
    pub subtasks: HashMap<SubtaskId, Subtask>,
    pub workers: HashMap<WorkerId, Worker>,
    pub checkpoints: HashMap<CheckpointId, Checkpoint>,
    pub evaluations: HashMap<String, Evaluation>,
}

impl Tables {
    /// Version-checked subtask update; bumps the row version on success.
    pub fn update_subtask<T>(
        &mut self,
        id: &SubtaskId,
        expected_version: u64,
        f: impl FnOnce(&mut Subtask) -> T,
    ) -> Result<T, StoreError> {
        let subtask = self
            .subtasks
            .get_mut(id)
            .ok_or_else(|| StoreError::not_found("subtask", id))?;
        if subtask.version != expected_version {
            return Err(StoreError::StaleVersion {
                entity: "subtask",
                id: id.to_string(),
                expected: expected_version,
                found: subtask.version,
            });
        }
        let out = f(subtask);
        subtask.version += 1;
        Ok(out)
    }

    /// Version-checked worker update; bumps the row version on success.
    pub fn update_worker<T>(
        &mut self,
        id: &WorkerId,
        expected_version: u64,
        f: impl FnOnce(&mut Worker) -> T,
    ) -> Result<T, StoreError> {
        let worker =
            self.workers.get_mut(id).ok_or_else(|| StoreError::not_found("worker", id))?;
        if worker.version != expected_version {
            return Err(StoreError::StaleVersion {
                entity: "worker",
                id: id.to_string(),
                expected: expected_version,
                found: worker.version,
            });
        }
        let out = f(worker);
        worker.version += 1;
        Ok(out)
    }

    /// Unversioned read-modify-write under the table lock (the lock
    /// itself serializes the commit); bumps the row version.
    pub fn rmw_subtask<T>(
        &mut self,
        id: &SubtaskId,
        f: impl FnOnce(&mut Subtask) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let subtask = self
            .subtasks
            .get_mut(id)
            .ok_or_else(|| StoreError::not_found("subtask", id))?;
        let out = f(subtask)?;
        subtask.version += 1;
        Ok(out)
    }

    /// See [`Tables::rmw_subtask`].
    pub fn rmw_worker<T>(
        &mut self,
        id: &WorkerId,
        f: impl FnOnce(&mut Worker) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let worker =
            self.workers.get_mut(id).ok_or_else(|| StoreError::not_found("worker", id))?;
        let out = f(worker)?;
        worker.version += 1;
        Ok(out)
    }
}

/// Handle to the shared tables. Cheap to clone.
#[derive(Clone, Default)]
pub struct DurableStore {
    inner: Arc<Mutex<Tables>>,
}

impl DurableStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read-only access to the tables.
    pub fn with<T>(&self, f: impl FnOnce(&Tables) -> T) -> T {
        f(&self.inner.lock())
    }

    /// Atomic multi-row commit. The closure must validate all
    /// preconditions before mutating any row.
    pub fn txn<T>(
        &self,
        f: impl FnOnce(&mut Tables) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        f(&mut self.inner.lock())
    }

    // -- workflows --

    /// Persist a workflow with its nodes and edges. The graph is
    /// validated first; on `cycle-detected` nothing is persisted.
    pub fn create_workflow(
        &self,
        mut workflow: Workflow,
        nodes: Vec<Node>,
        edges: Vec<Edge>,
    ) -> Result<(), StoreError> {
        WorkflowGraph::new(nodes.clone(), edges.clone())
            .map_err(|e| StoreError::Invalid(CoreError::from(e)))?;

        let mut tables = self.inner.lock();
        if tables.workflows.contains_key(&workflow.id) {
            return Err(StoreError::Duplicate { entity: "workflow", id: workflow.id.to_string() });
        }
        workflow.total_nodes = nodes.len() as u32;
        for node in nodes {
            tables.nodes.insert(node.id.clone(), node);
        }
        for edge in edges {
            tables.edges.insert(edge.id.clone(), edge);
        }
        tables.workflows.insert(workflow.id.clone(), workflow);
        Ok(())
    }

    pub fn workflow(&self, id: &WorkflowId) -> Option<Workflow> {
        self.inner.lock().workflows.get(id).cloned()
    }

    /// Unversioned workflow update (the executor is the single writer
    /// of workflow rows); bumps the version.
    pub fn modify_workflow(
        &self,
        id: &WorkflowId,
        f: impl FnOnce(&mut Workflow),
    ) -> Result<Workflow, StoreError> {
        let mut tables = self.inner.lock();
        let workflow =
            tables.workflows.get_mut(id).ok_or_else(|| StoreError::not_found("workflow", id))?;
        f(workflow);
        workflow.version += 1;
        Ok(workflow.clone())
    }

    /// Cascade-delete a workflow and everything it owns.
    pub fn delete_workflow(&self, id: &WorkflowId) -> Result<(), StoreError> {
        let mut tables = self.inner.lock();
        tables
            .workflows
            .remove(id)
            .ok_or_else(|| StoreError::not_found("workflow", id))?;
        tables.nodes.retain(|_, n| n.workflow_id != *id);
        tables.edges.retain(|_, e| e.workflow_id != *id);
        tables.subtasks.retain(|_, s| s.workflow_id != *id);
        tables.checkpoints.retain(|_, c| c.workflow_id != *id);
        Ok(())
    }

    /// Materialize the graph of one workflow from its node/edge rows.
    pub fn graph(&self, id: &WorkflowId) -> Result<WorkflowGraph, StoreError> {
        let tables = self.inner.lock();
        if !tables.workflows.contains_key(id) {
            return Err(StoreError::not_found("workflow", id));
        }
        let nodes: Vec<Node> =
            tables.nodes.values().filter(|n| n.workflow_id == *id).cloned().collect();
        let edges: Vec<Edge> =
            tables.edges.values().filter(|e| e.workflow_id == *id).cloned().collect();
        WorkflowGraph::new(nodes, edges).map_err(|e| StoreError::Invalid(CoreError::from(e)))
    }

    // -- nodes & edges --

    pub fn node(&self, id: &NodeId) -> Option<Node> {
        self.inner.lock().nodes.get(id).cloned()
    }

    /// Unversioned node update (executor is the single writer).
    pub fn modify_node(
        &self,
        id: &NodeId,
        f: impl FnOnce(&mut Node),
    ) -> Result<Node, StoreError> {
        let mut tables = self.inner.lock();
        let node = tables.nodes.get_mut(id).ok_or_else(|| StoreError::not_found("node", id))?;
        f(node);
        Ok(node.clone())
    }

    /// Append dynamically created nodes/edges (DIRECTOR output). The
    /// caller has already validated acyclicity against the live graph.
    pub fn append_graph(&self, nodes: Vec<Node>, edges: Vec<Edge>) {
        let mut tables = self.inner.lock();
        for node in nodes {
            if let Some(workflow) = tables.workflows.get_mut(&node.workflow_id) {
                workflow.total_nodes += 1;
            }
            tables.nodes.insert(node.id.clone(), node);
        }
        for edge in edges {
            tables.edges.insert(edge.id.clone(), edge);
        }
    }

    // -- subtasks --

    pub fn insert_subtask(&self, subtask: Subtask) -> Result<(), StoreError> {
        let mut tables = self.inner.lock();
        if tables.subtasks.contains_key(&subtask.id) {
            return Err(StoreError::Duplicate { entity: "subtask", id: subtask.id.to_string() });
        }

        // the dependency graph over one workflow's subtasks must stay
        // acyclic; forward references to ids not yet inserted are
        // allowed during staged creation and re-checked as they land
        let mut peers: Vec<Subtask> = tables
            .subtasks
            .values()
            .filter(|s| s.workflow_id == subtask.workflow_id)
            .cloned()
            .collect();
        peers.push(subtask.clone());
        let known: std::collections::HashSet<SubtaskId> =
            peers.iter().map(|s| s.id.clone()).collect();
        for peer in &mut peers {
            peer.dependencies.retain(|dep| known.contains(dep));
        }
        hive_core::graph::validate_subtask_dependencies(&peers)
            .map_err(|e| StoreError::Invalid(CoreError::from(e)))?;

        tables.subtasks.insert(subtask.id.clone(), subtask);
        Ok(())
    }

    pub fn subtask(&self, id: &SubtaskId) -> Option<Subtask> {
        self.inner.lock().subtasks.get(id).cloned()
    }

    /// Subtask derived from the given node, if one was already created.
    pub fn subtask_for_node(&self, node: &NodeId) -> Option<Subtask> {
        self.inner.lock().subtasks.values().find(|s| s.node_id == *node).cloned()
    }

    pub fn update_subtask<T>(
        &self,
        id: &SubtaskId,
        expected_version: u64,
        f: impl FnOnce(&mut Subtask) -> T,
    ) -> Result<T, StoreError> {
        self.inner.lock().update_subtask(id, expected_version, f)
    }

    pub fn rmw_subtask<T>(
        &self,
        id: &SubtaskId,
        f: impl FnOnce(&mut Subtask) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        self.inner.lock().rmw_subtask(id, f)
    }

    /// Snapshot of ready subtasks: `pending` with every dependency
    /// `completed`. Sorted by descending priority, then creation time.
    pub fn ready_subtasks(&self) -> Vec<Subtask> {
        let tables = self.inner.lock();
        let mut ready: Vec<Subtask> = tables
            .subtasks
            .values()
            .filter(|s| s.status == SubtaskStatus::Pending)
            .filter(|s| {
                s.dependencies.iter().all(|dep| {
                    tables
                        .subtasks
                        .get(dep)
                        .is_some_and(|d| d.status == SubtaskStatus::Completed)
                })
            })
            .cloned()
            .collect();
        ready.sort_by(|a, b| {
            b.priority.cmp(&a.priority).then(a.created_at_ms.cmp(&b.created_at_ms))
        });
        ready
    }

    /// In-progress subtasks held by the given worker.
    pub fn subtasks_held_by(&self, worker: &WorkerId) -> Vec<Subtask> {
        self.inner
            .lock()
            .subtasks
            .values()
            .filter(|s| {
                s.status == SubtaskStatus::InProgress
                    && s.assigned_worker.as_ref() == Some(worker)
            })
            .cloned()
            .collect()
    }

    pub fn subtasks_for_workflow(&self, workflow: &WorkflowId) -> Vec<Subtask> {
        self.inner
            .lock()
            .subtasks
            .values()
            .filter(|s| s.workflow_id == *workflow)
            .cloned()
            .collect()
    }

    // -- workers --

    pub fn insert_worker(&self, worker: Worker) -> Result<(), StoreError> {
        let mut tables = self.inner.lock();
        if tables.workers.contains_key(&worker.id) {
            return Err(StoreError::Duplicate { entity: "worker", id: worker.id.to_string() });
        }
        tables.workers.insert(worker.id.clone(), worker);
        Ok(())
    }

    pub fn worker(&self, id: &WorkerId) -> Option<Worker> {
        self.inner.lock().workers.get(id).cloned()
    }

    /// Find a worker by its machine identifier (re-registration path).
    pub fn worker_by_machine(&self, machine_id: &str) -> Option<Worker> {
        self.inner.lock().workers.values().find(|w| w.machine_id == machine_id).cloned()
    }

    /// Find a worker by its API-key hash (authentication path).
    pub fn worker_by_key_hash(&self, hash: &str) -> Option<Worker> {
        self.inner.lock().workers.values().find(|w| w.api_key_hash == hash).cloned()
    }

    pub fn workers(&self) -> Vec<Worker> {
        self.inner.lock().workers.values().cloned().collect()
    }

    pub fn update_worker<T>(
        &self,
        id: &WorkerId,
        expected_version: u64,
        f: impl FnOnce(&mut Worker) -> T,
    ) -> Result<T, StoreError> {
        self.inner.lock().update_worker(id, expected_version, f)
    }

    pub fn rmw_worker<T>(
        &self,
        id: &WorkerId,
        f: impl FnOnce(&mut Worker) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        self.inner.lock().rmw_worker(id, f)
    }

    /// Delete a worker (explicit operator action only).
    pub fn delete_worker(&self, id: &WorkerId) -> Result<Worker, StoreError> {
        self.inner
            .lock()
            .workers
            .remove(id)
            .ok_or_else(|| StoreError::not_found("worker", id))
    }

    // -- checkpoints --

    pub fn insert_checkpoint(&self, checkpoint: Checkpoint) -> Result<(), StoreError> {
        let mut tables = self.inner.lock();
        if tables.checkpoints.contains_key(&checkpoint.id) {
            return Err(StoreError::Duplicate {
                entity: "checkpoint",
                id: checkpoint.id.to_string(),
            });
        }
        tables.checkpoints.insert(checkpoint.id.clone(), checkpoint);
        Ok(())
    }

    pub fn checkpoint(&self, id: &CheckpointId) -> Option<Checkpoint> {
        self.inner.lock().checkpoints.get(id).cloned()
    }

    pub fn update_checkpoint<T>(
        &self,
        id: &CheckpointId,
        expected_version: u64,
        f: impl FnOnce(&mut Checkpoint) -> T,
    ) -> Result<T, StoreError> {
        let mut tables = self.inner.lock();
        let checkpoint = tables
            .checkpoints
            .get_mut(id)
            .ok_or_else(|| StoreError::not_found("checkpoint", id))?;
        if checkpoint.version != expected_version {
            return Err(StoreError::StaleVersion {
                entity: "checkpoint",
                id: id.to_string(),
                expected: expected_version,
                found: checkpoint.version,
            });
        }
        let out = f(checkpoint);
        checkpoint.version += 1;
        Ok(out)
    }

    pub fn checkpoints_for_workflow(&self, workflow: &WorkflowId) -> Vec<Checkpoint> {
        self.inner
            .lock()
            .checkpoints
            .values()
            .filter(|c| c.workflow_id == *workflow)
            .cloned()
            .collect()
    }

    /// Open checkpoints whose deadline has passed.
    pub fn expired_checkpoints(&self, now_ms: u64) -> Vec<Checkpoint> {
        self.inner
            .lock()
            .checkpoints
            .values()
            .filter(|c| c.is_expired(now_ms))
            .cloned()
            .collect()
    }

    // -- evaluations --

    pub fn insert_evaluation(&self, evaluation: Evaluation) {
        self.inner.lock().evaluations.insert(evaluation.id.clone(), evaluation);
    }

    pub fn evaluations_for_subtask(&self, subtask: &SubtaskId) -> Vec<Evaluation> {
        self.inner
            .lock()
            .evaluations
            .values()
            .filter(|e| e.subtask_id == *subtask)
            .cloned()
            .collect()
    }
}

#[cfg(test)]
#[path = "durable_tests.rs"]
mod tests;
