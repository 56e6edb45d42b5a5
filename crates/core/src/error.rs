// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared error taxonomy for the control plane.
//!
//! Components communicate failures via these tagged variants, never
//! strings. Client-surfaced errors carry the stable `kind()` code plus
//! the human `Display` message.

use crate::graph::GraphError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Control-plane error kinds.
#[derive(Debug, Error, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum CoreError {
    /// Workflow graph or subtask dependencies contain a cycle.
    /// Fails workflow creation; surfaced to the client.
    #[error("cycle detected: {}", witness.join(" -> "))]
    CycleDetected { witness: Vec<String> },

    /// Attempt to run a subtask whose dependencies are incomplete.
    /// Internal only; the allocator filters it out.
    #[error("subtask {subtask} has unmet dependencies")]
    DependencyUnmet { subtask: String },

    /// Connection write failed between commit and worker ack.
    #[error("assignment of {subtask} to worker {worker} was not delivered")]
    AssignmentUndelivered { subtask: String, worker: String },

    /// Worker held a subtask past its wall-clock budget.
    #[error("subtask {subtask} timed out after {timeout_ms}ms")]
    SubtaskTimeout { subtask: String, timeout_ms: u64 },

    /// A node exhausted its retries.
    #[error("node {node} failed: {message}")]
    NodeExecutionFailed { node: String, message: String },

    /// The reaper classified a worker as dead.
    #[error("worker {worker} is dead")]
    WorkerDead { worker: String },

    /// Expected pause at a human-review node. Not a failure; state is
    /// preserved for resumption.
    #[error("workflow paused at node {node}")]
    WorkflowPaused { node: String },

    /// Explicit cancellation; clean stop.
    #[error("workflow cancelled")]
    WorkflowCancelled,

    /// Optimistic-lock collision; the enclosing read-compute-commit
    /// should re-read and retry.
    #[error("stale version on {entity} {id}")]
    StaleVersion { entity: String, id: String },

    /// Malformed workflow graph (dangling edges, duplicate ids).
    #[error("invalid workflow graph: {message}")]
    InvalidGraph { message: String },
}

impl CoreError {
    /// Stable kind code surfaced to clients.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::CycleDetected { .. } => "cycle-detected",
            Self::DependencyUnmet { .. } => "dependency-unmet",
            Self::AssignmentUndelivered { .. } => "assignment-undelivered",
            Self::SubtaskTimeout { .. } => "subtask-timeout",
            Self::NodeExecutionFailed { .. } => "node-execution-failed",
            Self::WorkerDead { .. } => "worker-dead",
            Self::WorkflowPaused { .. } => "workflow-paused",
            Self::WorkflowCancelled => "workflow-cancelled",
            Self::StaleVersion { .. } => "stale-version",
            Self::InvalidGraph { .. } => "invalid-graph",
        }
    }

    /// Transient failures are caught at the node level and retried up
    /// to `max_retries`; everything else bubbles to the workflow.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::SubtaskTimeout { .. }
                | Self::AssignmentUndelivered { .. }
                | Self::StaleVersion { .. }
                | Self::WorkerDead { .. }
        )
    }
}

impl From<GraphError> for CoreError {
    fn from(err: GraphError) -> Self {
        match err {
            GraphError::CycleDetected { witness } => Self::CycleDetected { witness },
            other => Self::InvalidGraph { message: other.to_string() },
        }
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
