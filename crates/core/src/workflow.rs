// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Workflow entity and status state machine.

use crate::clock::Clock;
use crate::id::WorkflowId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Free-form shared state passed between nodes of one workflow.
pub type Context = HashMap<String, serde_json::Value>;

/// Execution pattern of a workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowType {
    /// Linear pipeline
    Sequential,
    /// Parallel execution
    Concurrent,
    /// DAG with complex dependencies
    Graph,
    /// Director plans, workers execute
    Hierarchical,
    /// Multi-expert parallel, aggregate output
    Mixture,
}

crate::simple_display! {
    WorkflowType {
        Sequential => "sequential",
        Concurrent => "concurrent",
        Graph => "graph",
        Hierarchical => "hierarchical",
        Mixture => "mixture",
    }
}

/// Workflow execution status. Terminal states are sinks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Draft,
    Pending,
    Running,
    Paused,
    Completed,
    Failed,
    Cancelled,
}

impl WorkflowStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

crate::simple_display! {
    WorkflowStatus {
        Draft => "draft",
        Pending => "pending",
        Running => "running",
        Paused => "paused",
        Completed => "completed",
        Failed => "failed",
        Cancelled => "cancelled",
    }
}

/// A workflow: the unit of orchestration a client submits.
///
/// Owns its nodes, edges, subtasks, and checkpoints (cascade-delete in the
/// store). Executed exactly once unless explicitly re-run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workflow {
    pub id: WorkflowId,
    pub owner: String,
    pub name: String,
    pub kind: WorkflowType,
    pub status: WorkflowStatus,
    /// Shared context visible to every node; node outputs land here
    /// under their output keys.
    #[serde(default)]
    pub context: Context,
    pub total_nodes: u32,
    pub completed_nodes: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at_ms: Option<u64>,
    /// Optimistic-concurrency row version.
    pub version: u64,
}

impl Workflow {
    pub fn new(
        id: WorkflowId,
        owner: impl Into<String>,
        name: impl Into<String>,
        kind: WorkflowType,
        clock: &impl Clock,
    ) -> Self {
        Self {
            id,
            owner: owner.into(),
            name: name.into(),
            kind,
            status: WorkflowStatus::Pending,
            context: Context::new(),
            total_nodes: 0,
            completed_nodes: 0,
            error: None,
            created_at_ms: clock.epoch_ms(),
            started_at_ms: None,
            completed_at_ms: None,
            version: 1,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Completion percentage derived from the node counters.
    pub fn progress_percent(&self) -> u8 {
        if self.total_nodes == 0 {
            return 0;
        }
        ((self.completed_nodes as u64 * 100) / self.total_nodes as u64).min(100) as u8
    }
}

#[cfg(test)]
#[path = "workflow_tests.rs"]
mod tests;
