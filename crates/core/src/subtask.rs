// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Subtask: the unit of work derived from a TASK node.

use crate::clock::Clock;
use crate::id::{NodeId, SubtaskId, WorkerId, WorkflowId};
use serde::{Deserialize, Serialize};

/// Privacy classification driving worker selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrivacyLevel {
    #[default]
    Normal,
    /// Prefer workers offering local-only tools.
    Sensitive,
}

crate::simple_display! {
    PrivacyLevel {
        Normal => "normal",
        Sensitive => "sensitive",
    }
}

/// Subtask execution status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubtaskStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    Cancelled,
}

impl SubtaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

crate::simple_display! {
    SubtaskStatus {
        Pending => "pending",
        InProgress => "in_progress",
        Completed => "completed",
        Failed => "failed",
        Cancelled => "cancelled",
    }
}

/// The executable unit workers see.
///
/// Invariant: `assigned_worker` is non-null iff status is `InProgress`.
/// Dependencies point to subtasks of the same workflow and form a DAG.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subtask {
    pub id: SubtaskId,
    pub workflow_id: WorkflowId,
    /// TASK node this subtask was derived from.
    pub node_id: NodeId,
    pub name: String,
    pub description: String,
    pub recommended_tool: String,
    /// The recommended tool is a hard requirement, not a preference.
    #[serde(default)]
    pub require_exact_tool: bool,
    #[serde(default)]
    pub privacy: PrivacyLevel,
    #[serde(default)]
    pub dependencies: Vec<SubtaskId>,
    /// 1 (lowest) ..= 10 (highest).
    pub priority: u8,
    /// 1 (trivial) ..= 5 (hardest).
    pub complexity: u8,
    pub status: SubtaskStatus,
    /// 0..=100, monotone until completion.
    pub progress: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_worker: Option<WorkerId>,
    /// Assignment attempts, incremented on every (re-)assignment.
    pub attempt: u32,
    /// Times this subtask was recovered from a dead worker.
    pub recovery_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<serde_json::Value>,
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

impl Subtask {
    pub fn new(
        id: SubtaskId,
        workflow_id: WorkflowId,
        node_id: NodeId,
        name: impl Into<String>,
        description: impl Into<String>,
        recommended_tool: impl Into<String>,
        clock: &impl Clock,
    ) -> Self {
        Self {
            id,
            workflow_id,
            node_id,
            name: name.into(),
            description: description.into(),
            recommended_tool: recommended_tool.into(),
            require_exact_tool: false,
            privacy: PrivacyLevel::Normal,
            dependencies: Vec::new(),
            priority: 5,
            complexity: 3,
            status: SubtaskStatus::Pending,
            progress: 0,
            assigned_worker: None,
            attempt: 0,
            recovery_count: 0,
            output: None,
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

    /// The assignment invariant: a worker is held iff in progress.
    pub fn assignment_consistent(&self) -> bool {
        self.assigned_worker.is_some() == (self.status == SubtaskStatus::InProgress)
    }

    /// Apply a progress report, ignoring decreases (out-of-order updates
    /// are kept monotone). Returns whether the value changed.
    pub fn apply_progress(&mut self, progress: u8) -> bool {
        let clamped = progress.min(100);
        if clamped <= self.progress {
            return false;
        }
        self.progress = clamped;
        true
    }

    /// Mark completed with the worker's uploaded result.
    pub fn complete(&mut self, output: serde_json::Value, clock: &impl Clock) {
        self.status = SubtaskStatus::Completed;
        self.progress = 100;
        self.output = Some(output);
        self.assigned_worker = None;
        self.completed_at_ms = Some(clock.epoch_ms());
    }
}

#[cfg(test)]
#[path = "subtask_tests.rs"]
mod tests;
