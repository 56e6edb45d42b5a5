// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Human-review checkpoints.

use crate::clock::Clock;
use crate::id::{CheckpointId, NodeId, WorkflowId};
use serde::{Deserialize, Serialize};

/// What the reviewer is asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewType {
    /// Approve or reject as-is.
    #[default]
    Approval,
    /// The decision must carry values for the required fields.
    Input,
}

/// Review urgency, used for queue ordering in listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewUrgency {
    Low,
    #[default]
    Normal,
    High,
    Critical,
}

crate::simple_display! {
    ReviewUrgency {
        Low => "low",
        Normal => "normal",
        High => "high",
        Critical => "critical",
    }
}

/// Checkpoint lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointStatus {
    Pending,
    Approved,
    Rejected,
    /// Approved with reviewer modifications applied.
    Modified,
    Expired,
    Cancelled,
}

impl CheckpointStatus {
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Pending)
    }
}

crate::simple_display! {
    CheckpointStatus {
        Pending => "pending",
        Approved => "approved",
        Rejected => "rejected",
        Modified => "modified",
        Expired => "expired",
        Cancelled => "cancelled",
    }
}

/// The reviewer's verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionKind {
    Approve,
    Reject,
    /// Approve with modifications merged into the workflow context.
    Modify,
}

crate::simple_display! {
    DecisionKind {
        Approve => "approve",
        Reject => "reject",
        Modify => "modify",
    }
}

/// Recorded review decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewDecision {
    pub kind: DecisionKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comments: Option<String>,
    /// Field values supplied by the reviewer (required for input reviews).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modifications: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reviewer: Option<String>,
    pub decided_at_ms: u64,
}

/// A persisted human-review request awaiting a decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub id: CheckpointId,
    pub workflow_id: WorkflowId,
    /// The HUMAN-REVIEW node paused on this checkpoint.
    pub node_id: NodeId,
    /// Snapshot of the node inputs at pause time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_snapshot: Option<serde_json::Value>,
    pub instructions: String,
    #[serde(default)]
    pub required_fields: Vec<String>,
    pub review_type: ReviewType,
    pub urgency: ReviewUrgency,
    pub status: CheckpointStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignee: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decision: Option<ReviewDecision>,
    pub created_at_ms: u64,
    /// Optimistic-concurrency row version.
    pub version: u64,
}

impl Checkpoint {
    pub fn new(
        id: CheckpointId,
        workflow_id: WorkflowId,
        node_id: NodeId,
        instructions: impl Into<String>,
        clock: &impl Clock,
    ) -> Self {
        Self {
            id,
            workflow_id,
            node_id,
            input_snapshot: None,
            instructions: instructions.into(),
            required_fields: Vec::new(),
            review_type: ReviewType::Approval,
            urgency: ReviewUrgency::Normal,
            status: CheckpointStatus::Pending,
            assignee: None,
            expires_at_ms: None,
            decision: None,
            created_at_ms: clock.epoch_ms(),
            version: 1,
        }
    }

    pub fn is_expired(&self, now_ms: u64) -> bool {
        self.status.is_open() && self.expires_at_ms.is_some_and(|at| at <= now_ms)
    }
}

#[cfg(test)]
#[path = "checkpoint_tests.rs"]
mod tests;
