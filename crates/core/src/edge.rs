// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Workflow edges.

use crate::id::{EdgeId, NodeId, WorkflowId};
use serde::{Deserialize, Serialize};

/// A directed edge between two nodes of one workflow.
///
/// The edge set forms a DAG except within loop regions, where the
/// back-edge is marked and excluded from topological ordering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub id: EdgeId,
    pub workflow_id: WorkflowId,
    pub from: NodeId,
    pub to: NodeId,
    /// Branch label matched against condition/review outcomes
    /// (e.g. `"true"`, `"false"`, `"approve"`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Loop back-edge, excluded from topological ordering.
    #[serde(default)]
    pub back_edge: bool,
}

impl Edge {
    pub fn new(
        id: EdgeId,
        workflow_id: WorkflowId,
        from: NodeId,
        to: NodeId,
    ) -> Self {
        Self { id, workflow_id, from, to, label: None, back_edge: false }
    }

    pub fn labeled(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn back(mut self) -> Self {
        self.back_edge = true;
        self
    }
}
