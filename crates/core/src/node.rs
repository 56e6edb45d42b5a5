// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Workflow nodes: kinds, per-kind configuration, and the node state machine.

use crate::clock::Clock;
use crate::id::{NodeId, WorkflowId};
use crate::subtask::PrivacyLevel;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Node kind tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Task,
    Condition,
    ParallelSplit,
    ParallelJoin,
    HumanReview,
    Loop,
    Router,
    Subflow,
    Director,
}

crate::simple_display! {
    NodeKind {
        Task => "task",
        Condition => "condition",
        ParallelSplit => "parallel_split",
        ParallelJoin => "parallel_join",
        HumanReview => "human_review",
        Loop => "loop",
        Router => "router",
        Subflow => "subflow",
        Director => "director",
    }
}

/// Per-node execution status.
///
/// A node is `Ready` iff every predecessor is `Completed` or `Skipped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    Pending,
    Ready,
    Running,
    Completed,
    Failed,
    Skipped,
    /// Paused at a human-review checkpoint.
    Waiting,
}

impl NodeStatus {
    /// Terminal-success for readiness purposes: successors may proceed.
    pub fn satisfies_dependents(&self) -> bool {
        matches!(self, Self::Completed | Self::Skipped)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Skipped)
    }
}

crate::simple_display! {
    NodeStatus {
        Pending => "pending",
        Ready => "ready",
        Running => "running",
        Completed => "completed",
        Failed => "failed",
        Skipped => "skipped",
        Waiting => "waiting",
    }
}

fn default_priority() -> u8 {
    5
}

fn default_complexity() -> u8 {
    3
}

fn default_max_iterations() -> u32 {
    100
}

/// Configuration for a TASK node: the work dispatched to a worker agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskConfig {
    pub description: String,
    pub recommended_tool: String,
    /// Reject workers that lack the recommended tool outright.
    #[serde(default)]
    pub require_exact_tool: bool,
    #[serde(default)]
    pub privacy: PrivacyLevel,
    #[serde(default = "default_priority")]
    pub priority: u8,
    #[serde(default = "default_complexity")]
    pub complexity: u8,
    /// Context key the node output is stored under; defaults to the node name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_key: Option<String>,
    /// Wall-clock budget override for the derived subtask.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    /// Context keys forwarded to the worker with the assignment.
    #[serde(default)]
    pub context_keys: Vec<String>,
}

/// Configuration for a CONDITION node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionConfig {
    /// Expression evaluated against the workflow context, e.g. `x > 10`.
    pub expr: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_key: Option<String>,
}

/// Configuration for a PARALLEL-SPLIT node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SplitConfig {
    /// Branch entry nodes enqueued together.
    pub branches: Vec<NodeId>,
    /// The join this split's branches converge on.
    pub join: NodeId,
    /// A single failed branch fails the join.
    #[serde(default)]
    pub fail_fast: bool,
}

/// Merge strategy for a PARALLEL-JOIN node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinStrategy {
    /// Earliest branch output wins.
    First,
    /// Latest branch output wins.
    Last,
    /// Map of branch name → output.
    #[default]
    All,
    /// Majority-selected value.
    Vote,
}

crate::simple_display! {
    JoinStrategy {
        First => "first",
        Last => "last",
        All => "all",
        Vote => "vote",
    }
}

/// Configuration for a PARALLEL-JOIN node.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct JoinConfig {
    #[serde(default)]
    pub strategy: JoinStrategy,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_key: Option<String>,
}

/// Configuration for a HUMAN-REVIEW node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewConfig {
    pub instructions: String,
    /// Fields the reviewer must supply for input-type reviews.
    #[serde(default)]
    pub required_fields: Vec<String>,
    #[serde(default)]
    pub review_type: crate::checkpoint::ReviewType,
    #[serde(default)]
    pub urgency: crate::checkpoint::ReviewUrgency,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approve_branch: Option<NodeId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reject_branch: Option<NodeId>,
}

/// Configuration for a LOOP node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoopConfig {
    /// Loop-while expression over the workflow context.
    pub expr: String,
    /// Entry node of the loop body.
    pub body: NodeId,
    /// Node control continues with once the loop exits.
    pub exit: NodeId,
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
}

/// Configuration for a ROUTER node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouterConfig {
    /// Route label → target node.
    pub routes: IndexMap<String, NodeId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_route: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_key: Option<String>,
}

/// Configuration for a SUBFLOW node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubflowConfig {
    /// Name of the workflow template to instantiate.
    pub template: String,
    /// Parent context key → subflow context key.
    #[serde(default)]
    pub inputs: HashMap<String, String>,
    /// Subflow context key → parent context key.
    #[serde(default)]
    pub outputs: HashMap<String, String>,
    /// Seed the subflow with the full parent context.
    #[serde(default)]
    pub inherit_context: bool,
}

/// Configuration for a DIRECTOR node.
///
/// Runs like a TASK, but its output is a [`Decomposition`] appended to the
/// running workflow. The append is rejected if it would introduce a cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectorConfig {
    pub description: String,
    pub recommended_tool: String,
    #[serde(default)]
    pub privacy: PrivacyLevel,
    #[serde(default = "default_priority")]
    pub priority: u8,
    #[serde(default = "default_complexity")]
    pub complexity: u8,
}

/// Kind-specific node configuration. The node kind is derived from the
/// configuration variant so the two can never disagree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NodeConfig {
    Task(TaskConfig),
    Condition(ConditionConfig),
    ParallelSplit(SplitConfig),
    ParallelJoin(JoinConfig),
    HumanReview(ReviewConfig),
    Loop(LoopConfig),
    Router(RouterConfig),
    Subflow(SubflowConfig),
    Director(DirectorConfig),
}

impl NodeConfig {
    pub fn kind(&self) -> NodeKind {
        match self {
            Self::Task(_) => NodeKind::Task,
            Self::Condition(_) => NodeKind::Condition,
            Self::ParallelSplit(_) => NodeKind::ParallelSplit,
            Self::ParallelJoin(_) => NodeKind::ParallelJoin,
            Self::HumanReview(_) => NodeKind::HumanReview,
            Self::Loop(_) => NodeKind::Loop,
            Self::Router(_) => NodeKind::Router,
            Self::Subflow(_) => NodeKind::Subflow,
            Self::Director(_) => NodeKind::Director,
        }
    }
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    1_000
}

/// A single node of a workflow graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub workflow_id: WorkflowId,
    pub name: String,
    pub config: NodeConfig,
    pub status: NodeStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub retry_count: u32,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Base retry delay; attempt `n` waits `retry_delay_ms * (1 + n)`.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    pub created_at_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at_ms: Option<u64>,
}

impl Node {
    pub fn new(
        id: NodeId,
        workflow_id: WorkflowId,
        name: impl Into<String>,
        config: NodeConfig,
        clock: &impl Clock,
    ) -> Self {
        Self {
            id,
            workflow_id,
            name: name.into(),
            config,
            status: NodeStatus::Pending,
            input: None,
            output: None,
            error: None,
            retry_count: 0,
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            created_at_ms: clock.epoch_ms(),
            started_at_ms: None,
            completed_at_ms: None,
        }
    }

    pub fn kind(&self) -> NodeKind {
        self.config.kind()
    }

    pub fn can_retry(&self) -> bool {
        self.retry_count < self.max_retries
    }

    /// Context key this node's output is stored under.
    pub fn output_key(&self) -> &str {
        let key = match &self.config {
            NodeConfig::Task(c) => c.output_key.as_deref(),
            NodeConfig::Condition(c) => c.output_key.as_deref(),
            NodeConfig::ParallelJoin(c) => c.output_key.as_deref(),
            NodeConfig::Router(c) => c.output_key.as_deref(),
            _ => None,
        };
        key.unwrap_or(&self.name)
    }
}

/// A node to be appended to a running workflow, referenced by name
/// until it is materialized with a real id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSeed {
    pub name: String,
    #[serde(flatten)]
    pub config: NodeConfig,
}

/// An edge to be appended: endpoints name either a [`NodeSeed`] by name
/// or an existing node by id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeSeed {
    pub from: String,
    pub to: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

/// Output schema of a DIRECTOR node: nodes and edges appended to the
/// running workflow. The addition must keep the graph acyclic.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Decomposition {
    #[serde(default)]
    pub nodes: Vec<NodeSeed>,
    #[serde(default)]
    pub edges: Vec<EdgeSeed>,
}

#[cfg(test)]
#[path = "node_tests.rs"]
mod tests;
