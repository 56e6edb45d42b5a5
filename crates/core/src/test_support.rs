// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Test builders and helpers shared across the workspace's tests.

use crate::checkpoint::Checkpoint;
use crate::clock::FakeClock;
use crate::edge::Edge;
use crate::id::{CheckpointId, EdgeId, NodeId, SubtaskId, WorkerId, WorkflowId};
use crate::node::{
    ConditionConfig, JoinConfig, JoinStrategy, LoopConfig, Node, NodeConfig, ReviewConfig,
    RouterConfig, SplitConfig, SubflowConfig, TaskConfig,
};
use crate::subtask::{PrivacyLevel, Subtask};
use crate::worker::{ResourceMetrics, Worker, WorkerStatus};
use crate::workflow::{Workflow, WorkflowType};

/// A workflow with sensible test defaults.
pub fn workflow(id: &str) -> Workflow {
    Workflow::new(
        WorkflowId::new(id),
        "owner-1",
        format!("{id}-name"),
        WorkflowType::Graph,
        &FakeClock::new(),
    )
}

/// A TASK node with the given recommended tool.
pub fn task_node(workflow: &str, id: &str, tool: &str) -> Node {
    Node::new(
        NodeId::new(id),
        WorkflowId::new(workflow),
        id,
        NodeConfig::Task(TaskConfig {
            description: format!("run {id}"),
            recommended_tool: tool.to_string(),
            require_exact_tool: false,
            privacy: PrivacyLevel::Normal,
            priority: 5,
            complexity: 3,
            output_key: None,
            timeout_ms: None,
            context_keys: Vec::new(),
        }),
        &FakeClock::new(),
    )
}

/// A CONDITION node evaluating `expr`.
pub fn condition_node(workflow: &str, id: &str, expr: &str) -> Node {
    Node::new(
        NodeId::new(id),
        WorkflowId::new(workflow),
        id,
        NodeConfig::Condition(ConditionConfig { expr: expr.to_string(), output_key: None }),
        &FakeClock::new(),
    )
}

/// A PARALLEL-SPLIT node with the given branches and join.
pub fn split_node(workflow: &str, id: &str, branches: &[&str], join: &str) -> Node {
    Node::new(
        NodeId::new(id),
        WorkflowId::new(workflow),
        id,
        NodeConfig::ParallelSplit(SplitConfig {
            branches: branches.iter().map(|b| NodeId::new(*b)).collect(),
            join: NodeId::new(join),
            fail_fast: false,
        }),
        &FakeClock::new(),
    )
}

/// A PARALLEL-JOIN node with the given merge strategy.
pub fn join_node(workflow: &str, id: &str, strategy: JoinStrategy) -> Node {
    Node::new(
        NodeId::new(id),
        WorkflowId::new(workflow),
        id,
        NodeConfig::ParallelJoin(JoinConfig { strategy, output_key: None }),
        &FakeClock::new(),
    )
}

/// A HUMAN-REVIEW node with approve/reject branches.
pub fn review_node(workflow: &str, id: &str, approve: Option<&str>, reject: Option<&str>) -> Node {
    Node::new(
        NodeId::new(id),
        WorkflowId::new(workflow),
        id,
        NodeConfig::HumanReview(ReviewConfig {
            instructions: format!("review {id}"),
            required_fields: Vec::new(),
            review_type: crate::checkpoint::ReviewType::Approval,
            urgency: crate::checkpoint::ReviewUrgency::Normal,
            timeout_ms: None,
            approve_branch: approve.map(NodeId::new),
            reject_branch: reject.map(NodeId::new),
        }),
        &FakeClock::new(),
    )
}

/// A LOOP node with body/exit targets.
pub fn loop_node(workflow: &str, id: &str, expr: &str, body: &str, exit: &str) -> Node {
    Node::new(
        NodeId::new(id),
        WorkflowId::new(workflow),
        id,
        NodeConfig::Loop(LoopConfig {
            expr: expr.to_string(),
            body: NodeId::new(body),
            exit: NodeId::new(exit),
            max_iterations: 100,
        }),
        &FakeClock::new(),
    )
}

/// A ROUTER node with labeled routes.
pub fn router_node(
    workflow: &str,
    id: &str,
    routes: &[(&str, &str)],
    default_route: Option<&str>,
) -> Node {
    Node::new(
        NodeId::new(id),
        WorkflowId::new(workflow),
        id,
        NodeConfig::Router(RouterConfig {
            routes: routes
                .iter()
                .map(|(label, target)| (label.to_string(), NodeId::new(*target)))
                .collect(),
            default_route: default_route.map(str::to_string),
            output_key: None,
        }),
        &FakeClock::new(),
    )
}

/// A SUBFLOW node referencing a template.
pub fn subflow_node(workflow: &str, id: &str, template: &str) -> Node {
    Node::new(
        NodeId::new(id),
        WorkflowId::new(workflow),
        id,
        NodeConfig::Subflow(SubflowConfig {
            template: template.to_string(),
            inputs: Default::default(),
            outputs: Default::default(),
            inherit_context: false,
        }),
        &FakeClock::new(),
    )
}

/// An edge between two nodes of a workflow.
pub fn edge(workflow: &str, from: &str, to: &str) -> Edge {
    Edge::new(
        EdgeId::new(format!("{from}->{to}")),
        WorkflowId::new(workflow),
        NodeId::new(from),
        NodeId::new(to),
    )
}

/// A labeled edge (condition/review branches).
pub fn labeled_edge(workflow: &str, from: &str, to: &str, label: &str) -> Edge {
    edge(workflow, from, to).labeled(label)
}

/// Builder for subtasks in tests.
pub struct SubtaskBuilder {
    subtask: Subtask,
}

impl SubtaskBuilder {
    pub fn new(id: &str) -> Self {
        Self {
            subtask: Subtask::new(
                SubtaskId::new(id),
                WorkflowId::new("wf-1"),
                NodeId::new(format!("node-{id}")),
                id,
                format!("do {id}"),
                "claude_code",
                &FakeClock::new(),
            ),
        }
    }

    pub fn workflow(mut self, id: &str) -> Self {
        self.subtask.workflow_id = WorkflowId::new(id);
        self
    }

    pub fn tool(mut self, tool: &str) -> Self {
        self.subtask.recommended_tool = tool.to_string();
        self
    }

    pub fn priority(mut self, priority: u8) -> Self {
        self.subtask.priority = priority;
        self
    }

    pub fn privacy(mut self, privacy: PrivacyLevel) -> Self {
        self.subtask.privacy = privacy;
        self
    }

    pub fn depends_on(mut self, ids: &[&str]) -> Self {
        self.subtask.dependencies = ids.iter().map(|id| SubtaskId::new(*id)).collect();
        self
    }

    pub fn created_at_ms(mut self, at: u64) -> Self {
        self.subtask.created_at_ms = at;
        self
    }

    pub fn build(self) -> Subtask {
        self.subtask
    }
}

/// Builder for workers in tests.
pub struct WorkerBuilder {
    worker: Worker,
}

impl WorkerBuilder {
    pub fn new(id: &str) -> Self {
        let mut worker = Worker::new(
            WorkerId::new(id),
            format!("machine-{id}"),
            format!("Machine {id}"),
            "hash",
            &FakeClock::new(),
        );
        worker.status = WorkerStatus::Idle;
        worker.tools = vec!["claude_code".to_string()];
        Self { worker }
    }

    pub fn tools(mut self, tools: &[&str]) -> Self {
        self.worker.tools = tools.iter().map(|t| t.to_string()).collect();
        self
    }

    pub fn status(mut self, status: WorkerStatus) -> Self {
        self.worker.status = status;
        self
    }

    pub fn metrics(mut self, cpu: f64, memory: f64, disk: f64) -> Self {
        self.worker.metrics = Some(ResourceMetrics {
            cpu_percent: cpu,
            memory_percent: memory,
            disk_percent: disk,
        });
        self
    }

    pub fn heartbeat_at_ms(mut self, at: u64) -> Self {
        self.worker.last_heartbeat_ms = at;
        self
    }

    pub fn build(self) -> Worker {
        self.worker
    }
}

/// A pending checkpoint for tests.
pub fn checkpoint(id: &str, workflow: &str, node: &str) -> Checkpoint {
    Checkpoint::new(
        CheckpointId::new(id),
        WorkflowId::new(workflow),
        NodeId::new(node),
        format!("review {node}"),
        &FakeClock::new(),
    )
}
