// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::test_support::{condition_node, task_node};

#[test]
fn kind_derives_from_config() {
    let node = task_node("wf-1", "a", "claude_code");
    assert_eq!(node.kind(), NodeKind::Task);
    let node = condition_node("wf-1", "c", "x > 10");
    assert_eq!(node.kind(), NodeKind::Condition);
}

#[yare::parameterized(
    pending = { NodeStatus::Pending, false, false },
    ready = { NodeStatus::Ready, false, false },
    running = { NodeStatus::Running, false, false },
    waiting = { NodeStatus::Waiting, false, false },
    completed = { NodeStatus::Completed, true, true },
    failed = { NodeStatus::Failed, true, false },
    skipped = { NodeStatus::Skipped, true, true },
)]
fn status_classification(status: NodeStatus, terminal: bool, satisfies: bool) {
    assert_eq!(status.is_terminal(), terminal);
    assert_eq!(status.satisfies_dependents(), satisfies);
}

#[test]
fn retry_budget() {
    let mut node = task_node("wf-1", "a", "claude_code");
    assert!(node.can_retry());
    node.retry_count = node.max_retries;
    assert!(!node.can_retry());
}

#[test]
fn output_key_defaults_to_node_name() {
    let node = task_node("wf-1", "build", "claude_code");
    assert_eq!(node.output_key(), "build");

    let mut node = task_node("wf-1", "build", "claude_code");
    if let NodeConfig::Task(config) = &mut node.config {
        config.output_key = Some("artifact".to_string());
    }
    assert_eq!(node.output_key(), "artifact");
}

#[test]
fn config_serde_round_trip() {
    let node = task_node("wf-1", "a", "claude_code");
    let json = serde_json::to_string(&node).unwrap();
    assert!(json.contains("\"kind\":\"task\""));
    let parsed: Node = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, node);
}

#[test]
fn decomposition_parses_from_director_output() {
    let raw = serde_json::json!({
        "nodes": [
            {"name": "lint", "kind": "task", "description": "lint it", "recommended_tool": "claude_code"}
        ],
        "edges": [
            {"from": "node-director", "to": "lint"}
        ]
    });
    let decomposition: Decomposition = serde_json::from_value(raw).unwrap();
    assert_eq!(decomposition.nodes.len(), 1);
    assert_eq!(decomposition.nodes[0].name, "lint");
    assert_eq!(decomposition.edges[0].to, "lint");
}
