// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[yare::parameterized(
    cycle = { CoreError::CycleDetected { witness: vec![] }, "cycle-detected", false },
    timeout = { CoreError::SubtaskTimeout { subtask: "st-1".into(), timeout_ms: 10 }, "subtask-timeout", true },
    undelivered = { CoreError::AssignmentUndelivered { subtask: "st-1".into(), worker: "wk-1".into() }, "assignment-undelivered", true },
    stale = { CoreError::StaleVersion { entity: "subtask".into(), id: "st-1".into() }, "stale-version", true },
    node_failed = { CoreError::NodeExecutionFailed { node: "n".into(), message: "boom".into() }, "node-execution-failed", false },
    cancelled = { CoreError::WorkflowCancelled, "workflow-cancelled", false },
)]
fn kind_codes_and_transience(err: CoreError, kind: &str, transient: bool) {
    assert_eq!(err.kind(), kind);
    assert_eq!(err.is_transient(), transient);
}

#[test]
fn serde_carries_kind_tag() {
    let err = CoreError::WorkflowPaused { node: "node-h".to_string() };
    let json = serde_json::to_value(&err).unwrap();
    assert_eq!(json["kind"], "workflow-paused");
    assert_eq!(json["node"], "node-h");

    let parsed: CoreError = serde_json::from_value(json).unwrap();
    assert_eq!(parsed, err);
}

#[test]
fn graph_error_maps_into_taxonomy() {
    let err: CoreError =
        GraphError::CycleDetected { witness: vec!["a".into(), "b".into()] }.into();
    assert_eq!(err.kind(), "cycle-detected");

    let err: CoreError = GraphError::UnknownNode("ghost".into()).into();
    assert_eq!(err.kind(), "invalid-graph");
}
