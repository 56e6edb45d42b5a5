// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! hive-engine: the DAG workflow executor and review coordinator.
//!
//! Drives a workflow from its first node to a terminal state, obeying
//! node-kind semantics (tasks, conditions, parallel forks/joins, human
//! review, loops, routers, subflows, directors). Worker I/O happens
//! behind the [`SubtaskDispatch`] seam implemented by the daemon.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod condition;
mod dispatch;
mod error;
mod evaluate;
mod executor;
mod join;
mod review;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use condition::eval_condition;
pub use dispatch::{
    DispatchError, NotifyEvent, Notifier, RouteSelector, StaticTemplateRegistry, SubtaskDispatch,
    SubtaskOutcome, TemplateRegistry, TracingNotifier, WorkflowSpec,
};
pub use error::EngineError;
pub use evaluate::{EvaluationPolicy, Evaluator, EvaluatorRegistry, QualityGate};
pub use executor::{DagExecutor, ExecutionOutcome, ExecutorConfig, ExecutorDeps};
pub use review::{DecisionRequest, ReviewCoordinator};
