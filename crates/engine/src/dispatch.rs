// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Injected collaborator seams.
//!
//! The executor never talks to workers, LLM routers, template storage,
//! or notification transports directly; each is a constructor-injected
//! trait object so tests (and alternative deployments) swap them freely.

use async_trait::async_trait;
use hive_core::{
    CheckpointId, EdgeSeed, NodeSeed, Subtask, SubtaskId, WorkerId, WorkflowId, ReviewUrgency,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Errors crossing a collaborator seam.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DispatchError {
    /// The dispatcher lost track of the subtask (hub shut down).
    #[error("subtask channel closed")]
    ChannelClosed,

    /// The routing callback failed; the router node falls back to its
    /// default route.
    #[error("router unavailable: {0}")]
    RouterUnavailable(String),

    #[error("{0}")]
    Other(String),
}

/// Terminal observation of one subtask attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum SubtaskOutcome {
    Completed { output: serde_json::Value },
    Failed { error: String },
    Cancelled,
    /// Wall-clock budget elapsed before a terminal upload arrived.
    TimedOut,
}

/// Bridge from the executor to the allocation/worker stack.
///
/// At-least-once contract: `submit` may be called again for a subtask
/// that already ran (retry, resume); implementations re-queue pending
/// rows and re-attach to in-progress ones.
#[async_trait]
pub trait SubtaskDispatch: Send + Sync + 'static {
    /// Announce a ready subtask to the allocator.
    async fn submit(&self, subtask: &Subtask) -> Result<(), DispatchError>;

    /// Wait for the subtask to reach a terminal state, up to `timeout`.
    async fn await_result(
        &self,
        subtask: &SubtaskId,
        timeout: Duration,
    ) -> Result<SubtaskOutcome, DispatchError>;

    /// Request cancellation of an in-flight subtask.
    async fn cancel(&self, subtask: &SubtaskId, reason: &str) -> Result<(), DispatchError>;
}

/// LLM routing callback consulted by ROUTER nodes.
#[async_trait]
pub trait RouteSelector: Send + Sync {
    /// Pick one of `routes` given the workflow context.
    async fn select(
        &self,
        workflow: &WorkflowId,
        context: &serde_json::Value,
        routes: &[String],
    ) -> Result<String, DispatchError>;
}

/// A workflow template: nodes and edges by symbolic name, instantiated
/// with fresh ids per subflow execution.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowSpec {
    pub name: String,
    pub nodes: Vec<NodeSeed>,
    pub edges: Vec<EdgeSeed>,
}

/// Source of subflow templates. Registered at boot; a SUBFLOW node
/// referencing an unknown template fails (no silent skip).
pub trait TemplateRegistry: Send + Sync {
    fn load(&self, template: &str) -> Option<WorkflowSpec>;
}

/// In-memory template registry populated at boot.
#[derive(Default)]
pub struct StaticTemplateRegistry {
    templates: Mutex<HashMap<String, WorkflowSpec>>,
}

impl StaticTemplateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, spec: WorkflowSpec) {
        self.templates.lock().insert(spec.name.clone(), spec);
    }
}

impl TemplateRegistry for StaticTemplateRegistry {
    fn load(&self, template: &str) -> Option<WorkflowSpec> {
        self.templates.lock().get(template).cloned()
    }
}

/// Events surfaced to the notification seam. Transports (email,
/// webhook, desktop) live outside the core.
#[derive(Debug, Clone, PartialEq)]
pub enum NotifyEvent {
    ReviewRequested {
        checkpoint: CheckpointId,
        workflow: WorkflowId,
        urgency: ReviewUrgency,
    },
    ReviewExpired {
        checkpoint: CheckpointId,
        workflow: WorkflowId,
    },
    WorkflowFinished {
        workflow: WorkflowId,
        status: String,
    },
    WorkerOffline {
        worker: WorkerId,
    },
}

/// Notification sink.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, event: NotifyEvent);
}

/// Default notifier: structured log lines only.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

#[async_trait]
impl Notifier for TracingNotifier {
    async fn notify(&self, event: NotifyEvent) {
        tracing::info!(?event, "notification");
    }
}

/// Shared handle alias used throughout the engine.
pub type SharedNotifier = Arc<dyn Notifier>;
