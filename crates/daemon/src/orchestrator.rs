// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Boot wiring and workflow lifecycle entry points.
//!
//! Constructs the store pair, connection manager, allocator, reaper,
//! executor, and review coordinator, threads them together through
//! constructor injection, and runs one tokio task per active workflow.

use crate::allocator::{ScoringPolicy, TaskAllocator};
use crate::connection::{ConnEvent, ConnectionManager, FrameIngest, IngestDeps};
use crate::dispatch::DaemonDispatch;
use crate::env::Config;
use crate::hub::ResultHub;
use crate::reaper::{HeartbeatReaper, ReaperConfig};
use hive_core::{
    Clock, Edge, IdGen, Node, SubtaskStatus, UuidIdGen, Worker, WorkerId, Workflow, WorkflowId,
};
use hive_engine::{
    DagExecutor, DecisionRequest, ExecutionOutcome, ExecutorConfig, ExecutorDeps, EngineError,
    Notifier, ReviewCoordinator, StaticTemplateRegistry, RouteSelector, TemplateRegistry,
    TracingNotifier,
};
use hive_storage::{DurableStore, KvStore, StoreError};
use hive_wire::close_code;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Notify};
use tokio_util::sync::CancellationToken;

/// Optional collaborator overrides for [`Orchestrator::new`].
pub struct Collaborators {
    pub router: Arc<dyn RouteSelector>,
    pub templates: Arc<dyn TemplateRegistry>,
    pub notifier: Arc<dyn Notifier>,
    pub id_gen: Arc<dyn IdGen>,
}

impl Default for Collaborators {
    fn default() -> Self {
        Self {
            router: Arc::new(DefaultRouter),
            templates: Arc::new(StaticTemplateRegistry::new()),
            notifier: Arc::new(TracingNotifier),
            id_gen: Arc::new(UuidIdGen),
        }
    }
}

/// Fallback router when no LLM callback is wired: always asks for the
/// configured default route.
struct DefaultRouter;

#[async_trait::async_trait]
impl RouteSelector for DefaultRouter {
    async fn select(
        &self,
        _workflow: &WorkflowId,
        _context: &serde_json::Value,
        _routes: &[String],
    ) -> Result<String, hive_engine::DispatchError> {
        Err(hive_engine::DispatchError::RouterUnavailable("no router configured".to_string()))
    }
}

/// The assembled control plane.
pub struct Orchestrator<C: Clock + 'static> {
    config: Config,
    store: DurableStore,
    kv: KvStore<C>,
    conns: Arc<ConnectionManager<C>>,
    ingest: Arc<FrameIngest<C>>,
    allocator: Arc<TaskAllocator<C>>,
    reaper: Arc<HeartbeatReaper<DaemonDispatch<C>, C>>,
    executor: Arc<DagExecutor<DaemonDispatch<C>, C>>,
    reviews: Arc<ReviewCoordinator<DaemonDispatch<C>, C>>,
    dispatch: Arc<DaemonDispatch<C>>,
    shutdown: CancellationToken,
    events_rx: parking_lot::Mutex<Option<mpsc::Receiver<ConnEvent>>>,
}

impl<C: Clock + 'static> Orchestrator<C> {
    pub fn new(config: Config, clock: C, collaborators: Collaborators) -> Self {
        let store = DurableStore::new();
        let kv = KvStore::new(clock.clone());
        let hub = Arc::new(ResultHub::new());
        let allocator_kick = Arc::new(Notify::new());
        let (events_tx, events_rx) = mpsc::channel(256);

        let conns = Arc::new(ConnectionManager::new(
            store.clone(),
            kv.clone(),
            clock.clone(),
            events_tx,
            config.heartbeat_interval_ms,
        ));
        let ingest = Arc::new(FrameIngest::new(
            IngestDeps {
                store: store.clone(),
                kv: kv.clone(),
                hub: hub.clone(),
                conns: conns.clone(),
                allocator_kick: allocator_kick.clone(),
            },
            clock.clone(),
        ));
        let dispatch = Arc::new(DaemonDispatch::new(
            store.clone(),
            kv.clone(),
            hub.clone(),
            conns.clone(),
            allocator_kick.clone(),
        ));
        let allocator = Arc::new(TaskAllocator::new(
            store.clone(),
            kv.clone(),
            conns.clone(),
            clock.clone(),
            ScoringPolicy {
                tool_weight: config.tool_weight,
                resource_weight: config.resource_weight,
                privacy_weight: config.privacy_weight,
                min_score: config.min_score,
            },
            config.subtask_timeout_ms,
            allocator_kick.clone(),
        ));
        let executor = Arc::new(DagExecutor::new(
            ExecutorDeps {
                store: store.clone(),
                kv: kv.clone(),
                dispatch: dispatch.clone(),
                router: collaborators.router,
                templates: collaborators.templates,
                notifier: collaborators.notifier.clone(),
                id_gen: collaborators.id_gen,
            },
            clock.clone(),
            ExecutorConfig {
                max_parallel_branches: config.max_parallel_branches,
                default_subtask_timeout_ms: config.subtask_timeout_ms,
            },
        ));
        let reviews = Arc::new(ReviewCoordinator::new(
            store.clone(),
            kv.clone(),
            executor.clone(),
            collaborators.notifier.clone(),
            clock.clone(),
        ));
        let reaper = Arc::new(HeartbeatReaper::new(
            store.clone(),
            kv.clone(),
            conns.clone(),
            reviews.clone(),
            collaborators.notifier,
            allocator_kick,
            clock,
            ReaperConfig {
                interval_ms: config.reaper_interval_ms,
                stale_after_ms: config.stale_after_ms,
                dead_after_ms: config.dead_after_ms,
            },
        ));

        Self {
            config,
            store,
            kv,
            conns,
            ingest,
            allocator,
            reaper,
            executor,
            reviews,
            dispatch,
            shutdown: CancellationToken::new(),
            events_rx: parking_lot::Mutex::new(Some(events_rx)),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &DurableStore {
        &self.store
    }

    pub fn kv(&self) -> &KvStore<C> {
        &self.kv
    }

    pub fn connections(&self) -> &Arc<ConnectionManager<C>> {
        &self.conns
    }

    pub fn ingest(&self) -> &Arc<FrameIngest<C>> {
        &self.ingest
    }

    pub fn allocator(&self) -> &Arc<TaskAllocator<C>> {
        &self.allocator
    }

    pub fn executor(&self) -> &Arc<DagExecutor<DaemonDispatch<C>, C>> {
        &self.executor
    }

    pub fn reviews(&self) -> &Arc<ReviewCoordinator<DaemonDispatch<C>, C>> {
        &self.reviews
    }

    pub fn reaper(&self) -> &Arc<HeartbeatReaper<DaemonDispatch<C>, C>> {
        &self.reaper
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Spawn the background loops (allocator, reaper, liveness events).
    pub fn start(self: &Arc<Self>) {
        let allocator = self.allocator.clone();
        let cancel = self.shutdown.clone();
        let interval = Duration::from_millis(self.config.allocator_interval_ms.max(1));
        tokio::spawn(async move { allocator.run(cancel, interval).await });

        let reaper = self.reaper.clone();
        let cancel = self.shutdown.clone();
        tokio::spawn(async move { reaper.run(cancel).await });

        if let Some(mut events) = self.events_rx.lock().take() {
            let this = self.clone();
            let cancel = self.shutdown.clone();
            tokio::spawn(async move {
                loop {
                    let event = tokio::select! {
                        _ = cancel.cancelled() => break,
                        event = events.recv() => event,
                    };
                    match event {
                        Some(ConnEvent::Connected(worker)) => {
                            tracing::debug!(worker = %worker, "liveness: connected");
                            this.allocator.kick();
                        }
                        Some(ConnEvent::Disconnected(worker)) => {
                            // held subtasks stay with the worker until
                            // the reaper declares it dead
                            tracing::debug!(worker = %worker, "liveness: disconnected");
                        }
                        None => break,
                    }
                }
            });
        }
    }

    pub fn stop(&self) {
        self.shutdown.cancel();
    }

    // -- workflow lifecycle ---------------------------------------------

    /// Persist a workflow. Cycles are rejected here with nothing stored.
    pub fn create_workflow(
        &self,
        workflow: Workflow,
        nodes: Vec<Node>,
        edges: Vec<Edge>,
    ) -> Result<(), StoreError> {
        self.store.create_workflow(workflow, nodes, edges)
    }

    /// Run a workflow on its own tokio task.
    pub fn start_workflow(self: &Arc<Self>, id: WorkflowId) {
        let this = self.clone();
        tokio::spawn(async move {
            match this.executor.run(&id).await {
                Ok(outcome) => {
                    tracing::info!(workflow = %id, ?outcome, "workflow run returned")
                }
                Err(error) => {
                    tracing::error!(workflow = %id, %error, "workflow run errored")
                }
            }
        });
    }

    /// Run a workflow inline and return its outcome.
    pub async fn run_workflow(&self, id: &WorkflowId) -> Result<ExecutionOutcome, EngineError> {
        self.executor.run(id).await
    }

    pub fn pause_workflow(&self, id: &WorkflowId) {
        self.executor.pause(id);
    }

    /// Workflow-scope cancellation: every running subtask gets a
    /// cancel frame, paused reviews close as cancelled.
    pub async fn cancel_workflow(&self, id: &WorkflowId) -> Result<(), EngineError> {
        self.executor.cancel(id).await?;
        self.reviews.cancel_for_workflow(id);
        Ok(())
    }

    pub async fn submit_review(
        &self,
        checkpoint: &hive_core::CheckpointId,
        request: DecisionRequest,
    ) -> Result<ExecutionOutcome, EngineError> {
        self.reviews.submit_decision(checkpoint, request).await
    }

    // -- worker operations ----------------------------------------------

    /// Subtask-scope cancellation.
    pub async fn cancel_subtask(
        &self,
        id: &hive_core::SubtaskId,
        reason: &str,
    ) -> Result<(), EngineError> {
        use hive_engine::SubtaskDispatch;
        self.dispatch.cancel(id, reason).await?;
        let _ = self.store.rmw_subtask(id, |s| {
            if !s.is_terminal() {
                s.status = SubtaskStatus::Cancelled;
                s.assigned_worker = None;
            }
            Ok(())
        });
        Ok(())
    }

    /// Worker-scope cancellation (operator action): cancel its current
    /// work, mark it offline, close the channel.
    pub async fn cancel_worker(&self, worker: &WorkerId) -> Result<(), EngineError> {
        for subtask in self.store.subtasks_held_by(worker) {
            self.cancel_subtask(&subtask.id, "worker cancelled by operator").await?;
        }
        let _ = self.store.rmw_worker(worker, |w| {
            w.status = hive_core::WorkerStatus::Offline;
            Ok(())
        });
        self.kv.set_worker_status(worker, hive_core::WorkerStatus::Offline);
        self.conns.teardown(worker, close_code::NORMAL, "cancelled by operator").await;
        Ok(())
    }

    /// Operator delete: the only way a worker row disappears.
    pub async fn delete_worker(&self, worker: &WorkerId) -> Result<Worker, StoreError> {
        self.conns
            .teardown(worker, close_code::WORKER_DELETED, "worker-already-deleted")
            .await;
        self.kv.clear_worker_current_task(worker);
        self.store.delete_worker(worker)
    }
}

#[cfg(test)]
#[path = "orchestrator_tests.rs"]
mod tests;
