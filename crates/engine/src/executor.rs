// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The DAG workflow executor.
//!
//! One `run` drives one workflow. Bookkeeping (in-degrees, ready queue,
//! join membership, loop counters) is reconstructed from persisted node
//! statuses on every entry, so pause/resume and crash recovery fall out
//! of the same path. Suspension happens in exactly four places: awaiting
//! a subtask result, awaiting a parallel join, awaiting a human-review
//! decision, and between retry attempts. Cancellation is observed at
//! every iteration boundary and wakes any pending await.

use crate::condition::eval_condition;
use crate::dispatch::{
    Notifier, NotifyEvent, RouteSelector, SubtaskDispatch, SubtaskOutcome, TemplateRegistry,
};
use crate::error::EngineError;
use crate::join::{merge, BranchResult};
use futures_util::future::BoxFuture;
use futures_util::stream::{FuturesUnordered, StreamExt};
use hive_core::{
    Checkpoint, CheckpointId, CheckpointStatus, Clock, Context, CoreError, DecisionKind,
    Decomposition, Edge, EdgeId, IdGen, LoopConfig, Node, NodeConfig, NodeId, NodeKind,
    NodeStatus, ReviewConfig, RouterConfig, SplitConfig, Subtask, SubtaskId, SubtaskStatus,
    TaskConfig, Workflow, WorkflowGraph, WorkflowId, WorkflowStatus,
};
use hive_storage::{DurableStore, KvStore, StoreError};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Notify, Semaphore};

/// Reserved context key holding per-loop iteration counters.
const LOOPS_KEY: &str = "_loops";

/// Executor limits and defaults.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Concurrent branch executions per workflow.
    pub max_parallel_branches: usize,
    /// Wall-clock budget per subtask when the node does not override it.
    pub default_subtask_timeout_ms: u64,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self { max_parallel_branches: 10, default_subtask_timeout_ms: 3_600_000 }
    }
}

/// Constructor-injected collaborators (no process-globals).
pub struct ExecutorDeps<D, C: Clock> {
    pub store: DurableStore,
    pub kv: KvStore<C>,
    pub dispatch: Arc<D>,
    pub router: Arc<dyn RouteSelector>,
    pub templates: Arc<dyn TemplateRegistry>,
    pub notifier: Arc<dyn Notifier>,
    pub id_gen: Arc<dyn IdGen>,
}

/// How a `run` ended.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionOutcome {
    Completed,
    Failed { error: CoreError },
    Cancelled,
    /// Waiting on a human-review decision (or an explicit pause).
    Paused { node: Option<NodeId> },
}

#[derive(Default)]
struct ControlFlags {
    cancel: bool,
    pause: bool,
}

/// Per-workflow cancel/pause flags plus a wakeup for pending awaits.
struct ControlHandle {
    flags: Mutex<ControlFlags>,
    changed: Notify,
}

impl ControlHandle {
    fn new() -> Self {
        Self { flags: Mutex::new(ControlFlags::default()), changed: Notify::new() }
    }

    fn cancelled(&self) -> bool {
        self.flags.lock().cancel
    }

    fn paused(&self) -> bool {
        self.flags.lock().pause
    }
}

/// Join membership of a branch entry node.
#[derive(Debug, Clone)]
struct JoinMembership {
    join: NodeId,
    fail_fast: bool,
}

/// Per-run bookkeeping, reconstructed from node statuses.
struct RunState {
    in_degree: HashMap<NodeId, usize>,
    ready: VecDeque<NodeId>,
    enqueued: HashSet<NodeId>,
    discharged: HashSet<NodeId>,
    branch_of: HashMap<NodeId, JoinMembership>,
    join_branches: HashMap<NodeId, Vec<NodeId>>,
    completion_order: Vec<NodeId>,
    loop_iterations: HashMap<NodeId, u32>,
}

impl RunState {
    fn build(graph: &WorkflowGraph, context: &Context) -> Self {
        let mut branch_of = HashMap::new();
        let mut join_branches = HashMap::new();
        for node in graph.nodes() {
            if let NodeConfig::ParallelSplit(split) = &node.config {
                for branch in &split.branches {
                    branch_of.insert(
                        branch.clone(),
                        JoinMembership { join: split.join.clone(), fail_fast: split.fail_fast },
                    );
                }
                join_branches.insert(split.join.clone(), split.branches.clone());
            }
        }

        let mut in_degree: HashMap<NodeId, usize> =
            graph.node_ids().map(|id| (id.clone(), 0)).collect();
        let mut discharged = HashSet::new();
        for node in graph.nodes() {
            if node.status.is_terminal() {
                discharged.insert(node.id.clone());
            }
        }
        for edge in graph.edges().iter().filter(|e| !e.back_edge) {
            if !discharged.contains(&edge.from) {
                if let Some(d) = in_degree.get_mut(&edge.to) {
                    *d += 1;
                }
            }
        }

        let mut ready = VecDeque::new();
        let mut enqueued = HashSet::new();
        let order = graph.topo_order().unwrap_or_else(|_| graph.node_ids().cloned().collect());
        for id in &order {
            let Some(node) = graph.node(id) else { continue };
            let runnable = matches!(
                node.status,
                NodeStatus::Pending | NodeStatus::Ready | NodeStatus::Running
            );
            if runnable && in_degree.get(id).copied() == Some(0) {
                ready.push_back(id.clone());
                enqueued.insert(id.clone());
            }
        }

        let loop_iterations = context
            .get(LOOPS_KEY)
            .and_then(|v| v.as_object())
            .map(|counters| {
                counters
                    .iter()
                    .filter_map(|(k, v)| v.as_u64().map(|n| (NodeId::new(k.clone()), n as u32)))
                    .collect()
            })
            .unwrap_or_default();

        Self {
            in_degree,
            ready,
            enqueued,
            discharged,
            branch_of,
            join_branches,
            completion_order: Vec::new(),
            loop_iterations,
        }
    }

    /// Enqueue if the node can still run and is not already queued.
    fn enqueue(&mut self, graph: &WorkflowGraph, id: &NodeId) {
        let Some(node) = graph.node(id) else { return };
        let runnable = matches!(
            node.status,
            NodeStatus::Pending | NodeStatus::Ready | NodeStatus::Running
        );
        if runnable && !self.enqueued.contains(id) {
            self.ready.push_back(id.clone());
            self.enqueued.insert(id.clone());
        }
    }
}

/// Result of one task-like inflight future.
type TaskReturn = (NodeId, Result<Value, CoreError>);

/// The per-workflow state machine driver.
pub struct DagExecutor<D, C>
where
    D: SubtaskDispatch,
    C: Clock,
{
    store: DurableStore,
    kv: KvStore<C>,
    dispatch: Arc<D>,
    router: Arc<dyn RouteSelector>,
    templates: Arc<dyn TemplateRegistry>,
    notifier: Arc<dyn Notifier>,
    id_gen: Arc<dyn IdGen>,
    clock: C,
    config: ExecutorConfig,
    controls: Mutex<HashMap<WorkflowId, Arc<ControlHandle>>>,
}

impl<D, C> DagExecutor<D, C>
where
    D: SubtaskDispatch,
    C: Clock + 'static,
{
    pub fn new(deps: ExecutorDeps<D, C>, clock: C, config: ExecutorConfig) -> Self {
        Self {
            store: deps.store,
            kv: deps.kv,
            dispatch: deps.dispatch,
            router: deps.router,
            templates: deps.templates,
            notifier: deps.notifier,
            id_gen: deps.id_gen,
            clock,
            config,
            controls: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &DurableStore {
        &self.store
    }

    fn control(&self, id: &WorkflowId) -> Arc<ControlHandle> {
        self.controls
            .lock()
            .entry(id.clone())
            .or_insert_with(|| Arc::new(ControlHandle::new()))
            .clone()
    }

    /// Request a pause; observed at the next iteration boundary.
    pub fn pause(&self, id: &WorkflowId) {
        let control = self.control(id);
        control.flags.lock().pause = true;
        control.changed.notify_waiters();
    }

    /// Request cancellation. A running workflow observes the flag within
    /// one tick; a workflow with no active run is finalized here.
    pub async fn cancel(&self, id: &WorkflowId) -> Result<(), EngineError> {
        let control = self.control(id);
        control.flags.lock().cancel = true;
        control.changed.notify_waiters();

        if let Some(workflow) = self.store.workflow(id) {
            if matches!(
                workflow.status,
                WorkflowStatus::Draft
                    | WorkflowStatus::Pending
                    | WorkflowStatus::Paused
            ) {
                self.finalize_cancelled(id).await?;
            }
        }
        Ok(())
    }

    /// Execute the workflow until terminal or paused.
    pub async fn run(&self, id: &WorkflowId) -> Result<ExecutionOutcome, EngineError> {
        self.run_dyn(id.clone()).await
    }

    /// Boxed entry used for subflow recursion.
    fn run_dyn(&self, id: WorkflowId) -> BoxFuture<'_, Result<ExecutionOutcome, EngineError>> {
        Box::pin(self.run_inner(id))
    }

    async fn run_inner(&self, id: WorkflowId) -> Result<ExecutionOutcome, EngineError> {
        let workflow = self
            .store
            .workflow(&id)
            .ok_or_else(|| StoreError::not_found("workflow", &id))?;

        // terminal states are sinks; a workflow is executed exactly once
        match workflow.status {
            WorkflowStatus::Completed => return Ok(ExecutionOutcome::Completed),
            WorkflowStatus::Cancelled => return Ok(ExecutionOutcome::Cancelled),
            WorkflowStatus::Failed => {
                return Ok(ExecutionOutcome::Failed {
                    error: CoreError::NodeExecutionFailed {
                        node: String::new(),
                        message: workflow.error.unwrap_or_else(|| "workflow failed".to_string()),
                    },
                })
            }
            _ => {}
        }

        let control = self.control(&id);
        control.flags.lock().pause = false;

        let now = self.clock.epoch_ms();
        self.store.modify_workflow(&id, |wf| {
            wf.status = WorkflowStatus::Running;
            if wf.started_at_ms.is_none() {
                wf.started_at_ms = Some(now);
            }
        })?;

        let mut graph = match self.store.graph(&id) {
            Ok(graph) => graph,
            Err(StoreError::Invalid(core)) => {
                return self.finalize_failed(&id, core).await;
            }
            Err(other) => return Err(other.into()),
        };
        if let Err(graph_err) = graph.topo_order() {
            return self.finalize_failed(&id, CoreError::from(graph_err)).await;
        }

        let mut run = RunState::build(&graph, &workflow.context);
        let semaphore = Arc::new(Semaphore::new(self.config.max_parallel_branches.max(1)));
        let mut inflight: FuturesUnordered<BoxFuture<'_, TaskReturn>> = FuturesUnordered::new();

        tracing::info!(workflow = %id, nodes = graph.len(), "workflow run started");

        loop {
            if control.cancelled() {
                drop(inflight);
                self.finalize_cancelled(&id).await?;
                return Ok(ExecutionOutcome::Cancelled);
            }
            if control.paused() {
                drop(inflight);
                self.store.modify_workflow(&id, |wf| wf.status = WorkflowStatus::Paused)?;
                tracing::info!(workflow = %id, "workflow paused");
                return Ok(ExecutionOutcome::Paused { node: None });
            }

            if let Some(node_id) = run.ready.pop_front() {
                run.enqueued.remove(&node_id);
                let Some(node) = graph.node(&node_id).cloned() else { continue };
                if node.status.is_terminal() {
                    continue;
                }
                tracing::debug!(workflow = %id, node = %node_id, kind = %node.kind(), "node ready");

                match node.kind() {
                    NodeKind::Task | NodeKind::Director | NodeKind::Subflow => {
                        self.mark_running(&mut graph, &node_id)?;
                        let fut = self.spawn_task_future(&id, node, semaphore.clone());
                        inflight.push(fut);
                    }
                    NodeKind::Condition => {
                        self.handle_condition(&id, &mut run, &mut graph, &node)?;
                    }
                    NodeKind::ParallelSplit => {
                        self.complete_node(&id, &mut run, &mut graph, &node_id, Value::Null)?;
                    }
                    NodeKind::ParallelJoin => {
                        if let Some(error) =
                            self.handle_join(&id, &mut run, &mut graph, &node)?
                        {
                            drop(inflight);
                            return self.finalize_failed(&id, error).await;
                        }
                    }
                    NodeKind::Loop => {
                        self.handle_loop(&id, &mut run, &mut graph, &node)?;
                    }
                    NodeKind::Router => {
                        if let Some(error) =
                            self.handle_router(&id, &mut run, &mut graph, &node).await?
                        {
                            drop(inflight);
                            return self.finalize_failed(&id, error).await;
                        }
                    }
                    NodeKind::HumanReview => {
                        drop(inflight);
                        return self.handle_review(&id, &node).await;
                    }
                }
                continue;
            }

            if !inflight.is_empty() {
                let finished: Option<TaskReturn> = tokio::select! {
                    next = inflight.next() => next,
                    _ = control.changed.notified() => None,
                };
                let Some((node_id, result)) = finished else { continue };
                match result {
                    Ok(output) => {
                        let Some(node) = graph.node(&node_id).cloned() else { continue };
                        if node.kind() == NodeKind::Director {
                            if let Err(error) =
                                self.apply_decomposition(&id, &mut run, &mut graph, &node, &output)
                            {
                                self.mark_failed(&mut graph, &node_id, &error)?;
                                drop(inflight);
                                return self.finalize_failed(&id, error).await;
                            }
                        }
                        self.complete_node(&id, &mut run, &mut graph, &node_id, output)?;
                    }
                    Err(error) => {
                        if let Some(fatal) =
                            self.fail_node(&mut run, &mut graph, &node_id, error)?
                        {
                            drop(inflight);
                            return self.finalize_failed(&id, fatal).await;
                        }
                    }
                }
                continue;
            }

            break;
        }

        // nothing ready, nothing in flight: success iff every node is
        // discharged
        let stuck: Vec<String> = graph
            .nodes()
            .filter(|n| !n.status.is_terminal())
            .map(|n| n.id.to_string())
            .collect();
        if stuck.is_empty() {
            let now = self.clock.epoch_ms();
            self.store.modify_workflow(&id, |wf| {
                wf.status = WorkflowStatus::Completed;
                wf.completed_at_ms = Some(now);
            })?;
            self.notifier
                .notify(NotifyEvent::WorkflowFinished {
                    workflow: id.clone(),
                    status: WorkflowStatus::Completed.to_string(),
                })
                .await;
            tracing::info!(workflow = %id, "workflow completed");
            Ok(ExecutionOutcome::Completed)
        } else {
            let error = CoreError::InvalidGraph {
                message: format!("unreachable nodes: {}", stuck.join(", ")),
            };
            self.finalize_failed(&id, error).await
        }
    }

    // -- node bookkeeping ------------------------------------------------

    fn mark_running(&self, graph: &mut WorkflowGraph, id: &NodeId) -> Result<(), EngineError> {
        let now = self.clock.epoch_ms();
        let updated = self.store.modify_node(id, |n| {
            n.status = NodeStatus::Running;
            if n.started_at_ms.is_none() {
                n.started_at_ms = Some(now);
            }
        })?;
        if let Some(node) = graph.node_mut(id) {
            *node = updated;
        }
        Ok(())
    }

    fn mark_failed(
        &self,
        graph: &mut WorkflowGraph,
        id: &NodeId,
        error: &CoreError,
    ) -> Result<(), EngineError> {
        let now = self.clock.epoch_ms();
        let updated = self.store.modify_node(id, |n| {
            n.status = NodeStatus::Failed;
            n.error = Some(error.to_string());
            n.completed_at_ms = Some(now);
        })?;
        if let Some(node) = graph.node_mut(id) {
            *node = updated;
        }
        Ok(())
    }

    /// Mark a node completed, store its output in the node row and the
    /// workflow context, and release its successors.
    fn complete_node(
        &self,
        workflow: &WorkflowId,
        run: &mut RunState,
        graph: &mut WorkflowGraph,
        id: &NodeId,
        output: Value,
    ) -> Result<(), EngineError> {
        let now = self.clock.epoch_ms();
        let updated = self.store.modify_node(id, |n| {
            n.status = NodeStatus::Completed;
            n.output = Some(output.clone());
            n.completed_at_ms = Some(now);
        })?;
        let output_key = updated.output_key().to_string();
        if let Some(node) = graph.node_mut(id) {
            *node = updated;
        }
        self.store.modify_workflow(workflow, |wf| {
            wf.completed_nodes += 1;
            if !output.is_null() {
                wf.context.insert(output_key, output.clone());
            }
        })?;
        run.completion_order.push(id.clone());
        self.discharge(run, graph, id);
        Ok(())
    }

    /// Decrement successors after a node reached a terminal state;
    /// re-arm loop heads via back-edges.
    fn discharge(&self, run: &mut RunState, graph: &WorkflowGraph, id: &NodeId) {
        if !run.discharged.insert(id.clone()) {
            return;
        }
        for target in graph.successors(id) {
            if let Some(d) = run.in_degree.get_mut(&target) {
                *d = d.saturating_sub(1);
                if *d == 0 {
                    run.enqueue(graph, &target);
                }
            }
        }
        let back_targets: Vec<NodeId> =
            graph.back_edges_from(id).map(|e| e.to.clone()).collect();
        for target in back_targets {
            run.enqueue(graph, &target);
        }
    }

    /// Node failure: tolerated inside a non-fail-fast join, fatal
    /// otherwise. Returns the workflow-fatal error if any.
    fn fail_node(
        &self,
        run: &mut RunState,
        graph: &mut WorkflowGraph,
        id: &NodeId,
        error: CoreError,
    ) -> Result<Option<CoreError>, EngineError> {
        self.mark_failed(graph, id, &error)?;
        match run.branch_of.get(id) {
            Some(membership) if !membership.fail_fast => {
                tracing::warn!(node = %id, join = %membership.join, error = %error,
                    "branch failed; join tolerates");
                run.completion_order.push(id.clone());
                self.discharge(run, graph, id);
                Ok(None)
            }
            _ => Ok(Some(error)),
        }
    }

    /// Fixpoint skip propagation: a pending node is skipped when every
    /// incoming forward edge is a losing edge or comes from a skipped
    /// node (transitively, until a join with live inputs or the sink).
    fn propagate_skips(
        &self,
        workflow: &WorkflowId,
        run: &mut RunState,
        graph: &mut WorkflowGraph,
        losing_edges: &HashSet<EdgeId>,
    ) -> Result<(), EngineError> {
        let skipped = compute_skips(graph, losing_edges);
        let now = self.clock.epoch_ms();
        for id in &skipped {
            let updated = self.store.modify_node(id, |n| {
                n.status = NodeStatus::Skipped;
                n.completed_at_ms = Some(now);
            })?;
            if let Some(node) = graph.node_mut(id) {
                *node = updated;
            }
        }
        if !skipped.is_empty() {
            self.store.modify_workflow(workflow, |wf| {
                wf.completed_nodes += skipped.len() as u32;
            })?;
        }
        for id in &skipped {
            self.discharge(run, graph, id);
        }
        Ok(())
    }

    // -- per-kind handlers ----------------------------------------------

    fn handle_condition(
        &self,
        workflow: &WorkflowId,
        run: &mut RunState,
        graph: &mut WorkflowGraph,
        node: &Node,
    ) -> Result<(), EngineError> {
        let NodeConfig::Condition(config) = &node.config else {
            return Ok(());
        };
        let context = self
            .store
            .workflow(workflow)
            .map(|wf| wf.context)
            .unwrap_or_default();
        let result = eval_condition(&config.expr, &context).unwrap_or(false);
        let label = if result { "true" } else { "false" };
        tracing::debug!(node = %node.id, expr = %config.expr, label, "condition evaluated");

        let losing: HashSet<EdgeId> = graph
            .edges_from(&node.id)
            .filter(|e| e.label.as_deref().is_some_and(|l| l != label))
            .map(|e| e.id.clone())
            .collect();
        self.propagate_skips(workflow, run, graph, &losing)?;
        self.complete_node(
            workflow,
            run,
            graph,
            &node.id,
            serde_json::json!({ "condition_result": result, "branch": label }),
        )
    }

    /// Join: every registered branch has reached a terminal state (the
    /// in-degree machinery guarantees it); merge by strategy.
    fn handle_join(
        &self,
        workflow: &WorkflowId,
        run: &mut RunState,
        graph: &mut WorkflowGraph,
        node: &Node,
    ) -> Result<Option<CoreError>, EngineError> {
        let NodeConfig::ParallelJoin(config) = &node.config else {
            return Ok(None);
        };
        let branches = run
            .join_branches
            .get(&node.id)
            .cloned()
            .unwrap_or_else(|| graph.predecessors(&node.id));

        let position = |id: &NodeId| {
            run.completion_order.iter().position(|n| n == id).unwrap_or(usize::MAX)
        };
        let mut ordered = branches.clone();
        ordered.sort_by_key(|id| position(id));

        let mut results = Vec::new();
        for branch_id in &ordered {
            let Some(branch) = graph.node(branch_id) else { continue };
            results.push(BranchResult {
                name: branch.name.clone(),
                output: branch.output.clone(),
                failed: branch.status == NodeStatus::Failed,
                error: branch.error.clone(),
            });
        }

        match merge(config.strategy, &results) {
            Some(merged) => {
                self.complete_node(workflow, run, graph, &node.id, merged)?;
                Ok(None)
            }
            None => {
                let error = CoreError::NodeExecutionFailed {
                    node: node.id.to_string(),
                    message: "all join branches failed".to_string(),
                };
                self.mark_failed(graph, &node.id, &error)?;
                Ok(Some(error))
            }
        }
    }

    fn handle_loop(
        &self,
        workflow: &WorkflowId,
        run: &mut RunState,
        graph: &mut WorkflowGraph,
        node: &Node,
    ) -> Result<(), EngineError> {
        let NodeConfig::Loop(config) = node.config.clone() else {
            return Ok(());
        };
        let iteration = run.loop_iterations.get(&node.id).copied().unwrap_or(0) + 1;
        run.loop_iterations.insert(node.id.clone(), iteration);
        let node_key = node.id.to_string();
        self.store.modify_workflow(workflow, |wf| {
            let counters = wf
                .context
                .entry(LOOPS_KEY.to_string())
                .or_insert_with(|| Value::Object(Default::default()));
            if let Some(map) = counters.as_object_mut() {
                map.insert(node_key, serde_json::json!(iteration));
            }
        })?;

        let context = self
            .store
            .workflow(workflow)
            .map(|wf| wf.context)
            .unwrap_or_default();
        let proceed = iteration <= config.max_iterations
            && eval_condition(&config.expr, &context).unwrap_or(false);
        tracing::debug!(node = %node.id, iteration, proceed, "loop evaluated");

        if proceed {
            // reset the body region for this iteration
            let region = loop_region(graph, &config.body, &node.id, &config.exit);
            let mut resets = 0u32;
            for region_id in &region {
                let Some(status) = graph.node(region_id).map(|n| n.status) else { continue };
                if status.is_terminal() {
                    if status.satisfies_dependents() {
                        resets += 1;
                    }
                    let updated = self.store.modify_node(region_id, |n| {
                        n.status = NodeStatus::Pending;
                        n.output = None;
                        n.error = None;
                        n.completed_at_ms = None;
                    })?;
                    if let Some(n) = graph.node_mut(region_id) {
                        *n = updated;
                    }
                    run.discharged.remove(region_id);
                    // task nodes re-execute each iteration: rearm the
                    // derived subtask row as well
                    if let Some(subtask) = self.store.subtask_for_node(region_id) {
                        let _ = self.store.rmw_subtask(&subtask.id, |s| {
                            if !matches!(s.status, SubtaskStatus::InProgress) {
                                s.status = SubtaskStatus::Pending;
                                s.assigned_worker = None;
                                s.output = None;
                                s.error = None;
                            }
                            Ok(())
                        });
                    }
                }
            }
            if resets > 0 {
                self.store.modify_workflow(workflow, |wf| {
                    wf.completed_nodes = wf.completed_nodes.saturating_sub(resets);
                })?;
            }
            // rebuild in-degrees within the region (edges from outside
            // terminal nodes stay discharged)
            for region_id in &region {
                let blocked = graph
                    .edges()
                    .iter()
                    .filter(|e| !e.back_edge && e.to == *region_id)
                    .filter(|e| {
                        e.from != node.id
                            && graph.node(&e.from).is_some_and(|n| !n.status.is_terminal())
                    })
                    .count();
                run.in_degree.insert(region_id.clone(), blocked);
            }
            run.enqueue(graph, &config.body);
        } else {
            // exiting without ever entering the body: the body region is
            // dead, not failed
            let region = loop_region(graph, &config.body, &node.id, &config.exit);
            let now = self.clock.epoch_ms();
            let mut newly_skipped = 0u32;
            for region_id in &region {
                let Some(status) = graph.node(region_id).map(|n| n.status) else { continue };
                if status == NodeStatus::Pending {
                    let updated = self.store.modify_node(region_id, |n| {
                        n.status = NodeStatus::Skipped;
                        n.completed_at_ms = Some(now);
                    })?;
                    if let Some(n) = graph.node_mut(region_id) {
                        *n = updated;
                    }
                    newly_skipped += 1;
                }
            }
            if newly_skipped > 0 {
                self.store.modify_workflow(workflow, |wf| {
                    wf.completed_nodes += newly_skipped;
                })?;
            }
            let skipped_ids: Vec<NodeId> = region
                .iter()
                .filter(|id| {
                    graph.node(id).is_some_and(|n| n.status == NodeStatus::Skipped)
                })
                .cloned()
                .collect();
            for id in skipped_ids {
                self.discharge(run, graph, &id);
            }
            self.complete_node(
                workflow,
                run,
                graph,
                &node.id,
                serde_json::json!({ "iterations": iteration.saturating_sub(1) }),
            )?;
        }
        Ok(())
    }

    async fn handle_router(
        &self,
        workflow: &WorkflowId,
        run: &mut RunState,
        graph: &mut WorkflowGraph,
        node: &Node,
    ) -> Result<Option<CoreError>, EngineError> {
        let NodeConfig::Router(config) = node.config.clone() else {
            return Ok(None);
        };
        let context = self
            .store
            .workflow(workflow)
            .map(|wf| serde_json::json!(wf.context))
            .unwrap_or(Value::Null);
        let routes: Vec<String> = config.routes.keys().cloned().collect();

        let chosen = match self.router.select(workflow, &context, &routes).await {
            Ok(label) if config.routes.contains_key(&label) => Some(label),
            Ok(unknown) => {
                tracing::warn!(node = %node.id, route = %unknown, "router picked unknown route");
                config.default_route.clone()
            }
            Err(error) => {
                tracing::warn!(node = %node.id, %error, "router callback failed");
                config.default_route.clone()
            }
        };

        let target = chosen
            .as_ref()
            .and_then(|label| config.routes.get(label))
            .cloned();
        let (Some(label), Some(target)) = (chosen, target) else {
            let error = CoreError::NodeExecutionFailed {
                node: node.id.to_string(),
                message: "router failed and no default route is configured".to_string(),
            };
            self.mark_failed(graph, &node.id, &error)?;
            return Ok(Some(error));
        };

        let losing: HashSet<EdgeId> = graph
            .edges_from(&node.id)
            .filter(|e| e.to != target)
            .map(|e| e.id.clone())
            .collect();
        self.propagate_skips(workflow, run, graph, &losing)?;
        self.complete_node(
            workflow,
            run,
            graph,
            &node.id,
            serde_json::json!({ "selected_route": label, "target_node": target.as_str() }),
        )?;
        Ok(None)
    }

    /// HUMAN-REVIEW: persist a checkpoint, notify, and pause.
    async fn handle_review(
        &self,
        workflow: &WorkflowId,
        node: &Node,
    ) -> Result<ExecutionOutcome, EngineError> {
        let NodeConfig::HumanReview(config) = &node.config else {
            return Ok(ExecutionOutcome::Paused { node: Some(node.id.clone()) });
        };

        self.store.modify_node(&node.id, |n| n.status = NodeStatus::Waiting)?;

        // reuse an open checkpoint if this node already paused once
        let existing = self
            .store
            .checkpoints_for_workflow(workflow)
            .into_iter()
            .find(|c| c.node_id == node.id && c.status.is_open());
        let checkpoint = match existing {
            Some(found) => found,
            None => {
                let checkpoint = self.new_checkpoint(workflow, node, config);
                self.store.insert_checkpoint(checkpoint.clone())?;
                checkpoint
            }
        };
        self.kv.put_review(&checkpoint);
        self.notifier
            .notify(NotifyEvent::ReviewRequested {
                checkpoint: checkpoint.id.clone(),
                workflow: workflow.clone(),
                urgency: checkpoint.urgency,
            })
            .await;

        self.store.modify_workflow(workflow, |wf| wf.status = WorkflowStatus::Paused)?;
        tracing::info!(workflow = %workflow, node = %node.id, checkpoint = %checkpoint.id,
            "workflow paused for human review");
        Ok(ExecutionOutcome::Paused { node: Some(node.id.clone()) })
    }

    fn new_checkpoint(
        &self,
        workflow: &WorkflowId,
        node: &Node,
        config: &ReviewConfig,
    ) -> Checkpoint {
        let mut checkpoint = Checkpoint::new(
            CheckpointId::new(self.id_gen.id("cp")),
            workflow.clone(),
            node.id.clone(),
            config.instructions.clone(),
            &self.clock,
        );
        checkpoint.required_fields = config.required_fields.clone();
        checkpoint.review_type = config.review_type;
        checkpoint.urgency = config.urgency;
        checkpoint.input_snapshot = node.input.clone().or_else(|| {
            self.store.workflow(workflow).map(|wf| serde_json::json!(wf.context))
        });
        checkpoint.expires_at_ms =
            config.timeout_ms.map(|t| self.clock.epoch_ms() + t);
        checkpoint
    }

    /// Resume a workflow paused at a HUMAN-REVIEW node.
    pub async fn resume_after_review(
        &self,
        workflow: &WorkflowId,
        node_id: &NodeId,
        decision: DecisionKind,
        modifications: Option<Value>,
    ) -> Result<ExecutionOutcome, EngineError> {
        let node = self
            .store
            .node(node_id)
            .ok_or_else(|| StoreError::not_found("node", node_id))?;
        if node.status != NodeStatus::Waiting {
            return Err(EngineError::NotAwaitingReview { node: node_id.to_string() });
        }
        let NodeConfig::HumanReview(config) = node.config.clone() else {
            return Err(EngineError::NotAwaitingReview { node: node_id.to_string() });
        };

        let output = serde_json::json!({
            "decision": decision.to_string(),
            "data": modifications,
            "reviewed_at_ms": self.clock.epoch_ms(),
        });
        let now = self.clock.epoch_ms();
        self.store.modify_node(node_id, |n| {
            n.status = NodeStatus::Completed;
            n.output = Some(output.clone());
            n.completed_at_ms = Some(now);
        })?;
        let review_key = format!("{}_review", node.name);
        self.store.modify_workflow(workflow, |wf| {
            wf.completed_nodes += 1;
            wf.context.insert(review_key, output.clone());
            if decision == DecisionKind::Modify {
                if let Some(fields) = modifications.as_ref().and_then(|m| m.as_object()) {
                    for (key, value) in fields {
                        wf.context.insert(key.clone(), value.clone());
                    }
                }
            }
        })?;

        // skip the losing branch before re-entering the run loop
        let (_chosen, loser) = match decision {
            DecisionKind::Approve | DecisionKind::Modify => {
                (config.approve_branch.clone(), config.reject_branch.clone())
            }
            DecisionKind::Reject => {
                (config.reject_branch.clone(), config.approve_branch.clone())
            }
        };
        if let Some(loser) = loser {
            let graph = self.store.graph(workflow)?;
            let losing: HashSet<EdgeId> = graph
                .edges_from(node_id)
                .filter(|e| e.to == loser)
                .map(|e| e.id.clone())
                .collect();
            let skipped = compute_skips(&graph, &losing);
            for id in &skipped {
                self.store.modify_node(id, |n| {
                    n.status = NodeStatus::Skipped;
                    n.completed_at_ms = Some(now);
                })?;
            }
            if !skipped.is_empty() {
                self.store.modify_workflow(workflow, |wf| {
                    wf.completed_nodes += skipped.len() as u32;
                })?;
            }
        }

        tracing::info!(workflow = %workflow, node = %node_id, decision = %decision,
            "resuming after review");
        self.run_dyn(workflow.clone()).await
    }

    // -- task-like futures ----------------------------------------------

    fn spawn_task_future<'a>(
        &'a self,
        workflow: &WorkflowId,
        node: Node,
        semaphore: Arc<Semaphore>,
    ) -> BoxFuture<'a, TaskReturn> {
        let workflow = workflow.clone();
        Box::pin(async move {
            let node_id = node.id.clone();
            let _permit = match semaphore.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    return (
                        node_id.clone(),
                        Err(CoreError::NodeExecutionFailed {
                            node: node_id.to_string(),
                            message: "branch semaphore closed".to_string(),
                        }),
                    )
                }
            };
            let result = match &node.config {
                NodeConfig::Task(config) => {
                    self.run_task(&workflow, &node, &config.clone()).await
                }
                NodeConfig::Director(config) => {
                    let as_task = TaskConfig {
                        description: config.description.clone(),
                        recommended_tool: config.recommended_tool.clone(),
                        require_exact_tool: false,
                        privacy: config.privacy,
                        priority: config.priority,
                        complexity: config.complexity,
                        output_key: None,
                        timeout_ms: None,
                        context_keys: Vec::new(),
                    };
                    self.run_task(&workflow, &node, &as_task).await
                }
                NodeConfig::Subflow(_) => self.run_subflow(&workflow, &node).await,
                _ => Err(CoreError::NodeExecutionFailed {
                    node: node_id.to_string(),
                    message: "not a task-like node".to_string(),
                }),
            };
            (node_id, result)
        })
    }

    /// TASK (and DIRECTOR) execution: create the subtask row once,
    /// announce it, await the upload, retry transient failures with a
    /// linear backoff.
    async fn run_task(
        &self,
        workflow: &WorkflowId,
        node: &Node,
        config: &TaskConfig,
    ) -> Result<Value, CoreError> {
        let timeout_ms = config.timeout_ms.unwrap_or(self.config.default_subtask_timeout_ms);
        loop {
            let subtask = self.ensure_subtask(workflow, node, config)?;
            if subtask.status == SubtaskStatus::Completed {
                return Ok(subtask.output.unwrap_or(Value::Null));
            }

            if subtask.status == SubtaskStatus::Pending {
                self.dispatch.submit(&subtask).await.map_err(|e| {
                    CoreError::NodeExecutionFailed {
                        node: node.id.to_string(),
                        message: format!("dispatch failed: {e}"),
                    }
                })?;
            }

            let outcome = self
                .dispatch
                .await_result(&subtask.id, Duration::from_millis(timeout_ms))
                .await
                .map_err(|e| CoreError::NodeExecutionFailed {
                    node: node.id.to_string(),
                    message: format!("await failed: {e}"),
                })?;

            let transient = match outcome {
                SubtaskOutcome::Completed { output } => return Ok(output),
                SubtaskOutcome::Cancelled => return Err(CoreError::WorkflowCancelled),
                SubtaskOutcome::TimedOut => {
                    let _ = self.dispatch.cancel(&subtask.id, "wall-clock timeout").await;
                    CoreError::SubtaskTimeout { subtask: subtask.id.to_string(), timeout_ms }
                }
                SubtaskOutcome::Failed { error } => CoreError::NodeExecutionFailed {
                    node: node.id.to_string(),
                    message: error,
                },
            };

            let fresh = self
                .store
                .node(&node.id)
                .ok_or_else(|| CoreError::NodeExecutionFailed {
                    node: node.id.to_string(),
                    message: "node row disappeared".to_string(),
                })?;
            if !fresh.can_retry() {
                return Err(CoreError::NodeExecutionFailed {
                    node: node.id.to_string(),
                    message: format!("retries exhausted: {transient}"),
                });
            }
            let retry_count = fresh.retry_count + 1;
            self.store
                .modify_node(&node.id, |n| n.retry_count = retry_count)
                .map_err(|_| CoreError::NodeExecutionFailed {
                    node: node.id.to_string(),
                    message: "node row disappeared".to_string(),
                })?;
            tracing::warn!(node = %node.id, retry = retry_count, error = %transient,
                "transient node failure; backing off");

            // reset the subtask row for the next attempt
            let _ = self.store.rmw_subtask(&subtask.id, |s| {
                if !matches!(s.status, SubtaskStatus::Completed) {
                    s.status = SubtaskStatus::Pending;
                    s.assigned_worker = None;
                    s.error = None;
                }
                Ok(())
            });

            let delay = fresh.retry_delay_ms * (1 + u64::from(fresh.retry_count));
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
    }

    /// Create (or fetch) the subtask row for a TASK node. Idempotent per
    /// node so resumed runs re-attach instead of duplicating work.
    fn ensure_subtask(
        &self,
        workflow: &WorkflowId,
        node: &Node,
        config: &TaskConfig,
    ) -> Result<Subtask, CoreError> {
        if let Some(existing) = self.store.subtask_for_node(&node.id) {
            return Ok(existing);
        }
        let mut subtask = Subtask::new(
            SubtaskId::new(self.id_gen.id("st")),
            workflow.clone(),
            node.id.clone(),
            node.name.clone(),
            config.description.clone(),
            config.recommended_tool.clone(),
            &self.clock,
        );
        subtask.require_exact_tool = config.require_exact_tool;
        subtask.privacy = config.privacy;
        subtask.priority = config.priority;
        subtask.complexity = config.complexity;
        self.store.insert_subtask(subtask.clone()).map_err(|e| {
            CoreError::NodeExecutionFailed {
                node: node.id.to_string(),
                message: format!("subtask insert failed: {e}"),
            }
        })?;
        Ok(subtask)
    }

    /// SUBFLOW: instantiate the referenced template as a nested
    /// workflow, run it to completion, and map outputs back.
    async fn run_subflow(&self, workflow: &WorkflowId, node: &Node) -> Result<Value, CoreError> {
        let NodeConfig::Subflow(config) = node.config.clone() else {
            return Err(CoreError::NodeExecutionFailed {
                node: node.id.to_string(),
                message: "not a subflow node".to_string(),
            });
        };
        let node_err = |message: String| CoreError::NodeExecutionFailed {
            node: node.id.to_string(),
            message,
        };

        let spec = self
            .templates
            .load(&config.template)
            .ok_or_else(|| node_err(format!("unknown workflow template: {}", config.template)))?;
        let parent = self
            .store
            .workflow(workflow)
            .ok_or_else(|| node_err("parent workflow disappeared".to_string()))?;

        let child_id = WorkflowId::new(self.id_gen.id("wf"));
        let mut child = Workflow::new(
            child_id.clone(),
            parent.owner.clone(),
            format!("{}/{}", parent.name, spec.name),
            parent.kind,
            &self.clock,
        );
        if config.inherit_context {
            child.context = parent.context.clone();
        }
        for (parent_key, child_key) in &config.inputs {
            if let Some(value) = parent.context.get(parent_key) {
                child.context.insert(child_key.clone(), value.clone());
            }
        }

        let (nodes, edges) = self
            .instantiate_spec(&child_id, &spec)
            .map_err(|m| node_err(m))?;
        self.store
            .create_workflow(child, nodes, edges)
            .map_err(|e| node_err(format!("subflow instantiation failed: {e}")))?;

        let outcome = self
            .run_dyn(child_id.clone())
            .await
            .map_err(|e| node_err(format!("subflow execution failed: {e}")))?;
        if outcome != ExecutionOutcome::Completed {
            return Err(node_err(format!("subflow ended {outcome:?}")));
        }

        let child_context = self
            .store
            .workflow(&child_id)
            .map(|wf| wf.context)
            .unwrap_or_default();
        if !config.outputs.is_empty() {
            let mapped: Vec<(String, Value)> = config
                .outputs
                .iter()
                .filter_map(|(child_key, parent_key)| {
                    child_context.get(child_key).map(|v| (parent_key.clone(), v.clone()))
                })
                .collect();
            self.store
                .modify_workflow(workflow, |wf| {
                    for (key, value) in &mapped {
                        wf.context.insert(key.clone(), value.clone());
                    }
                })
                .map_err(|e| node_err(format!("output mapping failed: {e}")))?;
        }

        Ok(serde_json::json!({
            "workflow_id": child_id.as_str(),
            "status": "completed",
        }))
    }

    fn instantiate_spec(
        &self,
        child: &WorkflowId,
        spec: &crate::dispatch::WorkflowSpec,
    ) -> Result<(Vec<Node>, Vec<Edge>), String> {
        let mut ids: HashMap<String, NodeId> = HashMap::new();
        let mut nodes = Vec::new();
        for seed in &spec.nodes {
            let id = NodeId::new(self.id_gen.id("node"));
            ids.insert(seed.name.clone(), id.clone());
            nodes.push(Node::new(
                id,
                child.clone(),
                seed.name.clone(),
                materialize_config(&seed.config, &ids),
                &self.clock,
            ));
        }
        // second pass: split/loop targets may reference later seeds
        for node in &mut nodes {
            node.config = materialize_config(&node.config, &ids);
        }
        let mut edges = Vec::new();
        for seed in &spec.edges {
            let from = ids
                .get(&seed.from)
                .cloned()
                .ok_or_else(|| format!("edge references unknown template node {}", seed.from))?;
            let to = ids
                .get(&seed.to)
                .cloned()
                .ok_or_else(|| format!("edge references unknown template node {}", seed.to))?;
            let mut edge =
                Edge::new(EdgeId::new(self.id_gen.id("edge")), child.clone(), from, to);
            edge.label = seed.label.clone();
            edges.push(edge);
        }
        Ok((nodes, edges))
    }

    /// DIRECTOR output: parse the decomposition and append it to the
    /// running graph. Cycles reject the append (and fail the node).
    fn apply_decomposition(
        &self,
        workflow: &WorkflowId,
        run: &mut RunState,
        graph: &mut WorkflowGraph,
        node: &Node,
        output: &Value,
    ) -> Result<(), CoreError> {
        let Ok(decomposition) = serde_json::from_value::<Decomposition>(output.clone()) else {
            // output with no decomposition shape appends nothing
            return Ok(());
        };
        if decomposition.nodes.is_empty() && decomposition.edges.is_empty() {
            return Ok(());
        }

        let mut ids: HashMap<String, NodeId> = HashMap::new();
        let mut new_nodes = Vec::new();
        for seed in &decomposition.nodes {
            let id = NodeId::new(self.id_gen.id("node"));
            ids.insert(seed.name.clone(), id.clone());
            new_nodes.push(Node::new(
                id,
                workflow.clone(),
                seed.name.clone(),
                seed.config.clone(),
                &self.clock,
            ));
        }
        let resolve = |name: &str| -> Result<NodeId, CoreError> {
            if let Some(id) = ids.get(name) {
                return Ok(id.clone());
            }
            let existing = NodeId::new(name);
            if graph.node(&existing).is_some() || existing == node.id {
                return Ok(existing);
            }
            Err(CoreError::InvalidGraph {
                message: format!("decomposition references unknown node {name}"),
            })
        };
        let mut new_edges = Vec::new();
        for seed in &decomposition.edges {
            let mut edge = Edge::new(
                EdgeId::new(self.id_gen.id("edge")),
                workflow.clone(),
                resolve(&seed.from)?,
                resolve(&seed.to)?,
            );
            edge.label = seed.label.clone();
            new_edges.push(edge);
        }

        graph
            .append(new_nodes.clone(), new_edges.clone())
            .map_err(CoreError::from)?;
        self.store.append_graph(new_nodes.clone(), new_edges.clone());

        // extend run bookkeeping: fresh nodes, fresh join registrations,
        // in-degrees counting only live predecessors
        for new_node in &new_nodes {
            run.in_degree.insert(new_node.id.clone(), 0);
            if let NodeConfig::ParallelSplit(split) = &new_node.config {
                for branch in &split.branches {
                    run.branch_of.insert(
                        branch.clone(),
                        JoinMembership { join: split.join.clone(), fail_fast: split.fail_fast },
                    );
                }
                run.join_branches.insert(split.join.clone(), split.branches.clone());
            }
        }
        for edge in &new_edges {
            if edge.back_edge {
                continue;
            }
            let from_live =
                graph.node(&edge.from).is_some_and(|n| !n.status.is_terminal());
            if from_live {
                if let Some(d) = run.in_degree.get_mut(&edge.to) {
                    *d += 1;
                }
            }
        }
        for new_node in &new_nodes {
            if run.in_degree.get(&new_node.id).copied() == Some(0) {
                run.enqueue(graph, &new_node.id);
            }
        }
        tracing::info!(workflow = %workflow, director = %node.id,
            nodes = new_nodes.len(), edges = new_edges.len(), "decomposition appended");
        Ok(())
    }

    // -- terminal transitions -------------------------------------------

    async fn finalize_failed(
        &self,
        id: &WorkflowId,
        error: CoreError,
    ) -> Result<ExecutionOutcome, EngineError> {
        let now = self.clock.epoch_ms();
        let message = error.to_string();
        self.store.modify_workflow(id, |wf| {
            wf.status = WorkflowStatus::Failed;
            wf.error = Some(message.clone());
            wf.completed_at_ms = Some(now);
        })?;
        self.cancel_workflow_subtasks(id, "workflow failed").await;
        self.notifier
            .notify(NotifyEvent::WorkflowFinished {
                workflow: id.clone(),
                status: WorkflowStatus::Failed.to_string(),
            })
            .await;
        tracing::warn!(workflow = %id, error = %message, "workflow failed");
        Ok(ExecutionOutcome::Failed { error })
    }

    async fn finalize_cancelled(&self, id: &WorkflowId) -> Result<(), EngineError> {
        self.cancel_workflow_subtasks(id, "workflow cancelled").await;

        // close any paused reviews
        let now = self.clock.epoch_ms();
        for checkpoint in self.store.checkpoints_for_workflow(id) {
            if checkpoint.status.is_open() {
                let _ = self.store.update_checkpoint(
                    &checkpoint.id,
                    checkpoint.version,
                    |c| c.status = CheckpointStatus::Cancelled,
                );
                self.kv.drop_review(&checkpoint.id);
            }
        }

        self.store.modify_workflow(id, |wf| {
            wf.status = WorkflowStatus::Cancelled;
            wf.completed_at_ms = Some(now);
        })?;
        self.notifier
            .notify(NotifyEvent::WorkflowFinished {
                workflow: id.clone(),
                status: WorkflowStatus::Cancelled.to_string(),
            })
            .await;
        tracing::info!(workflow = %id, "workflow cancelled");
        Ok(())
    }

    /// Cancel every live subtask of a workflow (frame to the assigned
    /// worker; the reaper covers non-acknowledging holders).
    async fn cancel_workflow_subtasks(&self, id: &WorkflowId, reason: &str) {
        for subtask in self.store.subtasks_for_workflow(id) {
            if subtask.is_terminal() {
                continue;
            }
            let _ = self.dispatch.cancel(&subtask.id, reason).await;
            let _ = self.store.rmw_subtask(&subtask.id, |s| {
                if !s.is_terminal() {
                    s.status = SubtaskStatus::Cancelled;
                    s.assigned_worker = None;
                }
                Ok(())
            });
        }
    }
}

/// Rewrite symbolic node references inside a template config to the
/// freshly generated ids. Names not present in the map are left as-is.
fn materialize_config(config: &NodeConfig, ids: &HashMap<String, NodeId>) -> NodeConfig {
    let map_id = |id: &NodeId| ids.get(id.as_str()).cloned().unwrap_or_else(|| id.clone());
    match config {
        NodeConfig::ParallelSplit(c) => NodeConfig::ParallelSplit(SplitConfig {
            branches: c.branches.iter().map(&map_id).collect(),
            join: map_id(&c.join),
            fail_fast: c.fail_fast,
        }),
        NodeConfig::HumanReview(c) => NodeConfig::HumanReview(ReviewConfig {
            approve_branch: c.approve_branch.as_ref().map(&map_id),
            reject_branch: c.reject_branch.as_ref().map(&map_id),
            ..c.clone()
        }),
        NodeConfig::Loop(c) => NodeConfig::Loop(LoopConfig {
            body: map_id(&c.body),
            exit: map_id(&c.exit),
            ..c.clone()
        }),
        NodeConfig::Router(c) => NodeConfig::Router(RouterConfig {
            routes: c.routes.iter().map(|(label, id)| (label.clone(), map_id(id))).collect(),
            ..c.clone()
        }),
        other => other.clone(),
    }
}

/// Nodes of the loop body region: forward-reachable from `body` without
/// passing through the loop head or its exit.
fn loop_region(
    graph: &WorkflowGraph,
    body: &NodeId,
    loop_id: &NodeId,
    exit: &NodeId,
) -> Vec<NodeId> {
    let mut seen = HashSet::new();
    let mut queue = VecDeque::from([body.clone()]);
    let mut region = Vec::new();
    while let Some(id) = queue.pop_front() {
        if id == *loop_id || id == *exit || !seen.insert(id.clone()) {
            continue;
        }
        region.push(id.clone());
        for next in graph.successors(&id) {
            queue.push_back(next);
        }
    }
    region
}

/// Fixpoint skip computation: a pending node is dead when every incoming
/// forward edge is losing or originates from a dead node.
fn compute_skips(graph: &WorkflowGraph, losing_edges: &HashSet<EdgeId>) -> Vec<NodeId> {
    if losing_edges.is_empty() {
        return Vec::new();
    }
    let mut skipped: HashSet<NodeId> = graph
        .nodes()
        .filter(|n| n.status == NodeStatus::Skipped)
        .map(|n| n.id.clone())
        .collect();
    let mut result = Vec::new();

    let mut candidates: VecDeque<NodeId> = graph
        .edges()
        .iter()
        .filter(|e| losing_edges.contains(&e.id))
        .map(|e| e.to.clone())
        .collect();

    while let Some(id) = candidates.pop_front() {
        if skipped.contains(&id) {
            continue;
        }
        let Some(node) = graph.node(&id) else { continue };
        if node.status != NodeStatus::Pending {
            continue;
        }
        let all_dead = graph
            .edges()
            .iter()
            .filter(|e| !e.back_edge && e.to == id)
            .all(|e| losing_edges.contains(&e.id) || skipped.contains(&e.from));
        if all_dead {
            skipped.insert(id.clone());
            result.push(id.clone());
            for next in graph.successors(&id) {
                candidates.push_back(next);
            }
        }
    }
    result
}

#[cfg(test)]
#[path = "executor_tests.rs"]
mod tests;
