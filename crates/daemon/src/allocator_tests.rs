// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::connection::test_channel::{test_channel, ChannelHandle};
use hive_core::test_support::{SubtaskBuilder, WorkerBuilder};
use hive_core::FakeClock;

struct Harness {
    store: DurableStore,
    kv: KvStore<FakeClock>,
    conns: Arc<ConnectionManager<FakeClock>>,
    allocator: TaskAllocator<FakeClock>,
}

fn harness() -> Harness {
    harness_with_policy(ScoringPolicy::default())
}

fn harness_with_policy(policy: ScoringPolicy) -> Harness {
    let store = DurableStore::new();
    let clock = FakeClock::new();
    let kv = KvStore::new(clock.clone());
    let (events_tx, _events_rx) = tokio::sync::mpsc::channel(64);
    let conns = Arc::new(ConnectionManager::new(
        store.clone(),
        kv.clone(),
        clock.clone(),
        events_tx,
        30_000,
    ));
    let allocator = TaskAllocator::new(
        store.clone(),
        kv.clone(),
        conns.clone(),
        clock,
        policy,
        3_600_000,
        Arc::new(Notify::new()),
    );
    Harness { store, kv, conns, allocator }
}

async fn connect_idle_worker(h: &Harness, id: &str, tools: &[&str]) -> ChannelHandle {
    h.store
        .insert_worker(WorkerBuilder::new(id).tools(tools).build())
        .unwrap();
    let (handle, sink, _source) = test_channel();
    h.conns.accept(id.into(), Box::new(sink)).await;
    handle
}

// -- scoring ------------------------------------------------------------

#[yare::parameterized(
    has_tool = { &["claude_code", "gemini_cli"], 1.0 },
    lacks_tool = { &["gemini_cli"], 0.5 },
    no_tools = { &[], 0.0 },
)]
fn tool_score_cases(tools: &[&str], expected: f64) {
    let h = harness();
    let subtask = SubtaskBuilder::new("st-1").tool("claude_code").build();
    let worker = WorkerBuilder::new("wk-1").tools(tools).build();
    let policy = ScoringPolicy { resource_weight: 0.0, privacy_weight: 0.0, ..Default::default() };
    let allocator = TaskAllocator::new(
        h.store.clone(),
        h.kv.clone(),
        h.conns.clone(),
        FakeClock::new(),
        policy,
        3_600_000,
        Arc::new(Notify::new()),
    );
    assert!((allocator.score(&subtask, &worker) - expected).abs() < 1e-9);
}

#[test]
fn exact_tool_requirement_rejects_mismatched_workers() {
    let h = harness();
    let mut subtask = SubtaskBuilder::new("st-1").tool("claude_code").build();
    subtask.require_exact_tool = true;
    let worker = WorkerBuilder::new("wk-1").tools(&["gemini_cli"]).build();
    let policy = ScoringPolicy { resource_weight: 0.0, privacy_weight: 0.0, ..Default::default() };
    let allocator = TaskAllocator::new(
        h.store.clone(),
        h.kv.clone(),
        h.conns.clone(),
        FakeClock::new(),
        policy,
        3_600_000,
        Arc::new(Notify::new()),
    );
    assert_eq!(allocator.score(&subtask, &worker), 0.0);

    // the exact match still scores fully
    let matching = WorkerBuilder::new("wk-2").tools(&["claude_code"]).build();
    assert!((allocator.score(&subtask, &matching) - 1.0).abs() < 1e-9);
}

#[test]
fn resource_score_prefers_unloaded_workers() {
    let h = harness();
    let subtask = SubtaskBuilder::new("st-1").build();
    let loaded = WorkerBuilder::new("wk-loaded").metrics(90.0, 90.0, 90.0).build();
    let free = WorkerBuilder::new("wk-free").metrics(10.0, 10.0, 10.0).build();
    assert!(h.allocator.score(&subtask, &free) > h.allocator.score(&subtask, &loaded));
}

#[test]
fn unknown_metrics_score_neutral() {
    let h = harness();
    let subtask = SubtaskBuilder::new("st-1").build();
    let worker = WorkerBuilder::new("wk-1").build(); // no metrics
    // tool 1.0·0.5 + resource 0.5·0.3 + privacy 1.0·0.2
    assert!((h.allocator.score(&subtask, &worker) - 0.85).abs() < 1e-9);
}

#[yare::parameterized(
    local_only = { &["ollama"], 1.0 },
    mixed = { &["ollama", "claude_code"], 0.8 },
    cloud_only = { &["claude_code"], 0.5 },
)]
fn privacy_score_for_sensitive_tasks(tools: &[&str], expected: f64) {
    let h = harness();
    let subtask = SubtaskBuilder::new("st-1")
        .tool(tools[0])
        .privacy(hive_core::PrivacyLevel::Sensitive)
        .build();
    let worker = WorkerBuilder::new("wk-1").tools(tools).build();
    let policy = ScoringPolicy { tool_weight: 0.0, resource_weight: 0.0, ..Default::default() };
    let allocator = TaskAllocator::new(
        h.store.clone(),
        h.kv.clone(),
        h.conns.clone(),
        FakeClock::new(),
        policy,
        3_600_000,
        Arc::new(Notify::new()),
    );
    assert!((allocator.score(&subtask, &worker) - expected).abs() < 1e-9);
}

// -- boundary behaviors -------------------------------------------------

#[tokio::test]
async fn no_ready_subtasks_means_no_commits() {
    let h = harness();
    connect_idle_worker(&h, "wk-1", &["claude_code"]).await;

    assert_eq!(h.allocator.cycle().await, 0);
    assert_eq!(h.store.worker(&"wk-1".into()).unwrap().status, WorkerStatus::Idle);
}

#[tokio::test]
async fn no_idle_workers_leaves_subtasks_pending() {
    let h = harness();
    h.store.insert_subtask(SubtaskBuilder::new("st-1").build()).unwrap();

    assert_eq!(h.allocator.cycle().await, 0);
    assert_eq!(h.store.subtask(&"st-1".into()).unwrap().status, SubtaskStatus::Pending);
}

#[tokio::test]
async fn disconnected_worker_is_not_idle() {
    let h = harness();
    // idle in the store but never connected
    h.store.insert_worker(WorkerBuilder::new("wk-1").build()).unwrap();
    h.store.insert_subtask(SubtaskBuilder::new("st-1").build()).unwrap();

    assert_eq!(h.allocator.cycle().await, 0);
    assert_eq!(h.store.subtask(&"st-1".into()).unwrap().status, SubtaskStatus::Pending);
}

// -- commit protocol ----------------------------------------------------

#[tokio::test]
async fn commit_flips_both_rows_and_pushes_assignment() {
    let h = harness();
    let handle = connect_idle_worker(&h, "wk-1", &["claude_code"]).await;
    h.store.insert_subtask(SubtaskBuilder::new("st-1").tool("claude_code").build()).unwrap();

    assert_eq!(h.allocator.cycle().await, 1);

    let subtask = h.store.subtask(&"st-1".into()).unwrap();
    assert_eq!(subtask.status, SubtaskStatus::InProgress);
    assert_eq!(subtask.assigned_worker, Some("wk-1".into()));
    assert_eq!(subtask.attempt, 1);
    assert!(subtask.assignment_consistent());
    assert_eq!(h.store.worker(&"wk-1".into()).unwrap().status, WorkerStatus::Busy);

    // KV mirror
    assert_eq!(h.kv.worker_current_task(&"wk-1".into()), Some("st-1".into()));
    assert!(h.kv.in_progress().contains(&SubtaskId::from("st-1")));

    // the worker received exactly one assignment frame
    let frames = handle.sent();
    let assignments: Vec<_> = frames
        .iter()
        .filter_map(|f| match f {
            ServerFrame::TaskAssignment { subtask_id, assigned_tool, timeout_seconds, .. } => {
                Some((subtask_id.clone(), assigned_tool.clone(), *timeout_seconds))
            }
            _ => None,
        })
        .collect();
    assert_eq!(assignments, vec![("st-1".to_string(), "claude_code".to_string(), 3_600)]);
}

#[tokio::test]
async fn higher_priority_subtask_wins_the_only_worker() {
    let h = harness();
    connect_idle_worker(&h, "wk-1", &["claude_code"]).await;
    h.store
        .insert_subtask(SubtaskBuilder::new("st-low").priority(2).build())
        .unwrap();
    h.store
        .insert_subtask(SubtaskBuilder::new("st-high").priority(9).build())
        .unwrap();

    assert_eq!(h.allocator.cycle().await, 1);

    assert_eq!(
        h.store.subtask(&"st-high".into()).unwrap().status,
        SubtaskStatus::InProgress
    );
    assert_eq!(h.store.subtask(&"st-low".into()).unwrap().status, SubtaskStatus::Pending);
}

#[tokio::test]
async fn best_scoring_worker_is_picked() {
    let h = harness();
    connect_idle_worker(&h, "wk-other", &["gemini_cli"]).await;
    connect_idle_worker(&h, "wk-match", &["claude_code"]).await;
    h.store.insert_subtask(SubtaskBuilder::new("st-1").tool("claude_code").build()).unwrap();

    assert_eq!(h.allocator.cycle().await, 1);
    assert_eq!(
        h.store.subtask(&"st-1".into()).unwrap().assigned_worker,
        Some("wk-match".into())
    );
}

#[tokio::test]
async fn below_min_score_stays_queued() {
    let h = harness_with_policy(ScoringPolicy { min_score: 0.99, ..Default::default() });
    connect_idle_worker(&h, "wk-1", &["gemini_cli"]).await;
    h.store.insert_subtask(SubtaskBuilder::new("st-1").tool("claude_code").build()).unwrap();

    assert_eq!(h.allocator.cycle().await, 0);
    assert_eq!(h.store.subtask(&"st-1".into()).unwrap().status, SubtaskStatus::Pending);
}

#[tokio::test]
async fn one_worker_gets_at_most_one_subtask_per_cycle() {
    let h = harness();
    connect_idle_worker(&h, "wk-1", &["claude_code"]).await;
    h.store.insert_subtask(SubtaskBuilder::new("st-1").build()).unwrap();
    h.store.insert_subtask(SubtaskBuilder::new("st-2").build()).unwrap();

    assert_eq!(h.allocator.cycle().await, 1);

    let statuses: Vec<SubtaskStatus> = ["st-1", "st-2"]
        .iter()
        .map(|id| h.store.subtask(&(*id).into()).unwrap().status)
        .collect();
    assert!(statuses.contains(&SubtaskStatus::InProgress));
    assert!(statuses.contains(&SubtaskStatus::Pending));
}

#[tokio::test]
async fn undelivered_assignment_runs_release_path() {
    let h = harness();
    let handle = connect_idle_worker(&h, "wk-1", &["claude_code"]).await;
    h.store.insert_subtask(SubtaskBuilder::new("st-1").build()).unwrap();

    // the socket dies between commit and send
    handle.break_pipe();
    assert_eq!(h.allocator.cycle().await, 0);

    // no orphan: subtask back to pending with no worker assigned
    let subtask = h.store.subtask(&"st-1".into()).unwrap();
    assert_eq!(subtask.status, SubtaskStatus::Pending);
    assert!(subtask.assigned_worker.is_none());
    assert!(subtask.assignment_consistent());
    assert_eq!(h.store.worker(&"wk-1".into()).unwrap().status, WorkerStatus::Idle);
    assert_eq!(h.kv.worker_current_task(&"wk-1".into()), None);
    assert!(h.kv.in_progress().is_empty());
    // re-queued for the next cycle
    assert_eq!(h.kv.queue_snapshot(), vec![SubtaskId::from("st-1")]);
}

#[tokio::test]
async fn dependent_subtask_waits_for_dependency() {
    let h = harness();
    connect_idle_worker(&h, "wk-1", &["claude_code"]).await;
    h.store.insert_subtask(SubtaskBuilder::new("st-a").build()).unwrap();
    h.store
        .insert_subtask(SubtaskBuilder::new("st-b").depends_on(&["st-a"]).priority(10).build())
        .unwrap();

    assert_eq!(h.allocator.cycle().await, 1);
    // despite its priority, st-b is not ready
    assert_eq!(
        h.store.subtask(&"st-a".into()).unwrap().status,
        SubtaskStatus::InProgress
    );
    assert_eq!(h.store.subtask(&"st-b".into()).unwrap().status, SubtaskStatus::Pending);
}
