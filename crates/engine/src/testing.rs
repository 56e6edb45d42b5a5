// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fakes for the collaborator seams, shared by engine tests and the
//! workspace-level specs.

use crate::dispatch::{
    DispatchError, Notifier, NotifyEvent, RouteSelector, SubtaskDispatch, SubtaskOutcome,
};
use async_trait::async_trait;
use hive_core::{SubtaskId, SubtaskStatus, WorkflowId};
use hive_storage::DurableStore;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;

/// Scripted behavior for one subtask attempt, keyed by subtask name.
#[derive(Debug, Clone)]
pub enum Scripted {
    Outcome(SubtaskOutcome),
    /// Never resolves (a worker that goes silent); the executor's
    /// timeout or a cancellation must break the wait.
    Hang,
}

/// Dispatcher fake: resolves subtask attempts from a per-name script
/// and mirrors terminal outcomes into the store the way the daemon's
/// ingest path does.
pub struct FakeDispatch {
    store: DurableStore,
    scripts: Mutex<HashMap<String, VecDeque<Scripted>>>,
    submitted: Mutex<Vec<SubtaskId>>,
    cancelled: Mutex<Vec<(SubtaskId, String)>>,
}

impl FakeDispatch {
    pub fn new(store: DurableStore) -> Self {
        Self {
            store,
            scripts: Mutex::new(HashMap::new()),
            submitted: Mutex::new(Vec::new()),
            cancelled: Mutex::new(Vec::new()),
        }
    }

    /// Queue the next attempt outcome for subtasks named `name`.
    pub fn script(&self, name: &str, scripted: Scripted) {
        self.scripts.lock().entry(name.to_string()).or_default().push_back(scripted);
    }

    /// Shorthand: next attempt for `name` completes with `output`.
    pub fn complete_with(&self, name: &str, output: serde_json::Value) {
        self.script(name, Scripted::Outcome(SubtaskOutcome::Completed { output }));
    }

    pub fn submitted(&self) -> Vec<SubtaskId> {
        self.submitted.lock().clone()
    }

    pub fn cancelled(&self) -> Vec<(SubtaskId, String)> {
        self.cancelled.lock().clone()
    }

    fn next_for(&self, name: &str) -> Scripted {
        let mut scripts = self.scripts.lock();
        match scripts.get_mut(name).and_then(|q| q.pop_front()) {
            Some(scripted) => scripted,
            // unscripted subtasks succeed with a predictable output
            None => Scripted::Outcome(SubtaskOutcome::Completed {
                output: serde_json::json!(format!("out-{name}")),
            }),
        }
    }

    /// Mirror the outcome into the subtask row (what the connection
    /// ingest does in production).
    fn record(&self, id: &SubtaskId, outcome: &SubtaskOutcome) {
        let _ = self.store.rmw_subtask(id, |s| {
            match outcome {
                SubtaskOutcome::Completed { output } => {
                    s.status = SubtaskStatus::Completed;
                    s.progress = 100;
                    s.output = Some(output.clone());
                    s.assigned_worker = None;
                }
                SubtaskOutcome::Failed { error } => {
                    s.status = SubtaskStatus::Failed;
                    s.error = Some(error.clone());
                    s.assigned_worker = None;
                }
                SubtaskOutcome::Cancelled => {
                    s.status = SubtaskStatus::Cancelled;
                    s.assigned_worker = None;
                }
                SubtaskOutcome::TimedOut => {}
            }
            Ok(())
        });
    }
}

#[async_trait]
impl SubtaskDispatch for FakeDispatch {
    async fn submit(&self, subtask: &hive_core::Subtask) -> Result<(), DispatchError> {
        self.submitted.lock().push(subtask.id.clone());
        Ok(())
    }

    async fn await_result(
        &self,
        subtask: &SubtaskId,
        timeout: Duration,
    ) -> Result<SubtaskOutcome, DispatchError> {
        let row = self.store.subtask(subtask).ok_or(DispatchError::ChannelClosed)?;
        // terminal rows replay their outcome (resume / re-attach path)
        match row.status {
            SubtaskStatus::Completed => {
                return Ok(SubtaskOutcome::Completed {
                    output: row.output.unwrap_or(serde_json::Value::Null),
                })
            }
            SubtaskStatus::Cancelled => return Ok(SubtaskOutcome::Cancelled),
            _ => {}
        }
        match self.next_for(&row.name) {
            Scripted::Outcome(outcome) => {
                self.record(subtask, &outcome);
                Ok(outcome)
            }
            Scripted::Hang => {
                tokio::time::sleep(timeout).await;
                Ok(SubtaskOutcome::TimedOut)
            }
        }
    }

    async fn cancel(&self, subtask: &SubtaskId, reason: &str) -> Result<(), DispatchError> {
        self.cancelled.lock().push((subtask.clone(), reason.to_string()));
        Ok(())
    }
}

/// Router fake: fixed choice or scripted failure.
pub struct FakeRouter {
    choice: Option<String>,
    fail: bool,
}

impl FakeRouter {
    pub fn always(label: &str) -> Self {
        Self { choice: Some(label.to_string()), fail: false }
    }

    pub fn failing() -> Self {
        Self { choice: None, fail: true }
    }
}

#[async_trait]
impl RouteSelector for FakeRouter {
    async fn select(
        &self,
        _workflow: &WorkflowId,
        _context: &serde_json::Value,
        _routes: &[String],
    ) -> Result<String, DispatchError> {
        if self.fail {
            return Err(DispatchError::RouterUnavailable("scripted failure".to_string()));
        }
        self.choice
            .clone()
            .ok_or_else(|| DispatchError::RouterUnavailable("no choice".to_string()))
    }
}

/// Notifier fake recording every event.
#[derive(Default)]
pub struct RecordingNotifier {
    events: Mutex<Vec<NotifyEvent>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<NotifyEvent> {
        self.events.lock().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, event: NotifyEvent) {
        self.events.lock().push(event);
    }
}
