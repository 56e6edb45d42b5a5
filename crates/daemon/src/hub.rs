// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Completion hub bridging connection ingest to executor awaits.
//!
//! One watch channel per subtask; the latest terminal observation is
//! retained, so late subscribers (resume, re-attach) see it
//! immediately. At-least-once tolerant: publishing the same terminal
//! outcome twice is harmless.

use hive_core::SubtaskId;
use hive_engine::SubtaskOutcome;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::watch;

#[derive(Default)]
pub struct ResultHub {
    channels: Mutex<HashMap<SubtaskId, watch::Sender<Option<SubtaskOutcome>>>>,
}

impl ResultHub {
    pub fn new() -> Self {
        Self::default()
    }

    fn subscribe(&self, id: &SubtaskId) -> watch::Receiver<Option<SubtaskOutcome>> {
        let mut channels = self.channels.lock();
        channels
            .entry(id.clone())
            .or_insert_with(|| watch::channel(None).0)
            .subscribe()
    }

    /// Publish a terminal observation for a subtask.
    pub fn publish(&self, id: &SubtaskId, outcome: SubtaskOutcome) {
        let sender = {
            let mut channels = self.channels.lock();
            channels.entry(id.clone()).or_insert_with(|| watch::channel(None).0).clone()
        };
        let _ = sender.send(Some(outcome));
    }

    /// Drop a subtask's channel once its workflow is done with it.
    pub fn forget(&self, id: &SubtaskId) {
        self.channels.lock().remove(id);
    }

    /// Wait for a terminal observation up to `timeout`. `None` means
    /// the budget elapsed first.
    pub async fn wait(&self, id: &SubtaskId, timeout: Duration) -> Option<SubtaskOutcome> {
        let mut rx = self.subscribe(id);
        let deadline = tokio::time::sleep(timeout);
        tokio::pin!(deadline);
        loop {
            let cur = rx.borrow_and_update().clone();
            eprintln!("DEBUG wait loop: {:?}", cur);
            if let Some(outcome) = cur {
                return Some(outcome);
            }
            tokio::select! {
                changed = rx.changed() => {
                    if changed.is_err() {
                        return None;
                    }
                }
                _ = &mut deadline => return None,
            }
        }
    }
}

#[cfg(test)]
#[path = "hub_tests.rs"]
mod tests;
