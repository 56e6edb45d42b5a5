// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Heartbeat reaper: turns heartbeat silence into recovered subtasks.
//!
//! Each sweep classifies workers by silence. Stale workers with a live
//! connection only warn; dead workers go offline, lose their
//! connection, and every subtask they held returns to the queue with a
//! bumped recovery counter, all in one durable transaction per worker,
//! so no half-recovered state is observable. The sweep also expires
//! overdue review checkpoints.

use crate::connection::ConnectionManager;
use hive_core::{Clock, SubtaskStatus, Worker, WorkerStatus};
use hive_engine::{Notifier, NotifyEvent, ReviewCoordinator, SubtaskDispatch};
use hive_storage::{DurableStore, KvStore};
use hive_wire::close_code;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone)]
pub struct ReaperConfig {
    pub interval_ms: u64,
    /// Silence after which a worker is stale (warning only).
    pub stale_after_ms: u64,
    /// Silence after which a worker is dead (recovered).
    pub dead_after_ms: u64,
}

impl Default for ReaperConfig {
    fn default() -> Self {
        Self { interval_ms: 30_000, stale_after_ms: 120_000, dead_after_ms: 300_000 }
    }
}

pub struct HeartbeatReaper<D, C>
where
    D: SubtaskDispatch,
    C: Clock,
{
    store: DurableStore,
    kv: KvStore<C>,
    conns: Arc<ConnectionManager<C>>,
    reviews: Arc<ReviewCoordinator<D, C>>,
    notifier: Arc<dyn Notifier>,
    allocator_kick: Arc<Notify>,
    clock: C,
    config: ReaperConfig,
}

impl<D, C> HeartbeatReaper<D, C>
where
    D: SubtaskDispatch,
    C: Clock + 'static,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: DurableStore,
        kv: KvStore<C>,
        conns: Arc<ConnectionManager<C>>,
        reviews: Arc<ReviewCoordinator<D, C>>,
        notifier: Arc<dyn Notifier>,
        allocator_kick: Arc<Notify>,
        clock: C,
        config: ReaperConfig,
    ) -> Self {
        Self { store, kv, conns, reviews, notifier, allocator_kick, clock, config }
    }

    /// One sweep over workers and the review queue.
    pub async fn sweep(&self) {
        let now = self.clock.epoch_ms();
        for worker in self.store.workers() {
            if worker.status == WorkerStatus::Offline {
                continue;
            }
            let silence = worker.silence_ms(now);
            if silence >= self.config.dead_after_ms {
                self.reap(&worker).await;
            } else if silence >= self.config.stale_after_ms {
                tracing::warn!(worker = %worker.id, silence_ms = silence,
                    connected = self.conns.is_connected(&worker.id), "worker heartbeat stale");
            }
        }

        self.reviews.expire_due().await;
    }

    /// Mark a dead worker offline and recover everything it held.
    async fn reap(&self, worker: &Worker) {
        let recovered = self.store.txn(|t| {
            t.rmw_worker(&worker.id, |w| {
                w.status = WorkerStatus::Offline;
                Ok(())
            })?;
            let held: Vec<_> = t
                .subtasks
                .values()
                .filter(|s| {
                    s.status == SubtaskStatus::InProgress
                        && s.assigned_worker.as_ref() == Some(&worker.id)
                })
                .map(|s| s.id.clone())
                .collect();
            let mut recovered = Vec::new();
            for id in held {
                t.rmw_subtask(&id, |s| {
                    s.status = SubtaskStatus::Pending;
                    s.assigned_worker = None;
                    s.recovery_count += 1;
                    Ok(())
                })?;
                if let Some(s) = t.subtasks.get(&id) {
                    recovered.push((id.clone(), s.priority, s.created_at_ms));
                }
            }
            Ok(recovered)
        });

        let recovered = match recovered {
            Ok(recovered) => recovered,
            Err(error) => {
                tracing::error!(worker = %worker.id, %error, "reap transaction failed");
                return;
            }
        };

        self.conns.teardown(&worker.id, close_code::NORMAL, "worker dead").await;
        self.kv.clear_worker_current_task(&worker.id);
        self.kv.set_worker_status(&worker.id, WorkerStatus::Offline);
        for (id, priority, created_at_ms) in &recovered {
            self.kv.clear_in_progress(id);
            self.kv.queue_push(id, *priority, *created_at_ms);
        }
        self.notifier.notify(NotifyEvent::WorkerOffline { worker: worker.id.clone() }).await;
        if !recovered.is_empty() {
            self.allocator_kick.notify_one();
        }
        tracing::warn!(worker = %worker.id, recovered = recovered.len(),
            "dead worker reaped");
    }

    /// Periodic sweep loop.
    pub async fn run(&self, cancel: CancellationToken) {
        let interval = Duration::from_millis(self.config.interval_ms.max(1));
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }
            self.sweep().await;
        }
    }
}

#[cfg(test)]
#[path = "reaper_tests.rs"]
mod tests;
