// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker connection manager.
//!
//! Maintains one live bidirectional channel per connected worker. The
//! worker-id → channel map is the single source of truth for "who is
//! currently connected"; all access is serialized behind one lock. A
//! per-connection send mutex guarantees frame boundaries. Channel
//! errors are local: they tear down that connection only and surface a
//! disconnect event for the release/reaper path.

mod handler;
mod ingest;

pub use handler::serve;
pub use ingest::{FrameIngest, IngestDeps};

use async_trait::async_trait;
use hive_core::{Clock, WorkerId, WorkerStatus};
use hive_storage::{DurableStore, KvStore};
use hive_wire::{close_code, Envelope, ServerFrame, WireError, WorkerFrame, REASON_SUPERSEDED};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Write half of a worker channel. One writer at a time (the manager's
/// per-connection mutex).
#[async_trait]
pub trait FrameSink: Send {
    async fn send(&mut self, frame: &Envelope<ServerFrame>) -> Result<(), WireError>;
    async fn close(&mut self, code: u16, reason: &str) -> Result<(), WireError>;
}

/// Read half of a worker channel. `None` is a clean close.
#[async_trait]
pub trait FrameSource: Send {
    async fn next(&mut self) -> Option<Result<Envelope<WorkerFrame>, WireError>>;
}

/// Liveness events surfaced to the allocator/reaper side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnEvent {
    Connected(WorkerId),
    Disconnected(WorkerId),
}

/// One live worker channel.
pub struct Connection {
    pub worker: WorkerId,
    sink: tokio::sync::Mutex<Box<dyn FrameSink>>,
    cancel: CancellationToken,
    missed_pings: AtomicU32,
}

impl Connection {
    pub(crate) fn cancelled(&self) -> &CancellationToken {
        &self.cancel
    }

    fn mark_alive(&self) {
        self.missed_pings.store(0, Ordering::Relaxed);
    }

    fn missed(&self) -> u32 {
        self.missed_pings.load(Ordering::Relaxed)
    }

    fn bump_missed(&self) -> u32 {
        self.missed_pings.fetch_add(1, Ordering::Relaxed) + 1
    }
}

/// Connection registry and frame router.
pub struct ConnectionManager<C: Clock> {
    store: DurableStore,
    kv: KvStore<C>,
    clock: C,
    conns: parking_lot::Mutex<HashMap<WorkerId, Arc<Connection>>>,
    events: mpsc::Sender<ConnEvent>,
    heartbeat_interval_ms: u64,
}

impl<C: Clock> ConnectionManager<C> {
    pub fn new(
        store: DurableStore,
        kv: KvStore<C>,
        clock: C,
        events: mpsc::Sender<ConnEvent>,
        heartbeat_interval_ms: u64,
    ) -> Self {
        Self {
            store,
            kv,
            clock,
            conns: parking_lot::Mutex::new(HashMap::new()),
            events,
            heartbeat_interval_ms,
        }
    }

    pub(crate) fn heartbeat_interval_ms(&self) -> u64 {
        self.heartbeat_interval_ms
    }

    /// Register a newly opened channel. An existing channel for the
    /// worker is closed with "superseded" first. The worker moves to
    /// idle and a connected event is emitted.
    pub async fn accept(&self, worker: WorkerId, sink: Box<dyn FrameSink>) -> Arc<Connection> {
        let now = self.clock.epoch_ms();
        let conn = Arc::new(Connection {
            worker: worker.clone(),
            sink: tokio::sync::Mutex::new(sink),
            cancel: CancellationToken::new(),
            missed_pings: AtomicU32::new(0),
        });

        let superseded = self.conns.lock().insert(worker.clone(), conn.clone());
        if let Some(old) = superseded {
            old.cancel.cancel();
            let mut sink = old.sink.lock().await;
            let _ = sink.close(close_code::NORMAL, REASON_SUPERSEDED).await;
            tracing::info!(worker = %worker, "previous connection superseded");
        }

        let _ = self.store.rmw_worker(&worker, |w| {
            w.status = WorkerStatus::Idle;
            w.last_heartbeat_ms = now;
            Ok(())
        });
        self.kv.set_worker_status(&worker, WorkerStatus::Idle);

        let _ = self.events.send(ConnEvent::Connected(worker.clone())).await;
        tracing::info!(worker = %worker, total = self.count(), "worker connected");
        conn
    }

    /// Serialize and push one frame. `false` means undelivered; the
    /// channel is torn down and the caller runs its release path.
    pub async fn send(&self, worker: &WorkerId, frame: ServerFrame) -> bool {
        let Some(conn) = self.connection(worker) else {
            tracing::debug!(worker = %worker, kind = frame.kind(), "send to unconnected worker");
            return false;
        };
        let envelope = Envelope::new(frame, chrono::Utc::now().to_rfc3339());
        let result = { conn.sink.lock().await.send(&envelope).await };
        if let Err(error) = result {
            tracing::warn!(worker = %worker, %error, "frame write failed; tearing down");
            self.teardown_conn(&conn, close_code::INTERNAL, "write failed").await;
            return false;
        }
        true
    }

    /// Best-effort fan-out; failed channels are torn down.
    pub async fn broadcast(&self, frame: ServerFrame, exclude: &HashSet<WorkerId>) -> usize {
        let targets: Vec<WorkerId> = {
            self.conns
                .lock()
                .keys()
                .filter(|id| !exclude.contains(*id))
                .cloned()
                .collect()
        };
        let mut delivered = 0;
        for worker in targets {
            if self.send(&worker, frame.clone()).await {
                delivered += 1;
            }
        }
        delivered
    }

    pub fn is_connected(&self, worker: &WorkerId) -> bool {
        self.conns.lock().contains_key(worker)
    }

    pub fn connected_worker_ids(&self) -> Vec<WorkerId> {
        self.conns.lock().keys().cloned().collect()
    }

    pub fn count(&self) -> usize {
        self.conns.lock().len()
    }

    pub(crate) fn connection(&self, worker: &WorkerId) -> Option<Arc<Connection>> {
        self.conns.lock().get(worker).cloned()
    }

    /// Tear down by worker id (reaper/operator path).
    pub async fn teardown(&self, worker: &WorkerId, code: u16, reason: &str) {
        if let Some(conn) = self.connection(worker) {
            self.teardown_conn(&conn, code, reason).await;
        }
    }

    /// Tear down one specific connection. A superseded connection never
    /// removes its replacement from the map.
    pub(crate) async fn teardown_conn(&self, conn: &Arc<Connection>, code: u16, reason: &str) {
        let removed = {
            let mut conns = self.conns.lock();
            match conns.get(&conn.worker) {
                Some(current) if Arc::ptr_eq(current, conn) => {
                    conns.remove(&conn.worker);
                    true
                }
                _ => false,
            }
        };
        conn.cancel.cancel();
        let _ = conn.sink.lock().await.close(code, reason).await;
        if removed {
            let _ = self.events.send(ConnEvent::Disconnected(conn.worker.clone())).await;
            tracing::info!(worker = %conn.worker, code, reason, total = self.count(),
                "worker disconnected");
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
pub mod test_channel;

#[cfg(test)]
#[path = "manager_tests.rs"]
mod manager_tests;
