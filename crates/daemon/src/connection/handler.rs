// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-connection receive loop with keepalive.

use super::{Connection, ConnectionManager, FrameIngest, FrameSource};
use hive_core::Clock;
use hive_wire::{close_code, ServerFrame};
use std::sync::Arc;
use std::time::Duration;

/// Drain incoming frames and hand each to the typed ingest. Sends a
/// `ping` after 2× the heartbeat interval of silence; two consecutive
/// missed responses tear the connection down.
pub async fn serve<C: Clock + 'static>(
    manager: Arc<ConnectionManager<C>>,
    ingest: Arc<FrameIngest<C>>,
    conn: Arc<Connection>,
    mut source: impl FrameSource,
) {
    let idle_after = Duration::from_millis(manager.heartbeat_interval_ms() * 2);
    loop {
        tokio::select! {
            _ = conn.cancelled().cancelled() => break,

            frame = source.next() => match frame {
                Some(Ok(envelope)) => {
                    conn.mark_alive();
                    let kind = envelope.frame.kind();
                    if let Err(error) = ingest.handle(&conn.worker, envelope.frame).await {
                        tracing::warn!(worker = %conn.worker, kind, %error, "frame rejected");
                    }
                }
                Some(Err(error)) => {
                    tracing::warn!(worker = %conn.worker, %error, "receive error");
                    manager
                        .teardown_conn(&conn, close_code::INTERNAL, "protocol error")
                        .await;
                    break;
                }
                None => {
                    manager.teardown_conn(&conn, close_code::NORMAL, "closed").await;
                    break;
                }
            },

            _ = tokio::time::sleep(idle_after) => {
                if conn.missed() >= 2 {
                    tracing::warn!(worker = %conn.worker, "keepalive exhausted");
                    manager
                        .teardown_conn(&conn, close_code::NORMAL, "keepalive timeout")
                        .await;
                    break;
                }
                conn.bump_missed();
                if !manager.send(&conn.worker, ServerFrame::Ping {}).await {
                    break;
                }
            }
        }
    }
}
