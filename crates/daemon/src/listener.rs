// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! WebSocket listener for worker connections.
//!
//! The API key travels on the upgrade request (`X-Worker-API-Key`
//! header, `api_key` query parameter, or a `Bearer wk_…` fallback); the
//! resolved worker id is bound to the connection for its lifetime.
//! Frames are one JSON envelope per text message.

use crate::auth::{authenticate, extract_api_key};
use crate::connection::{serve, ConnectionManager, FrameIngest, FrameSink, FrameSource};
use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use hive_core::Clock;
use hive_storage::DurableStore;
use hive_wire::{close_code, Envelope, ServerFrame, WireError, WorkerFrame};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::handshake::server::{Request, Response};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use tokio_util::sync::CancellationToken;

struct WsSink {
    write: SplitSink<WebSocketStream<TcpStream>, Message>,
}

#[async_trait]
impl FrameSink for WsSink {
    async fn send(&mut self, frame: &Envelope<ServerFrame>) -> Result<(), WireError> {
        let mut line = hive_wire::encode_frame(frame)?;
        // the message boundary carries the newline's job
        line.pop();
        let text = String::from_utf8(line).map_err(|_| WireError::Closed)?;
        self.write.send(Message::text(text)).await.map_err(|_| WireError::Closed)
    }

    async fn close(&mut self, code: u16, reason: &str) -> Result<(), WireError> {
        let frame = CloseFrame {
            code: CloseCode::from(code),
            reason: reason.to_string().into(),
        };
        self.write
            .send(Message::Close(Some(frame)))
            .await
            .map_err(|_| WireError::Closed)
    }
}

struct WsSource {
    read: SplitStream<WebSocketStream<TcpStream>>,
    /// Frames still pending from a multi-line text message.
    buffered: VecDeque<Envelope<WorkerFrame>>,
}

#[async_trait]
impl FrameSource for WsSource {
    async fn next(&mut self) -> Option<Result<Envelope<WorkerFrame>, WireError>> {
        loop {
            if let Some(frame) = self.buffered.pop_front() {
                return Some(Ok(frame));
            }
            let message = match self.read.next().await {
                None => return None,
                Some(Err(_)) => return Some(Err(WireError::Closed)),
                Some(Ok(message)) => message,
            };
            let text = match message {
                Message::Text(text) => text.to_string(),
                Message::Binary(bytes) => match String::from_utf8(bytes.to_vec()) {
                    Ok(text) => text,
                    Err(_) => return Some(Err(WireError::Closed)),
                },
                Message::Close(_) => return None,
                // tungstenite answers pings internally
                _ => continue,
            };
            for line in text.lines() {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                match hive_wire::decode_frame::<Envelope<WorkerFrame>>(line.as_bytes()) {
                    Ok(frame) => self.buffered.push_back(frame),
                    Err(error) => return Some(Err(error)),
                }
            }
        }
    }
}

/// Accept loop. One spawned task per worker socket.
pub async fn serve_ws<C: Clock + 'static>(
    listener: TcpListener,
    store: DurableStore,
    manager: Arc<ConnectionManager<C>>,
    ingest: Arc<FrameIngest<C>>,
    cancel: CancellationToken,
) {
    loop {
        let accepted = tokio::select! {
            _ = cancel.cancelled() => break,
            accepted = listener.accept() => accepted,
        };
        match accepted {
            Ok((stream, peer)) => {
                let store = store.clone();
                let manager = manager.clone();
                let ingest = ingest.clone();
                tokio::spawn(async move {
                    if let Err(error) = handle_socket(stream, store, manager, ingest).await {
                        tracing::debug!(%peer, %error, "worker socket ended");
                    }
                });
            }
            Err(error) => tracing::error!(%error, "accept failed"),
        }
    }
}

async fn handle_socket<C: Clock + 'static>(
    stream: TcpStream,
    store: DurableStore,
    manager: Arc<ConnectionManager<C>>,
    ingest: Arc<FrameIngest<C>>,
) -> Result<(), WireError> {
    let mut api_key: Option<String> = None;
    let callback = |request: &Request, response: Response| {
        let header = request
            .headers()
            .get("x-worker-api-key")
            .and_then(|v| v.to_str().ok());
        let authorization = request
            .headers()
            .get("authorization")
            .and_then(|v| v.to_str().ok());
        api_key = extract_api_key(header, authorization, request.uri().query());
        Ok(response)
    };

    let mut ws = tokio_tungstenite::accept_hdr_async(stream, callback)
        .await
        .map_err(|_| WireError::Closed)?;

    let worker = match api_key.as_deref().map(|key| authenticate(&store, key)) {
        Some(Ok(worker)) => worker,
        _ => {
            let frame = CloseFrame {
                code: CloseCode::from(close_code::AUTH_FAILED),
                reason: "auth-failed".to_string().into(),
            };
            let _ = ws.close(Some(frame)).await;
            return Ok(());
        }
    };

    let (write, read) = ws.split();
    let conn = manager
        .accept(worker.id.clone(), Box::new(WsSink { write }))
        .await;
    serve(
        manager,
        ingest,
        conn,
        WsSource { read, buffered: VecDeque::new() },
    )
    .await;
    Ok(())
}
