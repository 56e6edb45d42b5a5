// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory worker channel for tests: a sink that records frames (and
//! can be told to fail) plus a source fed from a handle, no sockets.

use super::{FrameSink, FrameSource};
use async_trait::async_trait;
use hive_wire::{Envelope, ServerFrame, WireError, WorkerFrame};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Observer/controller side of a [`TestChannel`].
#[derive(Clone)]
pub struct ChannelHandle {
    sent: Arc<Mutex<Vec<Envelope<ServerFrame>>>>,
    closed: Arc<Mutex<Option<(u16, String)>>>,
    fail_sends: Arc<AtomicBool>,
    frames_tx: mpsc::UnboundedSender<Result<Envelope<WorkerFrame>, WireError>>,
}

impl ChannelHandle {
    /// Frames the server wrote to this worker.
    pub fn sent(&self) -> Vec<ServerFrame> {
        self.sent.lock().iter().map(|e| e.frame.clone()).collect()
    }

    /// Close code and reason, if the server closed the channel.
    pub fn closed(&self) -> Option<(u16, String)> {
        self.closed.lock().clone()
    }

    /// Make every subsequent write fail (a dead socket).
    pub fn break_pipe(&self) {
        self.fail_sends.store(true, Ordering::Relaxed);
    }

    /// Deliver a frame as if the worker sent it.
    pub fn push_frame(&self, frame: WorkerFrame) {
        let _ = self.frames_tx.send(Ok(Envelope::bare(frame)));
    }

    /// Deliver a protocol error to the receive loop.
    pub fn push_error(&self) {
        let _ = self.frames_tx.send(Err(WireError::Closed));
    }
}

pub struct TestSink {
    sent: Arc<Mutex<Vec<Envelope<ServerFrame>>>>,
    closed: Arc<Mutex<Option<(u16, String)>>>,
    fail_sends: Arc<AtomicBool>,
}

#[async_trait]
impl FrameSink for TestSink {
    async fn send(&mut self, frame: &Envelope<ServerFrame>) -> Result<(), WireError> {
        if self.fail_sends.load(Ordering::Relaxed) {
            return Err(WireError::Closed);
        }
        self.sent.lock().push(frame.clone());
        Ok(())
    }

    async fn close(&mut self, code: u16, reason: &str) -> Result<(), WireError> {
        *self.closed.lock() = Some((code, reason.to_string()));
        Ok(())
    }
}

pub struct TestSource {
    frames_rx: mpsc::UnboundedReceiver<Result<Envelope<WorkerFrame>, WireError>>,
}

#[async_trait]
impl FrameSource for TestSource {
    async fn next(&mut self) -> Option<Result<Envelope<WorkerFrame>, WireError>> {
        self.frames_rx.recv().await
    }
}

/// Build a connected (handle, sink, source) triple.
pub fn test_channel() -> (ChannelHandle, TestSink, TestSource) {
    let (frames_tx, frames_rx) = mpsc::unbounded_channel();
    let sent = Arc::new(Mutex::new(Vec::new()));
    let closed = Arc::new(Mutex::new(None));
    let fail_sends = Arc::new(AtomicBool::new(false));
    (
        ChannelHandle {
            sent: sent.clone(),
            closed: closed.clone(),
            fail_sends: fail_sends.clone(),
            frames_tx,
        },
        TestSink { sent, closed, fail_sends },
        TestSource { frames_rx },
    )
}
