// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Frame types exchanged with worker agents.

use hive_core::WorkerStatus;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Close codes used when tearing down a worker channel.
pub mod close_code {
    /// Normal closure (also used with reason "superseded").
    pub const NORMAL: u16 = 1000;
    /// Unexpected server error.
    pub const INTERNAL: u16 = 1011;
    /// API key did not validate.
    pub const AUTH_FAILED: u16 = 4401;
    /// The worker row no longer exists.
    pub const WORKER_DELETED: u16 = 4409;
}

/// Close reason when a new connection replaces an old one.
pub const REASON_SUPERSEDED: &str = "superseded";

/// Wire envelope: a frame plus its emission timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope<F> {
    #[serde(flatten)]
    pub frame: F,
    /// RFC3339; informational, never used for ordering decisions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

impl<F> Envelope<F> {
    pub fn new(frame: F, timestamp: impl Into<String>) -> Self {
        Self { frame, timestamp: Some(timestamp.into()) }
    }

    pub fn bare(frame: F) -> Self {
        Self { frame, timestamp: None }
    }
}

/// Result payload of a `task_result` frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResultData {
    pub output: serde_json::Value,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
    /// Wall-clock seconds the worker spent executing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_time: Option<f64>,
}

/// Frames sent by workers to the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum WorkerFrame {
    Register {
        machine_id: String,
        machine_name: String,
        #[serde(default)]
        tools: Vec<String>,
        #[serde(default)]
        system_info: HashMap<String, serde_json::Value>,
    },
    Heartbeat {
        status: WorkerStatus,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cpu_percent: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        memory_percent: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        disk_percent: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        current_task: Option<String>,
    },
    TaskProgress {
        task_id: String,
        progress: u8,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    TaskResult {
        task_id: String,
        result: TaskResultData,
    },
    TaskFailed {
        task_id: String,
        error: String,
    },
    TaskRejected {
        task_id: String,
        reason: String,
    },
    Pong {},
}

impl WorkerFrame {
    /// Kind tag as it appears on the wire.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Register { .. } => "register",
            Self::Heartbeat { .. } => "heartbeat",
            Self::TaskProgress { .. } => "task_progress",
            Self::TaskResult { .. } => "task_result",
            Self::TaskFailed { .. } => "task_failed",
            Self::TaskRejected { .. } => "task_rejected",
            Self::Pong {} => "pong",
        }
    }
}

/// Frames sent by the server to workers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ServerFrame {
    TaskAssignment {
        subtask_id: String,
        description: String,
        assigned_tool: String,
        #[serde(default)]
        context: HashMap<String, serde_json::Value>,
        timeout_seconds: u64,
    },
    TaskCancel {
        subtask_id: String,
        reason: String,
    },
    Ping {},
    RegisterAck {
        worker_id: String,
        status: String,
    },
    HeartbeatAck {
        status: String,
    },
    Notification(serde_json::Value),
}

impl ServerFrame {
    /// Kind tag as it appears on the wire.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::TaskAssignment { .. } => "task_assignment",
            Self::TaskCancel { .. } => "task_cancel",
            Self::Ping {} => "ping",
            Self::RegisterAck { .. } => "register_ack",
            Self::HeartbeatAck { .. } => "heartbeat_ack",
            Self::Notification(_) => "notification",
        }
    }
}

#[cfg(test)]
#[path = "frame_tests.rs"]
mod tests;
