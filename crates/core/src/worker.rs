// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker agents: registration record, liveness, and resource metrics.

use crate::clock::Clock;
use crate::id::WorkerId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Worker lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerStatus {
    /// Registered and reachable, assignment state unknown.
    Online,
    /// Connected and holding no assignment.
    Idle,
    /// Holding an in-progress subtask.
    Busy,
    /// Heartbeat silence exceeded the dead threshold, or operator action.
    Offline,
}

impl WorkerStatus {
    pub fn is_available(&self) -> bool {
        matches!(self, Self::Idle)
    }
}

crate::simple_display! {
    WorkerStatus {
        Online => "online",
        Idle => "idle",
        Busy => "busy",
        Offline => "offline",
    }
}

/// Point-in-time resource usage reported in heartbeats.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResourceMetrics {
    pub cpu_percent: f64,
    pub memory_percent: f64,
    pub disk_percent: f64,
}

/// Where a tool executes, for privacy scoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolLocality {
    Local,
    Cloud,
}

/// Classify a tool name by execution locality.
///
/// Local models (ollama and anything advertised `local_*`) keep task
/// content on the worker machine; everything else is assumed to call out.
pub fn tool_locality(tool: &str) -> ToolLocality {
    if tool == "ollama" || tool.starts_with("local_") {
        ToolLocality::Local
    } else {
        ToolLocality::Cloud
    }
}

/// A registered worker agent.
///
/// Registered on first contact; re-registration with the same machine id
/// resolves to the same worker. Deleted only by explicit operator action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Worker {
    pub id: WorkerId,
    pub machine_id: String,
    pub machine_name: String,
    /// AI tools this worker can run.
    #[serde(default)]
    pub tools: Vec<String>,
    pub status: WorkerStatus,
    pub last_heartbeat_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<ResourceMetrics>,
    #[serde(default)]
    pub system_info: HashMap<String, serde_json::Value>,
    /// SHA-256 hex of the worker API key; the key itself is never stored.
    pub api_key_hash: String,
    pub registered_at_ms: u64,
    /// Optimistic-concurrency row version.
    pub version: u64,
}

impl Worker {
    pub fn new(
        id: WorkerId,
        machine_id: impl Into<String>,
        machine_name: impl Into<String>,
        api_key_hash: impl Into<String>,
        clock: &impl Clock,
    ) -> Self {
        let now = clock.epoch_ms();
        Self {
            id,
            machine_id: machine_id.into(),
            machine_name: machine_name.into(),
            tools: Vec::new(),
            status: WorkerStatus::Online,
            last_heartbeat_ms: now,
            metrics: None,
            system_info: HashMap::new(),
            api_key_hash: api_key_hash.into(),
            registered_at_ms: now,
            version: 1,
        }
    }

    /// Milliseconds of heartbeat silence as of `now_ms`.
    pub fn silence_ms(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.last_heartbeat_ms)
    }

    /// Does this worker offer any local-only tool?
    pub fn has_local_tool(&self) -> bool {
        self.tools.iter().any(|t| tool_locality(t) == ToolLocality::Local)
    }

    /// Does this worker offer any cloud tool?
    pub fn has_cloud_tool(&self) -> bool {
        self.tools.iter().any(|t| tool_locality(t) == ToolLocality::Cloud)
    }
}

#[cfg(test)]
#[path = "worker_tests.rs"]
mod tests;
