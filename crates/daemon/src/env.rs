// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon configuration from `HIVE_*` environment variables.

use std::str::FromStr;

/// Runtime configuration with shipped defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// Listener bind address (`HIVE_BIND`).
    pub bind_addr: String,
    /// Worker heartbeat cadence (`HIVE_HEARTBEAT_INTERVAL_SECS`).
    pub heartbeat_interval_ms: u64,
    /// Heartbeat silence before a worker counts as stale
    /// (`HIVE_STALE_AFTER_SECS`).
    pub stale_after_ms: u64,
    /// Heartbeat silence before a worker counts as dead
    /// (`HIVE_DEAD_AFTER_SECS`).
    pub dead_after_ms: u64,
    /// Reaper sweep cadence (`HIVE_REAPER_INTERVAL_SECS`).
    pub reaper_interval_ms: u64,
    /// Allocator fallback cadence (`HIVE_ALLOCATOR_INTERVAL_SECS`).
    pub allocator_interval_ms: u64,
    /// Per-subtask wall-clock budget (`HIVE_SUBTASK_TIMEOUT_SECS`).
    pub subtask_timeout_ms: u64,
    /// Concurrent branch executions per workflow
    /// (`HIVE_MAX_PARALLEL_BRANCHES`).
    pub max_parallel_branches: usize,
    /// Scoring weights (`HIVE_TOOL_WEIGHT` etc.); normalized to sum 1.
    pub tool_weight: f64,
    pub resource_weight: f64,
    pub privacy_weight: f64,
    /// Minimum viable pairing score (`HIVE_MIN_SCORE`).
    pub min_score: f64,
    /// Maximum wire frame length in bytes (`HIVE_MAX_FRAME_LEN`).
    pub max_frame_len: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:7431".to_string(),
            heartbeat_interval_ms: 30_000,
            stale_after_ms: 120_000,
            dead_after_ms: 300_000,
            reaper_interval_ms: 30_000,
            allocator_interval_ms: 5_000,
            subtask_timeout_ms: 3_600_000,
            max_parallel_branches: 10,
            tool_weight: 0.5,
            resource_weight: 0.3,
            privacy_weight: 0.2,
            min_score: 0.3,
            max_frame_len: 1024 * 1024,
        }
    }
}

fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(raw) => match raw.parse() {
            Ok(value) => value,
            Err(_) => {
                tracing::warn!(key, raw, "invalid value; using default");
                default
            }
        },
        Err(_) => default,
    }
}

fn env_secs_ms(key: &str, default_ms: u64) -> u64 {
    env_parse(key, default_ms / 1_000) * 1_000
}

impl Config {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            bind_addr: std::env::var("HIVE_BIND").unwrap_or(defaults.bind_addr),
            heartbeat_interval_ms: env_secs_ms(
                "HIVE_HEARTBEAT_INTERVAL_SECS",
                defaults.heartbeat_interval_ms,
            ),
            stale_after_ms: env_secs_ms("HIVE_STALE_AFTER_SECS", defaults.stale_after_ms),
            dead_after_ms: env_secs_ms("HIVE_DEAD_AFTER_SECS", defaults.dead_after_ms),
            reaper_interval_ms: env_secs_ms(
                "HIVE_REAPER_INTERVAL_SECS",
                defaults.reaper_interval_ms,
            ),
            allocator_interval_ms: env_secs_ms(
                "HIVE_ALLOCATOR_INTERVAL_SECS",
                defaults.allocator_interval_ms,
            ),
            subtask_timeout_ms: env_secs_ms(
                "HIVE_SUBTASK_TIMEOUT_SECS",
                defaults.subtask_timeout_ms,
            ),
            max_parallel_branches: env_parse(
                "HIVE_MAX_PARALLEL_BRANCHES",
                defaults.max_parallel_branches,
            ),
            tool_weight: env_parse("HIVE_TOOL_WEIGHT", defaults.tool_weight),
            resource_weight: env_parse("HIVE_RESOURCE_WEIGHT", defaults.resource_weight),
            privacy_weight: env_parse("HIVE_PRIVACY_WEIGHT", defaults.privacy_weight),
            min_score: env_parse("HIVE_MIN_SCORE", defaults.min_score),
            max_frame_len: env_parse("HIVE_MAX_FRAME_LEN", defaults.max_frame_len),
        }
    }
}

#[cfg(test)]
#[path = "env_tests.rs"]
mod tests;
