// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker API-key authentication.
//!
//! Keys are issued once at registration (`wk_` prefix) and stored only
//! as SHA-256 hashes. A frame stream presents its key via the
//! `X-Worker-API-Key` header, an `api_key` query parameter, or an
//! `Authorization: Bearer wk_…` fallback; the resolved worker id is
//! bound to the connection for its lifetime.

use hive_core::{Clock, IdGen, Worker, WorkerId};
use hive_storage::{DurableStore, StoreError};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Worker API keys are recognizable by prefix.
pub const KEY_PREFIX: &str = "wk_";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// No credential presented, or the hash matched no worker row.
    /// Connections close with code 4401.
    #[error("api key did not validate")]
    InvalidKey,
}

/// Mint a fresh API key (returned to the worker exactly once).
pub fn generate_api_key() -> String {
    format!("{KEY_PREFIX}{}", uuid::Uuid::new_v4().simple())
}

/// SHA-256 hex of a key, the only form at rest.
pub fn hash_api_key(key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Pick the API key out of the upgrade request.
pub fn extract_api_key(
    header: Option<&str>,
    authorization: Option<&str>,
    query: Option<&str>,
) -> Option<String> {
    if let Some(key) = header {
        if !key.is_empty() {
            return Some(key.to_string());
        }
    }
    if let Some(bearer) = authorization.and_then(|a| a.strip_prefix("Bearer ")) {
        if bearer.starts_with(KEY_PREFIX) {
            return Some(bearer.to_string());
        }
    }
    if let Some(query) = query {
        for pair in query.split('&') {
            if let Some(value) = pair.strip_prefix("api_key=") {
                if !value.is_empty() {
                    return Some(value.to_string());
                }
            }
        }
    }
    None
}

/// Resolve a presented key to its worker row.
pub fn authenticate(store: &DurableStore, key: &str) -> Result<Worker, AuthError> {
    store.worker_by_key_hash(&hash_api_key(key)).ok_or(AuthError::InvalidKey)
}

/// First-contact registration payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Registration {
    pub machine_id: String,
    pub machine_name: String,
    pub tools: Vec<String>,
    pub system_info: std::collections::HashMap<String, serde_json::Value>,
}

/// Register a worker, or refresh the existing row for a machine id.
/// The plaintext key is returned only when freshly minted.
pub fn register_worker(
    store: &DurableStore,
    id_gen: &dyn IdGen,
    clock: &impl Clock,
    registration: Registration,
) -> Result<(Worker, Option<String>), StoreError> {
    let now = clock.epoch_ms();
    if let Some(existing) = store.worker_by_machine(&registration.machine_id) {
        // same machine id resolves to the same worker id, with a
        // reset heartbeat
        store.rmw_worker(&existing.id, |w| {
            w.machine_name = registration.machine_name.clone();
            w.tools = registration.tools.clone();
            w.system_info = registration.system_info.clone();
            w.last_heartbeat_ms = now;
            Ok(())
        })?;
        return Ok((
            store
                .worker(&existing.id)
                .ok_or_else(|| StoreError::not_found("worker", &existing.id))?,
            None,
        ));
    }

    let key = generate_api_key();
    let mut worker = Worker::new(
        WorkerId::new(id_gen.id("wk")),
        registration.machine_id,
        registration.machine_name,
        hash_api_key(&key),
        clock,
    );
    worker.tools = registration.tools;
    worker.system_info = registration.system_info;
    store.insert_worker(worker.clone())?;
    tracing::info!(worker = %worker.id, machine = %worker.machine_id, "worker registered");
    Ok((worker, Some(key)))
}

#[cfg(test)]
#[path = "auth_tests.rs"]
mod tests;
