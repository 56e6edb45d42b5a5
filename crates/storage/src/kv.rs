// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Ephemeral KV store.
//!
//! Key layout (all values JSON unless noted):
//! - `worker:current_task:<worker_id>` → subtask id (TTL = subtask timeout)
//! - `worker:status:<worker_id>` → status string
//! - `subtasks:queue` → subtask ids, priority-ordered
//! - `subtasks:in_progress` → set of subtask ids
//! - `review:request:<checkpoint_id>` → serialized checkpoint
//! - `review:queue`, `review:user:<user_id>` → sorted by creation time
//! - `auth:blacklist:<jti>` → revoked token marker (TTL)
//!
//! The store is a cache: entries may vanish (TTL or process loss) and
//! every consumer re-derives from the durable store.

use hive_core::{Checkpoint, CheckpointId, Clock, SubtaskId, WorkerId, WorkerStatus};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at_ms: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct QueueEntry {
    subtask: SubtaskId,
    priority: u8,
    created_at_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct ReviewEntry {
    checkpoint: CheckpointId,
    assignee: Option<String>,
    created_at_ms: u64,
}

#[derive(Default)]
struct KvInner {
    entries: HashMap<String, Entry>,
    queue: Vec<QueueEntry>,
    in_progress: HashSet<SubtaskId>,
    reviews: Vec<ReviewEntry>,
}

impl KvInner {
    fn purge_expired(&mut self, now_ms: u64) {
        self.entries
            .retain(|_, entry| entry.expires_at_ms.is_none_or(|at| at > now_ms));
    }
}

/// Handle to the shared KV state. Cheap to clone.
#[derive(Clone)]
pub struct KvStore<C: Clock> {
    inner: Arc<Mutex<KvInner>>,
    clock: C,
}

impl<C: Clock> KvStore<C> {
    pub fn new(clock: C) -> Self {
        Self { inner: Arc::new(Mutex::new(KvInner::default())), clock }
    }

    fn get(&self, key: &str) -> Option<String> {
        let mut inner = self.inner.lock();
        inner.purge_expired(self.clock.epoch_ms());
        inner.entries.get(key).map(|e| e.value.clone())
    }

    fn set(&self, key: String, value: String, ttl_ms: Option<u64>) {
        let expires_at_ms = ttl_ms.map(|ttl| self.clock.epoch_ms() + ttl);
        self.inner.lock().entries.insert(key, Entry { value, expires_at_ms });
    }

    fn del(&self, key: &str) {
        self.inner.lock().entries.remove(key);
    }

    // -- worker mirrors --

    /// Record the worker's live assignment with a TTL matching the
    /// subtask timeout.
    pub fn set_worker_current_task(&self, worker: &WorkerId, subtask: &SubtaskId, ttl_ms: u64) {
        self.set(format!("worker:current_task:{worker}"), subtask.to_string(), Some(ttl_ms));
    }

    pub fn worker_current_task(&self, worker: &WorkerId) -> Option<SubtaskId> {
        self.get(&format!("worker:current_task:{worker}")).map(SubtaskId::new)
    }

    pub fn clear_worker_current_task(&self, worker: &WorkerId) {
        self.del(&format!("worker:current_task:{worker}"));
    }

    pub fn set_worker_status(&self, worker: &WorkerId, status: WorkerStatus) {
        self.set(format!("worker:status:{worker}"), status.to_string(), None);
    }

    pub fn worker_status(&self, worker: &WorkerId) -> Option<String> {
        self.get(&format!("worker:status:{worker}"))
    }

    // -- subtask queue --

    /// Enqueue a subtask id; replaces any existing entry for the id.
    pub fn queue_push(&self, subtask: &SubtaskId, priority: u8, created_at_ms: u64) {
        let mut inner = self.inner.lock();
        inner.queue.retain(|e| e.subtask != *subtask);
        inner.queue.push(QueueEntry { subtask: subtask.clone(), priority, created_at_ms });
    }

    pub fn queue_remove(&self, subtask: &SubtaskId) {
        self.inner.lock().queue.retain(|e| e.subtask != *subtask);
    }

    /// Queue snapshot, priority-ordered (descending), ties by age.
    pub fn queue_snapshot(&self) -> Vec<SubtaskId> {
        let mut queue = self.inner.lock().queue.clone();
        queue.sort_by(|a, b| {
            b.priority.cmp(&a.priority).then(a.created_at_ms.cmp(&b.created_at_ms))
        });
        queue.into_iter().map(|e| e.subtask).collect()
    }

    pub fn queue_len(&self) -> usize {
        self.inner.lock().queue.len()
    }

    // -- in-progress set --

    pub fn mark_in_progress(&self, subtask: &SubtaskId) {
        self.inner.lock().in_progress.insert(subtask.clone());
    }

    pub fn clear_in_progress(&self, subtask: &SubtaskId) {
        self.inner.lock().in_progress.remove(subtask);
    }

    pub fn in_progress(&self) -> HashSet<SubtaskId> {
        self.inner.lock().in_progress.clone()
    }

    // -- review queue --

    /// Mirror a checkpoint into the indexed review queue.
    pub fn put_review(&self, checkpoint: &Checkpoint) {
        let serialized = match serde_json::to_string(checkpoint) {
            Ok(s) => s,
            Err(e) => {
                // Cache write only; the durable row is the source of truth.
                tracing::warn!(checkpoint = %checkpoint.id, error = %e, "review mirror skipped");
                return;
            }
        };
        self.set(format!("review:request:{}", checkpoint.id), serialized, None);
        let mut inner = self.inner.lock();
        inner.reviews.retain(|e| e.checkpoint != checkpoint.id);
        inner.reviews.push(ReviewEntry {
            checkpoint: checkpoint.id.clone(),
            assignee: checkpoint.assignee.clone(),
            created_at_ms: checkpoint.created_at_ms,
        });
    }

    pub fn drop_review(&self, id: &CheckpointId) {
        self.del(&format!("review:request:{id}"));
        self.inner.lock().reviews.retain(|e| e.checkpoint != *id);
    }

    pub fn review(&self, id: &CheckpointId) -> Option<Checkpoint> {
        let raw = self.get(&format!("review:request:{id}"))?;
        serde_json::from_str(&raw).ok()
    }

    /// All queued reviews, oldest first.
    pub fn review_queue(&self) -> Vec<CheckpointId> {
        let mut reviews = self.inner.lock().reviews.clone();
        reviews.sort_by_key(|e| e.created_at_ms);
        reviews.into_iter().map(|e| e.checkpoint).collect()
    }

    /// Reviews assigned to one user, oldest first.
    pub fn reviews_for_user(&self, user: &str) -> Vec<CheckpointId> {
        let mut reviews: Vec<ReviewEntry> = self
            .inner
            .lock()
            .reviews
            .iter()
            .filter(|e| e.assignee.as_deref() == Some(user))
            .cloned()
            .collect();
        reviews.sort_by_key(|e| e.created_at_ms);
        reviews.into_iter().map(|e| e.checkpoint).collect()
    }

    // -- token blacklist --

    pub fn blacklist_token(&self, jti: &str, ttl_ms: u64) {
        self.set(format!("auth:blacklist:{jti}"), "revoked".to_string(), Some(ttl_ms));
    }

    pub fn is_token_blacklisted(&self, jti: &str) -> bool {
        self.get(&format!("auth:blacklist:{jti}")).is_some()
    }
}

/// Thin, injectable wrapper over the KV blacklist keys; constructed at
/// boot and threaded through, never a process-global.
#[derive(Clone)]
pub struct TokenBlacklist<C: Clock> {
    kv: KvStore<C>,
}

impl<C: Clock> TokenBlacklist<C> {
    pub fn new(kv: KvStore<C>) -> Self {
        Self { kv }
    }

    pub fn revoke(&self, jti: &str, ttl_ms: u64) {
        self.kv.blacklist_token(jti, ttl_ms);
    }

    pub fn contains(&self, jti: &str) -> bool {
        self.kv.is_token_blacklisted(jti)
    }
}

#[cfg(test)]
#[path = "kv_tests.rs"]
mod tests;
