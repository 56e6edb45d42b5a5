// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Store errors.

use hive_core::CoreError;
use thiserror::Error;

/// Errors from the durable store.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum StoreError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Optimistic-lock collision; re-read and retry the enclosing
    /// read-compute-commit.
    #[error("stale version on {entity} {id}: expected {expected}, found {found}")]
    StaleVersion { entity: &'static str, id: String, expected: u64, found: u64 },

    #[error("duplicate {entity}: {id}")]
    Duplicate { entity: &'static str, id: String },

    /// A commit precondition no longer holds (e.g. the subtask is no
    /// longer pending). The caller skips and continues.
    #[error("conflict: {0}")]
    Conflict(String),

    #[error(transparent)]
    Invalid(#[from] CoreError),
}

impl StoreError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound { entity, id: id.to_string() }
    }

    pub fn is_stale(&self) -> bool {
        matches!(self, Self::StaleVersion { .. })
    }
}
