// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Engine errors.

use crate::dispatch::DispatchError;
use hive_core::CoreError;
use hive_storage::StoreError;
use thiserror::Error;

/// Errors from workflow execution and review coordination.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    #[error("checkpoint {0} is not pending")]
    CheckpointClosed(String),

    #[error("missing required review fields: {}", fields.join(", "))]
    MissingReviewFields { fields: Vec<String> },

    #[error("node {node} is not awaiting review")]
    NotAwaitingReview { node: String },

    #[error("unknown workflow template: {0}")]
    UnknownTemplate(String),
}

impl EngineError {
    /// The taxonomy kind code, when this error maps onto one.
    pub fn kind(&self) -> Option<&'static str> {
        match self {
            Self::Core(core) => Some(core.kind()),
            Self::Store(StoreError::StaleVersion { .. }) => Some("stale-version"),
            Self::Store(StoreError::Invalid(core)) => Some(core.kind()),
            _ => None,
        }
    }
}
