// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! hive-storage: the two state stores of the control plane.
//!
//! - [`DurableStore`] — source of truth (workflows, nodes, edges,
//!   subtasks, workers, checkpoints, evaluations) with row-version
//!   optimistic concurrency.
//! - [`KvStore`] — ephemeral cache (liveness mirrors, task queue,
//!   review queue, token blacklist). Losses are tolerated and
//!   re-derived; the durable store always wins.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod durable;
mod error;
mod kv;

pub use durable::{DurableStore, Tables};
pub use error::StoreError;
pub use kv::{KvStore, TokenBlacklist};
