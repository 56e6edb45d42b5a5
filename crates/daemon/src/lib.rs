// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! hive-daemon: the control plane around the engine.
//!
//! Hosts the worker connection manager, heartbeat reaper, task
//! allocator, and the WebSocket listener, and wires them to the DAG
//! executor through the dispatch seam.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod allocator;
pub mod auth;
pub mod connection;
pub mod dispatch;
pub mod env;
pub mod hub;
pub mod listener;
pub mod orchestrator;
pub mod reaper;

pub use allocator::{AllocError, ScoringPolicy, TaskAllocator};
pub use auth::{authenticate, extract_api_key, generate_api_key, hash_api_key, AuthError};
pub use connection::{ConnEvent, ConnectionManager, FrameSink, FrameSource};
pub use dispatch::DaemonDispatch;
pub use env::Config;
pub use hub::ResultHub;
pub use orchestrator::Orchestrator;
pub use reaper::{HeartbeatReaper, ReaperConfig};
