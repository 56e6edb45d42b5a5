// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker wire protocol.
//!
//! Wire format: newline-delimited JSON frames over a persistent duplex
//! stream (typically carried as WebSocket text messages). Every frame
//! is an envelope `{"type": <kind>, "data": {...}, "timestamp": <RFC3339>}`.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod codec;
mod frame;

pub use codec::{decode_frame, encode_frame, read_frame, write_frame, WireError};
pub use frame::{
    close_code, Envelope, ServerFrame, TaskResultData, WorkerFrame, REASON_SUPERSEDED,
};

#[cfg(test)]
mod property_tests;
