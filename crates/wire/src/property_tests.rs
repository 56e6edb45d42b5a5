// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Encode/decode laws for the wire envelope.

use crate::{decode_frame, encode_frame, Envelope, WorkerFrame};
use proptest::prelude::*;

fn worker_frame() -> impl Strategy<Value = WorkerFrame> {
    prop_oneof![
        ("[a-z0-9-]{1,16}", 0u8..=100).prop_map(|(task_id, progress)| {
            WorkerFrame::TaskProgress { task_id, progress, message: None }
        }),
        ("[a-z0-9-]{1,16}", "[a-z ]{1,32}").prop_map(|(task_id, error)| {
            WorkerFrame::TaskFailed { task_id, error }
        }),
        ("[a-z0-9-]{1,16}", "[a-z ]{1,32}").prop_map(|(task_id, reason)| {
            WorkerFrame::TaskRejected { task_id, reason }
        }),
        Just(WorkerFrame::Pong {}),
    ]
}

proptest! {
    /// A frame survives the encode/decode pair byte-exactly.
    #[test]
    fn envelope_round_trips(frame in worker_frame(), stamp in proptest::option::of("[0-9T:Z-]{8,24}")) {
        let envelope = Envelope { frame, timestamp: stamp };
        let bytes = encode_frame(&envelope).unwrap();
        prop_assert_eq!(*bytes.last().unwrap(), b'\n');
        let decoded: Envelope<WorkerFrame> = decode_frame(&bytes[..bytes.len() - 1]).unwrap();
        prop_assert_eq!(decoded, envelope);
    }
}
