// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Newline-delimited JSON framing.

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Errors from frame encoding and stream I/O.
#[derive(Debug, Error)]
pub enum WireError {
    #[error("wire I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed frame: {0}")]
    Json(#[from] serde_json::Error),

    #[error("frame exceeds {max} bytes")]
    Oversized { max: usize },

    #[error("channel closed")]
    Closed,
}

/// Encode one frame as a JSON line (trailing newline included).
pub fn encode_frame<T: Serialize>(frame: &T) -> Result<Vec<u8>, WireError> {
    let mut buf = serde_json::to_vec(frame)?;
    buf.push(b'\n');
    Ok(buf)
}

/// Decode one frame from a JSON line.
pub fn decode_frame<T: DeserializeOwned>(line: &[u8]) -> Result<T, WireError> {
    Ok(serde_json::from_slice(line)?)
}

/// Write one frame and flush.
pub async fn write_frame<W, T>(writer: &mut W, frame: &T) -> Result<(), WireError>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let buf = encode_frame(frame)?;
    writer.write_all(&buf).await?;
    writer.flush().await?;
    Ok(())
}

/// Read the next frame. Returns `Ok(None)` on clean EOF. Blank lines are
/// skipped; a line longer than `max_len` bytes fails the stream.
pub async fn read_frame<R, T>(reader: &mut R, max_len: usize) -> Result<Option<T>, WireError>
where
    R: AsyncBufRead + Unpin,
    T: DeserializeOwned,
{
    let mut line = Vec::new();
    loop {
        line.clear();
        let mut limited = (&mut *reader).take(max_len as u64 + 2);
        let n = limited.read_until(b'\n', &mut line).await?;
        if n == 0 {
            return Ok(None);
        }
        while line.last().is_some_and(|b| *b == b'\n' || *b == b'\r') {
            line.pop();
        }
        if line.len() > max_len {
            return Err(WireError::Oversized { max: max_len });
        }
        if line.is_empty() {
            continue;
        }
        return decode_frame(&line).map(Some);
    }
}

#[cfg(test)]
#[path = "codec_tests.rs"]
mod tests;
