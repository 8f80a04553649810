//! Per-connection frame reassembly.
//!
//! TCP delivers a byte stream, so a frame may arrive split across any number
//! of reads and one read may carry several frames. `FrameBuffer` accumulates
//! reads and hands back complete frames one at a time, discarding consumed
//! bytes and keeping any trailing partial frame at the front.
//!
//! The buffer is bounded: it never holds more than one maximum-size frame.

use crate::protocols::chat::{decode_header, CodecError, HEADER_SIZE, MAX_FRAME_SIZE};
use bytes::{Bytes, BytesMut};
use std::fmt;

/// Accumulation buffer for one connection.
#[derive(Debug)]
pub struct FrameBuffer {
    buf: BytesMut,
    limit: usize,
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new(MAX_FRAME_SIZE)
    }
}

impl FrameBuffer {
    /// Create a buffer that holds at most `limit` bytes.
    pub fn new(limit: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(limit),
            limit,
        }
    }

    /// Append freshly read bytes.
    ///
    /// Fails without appending anything if the buffer would exceed its limit.
    pub fn extend(&mut self, data: &[u8]) -> Result<(), BufferError> {
        if self.buf.len() + data.len() > self.limit {
            return Err(BufferError::Overflow {
                buffered: self.buf.len(),
                incoming: data.len(),
                limit: self.limit,
            });
        }
        self.buf.extend_from_slice(data);
        Ok(())
    }

    /// Split the next complete frame off the front of the buffer.
    ///
    /// Returns `Ok(None)` when more bytes are needed. A bad header is an
    /// error; so is a header declaring a frame that could never fit.
    pub fn next_frame(&mut self) -> Result<Option<Bytes>, BufferError> {
        if self.buf.len() < HEADER_SIZE {
            return Ok(None);
        }

        let header = decode_header(&self.buf).map_err(BufferError::Codec)?;
        let frame_len = header.frame_len();
        if frame_len > self.limit {
            return Err(BufferError::FrameTooLarge {
                frame_len,
                limit: self.limit,
            });
        }

        if self.buf.len() < frame_len {
            return Ok(None);
        }

        Ok(Some(self.buf.split_to(frame_len).freeze()))
    }

    /// Free space before the limit is reached.
    pub fn remaining(&self) -> usize {
        self.limit - self.buf.len()
    }

    /// Bytes currently buffered.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
}

/// Reassembly errors. All of them are fatal for the connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BufferError {
    /// Appending would exceed the buffer limit.
    Overflow {
        buffered: usize,
        incoming: usize,
        limit: usize,
    },
    /// Header declares a frame larger than the buffer limit.
    FrameTooLarge { frame_len: usize, limit: usize },
    /// Header failed to decode.
    Codec(CodecError),
}

impl fmt::Display for BufferError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BufferError::Overflow {
                buffered,
                incoming,
                limit,
            } => write!(
                f,
                "buffer overflow: {buffered} buffered + {incoming} incoming > {limit}"
            ),
            BufferError::FrameTooLarge { frame_len, limit } => {
                write!(f, "frame of {frame_len} bytes exceeds limit {limit}")
            }
            BufferError::Codec(e) => write!(f, "protocol error: {e}"),
        }
    }
}

impl std::error::Error for BufferError {}
