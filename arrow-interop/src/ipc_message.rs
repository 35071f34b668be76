//! Encapsulated IPC message framing.
//!
//! ```text
//! [ 0xFFFFFFFF | metadata_len: i32 | Message flatbuffer (padded) | body ]
//! ```
//!
//! Streams written before the continuation marker existed start directly with
//! `metadata_len`. A zero length marks end-of-stream.

use arrow_buffer::Buffer;
use arrow_ipc::{root_as_message, Message};

use crate::error::{InteropError, Result};

const CONTINUATION_MARKER: u32 = 0xFFFF_FFFF;

/// Length prefix of one message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessagePrefix {
    /// Bytes taken by the marker and length fields (4 or 8).
    pub prefix_len: usize,
    /// Bytes of flatbuffer metadata, including padding. Zero at end-of-stream.
    pub metadata_len: usize,
}

impl MessagePrefix {
    pub fn is_end_of_stream(&self) -> bool {
        self.metadata_len == 0
    }

    /// Parse the prefix from the first bytes of a message. At most 8 bytes are
    /// inspected.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let word = |at: usize| -> Result<u32> {
            bytes
                .get(at..at + 4)
                .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                .ok_or_else(|| InteropError::SchemaFormat("truncated message prefix".into()))
        };

        let first = word(0)?;
        let (prefix_len, raw_len) = if first == CONTINUATION_MARKER {
            (8, word(4)?)
        } else {
            (4, first)
        };

        let metadata_len = i32::from_le_bytes(raw_len.to_le_bytes());
        if metadata_len < 0 {
            return Err(InteropError::SchemaFormat(format!(
                "negative metadata length {metadata_len}"
            )));
        }
        Ok(Self { prefix_len, metadata_len: metadata_len as usize })
    }
}

/// Decode the flatbuffer `Message` stored in `metadata`.
pub fn decode_message(metadata: &[u8]) -> Result<Message<'_>> {
    root_as_message(metadata)
        .map_err(|e| InteropError::SchemaFormat(format!("invalid message flatbuffer: {e}")))
}

/// One message taken out of a stream.
#[derive(Debug, Clone)]
pub struct FramedMessage {
    metadata: Buffer,
    pub body: Buffer,
}

impl FramedMessage {
    pub fn message(&self) -> Result<Message<'_>> {
        decode_message(&self.metadata)
    }
}

/// Sequential reader over the messages of an IPC stream held in memory.
#[derive(Debug)]
pub struct MessageReader {
    buf: Buffer,
    offset: usize,
}

impl MessageReader {
    pub fn new(buf: Buffer) -> Self {
        Self { buf, offset: 0 }
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Next message, or `None` at end-of-stream or end-of-buffer.
    pub fn next_message(&mut self) -> Result<Option<FramedMessage>> {
        if self.buf.len().saturating_sub(self.offset) < 4 {
            return Ok(None);
        }

        let prefix = MessagePrefix::parse(&self.buf[self.offset..])?;
        if prefix.is_end_of_stream() {
            self.offset = self.buf.len();
            return Ok(None);
        }

        let meta_start = self.offset + prefix.prefix_len;
        let body_offset = meta_start + prefix.metadata_len;
        if body_offset > self.buf.len() {
            return Err(InteropError::SchemaFormat(format!(
                "metadata of {} bytes at offset {} runs past end of stream ({} bytes)",
                prefix.metadata_len,
                meta_start,
                self.buf.len()
            )));
        }
        let metadata = self.buf.slice_with_length(meta_start, prefix.metadata_len);

        let body_len = decode_message(&metadata)?.bodyLength();
        let body_len = usize::try_from(body_len).map_err(|_| {
            InteropError::SchemaFormat(format!("negative body length {body_len}"))
        })?;
        if body_offset + body_len > self.buf.len() {
            return Err(InteropError::SchemaFormat(format!(
                "body of {body_len} bytes at offset {body_offset} runs past end of stream"
            )));
        }
        let body = self.buf.slice_with_length(body_offset, body_len);

        self.offset = body_offset + body_len;
        Ok(Some(FramedMessage { metadata, body }))
    }
}
