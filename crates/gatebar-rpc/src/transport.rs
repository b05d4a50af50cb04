//! CR+LF delimited transport codec for the AppGate control socket.
//!
//! The service terminates every JSON document it writes with `\r\n` and
//! accepts requests terminated by a bare `\n`. A document may contain raw line
//! feeds (pretty-printed output, multi-line strings), so the decoder only
//! splits on the exact two-byte terminator.
//!
//! Frame format:
//! ```text
//! inbound:  <JSON document> \r \n
//! outbound: <JSON document> \n
//! ```

use bytes::{BufMut, BytesMut};
use serde_json::Value;
use std::io;
use tokio_util::codec::{Decoder, Encoder};

use crate::protocol::Request;

/// Maximum message size (16 MB)
const MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

/// Inbound message terminator
const TERMINATOR: &[u8] = b"\r\n";

/// Codec reading CR+LF terminated JSON documents and writing LF terminated requests
#[derive(Debug, Default)]
pub struct CrlfJsonCodec {
    // Bytes already scanned without finding a terminator
    next_index: usize,
}

impl CrlfJsonCodec {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn find_terminator(&self, src: &BytesMut) -> Option<usize> {
        // Back up one byte in case the previous scan ended between CR and LF
        let start = self.next_index.saturating_sub(1);
        src[start..]
            .windows(TERMINATOR.len())
            .position(|window| window == TERMINATOR)
            .map(|offset| start + offset)
    }
}

impl Decoder for CrlfJsonCodec {
    type Item = Value;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            let Some(end) = self.find_terminator(src) else {
                if src.len() > MAX_MESSAGE_SIZE {
                    return Err(CodecError::MessageTooLarge(src.len()));
                }
                self.next_index = src.len();
                return Ok(None);
            };

            let frame = src.split_to(end + TERMINATOR.len());
            self.next_index = 0;

            let payload = &frame[..end];
            if payload.iter().all(u8::is_ascii_whitespace) {
                continue;
            }

            let json_str = std::str::from_utf8(payload)?;
            let message: Value = serde_json::from_str(json_str)?;
            return Ok(Some(message));
        }
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.decode(buf)? {
            Some(message) => Ok(Some(message)),
            None if buf.iter().all(u8::is_ascii_whitespace) => Ok(None),
            None => Err(CodecError::Truncated(buf.len())),
        }
    }
}

impl Encoder<Request> for CrlfJsonCodec {
    type Error = CodecError;

    fn encode(&mut self, item: Request, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let json = serde_json::to_vec(&item)?;

        if json.len() > MAX_MESSAGE_SIZE {
            return Err(CodecError::MessageTooLarge(json.len()));
        }

        dst.reserve(json.len() + 1);
        dst.put_slice(&json);
        dst.put_u8(b'\n');

        Ok(())
    }
}

/// Errors that can occur during codec operations
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("UTF-8 error: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    #[error("Message too large: {0} bytes (max: {MAX_MESSAGE_SIZE})")]
    MessageTooLarge(usize),

    #[error("Stream ended inside a message ({0} bytes without terminator)")]
    Truncated(usize),
}
