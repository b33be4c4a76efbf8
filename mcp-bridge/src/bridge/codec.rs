//! Newline-delimited JSON codec for the child's stdio.
//!
//! Uses LinesCodec for framing + serde_json for (de)serialization.
//! Decoding never fails on bad content: unparseable lines come out as
//! [`Frame::Malformed`] so one garbage line cannot end the stream.

use std::io;

use tokio_util::bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder, LinesCodec, LinesCodecError};

use super::protocol::JsonRpcMessage;

/// Upper bound for a single line read from the child.
pub const DEFAULT_MAX_LINE_LENGTH: usize = 16 * 1024 * 1024;

/// One decoded line of child output.
#[derive(Debug)]
pub enum Frame {
    Message(JsonRpcMessage),
    /// Line was not a JSON-RPC document.
    Malformed {
        line: String,
        error: serde_json::Error,
    },
    /// Line exceeded the length limit and was discarded.
    Oversized,
}

/// Codec that frames messages by newline and serializes with JSON.
///
/// Wraps LinesCodec and adds serde_json serialization.
pub struct JsonLineCodec {
    inner: LinesCodec,
}

impl Default for JsonLineCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl JsonLineCodec {
    pub fn new() -> Self {
        Self::with_max_length(DEFAULT_MAX_LINE_LENGTH)
    }

    pub fn with_max_length(max_length: usize) -> Self {
        Self {
            inner: LinesCodec::new_with_max_length(max_length),
        }
    }

    fn frame(
        result: Result<Option<String>, LinesCodecError>,
    ) -> Result<Option<Option<Frame>>, io::Error> {
        match result {
            Ok(Some(line)) => {
                if line.trim().is_empty() {
                    return Ok(Some(None));
                }
                let frame = match serde_json::from_str::<JsonRpcMessage>(&line) {
                    Ok(message) => Frame::Message(message),
                    Err(error) => Frame::Malformed { line, error },
                };
                Ok(Some(Some(frame)))
            }
            Ok(None) => Ok(None),
            Err(LinesCodecError::MaxLineLengthExceeded) => Ok(Some(Some(Frame::Oversized))),
            Err(LinesCodecError::Io(e)) => Err(e),
        }
    }
}

impl Decoder for JsonLineCodec {
    type Item = Frame;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            match Self::frame(self.inner.decode(src))? {
                Some(Some(frame)) => return Ok(Some(frame)),
                // blank line
                Some(None) => continue,
                None => return Ok(None),
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            match Self::frame(self.inner.decode_eof(src))? {
                Some(Some(frame)) => return Ok(Some(frame)),
                Some(None) => continue,
                None => return Ok(None),
            }
        }
    }
}

impl Encoder<&JsonRpcMessage> for JsonLineCodec {
    type Error = io::Error;

    fn encode(&mut self, item: &JsonRpcMessage, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let json = serde_json::to_string(item)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        tracing::trace!(json_size_bytes = json.len(), "Encoding line");
        self.inner.encode(json, dst).map_err(|e| match e {
            LinesCodecError::Io(e) => e,
            LinesCodecError::MaxLineLengthExceeded => {
                io::Error::new(io::ErrorKind::InvalidData, "line too long")
            }
        })
    }
}
