//! Length-prefixed binary framing.
//!
//! Each frame is a big-endian `u32` body length followed by that many bytes
//! of protobuf-encoded [`Event`]. There is no stream header or trailer.

use crate::proto;
use agui_protocol::{AguiError, AguiResult, Event, EventStream};
use async_stream::stream;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use futures_util::{Stream, StreamExt};
use tracing::{debug, warn};

pub const HEADER_LEN: usize = 4;

/// Largest frame body accepted unless configured otherwise (16 MiB).
pub const DEFAULT_MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// Prefixes `body` with its length.
pub fn encode_frame(body: &[u8]) -> AguiResult<Bytes> {
    let len = u32::try_from(body.len())
        .map_err(|_| AguiError::Frame(format!("frame body of {} bytes exceeds u32", body.len())))?;
    let mut frame = BytesMut::with_capacity(HEADER_LEN + body.len());
    frame.put_u32(len);
    frame.put_slice(body);
    Ok(frame.freeze())
}

/// Encodes `event` as one complete binary frame.
pub fn encode_protobuf(event: &Event) -> AguiResult<Bytes> {
    encode_frame(&proto::encode_event(event)?)
}

/// Reassembles frames from arbitrarily split byte chunks.
#[derive(Debug)]
pub struct FrameDecoder {
    buffer: BytesMut,
    max_frame_len: usize,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::with_max_frame_len(DEFAULT_MAX_FRAME_LEN)
    }

    pub fn with_max_frame_len(max_frame_len: usize) -> Self {
        Self {
            buffer: BytesMut::new(),
            max_frame_len,
        }
    }

    pub fn push(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);
    }

    /// Takes the next complete frame body out of the buffer, if one is there.
    pub fn next_frame(&mut self) -> AguiResult<Option<Bytes>> {
        if self.buffer.len() < HEADER_LEN {
            return Ok(None);
        }
        let mut header = [0_u8; HEADER_LEN];
        header.copy_from_slice(&self.buffer[..HEADER_LEN]);
        let len = u32::from_be_bytes(header) as usize;
        if len > self.max_frame_len {
            return Err(AguiError::Frame(format!(
                "frame of {len} bytes exceeds the {} byte limit",
                self.max_frame_len
            )));
        }
        if self.buffer.len() < HEADER_LEN + len {
            return Ok(None);
        }
        self.buffer.advance(HEADER_LEN);
        Ok(Some(self.buffer.split_to(len).freeze()))
    }

    /// Bytes still buffered that do not form a complete frame.
    pub fn remaining(&self) -> usize {
        self.buffer.len()
    }
}

/// Decodes a byte stream of binary frames into events.
///
/// A malformed frame ends the stream with an error. Leftover bytes at a
/// clean end of stream are only logged.
pub fn decode_proto_stream<S>(chunks: S) -> EventStream
where
    S: Stream<Item = AguiResult<Bytes>> + Send + 'static,
{
    decode_proto_stream_with(chunks, FrameDecoder::new())
}

pub fn decode_proto_stream_with<S>(chunks: S, decoder: FrameDecoder) -> EventStream
where
    S: Stream<Item = AguiResult<Bytes>> + Send + 'static,
{
    Box::pin(stream! {
        let mut chunks = Box::pin(chunks);
        let mut decoder = decoder;
        while let Some(chunk) = chunks.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(err) => {
                    yield Err(err);
                    return;
                }
            };
            decoder.push(&chunk);
            loop {
                let event = match decoder.next_frame() {
                    Ok(Some(body)) => proto::decode_event(&body),
                    Ok(None) => break,
                    Err(err) => Err(err),
                };
                match event {
                    Ok(event) => {
                        debug!(event_type = %event.event_type(), "decoded protobuf event");
                        yield Ok(event);
                    }
                    Err(err) => {
                        yield Err(err);
                        return;
                    }
                }
            }
        }
        if decoder.remaining() > 0 {
            warn!(
                leftover = decoder.remaining(),
                "incomplete protobuf frame at end of stream"
            );
        }
    })
}
