//! Server-side framing of outgoing events.

use crate::frame;
use crate::media_type::{AGUI_MEDIA_TYPE, SSE_MEDIA_TYPE, prefers_protobuf};
use crate::sse;
use agui_protocol::{AguiResult, Event};
use bytes::Bytes;

/// Frames events for one response, in the format negotiated from the
/// request's `Accept` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventEncoder {
    protobuf: bool,
}

impl EventEncoder {
    pub fn new(accept: Option<&str>) -> Self {
        Self {
            protobuf: prefers_protobuf(accept),
        }
    }

    /// `Content-Type` to send with the response.
    pub fn content_type(&self) -> &'static str {
        if self.protobuf {
            AGUI_MEDIA_TYPE
        } else {
            SSE_MEDIA_TYPE
        }
    }

    pub fn encode(&self, event: &Event) -> AguiResult<Bytes> {
        if self.protobuf {
            self.encode_protobuf(event)
        } else {
            self.encode_sse(event)
        }
    }

    pub fn encode_sse(&self, event: &Event) -> AguiResult<Bytes> {
        sse::encode_sse(event)
    }

    pub fn encode_protobuf(&self, event: &Event) -> AguiResult<Bytes> {
        frame::encode_protobuf(event)
    }
}

impl Default for EventEncoder {
    fn default() -> Self {
        Self::new(Some(SSE_MEDIA_TYPE))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::HEADER_LEN;
    use crate::proto::decode_event;

    #[test]
    fn defaults_to_sse() -> anyhow::Result<()> {
        let encoder = EventEncoder::new(None);
        assert_eq!(encoder.content_type(), SSE_MEDIA_TYPE);
        let bytes = encoder.encode(&Event::run_started("t", "r"))?;
        assert!(bytes.starts_with(b"data: {\"type\":\"RUN_STARTED\""));
        assert!(bytes.ends_with(b"\n\n"));
        Ok(())
    }

    #[test]
    fn protobuf_when_requested() -> anyhow::Result<()> {
        let encoder = EventEncoder::new(Some(AGUI_MEDIA_TYPE));
        assert_eq!(encoder.content_type(), AGUI_MEDIA_TYPE);

        let event = Event::custom("ping", serde_json::json!({"n": 1}));
        let frame = encoder.encode(&event)?;
        let len = u32::from_be_bytes([frame[0], frame[1], frame[2], frame[3]]) as usize;
        assert_eq!(frame.len(), HEADER_LEN + len);
        assert_eq!(decode_event(&frame[HEADER_LEN..])?, event);
        Ok(())
    }
}
