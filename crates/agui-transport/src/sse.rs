//! Server-sent-events text framing.
//!
//! One event per `data: <json>\n\n` block. Multi-line payloads are repeated
//! `data: ` lines joined with `\n`; `event:`, `id:` and `retry:` lines are
//! ignored.

use agui_protocol::{AguiError, AguiResult, Event, EventStream};
use async_stream::stream;
use bytes::Bytes;
use futures_util::stream::BoxStream;
use futures_util::{Stream, StreamExt};
use serde_json::Value;
use tracing::debug;

const BLOCK_SEPARATOR: &str = "\n\n";
const DATA_PREFIX: &str = "data: ";

/// Frames `event` as one SSE block.
pub fn encode_sse(event: &Event) -> AguiResult<Bytes> {
    let json =
        serde_json::to_string(event).map_err(|e| AguiError::Serialization(e.to_string()))?;
    Ok(Bytes::from(format!("{DATA_PREFIX}{json}{BLOCK_SEPARATOR}")))
}

/// Incremental SSE decoder.
///
/// Bytes are decoded as UTF-8 across chunk boundaries; invalid sequences in
/// the middle of the stream become U+FFFD.
#[derive(Debug, Default)]
pub struct SseDecoder {
    undecoded: Vec<u8>,
    buffer: String,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one chunk and returns the data payloads of every block it
    /// completed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.undecoded.extend_from_slice(chunk);
        self.decode_utf8();

        let mut payloads = Vec::new();
        while let Some(end) = self.buffer.find(BLOCK_SEPARATOR) {
            let block: String = self.buffer.drain(..end + BLOCK_SEPARATOR.len()).collect();
            if let Some(data) = block_data(&block[..end]) {
                payloads.push(data);
            }
        }
        payloads
    }

    /// Flushes the trailing block at end of stream, even without a closing
    /// blank line.
    pub fn finish(&mut self) -> AguiResult<Option<String>> {
        if !self.undecoded.is_empty() {
            return Err(AguiError::Utf8(self.undecoded.len()));
        }
        let block = std::mem::take(&mut self.buffer);
        Ok(block_data(&block))
    }

    fn decode_utf8(&mut self) {
        loop {
            match std::str::from_utf8(&self.undecoded) {
                Ok(text) => {
                    self.buffer.push_str(text);
                    self.undecoded.clear();
                    return;
                }
                Err(err) => {
                    let valid = err.valid_up_to();
                    if let Ok(text) = std::str::from_utf8(&self.undecoded[..valid]) {
                        self.buffer.push_str(text);
                    }
                    match err.error_len() {
                        Some(invalid) => {
                            self.buffer.push(char::REPLACEMENT_CHARACTER);
                            self.undecoded.drain(..valid + invalid);
                        }
                        None => {
                            // incomplete sequence at the end, wait for more bytes
                            self.undecoded.drain(..valid);
                            return;
                        }
                    }
                }
            }
        }
    }
}

fn block_data(block: &str) -> Option<String> {
    let lines: Vec<&str> = block
        .split('\n')
        .filter_map(|line| line.strip_prefix(DATA_PREFIX))
        .collect();
    if lines.is_empty() {
        return None;
    }
    Some(lines.join("\n"))
}

/// Decodes a byte stream into the JSON payloads of its SSE blocks.
pub fn sse_json_stream<S>(chunks: S) -> BoxStream<'static, AguiResult<Value>>
where
    S: Stream<Item = AguiResult<Bytes>> + Send + 'static,
{
    Box::pin(stream! {
        let mut chunks = Box::pin(chunks);
        let mut decoder = SseDecoder::new();
        while let Some(chunk) = chunks.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(err) => {
                    yield Err(err);
                    return;
                }
            };
            for data in decoder.push(&chunk) {
                match serde_json::from_str::<Value>(&data) {
                    Ok(value) => yield Ok(value),
                    Err(err) => {
                        yield Err(AguiError::Decode(err.to_string()));
                        return;
                    }
                }
            }
        }
        match decoder.finish() {
            Ok(Some(data)) => match serde_json::from_str::<Value>(&data) {
                Ok(value) => yield Ok(value),
                Err(err) => yield Err(AguiError::Decode(err.to_string())),
            },
            Ok(None) => {}
            Err(err) => yield Err(err),
        }
    })
}

/// Decodes a byte stream of SSE blocks into events.
///
/// Each JSON payload must be a valid [`Event`]; the first one that is not
/// ends the stream with a decode error.
pub fn decode_sse_stream<S>(chunks: S) -> EventStream
where
    S: Stream<Item = AguiResult<Bytes>> + Send + 'static,
{
    Box::pin(stream! {
        let mut values = sse_json_stream(chunks);
        while let Some(value) = values.next().await {
            let event = value.and_then(|value| {
                serde_json::from_value::<Event>(value).map_err(AguiError::from)
            });
            match event {
                Ok(event) => {
                    debug!(event_type = %event.event_type(), "decoded SSE event");
                    yield Ok(event);
                }
                Err(err) => {
                    yield Err(err);
                    return;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;
    use serde_json::json;

    fn chunks(parts: &[&[u8]]) -> impl Stream<Item = AguiResult<Bytes>> + Send + 'static {
        let owned: Vec<AguiResult<Bytes>> = parts
            .iter()
            .map(|part| Ok(Bytes::copy_from_slice(part)))
            .collect();
        stream::iter(owned)
    }

    #[tokio::test]
    async fn payload_split_across_chunks() -> anyhow::Result<()> {
        let values: Vec<_> = sse_json_stream(chunks(&[b"data: {\"a\"", b":1}\n\n"]))
            .collect()
            .await;
        assert_eq!(values.len(), 1);
        assert_eq!(values.into_iter().next().transpose()?, Some(json!({"a": 1})));
        Ok(())
    }

    #[test]
    fn multi_line_data_is_joined_and_other_fields_ignored() {
        let mut decoder = SseDecoder::new();
        let out = decoder.push(b"event: message\nid: 7\ndata: {\"a\":\ndata: 2}\n\n: comment\n\n");
        assert_eq!(out, vec!["{\"a\":\n2}".to_owned()]);
    }

    #[test]
    fn multi_byte_character_split_between_chunks() -> anyhow::Result<()> {
        let encoded = "data: {\"text\":\"héllo\"}\n\n".as_bytes();
        let split = encoded.iter().position(|b| *b == 0xC3).unwrap_or(0) + 1;
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(&encoded[..split]).is_empty());
        let out = decoder.push(&encoded[split..]);
        assert_eq!(out, vec!["{\"text\":\"héllo\"}".to_owned()]);
        assert_eq!(decoder.finish()?, None);
        Ok(())
    }

    #[test]
    fn invalid_bytes_mid_stream_are_replaced() {
        let mut decoder = SseDecoder::new();
        let out = decoder.push(b"data: a\xFFb\n\n");
        assert_eq!(out, vec!["a\u{FFFD}b".to_owned()]);
    }

    #[test]
    fn trailing_block_without_blank_line_is_flushed() -> anyhow::Result<()> {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(b"data: {\"x\":true}").is_empty());
        assert_eq!(decoder.finish()?, Some("{\"x\":true}".to_owned()));
        Ok(())
    }

    #[test]
    fn incomplete_utf8_at_end_is_an_error() {
        let mut decoder = SseDecoder::new();
        decoder.push(b"data: \xE2\x82");
        assert!(matches!(decoder.finish(), Err(AguiError::Utf8(2))));
    }

    #[tokio::test]
    async fn decodes_events_and_stops_on_invalid_schema() -> anyhow::Result<()> {
        let run_started = encode_sse(&Event::run_started("t1", "r1"))?;
        let out: Vec<_> = decode_sse_stream(chunks(&[
            &run_started[..],
            b"data: {\"type\":\"TEXT_MESSAGE_CONTENT\",\"messageId\":\"m\",\"delta\":\"\"}\n\n",
            b"data: {\"type\":\"RUN_FINISHED\",\"threadId\":\"t1\",\"runId\":\"r1\"}\n\n",
        ]))
        .collect()
        .await;
        assert_eq!(out.len(), 2);
        assert!(matches!(&out[0], Ok(Event::RunStarted { run_id, .. }) if run_id == "r1"));
        assert!(matches!(out[1], Err(AguiError::Decode(_))));
        Ok(())
    }

    #[tokio::test]
    async fn every_split_offset_decodes_the_same_event() -> anyhow::Result<()> {
        let event = Event::text_message_content("m1", "héllo wörld ✓");
        let block = encode_sse(&event)?;
        for offset in 0..=block.len() {
            let out: Vec<_> = decode_sse_stream(chunks(&[&block[..offset], &block[offset..]]))
                .collect()
                .await;
            let decoded = out.into_iter().collect::<AguiResult<Vec<_>>>()?;
            assert_eq!(decoded, vec![event.clone()], "split at {offset}");
        }
        Ok(())
    }

    #[tokio::test]
    async fn invalid_json_is_terminal() {
        let out: Vec<_> = sse_json_stream(chunks(&[b"data: {nope\n\ndata: {}\n\n"]))
            .collect()
            .await;
        assert_eq!(out.len(), 1);
        assert!(matches!(out[0], Err(AguiError::Decode(_))));
    }

    #[test]
    fn encode_produces_single_data_block() -> anyhow::Result<()> {
        let bytes = encode_sse(&Event::step_started("plan"))?;
        assert_eq!(
            &bytes[..],
            b"data: {\"type\":\"STEP_STARTED\",\"stepName\":\"plan\"}\n\n"
        );
        Ok(())
    }
}
