//! Expansion of chunk events into start/content/end triples.
//!
//! At most one text message or tool call is open at a time. A chunk that
//! continues it only emits content; a chunk for a different unit, or any
//! non-chunk event, closes it first. `RAW` events pass through without
//! closing the open unit.

use agui_protocol::{AguiResult, ChunkError, Event, EventStream};
use async_stream::stream;
use futures_util::StreamExt;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
enum OpenUnit {
    Text { message_id: String },
    Tool { tool_call_id: String },
}

/// Fold state of the chunk normalizer.
#[derive(Debug, Default)]
pub struct ChunkNormalizer {
    open: Option<OpenUnit>,
}

impl ChunkNormalizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rewrites one input event into zero or more canonical events.
    pub fn push(&mut self, event: Event) -> Result<Vec<Event>, ChunkError> {
        let mut out = Vec::new();
        match event {
            Event::TextMessageChunk {
                message_id, delta, ..
            } => {
                let continues = match (&self.open, &message_id) {
                    (Some(OpenUnit::Text { message_id: open }), Some(id)) => open == id,
                    (Some(OpenUnit::Text { .. }), None) => true,
                    _ => false,
                };
                if !continues {
                    out.extend(self.close());
                    let id = message_id.ok_or(ChunkError::MissingMessageId)?;
                    debug!(message_id = %id, "synthesizing TEXT_MESSAGE_START");
                    out.push(Event::text_message_start(id.clone()));
                    self.open = Some(OpenUnit::Text { message_id: id });
                }
                if let Some(delta) = delta.filter(|d| !d.is_empty())
                    && let Some(OpenUnit::Text { message_id }) = &self.open
                {
                    out.push(Event::text_message_content(message_id.clone(), delta));
                }
            }
            Event::ToolCallChunk {
                tool_call_id,
                tool_call_name,
                parent_message_id,
                delta,
                ..
            } => {
                let continues = match (&self.open, &tool_call_id) {
                    (Some(OpenUnit::Tool { tool_call_id: open }), Some(id)) => open == id,
                    (Some(OpenUnit::Tool { .. }), None) => true,
                    _ => false,
                };
                if !continues {
                    out.extend(self.close());
                    let id = tool_call_id.ok_or(ChunkError::MissingToolCallId)?;
                    let name = tool_call_name.ok_or(ChunkError::MissingToolCallName)?;
                    debug!(tool_call_id = %id, tool = %name, "synthesizing TOOL_CALL_START");
                    out.push(Event::tool_call_start(id.clone(), name, parent_message_id));
                    self.open = Some(OpenUnit::Tool { tool_call_id: id });
                }
                if let Some(delta) = delta.filter(|d| !d.is_empty())
                    && let Some(OpenUnit::Tool { tool_call_id }) = &self.open
                {
                    out.push(Event::tool_call_args(tool_call_id.clone(), delta));
                }
            }
            Event::Raw { .. } => out.push(event),
            other => {
                out.extend(self.close());
                out.push(other);
            }
        }
        Ok(out)
    }

    /// Closes whatever unit is still open at end of input.
    pub fn finish(&mut self) -> Option<Event> {
        self.close()
    }

    fn close(&mut self) -> Option<Event> {
        let end = match self.open.take()? {
            OpenUnit::Text { message_id } => Event::text_message_end(message_id),
            OpenUnit::Tool { tool_call_id } => Event::tool_call_end(tool_call_id),
        };
        debug!(event_type = %end.event_type(), "synthesizing end of chunked unit");
        Some(end)
    }
}

/// Normalizes a whole event stream.
///
/// An upstream error closes the open unit before it is propagated. A chunk
/// error ends the stream.
pub fn normalize_chunks(events: EventStream) -> EventStream {
    Box::pin(stream! {
        let mut events = events;
        let mut normalizer = ChunkNormalizer::new();
        while let Some(item) = events.next().await {
            match item {
                Ok(event) => match normalizer.push(event) {
                    Ok(out) => {
                        for event in out {
                            yield Ok(event);
                        }
                    }
                    Err(err) => {
                        yield AguiResult::Err(err.into());
                        return;
                    }
                },
                Err(err) => {
                    if let Some(end) = normalizer.finish() {
                        yield Ok(end);
                    }
                    yield Err(err);
                    return;
                }
            }
        }
        if let Some(end) = normalizer.finish() {
            yield Ok(end);
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use agui_protocol::{AguiError, EventType};
    use futures_util::stream;
    use serde_json::json;

    fn text_chunk(id: Option<&str>, delta: Option<&str>) -> Event {
        Event::text_message_chunk(id.map(Into::into), delta.map(Into::into))
    }

    fn tool_chunk(id: Option<&str>, name: Option<&str>, delta: Option<&str>) -> Event {
        Event::tool_call_chunk(
            id.map(Into::into),
            name.map(Into::into),
            None,
            delta.map(Into::into),
        )
    }

    async fn normalize(input: Vec<Event>) -> Vec<AguiResult<Event>> {
        let events: EventStream = stream::iter(input.into_iter().map(Ok)).boxed();
        normalize_chunks(events).collect().await
    }

    fn kinds(events: &[Event]) -> Vec<EventType> {
        events.iter().map(Event::event_type).collect()
    }

    #[tokio::test]
    async fn single_text_chunk_expands_to_triple() -> anyhow::Result<()> {
        let out = normalize(vec![
            Event::run_started("t1", "r1"),
            text_chunk(Some("m1"), Some("Hi")),
            Event::run_finished("t1", "r1"),
        ])
        .await;
        let out = out.into_iter().collect::<AguiResult<Vec<_>>>()?;
        assert_eq!(
            out,
            vec![
                Event::run_started("t1", "r1"),
                Event::text_message_start("m1"),
                Event::text_message_content("m1", "Hi"),
                Event::text_message_end("m1"),
                Event::run_finished("t1", "r1"),
            ]
        );
        Ok(())
    }

    #[tokio::test]
    async fn stream_without_chunks_is_unchanged() -> anyhow::Result<()> {
        let input = vec![
            Event::run_started("t1", "r1"),
            Event::text_message_start("m1"),
            Event::text_message_content("m1", "a"),
            Event::text_message_end("m1"),
            Event::raw(json!({"x": 1}), None),
            Event::run_finished("t1", "r1"),
        ];
        let out = normalize(input.clone())
            .await
            .into_iter()
            .collect::<AguiResult<Vec<_>>>()?;
        assert_eq!(out, input);
        Ok(())
    }

    #[test]
    fn same_id_chunks_share_one_start_and_end() -> anyhow::Result<()> {
        let mut normalizer = ChunkNormalizer::new();
        let mut out = Vec::new();
        out.extend(normalizer.push(text_chunk(Some("m1"), Some("a")))?);
        out.extend(normalizer.push(text_chunk(None, Some("b")))?);
        out.extend(normalizer.push(text_chunk(Some("m1"), None))?);
        out.extend(normalizer.push(text_chunk(Some("m1"), Some("c")))?);
        out.extend(normalizer.push(Event::step_started("s"))?);

        assert_eq!(
            kinds(&out),
            vec![
                EventType::TextMessageStart,
                EventType::TextMessageContent,
                EventType::TextMessageContent,
                EventType::TextMessageContent,
                EventType::TextMessageEnd,
                EventType::StepStarted,
            ]
        );
        assert!(normalizer.finish().is_none());
        Ok(())
    }

    #[test]
    fn new_id_closes_previous_message() -> anyhow::Result<()> {
        let mut normalizer = ChunkNormalizer::new();
        normalizer.push(text_chunk(Some("m1"), Some("a")))?;
        let out = normalizer.push(text_chunk(Some("m2"), Some("b")))?;
        assert_eq!(
            out,
            vec![
                Event::text_message_end("m1"),
                Event::text_message_start("m2"),
                Event::text_message_content("m2", "b"),
            ]
        );
        Ok(())
    }

    #[test]
    fn tool_chunk_closes_text_and_keeps_parent() -> anyhow::Result<()> {
        let mut normalizer = ChunkNormalizer::new();
        normalizer.push(text_chunk(Some("m1"), Some("a")))?;
        let out = normalizer.push(Event::tool_call_chunk(
            Some("c1".into()),
            Some("search".into()),
            Some("m1".into()),
            Some("{\"q\"".into()),
        ))?;
        assert_eq!(
            out,
            vec![
                Event::text_message_end("m1"),
                Event::tool_call_start("c1", "search", Some("m1".into())),
                Event::tool_call_args("c1", "{\"q\""),
            ]
        );
        let more = normalizer.push(tool_chunk(None, None, Some(":1}")))?;
        assert_eq!(more, vec![Event::tool_call_args("c1", ":1}")]);
        assert_eq!(normalizer.finish(), Some(Event::tool_call_end("c1")));
        Ok(())
    }

    #[test]
    fn raw_does_not_close_open_unit() -> anyhow::Result<()> {
        let mut normalizer = ChunkNormalizer::new();
        normalizer.push(text_chunk(Some("m1"), Some("a")))?;
        let raw = Event::raw(json!({"upstream": 1}), Some("proxy".into()));
        assert_eq!(normalizer.push(raw.clone())?, vec![raw]);
        assert_eq!(
            normalizer.push(text_chunk(None, Some("b")))?,
            vec![Event::text_message_content("m1", "b")]
        );
        Ok(())
    }

    #[test]
    fn first_chunk_requires_ids_and_name() {
        let mut normalizer = ChunkNormalizer::new();
        assert_eq!(
            normalizer.push(text_chunk(None, Some("a"))),
            Err(ChunkError::MissingMessageId)
        );
        assert_eq!(
            normalizer.push(tool_chunk(None, Some("search"), None)),
            Err(ChunkError::MissingToolCallId)
        );
        assert_eq!(
            normalizer.push(tool_chunk(Some("c1"), None, None)),
            Err(ChunkError::MissingToolCallName)
        );
    }

    #[tokio::test]
    async fn chunk_error_terminates_stream() {
        let out = normalize(vec![
            Event::run_started("t1", "r1"),
            text_chunk(None, Some("a")),
            Event::run_finished("t1", "r1"),
        ])
        .await;
        assert_eq!(out.len(), 2);
        assert!(matches!(
            out[1],
            Err(AguiError::Chunk(ChunkError::MissingMessageId))
        ));
    }

    #[tokio::test]
    async fn upstream_error_closes_open_unit_first() {
        let input = vec![
            Ok(text_chunk(Some("m1"), Some("a"))),
            Err(AguiError::Transport("connection reset".into())),
        ];
        let out: Vec<_> = normalize_chunks(stream::iter(input).boxed()).collect().await;
        assert_eq!(out.len(), 4);
        assert!(matches!(&out[2], Ok(Event::TextMessageEnd { message_id, .. }) if message_id == "m1"));
        assert!(matches!(out[3], Err(AguiError::Transport(_))));
    }

    #[tokio::test]
    async fn open_unit_is_closed_at_end_of_stream() -> anyhow::Result<()> {
        let out = normalize(vec![tool_chunk(Some("c1"), Some("lookup"), None)])
            .await
            .into_iter()
            .collect::<AguiResult<Vec<_>>>()?;
        assert_eq!(
            out,
            vec![
                Event::tool_call_start("c1", "lookup", None),
                Event::tool_call_end("c1"),
            ]
        );
        Ok(())
    }
}
