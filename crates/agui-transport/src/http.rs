//! Decoding an HTTP response into events.
//!
//! The response arrives as one `Headers` item followed by `Data` chunks.
//! The codec is picked once, from the headers' content type.

use crate::frame::decode_proto_stream;
use crate::media_type::is_protobuf_content_type;
use crate::sse::decode_sse_stream;
use agui_protocol::{AguiError, AguiResult, EventStream};
use async_stream::stream;
use bytes::Bytes;
use futures_util::stream::BoxStream;
use futures_util::{StreamExt, future};
use tracing::debug;

/// One item of an HTTP response body stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HttpEvent {
    Headers {
        status: u16,
        content_type: Option<String>,
    },
    Data(Bytes),
}

pub type HttpEventStream = BoxStream<'static, AguiResult<HttpEvent>>;

/// Turns a response stream into events, decoding protobuf frames or SSE
/// blocks depending on the announced content type.
pub fn transform_http_event_stream(events: HttpEventStream) -> EventStream {
    Box::pin(stream! {
        let mut events = events;
        let content_type = match events.next().await {
            None => return,
            Some(Err(err)) => {
                yield Err(err);
                return;
            }
            Some(Ok(HttpEvent::Data(_))) => {
                yield Err(AguiError::MissingHeaders);
                return;
            }
            Some(Ok(HttpEvent::Headers { status, content_type })) => {
                debug!(status, content_type = ?content_type, "response headers received");
                content_type
            }
        };

        let body = events.filter_map(|item| {
            future::ready(match item {
                Ok(HttpEvent::Data(chunk)) => Some(Ok(chunk)),
                Ok(HttpEvent::Headers { .. }) => None,
                Err(err) => Some(Err(err)),
            })
        });
        let mut decoded = if is_protobuf_content_type(content_type.as_deref()) {
            decode_proto_stream(body)
        } else {
            decode_sse_stream(body)
        };
        while let Some(item) = decoded.next().await {
            yield item;
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::encode_protobuf;
    use crate::media_type::{AGUI_MEDIA_TYPE, SSE_MEDIA_TYPE};
    use crate::sse::encode_sse;
    use agui_protocol::Event;
    use futures_util::stream;

    fn headers(content_type: &str) -> AguiResult<HttpEvent> {
        Ok(HttpEvent::Headers {
            status: 200,
            content_type: Some(content_type.to_owned()),
        })
    }

    async fn collect(items: Vec<AguiResult<HttpEvent>>) -> Vec<AguiResult<Event>> {
        transform_http_event_stream(stream::iter(items).boxed())
            .collect()
            .await
    }

    #[tokio::test]
    async fn sse_body_is_decoded() -> anyhow::Result<()> {
        let event = Event::run_started("t", "r");
        let out = collect(vec![
            headers(SSE_MEDIA_TYPE),
            Ok(HttpEvent::Data(encode_sse(&event)?)),
        ])
        .await;
        assert_eq!(out.into_iter().collect::<AguiResult<Vec<_>>>()?, vec![event]);
        Ok(())
    }

    #[tokio::test]
    async fn protobuf_body_is_decoded() -> anyhow::Result<()> {
        let event = Event::step_started("plan");
        let frame = encode_protobuf(&event)?;
        let out = collect(vec![
            headers(AGUI_MEDIA_TYPE),
            Ok(HttpEvent::Data(frame.slice(..3))),
            Ok(HttpEvent::Data(frame.slice(3..))),
        ])
        .await;
        assert_eq!(out.into_iter().collect::<AguiResult<Vec<_>>>()?, vec![event]);
        Ok(())
    }

    #[tokio::test]
    async fn data_before_headers_is_rejected() {
        let out = collect(vec![Ok(HttpEvent::Data(Bytes::from_static(b"data: {}\n\n")))]).await;
        assert_eq!(out.len(), 1);
        assert!(matches!(out[0], Err(AguiError::MissingHeaders)));
    }

    #[tokio::test]
    async fn transport_errors_pass_through() {
        let out = collect(vec![
            headers(SSE_MEDIA_TYPE),
            Err(AguiError::Transport("reset".into())),
        ])
        .await;
        assert_eq!(out.len(), 1);
        assert!(matches!(out[0], Err(AguiError::Transport(_))));
    }
}
