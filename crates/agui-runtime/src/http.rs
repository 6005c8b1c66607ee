//! [`Agent`] over HTTP.
//!
//! The run input is POSTed as JSON; the response body is decoded as SSE
//! or length-prefixed protobuf depending on the `Content-Type` the server
//! answers with.

use agui_protocol::{Agent, AguiError, AguiResult, EventStream, RunAgentInput};
use agui_transport::{AGUI_MEDIA_TYPE, HttpEvent, SSE_MEDIA_TYPE, transform_http_event_stream};
use async_trait::async_trait;
use futures_util::{StreamExt, future, stream};
use reqwest::header::{ACCEPT, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, instrument, warn};

/// Framing requested through the `Accept` header.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WireFormat {
    #[default]
    Sse,
    Protobuf,
}

impl WireFormat {
    pub fn accept(self) -> &'static str {
        match self {
            Self::Sse => SSE_MEDIA_TYPE,
            Self::Protobuf => AGUI_MEDIA_TYPE,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpAgentConfig {
    pub url: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub wire_format: WireFormat,
}

impl HttpAgentConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_wire_format(mut self, wire_format: WireFormat) -> Self {
        self.wire_format = wire_format;
        self
    }
}

#[derive(Debug, Clone)]
pub struct HttpAgent {
    config: HttpAgentConfig,
    client: reqwest::Client,
}

impl HttpAgent {
    pub fn new(config: HttpAgentConfig) -> AguiResult<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|err| AguiError::Transport(err.to_string()))?;
        Ok(Self::with_client(config, client))
    }

    pub fn with_client(config: HttpAgentConfig, client: reqwest::Client) -> Self {
        Self { config, client }
    }

    pub fn config(&self) -> &HttpAgentConfig {
        &self.config
    }
}

#[async_trait]
impl Agent for HttpAgent {
    #[instrument(skip(self, input), fields(url = %self.config.url, run_id = %input.run_id))]
    async fn run(&self, input: RunAgentInput) -> AguiResult<EventStream> {
        let mut request = self.client.post(&self.config.url);
        for (name, value) in &self.config.headers {
            request = request.header(name.as_str(), value.as_str());
        }
        // Replaces configured values for the same names.
        let mut negotiated = HeaderMap::new();
        negotiated.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        negotiated.insert(
            ACCEPT,
            HeaderValue::from_static(self.config.wire_format.accept()),
        );
        request = request.headers(negotiated);

        let response = request
            .json(&input)
            .send()
            .await
            .map_err(|err| AguiError::Transport(err.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), "agent endpoint rejected run");
            return Err(AguiError::Http {
                status: status.as_u16(),
                body,
            });
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned);
        debug!(status = status.as_u16(), content_type = ?content_type, "response stream opened");

        let headers = stream::once(future::ready(Ok(HttpEvent::Headers {
            status: status.as_u16(),
            content_type,
        })));
        let body = response.bytes_stream().map(|chunk| {
            chunk
                .map(HttpEvent::Data)
                .map_err(|err| AguiError::Transport(err.to_string()))
        });
        Ok(transform_http_event_stream(headers.chain(body).boxed()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AgentConfig, RunAgentParameters};
    use crate::session::{AgentSession, RunStatus};
    use agui_protocol::{Event, Message, Role};
    use agui_transport::EventEncoder;
    use axum::Router;
    use axum::body::Body;
    use axum::extract::Json;
    use axum::http::{HeaderMap, StatusCode};
    use axum::response::{IntoResponse, Response};
    use axum::routing::post;
    use serde_json::json;

    async fn serve(router: Router) -> anyhow::Result<String> {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        tokio::spawn(async move { axum::serve(listener, router).await });
        Ok(format!("http://{addr}/run"))
    }

    async fn echo_run(headers: HeaderMap, Json(input): Json<RunAgentInput>) -> Response {
        if headers.get("authorization").and_then(|v| v.to_str().ok()) != Some("Bearer secret") {
            return (StatusCode::UNAUTHORIZED, "missing token").into_response();
        }
        let encoder = EventEncoder::new(headers.get("accept").and_then(|v| v.to_str().ok()));
        let last_user = input
            .messages
            .last()
            .and_then(|m| m.content())
            .unwrap_or_default()
            .to_owned();
        let events = [
            Event::run_started(&input.thread_id, &input.run_id),
            Event::text_message_chunk(Some("reply".into()), Some(format!("echo: {last_user}"))),
            Event::state_snapshot(json!({"turns": 1})),
            Event::run_finished(&input.thread_id, &input.run_id),
        ];
        let chunks: Vec<_> = events.iter().map(|event| encoder.encode(event)).collect();
        (
            [("content-type", encoder.content_type())],
            Body::from_stream(stream::iter(chunks)),
        )
            .into_response()
    }

    async fn negotiated_headers_only(headers: HeaderMap) -> Response {
        let values = |name: &str| -> Vec<String> {
            headers
                .get_all(name)
                .iter()
                .filter_map(|value| value.to_str().ok())
                .map(str::to_owned)
                .collect()
        };
        let accepts = values("accept");
        let content_types = values("content-type");
        if accepts != [SSE_MEDIA_TYPE] || content_types != ["application/json"] {
            let detail = format!("accept={accepts:?} content-type={content_types:?}");
            return (StatusCode::BAD_REQUEST, detail).into_response();
        }
        let encoder = EventEncoder::default();
        let events = [
            Event::run_started("t1", "r1"),
            Event::run_finished("t1", "r1"),
        ];
        let chunks: Vec<_> = events.iter().map(|event| encoder.encode(event)).collect();
        (
            [("content-type", encoder.content_type())],
            Body::from_stream(stream::iter(chunks)),
        )
            .into_response()
    }

    fn session_for(
        url: String,
        wire_format: WireFormat,
    ) -> anyhow::Result<AgentSession<HttpAgent>> {
        let agent = HttpAgent::new(
            HttpAgentConfig::new(url)
                .with_header("Authorization", "Bearer secret")
                .with_wire_format(wire_format),
        )?;
        let config = AgentConfig::new()
            .with_thread_id("t1")
            .with_initial_messages(vec![Message::user("u1", "ping")]);
        Ok(AgentSession::new(agent, config))
    }

    #[tokio::test]
    async fn sse_round_trip() -> anyhow::Result<()> {
        let url = serve(Router::new().route("/run", post(echo_run))).await?;
        let mut session = session_for(url, WireFormat::Sse)?;

        session.run_agent(RunAgentParameters::new()).await?;

        assert_eq!(session.status(), RunStatus::Finished);
        assert_eq!(session.messages().len(), 2);
        assert_eq!(session.messages()[1].role(), Role::Assistant);
        assert_eq!(session.messages()[1].content(), Some("echo: ping"));
        assert_eq!(session.state(), &json!({"turns": 1}));
        Ok(())
    }

    #[tokio::test]
    async fn protobuf_round_trip() -> anyhow::Result<()> {
        let url = serve(Router::new().route("/run", post(echo_run))).await?;
        let mut session = session_for(url, WireFormat::Protobuf)?;

        session.run_agent(RunAgentParameters::new()).await?;

        assert_eq!(session.messages()[1].content(), Some("echo: ping"));
        assert_eq!(session.state(), &json!({"turns": 1}));
        Ok(())
    }

    #[tokio::test]
    async fn configured_headers_do_not_duplicate_negotiated_ones() -> anyhow::Result<()> {
        let url = serve(Router::new().route("/run", post(negotiated_headers_only))).await?;
        let agent = HttpAgent::new(
            HttpAgentConfig::new(url)
                .with_header("Accept", "application/json")
                .with_header("Content-Type", "text/plain")
                .with_header("X-Trace", "abc"),
        )?;

        let events: Vec<_> = agent
            .run(RunAgentInput::new("t1", "r1"))
            .await?
            .collect::<Vec<_>>()
            .await
            .into_iter()
            .collect::<AguiResult<_>>()?;
        assert_eq!(
            events,
            vec![Event::run_started("t1", "r1"), Event::run_finished("t1", "r1")]
        );
        Ok(())
    }

    #[tokio::test]
    async fn error_status_surfaces_body() -> anyhow::Result<()> {
        let url = serve(Router::new().route("/run", post(echo_run))).await?;
        let agent = HttpAgent::new(HttpAgentConfig::new(url))?;

        let result = agent.run(RunAgentInput::new("t1", "r1")).await;

        match result {
            Err(AguiError::Http { status, body }) => {
                assert_eq!(status, 401);
                assert_eq!(body, "missing token");
            }
            Err(other) => anyhow::bail!("unexpected error: {other}"),
            Ok(_) => anyhow::bail!("expected an HTTP error"),
        }
        Ok(())
    }

    #[test]
    fn config_from_json() -> anyhow::Result<()> {
        let config: HttpAgentConfig = serde_json::from_value(json!({
            "url": "http://localhost:8000/agent",
            "wireFormat": "protobuf"
        }))?;
        assert_eq!(config.wire_format.accept(), AGUI_MEDIA_TYPE);
        assert!(config.headers.is_empty());
        Ok(())
    }
}
