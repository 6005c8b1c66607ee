use agui_protocol::Message;
use agui_runtime::{
    AgentConfig, AgentSession, HttpAgent, HttpAgentConfig, RunAgentParameters, RunStatus,
    WireFormat,
};
use anyhow::{Context, Result};
use clap::Parser;
use serde_json::{Value, json};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[derive(Debug, Parser)]
#[command(name = "agui")]
#[command(about = "Run an AG-UI agent over HTTP and print the resulting conversation")]
struct Cli {
    /// Agent endpoint.
    #[arg(long)]
    url: String,
    #[arg(long)]
    thread_id: Option<String>,
    /// Extra request header, `KEY=VALUE`. Repeatable.
    #[arg(long = "header", value_parser = parse_header)]
    headers: Vec<(String, String)>,
    /// Ask for length-prefixed protobuf instead of SSE.
    #[arg(long)]
    binary: bool,
    /// User message to send. Repeatable.
    #[arg(long = "message")]
    messages: Vec<String>,
    /// Initial state as JSON.
    #[arg(long, value_parser = parse_json)]
    state: Option<Value>,
    #[arg(long, value_parser = parse_json)]
    forwarded_props: Option<Value>,
}

fn parse_header(raw: &str) -> Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got `{raw}`"))?;
    if key.trim().is_empty() {
        return Err(format!("empty header name in `{raw}`"));
    }
    Ok((key.trim().to_owned(), value.trim().to_owned()))
}

fn parse_json(raw: &str) -> Result<Value, String> {
    serde_json::from_str(raw).map_err(|err| err.to_string())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .compact()
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut http = HttpAgentConfig::new(cli.url).with_wire_format(if cli.binary {
        WireFormat::Protobuf
    } else {
        WireFormat::Sse
    });
    for (name, value) in cli.headers {
        http = http.with_header(name, value);
    }
    let agent = HttpAgent::new(http).context("building HTTP client")?;

    let mut config = AgentConfig::new().with_initial_messages(
        cli.messages
            .into_iter()
            .map(|content| Message::user(Uuid::new_v4().to_string(), content))
            .collect(),
    );
    if let Some(thread_id) = cli.thread_id {
        config = config.with_thread_id(thread_id);
    }
    if let Some(state) = cli.state {
        config = config.with_initial_state(state);
    }
    let mut session = AgentSession::new(agent, config);
    info!(thread_id = %session.thread_id(), url = %session.agent().config().url, "session created");

    let abort = session.abort_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, aborting run");
            abort.abort();
        }
    });

    let mut params = RunAgentParameters::new();
    if let Some(props) = cli.forwarded_props {
        params = params.with_forwarded_props(props);
    }
    session.run_agent(params).await.context("agent run failed")?;
    if session.status() == RunStatus::Cancelled {
        warn!("run cancelled; printing partial conversation");
    }

    let rendered = serde_json::to_string_pretty(&json!({
        "threadId": session.thread_id(),
        "messages": session.messages(),
        "state": session.state(),
    }))?;
    println!("{rendered}");
    Ok(())
}
