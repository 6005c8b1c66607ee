//! Client-side agent session.
//!
//! An [`AgentSession`] owns the conversation (messages and state) for one
//! thread. Each [`AgentSession::run_agent`] call sends the current
//! conversation to the agent, runs the returned events through
//! [`agui_events::pipeline`] and mirrors every snapshot back onto the
//! session as it arrives.

use crate::config::{AgentConfig, RunAgentParameters, object_or_empty};
use agui_events::pipeline;
use agui_protocol::{
    Agent, AgentState, AguiError, AguiResult, Message, RunAgentInput, StateStream,
};
use futures_util::StreamExt;
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{Span, debug, error, info, instrument};
use uuid::Uuid;

/// Lifecycle of the most recent run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum RunStatus {
    #[default]
    Idle,
    Running,
    Finished,
    Errored,
    Cancelled,
}

/// Callbacks around a run.
///
/// `on_error` fires once for the error that ends a run; `on_finalize` fires
/// exactly once per run, whatever the outcome.
pub trait RunHooks: Send + Sync {
    fn on_error(&self, error: &AguiError) {
        error!(error = %error, "agent execution failed");
    }

    fn on_finalize(&self) {}
}

/// Logs errors and nothing else.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultHooks;

impl RunHooks for DefaultHooks {}

/// Cancels the session's in-flight run from another task.
///
/// Every run arms a fresh token, so aborting while idle does not affect
/// the next run.
#[derive(Debug, Clone, Default)]
pub struct AbortHandle {
    token: Arc<Mutex<CancellationToken>>,
}

impl AbortHandle {
    /// Idempotent.
    pub fn abort(&self) {
        self.token.lock().cancel();
    }

    pub fn is_aborted(&self) -> bool {
        self.token.lock().is_cancelled()
    }

    fn arm(&self) -> CancellationToken {
        let token = CancellationToken::new();
        *self.token.lock() = token.clone();
        token
    }
}

enum Outcome {
    Finished,
    Cancelled,
}

pub struct AgentSession<A> {
    agent: A,
    agent_id: Option<String>,
    description: String,
    thread_id: String,
    messages: Vec<Message>,
    state: Value,
    status: RunStatus,
    hooks: Arc<dyn RunHooks>,
    abort: AbortHandle,
}

impl<A: Agent> AgentSession<A> {
    pub fn new(agent: A, config: AgentConfig) -> Self {
        Self {
            agent,
            agent_id: config.agent_id,
            description: config.description,
            thread_id: config
                .thread_id
                .unwrap_or_else(|| Uuid::new_v4().to_string()),
            messages: config.initial_messages,
            state: object_or_empty(config.initial_state),
            status: RunStatus::Idle,
            hooks: Arc::new(DefaultHooks),
            abort: AbortHandle::default(),
        }
    }

    pub fn with_hooks(mut self, hooks: Arc<dyn RunHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn agent(&self) -> &A {
        &self.agent
    }

    pub fn agent_id(&self) -> Option<&str> {
        self.agent_id.as_deref()
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn thread_id(&self) -> &str {
        &self.thread_id
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn state(&self) -> &Value {
        &self.state
    }

    pub fn status(&self) -> RunStatus {
        self.status
    }

    pub fn set_messages(&mut self, messages: Vec<Message>) {
        self.messages = messages;
    }

    pub fn set_state(&mut self, state: Value) {
        self.state = state;
    }

    pub fn abort_handle(&self) -> AbortHandle {
        self.abort.clone()
    }

    pub fn abort(&self) {
        self.abort.abort();
    }

    /// Snapshot of the conversation as the agent will receive it.
    pub fn prepare_run_agent_input(&self, params: RunAgentParameters) -> RunAgentInput {
        RunAgentInput {
            thread_id: self.thread_id.clone(),
            run_id: params.run_id.unwrap_or_else(|| Uuid::new_v4().to_string()),
            state: self.state.clone(),
            messages: self.messages.clone(),
            tools: params.tools,
            context: params.context,
            forwarded_props: object_or_empty(params.forwarded_props),
        }
    }

    /// Runs the agent to completion, mirroring every snapshot onto the
    /// session.
    ///
    /// A run stopped through [`AbortHandle::abort`] returns `Ok` with status
    /// [`RunStatus::Cancelled`]; messages and state keep the last snapshot.
    #[instrument(skip(self, params), fields(thread_id = %self.thread_id, run_id))]
    pub async fn run_agent(&mut self, params: RunAgentParameters) -> AguiResult<()> {
        if self.agent_id.is_none() {
            self.agent_id = Some(Uuid::new_v4().to_string());
        }
        let input = self.prepare_run_agent_input(params);
        Span::current().record("run_id", input.run_id.as_str());

        let token = self.abort.arm();
        self.status = RunStatus::Running;
        info!(messages = self.messages.len(), "run started");

        let result = self.drive(input, &token).await;
        let result = match result {
            Ok(Outcome::Finished) => {
                self.status = RunStatus::Finished;
                info!(messages = self.messages.len(), "run finished");
                Ok(())
            }
            Ok(Outcome::Cancelled) => {
                self.status = RunStatus::Cancelled;
                info!("run cancelled");
                Ok(())
            }
            Err(err) => {
                self.status = RunStatus::Errored;
                self.hooks.on_error(&err);
                Err(err)
            }
        };
        self.hooks.on_finalize();
        result
    }

    async fn drive(
        &mut self,
        input: RunAgentInput,
        token: &CancellationToken,
    ) -> AguiResult<Outcome> {
        let initial = AgentState::new(input.messages.clone(), input.state.clone());
        let events = tokio::select! {
            biased;
            _ = token.cancelled() => return Ok(Outcome::Cancelled),
            events = self.agent.run(input) => events?,
        };
        let mut snapshots = pipeline(initial, events);
        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => return Ok(Outcome::Cancelled),
                next = snapshots.next() => match next {
                    Some(Ok(snapshot)) => {
                        debug!(messages = snapshot.messages.len(), "snapshot applied");
                        self.messages = snapshot.messages;
                        self.state = snapshot.state;
                    }
                    Some(Err(err)) => return Err(err),
                    None => return Ok(Outcome::Finished),
                },
            }
        }
    }
}

/// Starts `agent` on `input` and returns the lazy snapshot stream, for
/// callers that manage conversation state themselves.
pub async fn run_pipeline<A: Agent + ?Sized>(
    agent: &A,
    input: RunAgentInput,
) -> AguiResult<StateStream> {
    let initial = AgentState::new(input.messages.clone(), input.state.clone());
    let events = agent.run(input).await?;
    Ok(pipeline(initial, events))
}
