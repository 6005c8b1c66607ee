//! Session and per-run configuration.

use agui_protocol::{Context, Message, Tool};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Initial identity and history of an [`AgentSession`](crate::AgentSession).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AgentConfig {
    /// Assigned a random id on the first run when absent.
    pub agent_id: Option<String>,
    pub description: String,
    /// A random id is generated when absent.
    pub thread_id: Option<String>,
    pub initial_messages: Vec<Message>,
    /// `null` is treated as an empty object.
    pub initial_state: Value,
}

impl AgentConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_agent_id(mut self, agent_id: impl Into<String>) -> Self {
        self.agent_id = Some(agent_id.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_thread_id(mut self, thread_id: impl Into<String>) -> Self {
        self.thread_id = Some(thread_id.into());
        self
    }

    pub fn with_initial_messages(mut self, messages: Vec<Message>) -> Self {
        self.initial_messages = messages;
        self
    }

    pub fn with_initial_state(mut self, state: Value) -> Self {
        self.initial_state = state;
        self
    }
}

/// Inputs that vary per run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RunAgentParameters {
    /// A random id is generated when absent.
    pub run_id: Option<String>,
    pub tools: Vec<Tool>,
    pub context: Vec<Context>,
    /// `null` is sent as an empty object.
    pub forwarded_props: Value,
}

impl RunAgentParameters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = Some(run_id.into());
        self
    }

    pub fn with_tool(mut self, tool: Tool) -> Self {
        self.tools.push(tool);
        self
    }

    pub fn with_context(mut self, context: Context) -> Self {
        self.context.push(context);
        self
    }

    pub fn with_forwarded_props(mut self, forwarded_props: Value) -> Self {
        self.forwarded_props = forwarded_props;
        self
    }
}

pub(crate) fn object_or_empty(value: Value) -> Value {
    match value {
        Value::Null => Value::Object(Default::default()),
        other => other,
    }
}
