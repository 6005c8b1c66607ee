//! Conversation messages and the per-run request envelope.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Role of a [`Message`], as written in its `role` tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Developer,
    System,
    Assistant,
    User,
    Tool,
}

/// One conversation message, tagged by role.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "lowercase", rename_all_fields = "camelCase")]
pub enum Message {
    Developer {
        id: String,
        content: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
    },
    System {
        id: String,
        content: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
    },
    Assistant {
        id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        content: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tool_calls: Option<Vec<ToolCall>>,
    },
    User {
        id: String,
        content: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
    },
    Tool {
        id: String,
        content: String,
        tool_call_id: String,
    },
}

impl Message {
    pub fn user(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self::User {
            id: id.into(),
            content: content.into(),
            name: None,
        }
    }

    pub fn system(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self::System {
            id: id.into(),
            content: content.into(),
            name: None,
        }
    }

    /// An assistant message with empty text, the shape a streamed message
    /// starts from.
    pub fn assistant(id: impl Into<String>) -> Self {
        Self::Assistant {
            id: id.into(),
            content: Some(String::new()),
            name: None,
            tool_calls: None,
        }
    }

    pub fn tool(
        id: impl Into<String>,
        tool_call_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self::Tool {
            id: id.into(),
            content: content.into(),
            tool_call_id: tool_call_id.into(),
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Self::Developer { id, .. }
            | Self::System { id, .. }
            | Self::Assistant { id, .. }
            | Self::User { id, .. }
            | Self::Tool { id, .. } => id,
        }
    }

    pub fn role(&self) -> Role {
        match self {
            Self::Developer { .. } => Role::Developer,
            Self::System { .. } => Role::System,
            Self::Assistant { .. } => Role::Assistant,
            Self::User { .. } => Role::User,
            Self::Tool { .. } => Role::Tool,
        }
    }

    pub fn content(&self) -> Option<&str> {
        match self {
            Self::Developer { content, .. }
            | Self::System { content, .. }
            | Self::User { content, .. }
            | Self::Tool { content, .. } => Some(content),
            Self::Assistant { content, .. } => content.as_deref(),
        }
    }

    pub fn append_content(&mut self, delta: &str) {
        match self {
            Self::Developer { content, .. }
            | Self::System { content, .. }
            | Self::User { content, .. }
            | Self::Tool { content, .. } => content.push_str(delta),
            Self::Assistant { content, .. } => content.get_or_insert_default().push_str(delta),
        }
    }

    /// Tool calls of an assistant message; empty for every other role.
    pub fn tool_calls(&self) -> &[ToolCall] {
        match self {
            Self::Assistant {
                tool_calls: Some(calls),
                ..
            } => calls,
            _ => &[],
        }
    }

    /// Mutable access to an assistant's tool-call list, created on demand.
    /// `None` for non-assistant roles.
    pub fn tool_calls_mut(&mut self) -> Option<&mut Vec<ToolCall>> {
        match self {
            Self::Assistant { tool_calls, .. } => Some(tool_calls.get_or_insert_default()),
            _ => None,
        }
    }
}

/// Kind marker of a [`ToolCall`]; only function calls exist.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolCallType {
    #[default]
    Function,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    /// JSON text, possibly incomplete while the call is still streaming.
    pub arguments: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    #[serde(rename = "type", default)]
    pub call_type: ToolCallType,
    pub function: FunctionCall,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            call_type: ToolCallType::Function,
            function: FunctionCall {
                name: name.into(),
                arguments: String::new(),
            },
        }
    }
}

/// A tool the client makes available to the agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tool {
    pub name: String,
    pub description: String,
    /// JSON Schema of the arguments.
    pub parameters: Value,
}

/// Free-form context entry forwarded to the agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Context {
    pub description: String,
    pub value: String,
}

/// Frozen request context for one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunAgentInput {
    pub thread_id: String,
    pub run_id: String,
    #[serde(default)]
    pub state: Value,
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default)]
    pub tools: Vec<Tool>,
    #[serde(default)]
    pub context: Vec<Context>,
    #[serde(default)]
    pub forwarded_props: Value,
}

impl RunAgentInput {
    pub fn new(thread_id: impl Into<String>, run_id: impl Into<String>) -> Self {
        Self {
            thread_id: thread_id.into(),
            run_id: run_id.into(),
            state: Value::Object(Default::default()),
            messages: Vec::new(),
            tools: Vec::new(),
            context: Vec::new(),
            forwarded_props: Value::Object(Default::default()),
        }
    }

    #[must_use]
    pub fn with_state(mut self, state: Value) -> Self {
        self.state = state;
        self
    }

    #[must_use]
    pub fn with_messages(mut self, messages: Vec<Message>) -> Self {
        self.messages = messages;
        self
    }

    #[must_use]
    pub fn with_tool(mut self, tool: Tool) -> Self {
        self.tools.push(tool);
        self
    }

    #[must_use]
    pub fn with_context(mut self, context: Context) -> Self {
        self.context.push(context);
        self
    }

    #[must_use]
    pub fn with_forwarded_props(mut self, forwarded_props: Value) -> Self {
        self.forwarded_props = forwarded_props;
        self
    }
}
