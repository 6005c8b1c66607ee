//! The AG-UI event vocabulary.
//!
//! Every event on the wire is a JSON object whose `type` field names one of
//! eighteen kinds; the remaining fields are camelCase and fixed per kind.
//! [`Event`] is the closed sum over those kinds, so a value that parses is
//! structurally valid.

use crate::message::Message;
use crate::state::JsonPatchOp;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;

/// Fields shared by every event kind.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BaseEvent {
    /// Milliseconds since the Unix epoch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<u64>,
    /// Opaque passthrough of whatever upstream event produced this one.
    #[serde(rename = "rawEvent", default, skip_serializing_if = "Option::is_none")]
    pub raw_event: Option<Value>,
}

/// Role carried by streamed text messages. Only assistants stream text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextMessageRole {
    #[default]
    Assistant,
}

/// Discriminant of an [`Event`], displayed as the wire kind name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    TextMessageStart,
    TextMessageContent,
    TextMessageEnd,
    TextMessageChunk,
    ToolCallStart,
    ToolCallArgs,
    ToolCallEnd,
    ToolCallChunk,
    StateSnapshot,
    StateDelta,
    MessagesSnapshot,
    Raw,
    Custom,
    RunStarted,
    RunFinished,
    RunError,
    StepStarted,
    StepFinished,
}

impl EventType {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::TextMessageStart => "TEXT_MESSAGE_START",
            Self::TextMessageContent => "TEXT_MESSAGE_CONTENT",
            Self::TextMessageEnd => "TEXT_MESSAGE_END",
            Self::TextMessageChunk => "TEXT_MESSAGE_CHUNK",
            Self::ToolCallStart => "TOOL_CALL_START",
            Self::ToolCallArgs => "TOOL_CALL_ARGS",
            Self::ToolCallEnd => "TOOL_CALL_END",
            Self::ToolCallChunk => "TOOL_CALL_CHUNK",
            Self::StateSnapshot => "STATE_SNAPSHOT",
            Self::StateDelta => "STATE_DELTA",
            Self::MessagesSnapshot => "MESSAGES_SNAPSHOT",
            Self::Raw => "RAW",
            Self::Custom => "CUSTOM",
            Self::RunStarted => "RUN_STARTED",
            Self::RunFinished => "RUN_FINISHED",
            Self::RunError => "RUN_ERROR",
            Self::StepStarted => "STEP_STARTED",
            Self::StepFinished => "STEP_FINISHED",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One protocol event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    rename_all = "SCREAMING_SNAKE_CASE",
    rename_all_fields = "camelCase"
)]
pub enum Event {
    // Text messages
    TextMessageStart {
        message_id: String,
        role: TextMessageRole,
        #[serde(flatten)]
        base: BaseEvent,
    },
    TextMessageContent {
        message_id: String,
        #[serde(deserialize_with = "non_empty_delta")]
        delta: String,
        #[serde(flatten)]
        base: BaseEvent,
    },
    TextMessageEnd {
        message_id: String,
        #[serde(flatten)]
        base: BaseEvent,
    },
    /// Wire-only shorthand, expanded by the chunk normalizer.
    TextMessageChunk {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        role: Option<TextMessageRole>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        delta: Option<String>,
        #[serde(flatten)]
        base: BaseEvent,
    },

    // Tool calls
    ToolCallStart {
        tool_call_id: String,
        tool_call_name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        parent_message_id: Option<String>,
        #[serde(flatten)]
        base: BaseEvent,
    },
    ToolCallArgs {
        tool_call_id: String,
        delta: String,
        #[serde(flatten)]
        base: BaseEvent,
    },
    ToolCallEnd {
        tool_call_id: String,
        #[serde(flatten)]
        base: BaseEvent,
    },
    /// Wire-only shorthand, expanded by the chunk normalizer.
    ToolCallChunk {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tool_call_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tool_call_name: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        parent_message_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        delta: Option<String>,
        #[serde(flatten)]
        base: BaseEvent,
    },

    // State synchronization
    StateSnapshot {
        snapshot: Value,
        #[serde(flatten)]
        base: BaseEvent,
    },
    StateDelta {
        delta: Vec<JsonPatchOp>,
        #[serde(flatten)]
        base: BaseEvent,
    },
    MessagesSnapshot {
        messages: Vec<Message>,
        #[serde(flatten)]
        base: BaseEvent,
    },

    // Escape hatches
    Raw {
        event: Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        source: Option<String>,
        #[serde(flatten)]
        base: BaseEvent,
    },
    Custom {
        name: String,
        value: Value,
        #[serde(flatten)]
        base: BaseEvent,
    },

    // Lifecycle
    RunStarted {
        thread_id: String,
        run_id: String,
        #[serde(flatten)]
        base: BaseEvent,
    },
    RunFinished {
        thread_id: String,
        run_id: String,
        #[serde(flatten)]
        base: BaseEvent,
    },
    RunError {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        code: Option<String>,
        #[serde(flatten)]
        base: BaseEvent,
    },
    StepStarted {
        step_name: String,
        #[serde(flatten)]
        base: BaseEvent,
    },
    StepFinished {
        step_name: String,
        #[serde(flatten)]
        base: BaseEvent,
    },
}

fn non_empty_delta<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let delta = String::deserialize(deserializer)?;
    if delta.is_empty() {
        return Err(serde::de::Error::custom("delta must not be an empty string"));
    }
    Ok(delta)
}

impl Event {
    pub fn text_message_start(message_id: impl Into<String>) -> Self {
        Self::TextMessageStart {
            message_id: message_id.into(),
            role: TextMessageRole::Assistant,
            base: BaseEvent::default(),
        }
    }

    pub fn text_message_content(message_id: impl Into<String>, delta: impl Into<String>) -> Self {
        Self::TextMessageContent {
            message_id: message_id.into(),
            delta: delta.into(),
            base: BaseEvent::default(),
        }
    }

    pub fn text_message_end(message_id: impl Into<String>) -> Self {
        Self::TextMessageEnd {
            message_id: message_id.into(),
            base: BaseEvent::default(),
        }
    }

    pub fn text_message_chunk(message_id: Option<String>, delta: Option<String>) -> Self {
        Self::TextMessageChunk {
            message_id,
            role: None,
            delta,
            base: BaseEvent::default(),
        }
    }

    pub fn tool_call_start(
        tool_call_id: impl Into<String>,
        tool_call_name: impl Into<String>,
        parent_message_id: Option<String>,
    ) -> Self {
        Self::ToolCallStart {
            tool_call_id: tool_call_id.into(),
            tool_call_name: tool_call_name.into(),
            parent_message_id,
            base: BaseEvent::default(),
        }
    }

    pub fn tool_call_args(tool_call_id: impl Into<String>, delta: impl Into<String>) -> Self {
        Self::ToolCallArgs {
            tool_call_id: tool_call_id.into(),
            delta: delta.into(),
            base: BaseEvent::default(),
        }
    }

    pub fn tool_call_end(tool_call_id: impl Into<String>) -> Self {
        Self::ToolCallEnd {
            tool_call_id: tool_call_id.into(),
            base: BaseEvent::default(),
        }
    }

    pub fn tool_call_chunk(
        tool_call_id: Option<String>,
        tool_call_name: Option<String>,
        parent_message_id: Option<String>,
        delta: Option<String>,
    ) -> Self {
        Self::ToolCallChunk {
            tool_call_id,
            tool_call_name,
            parent_message_id,
            delta,
            base: BaseEvent::default(),
        }
    }

    pub fn state_snapshot(snapshot: Value) -> Self {
        Self::StateSnapshot {
            snapshot,
            base: BaseEvent::default(),
        }
    }

    pub fn state_delta(delta: Vec<JsonPatchOp>) -> Self {
        Self::StateDelta {
            delta,
            base: BaseEvent::default(),
        }
    }

    pub fn messages_snapshot(messages: Vec<Message>) -> Self {
        Self::MessagesSnapshot {
            messages,
            base: BaseEvent::default(),
        }
    }

    pub fn raw(event: Value, source: Option<String>) -> Self {
        Self::Raw {
            event,
            source,
            base: BaseEvent::default(),
        }
    }

    pub fn custom(name: impl Into<String>, value: Value) -> Self {
        Self::Custom {
            name: name.into(),
            value,
            base: BaseEvent::default(),
        }
    }

    pub fn run_started(thread_id: impl Into<String>, run_id: impl Into<String>) -> Self {
        Self::RunStarted {
            thread_id: thread_id.into(),
            run_id: run_id.into(),
            base: BaseEvent::default(),
        }
    }

    pub fn run_finished(thread_id: impl Into<String>, run_id: impl Into<String>) -> Self {
        Self::RunFinished {
            thread_id: thread_id.into(),
            run_id: run_id.into(),
            base: BaseEvent::default(),
        }
    }

    pub fn run_error(message: impl Into<String>, code: Option<String>) -> Self {
        Self::RunError {
            message: message.into(),
            code,
            base: BaseEvent::default(),
        }
    }

    pub fn step_started(step_name: impl Into<String>) -> Self {
        Self::StepStarted {
            step_name: step_name.into(),
            base: BaseEvent::default(),
        }
    }

    pub fn step_finished(step_name: impl Into<String>) -> Self {
        Self::StepFinished {
            step_name: step_name.into(),
            base: BaseEvent::default(),
        }
    }

    pub fn event_type(&self) -> EventType {
        match self {
            Self::TextMessageStart { .. } => EventType::TextMessageStart,
            Self::TextMessageContent { .. } => EventType::TextMessageContent,
            Self::TextMessageEnd { .. } => EventType::TextMessageEnd,
            Self::TextMessageChunk { .. } => EventType::TextMessageChunk,
            Self::ToolCallStart { .. } => EventType::ToolCallStart,
            Self::ToolCallArgs { .. } => EventType::ToolCallArgs,
            Self::ToolCallEnd { .. } => EventType::ToolCallEnd,
            Self::ToolCallChunk { .. } => EventType::ToolCallChunk,
            Self::StateSnapshot { .. } => EventType::StateSnapshot,
            Self::StateDelta { .. } => EventType::StateDelta,
            Self::MessagesSnapshot { .. } => EventType::MessagesSnapshot,
            Self::Raw { .. } => EventType::Raw,
            Self::Custom { .. } => EventType::Custom,
            Self::RunStarted { .. } => EventType::RunStarted,
            Self::RunFinished { .. } => EventType::RunFinished,
            Self::RunError { .. } => EventType::RunError,
            Self::StepStarted { .. } => EventType::StepStarted,
            Self::StepFinished { .. } => EventType::StepFinished,
        }
    }

    pub fn base(&self) -> &BaseEvent {
        match self {
            Self::TextMessageStart { base, .. }
            | Self::TextMessageContent { base, .. }
            | Self::TextMessageEnd { base, .. }
            | Self::TextMessageChunk { base, .. }
            | Self::ToolCallStart { base, .. }
            | Self::ToolCallArgs { base, .. }
            | Self::ToolCallEnd { base, .. }
            | Self::ToolCallChunk { base, .. }
            | Self::StateSnapshot { base, .. }
            | Self::StateDelta { base, .. }
            | Self::MessagesSnapshot { base, .. }
            | Self::Raw { base, .. }
            | Self::Custom { base, .. }
            | Self::RunStarted { base, .. }
            | Self::RunFinished { base, .. }
            | Self::RunError { base, .. }
            | Self::StepStarted { base, .. }
            | Self::StepFinished { base, .. } => base,
        }
    }

    fn base_mut(&mut self) -> &mut BaseEvent {
        match self {
            Self::TextMessageStart { base, .. }
            | Self::TextMessageContent { base, .. }
            | Self::TextMessageEnd { base, .. }
            | Self::TextMessageChunk { base, .. }
            | Self::ToolCallStart { base, .. }
            | Self::ToolCallArgs { base, .. }
            | Self::ToolCallEnd { base, .. }
            | Self::ToolCallChunk { base, .. }
            | Self::StateSnapshot { base, .. }
            | Self::StateDelta { base, .. }
            | Self::MessagesSnapshot { base, .. }
            | Self::Raw { base, .. }
            | Self::Custom { base, .. }
            | Self::RunStarted { base, .. }
            | Self::RunFinished { base, .. }
            | Self::RunError { base, .. }
            | Self::StepStarted { base, .. }
            | Self::StepFinished { base, .. } => base,
        }
    }

    #[must_use]
    pub fn with_timestamp(mut self, timestamp: u64) -> Self {
        self.base_mut().timestamp = Some(timestamp);
        self
    }

    /// Stamps the event with the current wall-clock time.
    #[must_use]
    pub fn with_current_timestamp(self) -> Self {
        let millis = u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or_default();
        self.with_timestamp(millis)
    }

    #[must_use]
    pub fn with_raw_event(mut self, raw_event: Value) -> Self {
        self.base_mut().raw_event = Some(raw_event);
        self
    }

    /// Chunk kinds only exist on the wire and never reach the validator.
    pub fn is_chunk(&self) -> bool {
        matches!(
            self,
            Self::TextMessageChunk { .. } | Self::ToolCallChunk { .. }
        )
    }
}
