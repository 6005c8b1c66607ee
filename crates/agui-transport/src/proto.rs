//! Protobuf body encoding of events.
//!
//! The schema lives in [`pb`] as hand-written `prost` messages: one
//! top-level `Event` holding a oneof over the eighteen kind messages, each
//! with a `BaseEvent` header. JSON payloads travel as
//! `google.protobuf.Value`.

use agui_protocol::{
    AguiError, AguiResult, BaseEvent, Event, FunctionCall, JsonPatchOp, Message, PatchOpKind,
    TextMessageRole, ToolCall, ToolCallType,
};
use prost::Message as _;
use prost_types::value::Kind;
use prost_types::{ListValue, Struct};
use serde_json::{Map, Number, Value};

/// Largest integer an `f64` represents exactly (2^53).
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_992.0;

pub mod pb {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
    #[repr(i32)]
    pub enum EventType {
        TextMessageStart = 0,
        TextMessageContent = 1,
        TextMessageEnd = 2,
        ToolCallStart = 3,
        ToolCallArgs = 4,
        ToolCallEnd = 5,
        StateSnapshot = 6,
        StateDelta = 7,
        MessagesSnapshot = 8,
        Raw = 9,
        Custom = 10,
        RunStarted = 11,
        RunFinished = 12,
        RunError = 13,
        StepStarted = 14,
        StepFinished = 15,
        TextMessageChunk = 16,
        ToolCallChunk = 17,
    }

    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
    #[repr(i32)]
    pub enum JsonPatchOperationType {
        Add = 0,
        Remove = 1,
        Replace = 2,
        Move = 3,
        Copy = 4,
        Test = 5,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct BaseEvent {
        #[prost(enumeration = "EventType", tag = "1")]
        pub r#type: i32,
        #[prost(int64, optional, tag = "2")]
        pub timestamp: Option<i64>,
        #[prost(message, optional, tag = "3")]
        pub raw_event: Option<::prost_types::Value>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct JsonPatchOperation {
        #[prost(enumeration = "JsonPatchOperationType", tag = "1")]
        pub op: i32,
        #[prost(string, tag = "2")]
        pub path: String,
        #[prost(string, optional, tag = "3")]
        pub from: Option<String>,
        #[prost(message, optional, tag = "4")]
        pub value: Option<::prost_types::Value>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct FunctionCall {
        #[prost(string, tag = "1")]
        pub name: String,
        #[prost(string, tag = "2")]
        pub arguments: String,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct ToolCall {
        #[prost(string, tag = "1")]
        pub id: String,
        #[prost(string, tag = "2")]
        pub r#type: String,
        #[prost(message, optional, tag = "3")]
        pub function: Option<FunctionCall>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Message {
        #[prost(string, tag = "1")]
        pub id: String,
        #[prost(string, tag = "2")]
        pub role: String,
        #[prost(string, optional, tag = "3")]
        pub content: Option<String>,
        #[prost(string, optional, tag = "4")]
        pub name: Option<String>,
        #[prost(message, repeated, tag = "5")]
        pub tool_calls: Vec<ToolCall>,
        #[prost(string, optional, tag = "6")]
        pub tool_call_id: Option<String>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct TextMessageStartEvent {
        #[prost(message, optional, tag = "1")]
        pub base_event: Option<BaseEvent>,
        #[prost(string, tag = "2")]
        pub message_id: String,
        #[prost(string, optional, tag = "3")]
        pub role: Option<String>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct TextMessageContentEvent {
        #[prost(message, optional, tag = "1")]
        pub base_event: Option<BaseEvent>,
        #[prost(string, tag = "2")]
        pub message_id: String,
        #[prost(string, tag = "3")]
        pub delta: String,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct TextMessageEndEvent {
        #[prost(message, optional, tag = "1")]
        pub base_event: Option<BaseEvent>,
        #[prost(string, tag = "2")]
        pub message_id: String,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct TextMessageChunkEvent {
        #[prost(message, optional, tag = "1")]
        pub base_event: Option<BaseEvent>,
        #[prost(string, optional, tag = "2")]
        pub message_id: Option<String>,
        #[prost(string, optional, tag = "3")]
        pub role: Option<String>,
        #[prost(string, optional, tag = "4")]
        pub delta: Option<String>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct ToolCallStartEvent {
        #[prost(message, optional, tag = "1")]
        pub base_event: Option<BaseEvent>,
        #[prost(string, tag = "2")]
        pub tool_call_id: String,
        #[prost(string, tag = "3")]
        pub tool_call_name: String,
        #[prost(string, optional, tag = "4")]
        pub parent_message_id: Option<String>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct ToolCallArgsEvent {
        #[prost(message, optional, tag = "1")]
        pub base_event: Option<BaseEvent>,
        #[prost(string, tag = "2")]
        pub tool_call_id: String,
        #[prost(string, tag = "3")]
        pub delta: String,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct ToolCallEndEvent {
        #[prost(message, optional, tag = "1")]
        pub base_event: Option<BaseEvent>,
        #[prost(string, tag = "2")]
        pub tool_call_id: String,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct ToolCallChunkEvent {
        #[prost(message, optional, tag = "1")]
        pub base_event: Option<BaseEvent>,
        #[prost(string, optional, tag = "2")]
        pub tool_call_id: Option<String>,
        #[prost(string, optional, tag = "3")]
        pub tool_call_name: Option<String>,
        #[prost(string, optional, tag = "4")]
        pub parent_message_id: Option<String>,
        #[prost(string, optional, tag = "5")]
        pub delta: Option<String>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct StateSnapshotEvent {
        #[prost(message, optional, tag = "1")]
        pub base_event: Option<BaseEvent>,
        #[prost(message, optional, tag = "2")]
        pub snapshot: Option<::prost_types::Value>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct StateDeltaEvent {
        #[prost(message, optional, tag = "1")]
        pub base_event: Option<BaseEvent>,
        #[prost(message, repeated, tag = "2")]
        pub delta: Vec<JsonPatchOperation>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct MessagesSnapshotEvent {
        #[prost(message, optional, tag = "1")]
        pub base_event: Option<BaseEvent>,
        #[prost(message, repeated, tag = "2")]
        pub messages: Vec<Message>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct RawEvent {
        #[prost(message, optional, tag = "1")]
        pub base_event: Option<BaseEvent>,
        #[prost(message, optional, tag = "2")]
        pub event: Option<::prost_types::Value>,
        #[prost(string, optional, tag = "3")]
        pub source: Option<String>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct CustomEvent {
        #[prost(message, optional, tag = "1")]
        pub base_event: Option<BaseEvent>,
        #[prost(string, tag = "2")]
        pub name: String,
        #[prost(message, optional, tag = "3")]
        pub value: Option<::prost_types::Value>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct RunStartedEvent {
        #[prost(message, optional, tag = "1")]
        pub base_event: Option<BaseEvent>,
        #[prost(string, tag = "2")]
        pub thread_id: String,
        #[prost(string, tag = "3")]
        pub run_id: String,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct RunFinishedEvent {
        #[prost(message, optional, tag = "1")]
        pub base_event: Option<BaseEvent>,
        #[prost(string, tag = "2")]
        pub thread_id: String,
        #[prost(string, tag = "3")]
        pub run_id: String,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct RunErrorEvent {
        #[prost(message, optional, tag = "1")]
        pub base_event: Option<BaseEvent>,
        #[prost(string, optional, tag = "2")]
        pub code: Option<String>,
        #[prost(string, tag = "3")]
        pub message: String,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct StepStartedEvent {
        #[prost(message, optional, tag = "1")]
        pub base_event: Option<BaseEvent>,
        #[prost(string, tag = "2")]
        pub step_name: String,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct StepFinishedEvent {
        #[prost(message, optional, tag = "1")]
        pub base_event: Option<BaseEvent>,
        #[prost(string, tag = "2")]
        pub step_name: String,
    }

    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum EventKind {
        #[prost(message, tag = "1")]
        TextMessageStart(TextMessageStartEvent),
        #[prost(message, tag = "2")]
        TextMessageContent(TextMessageContentEvent),
        #[prost(message, tag = "3")]
        TextMessageEnd(TextMessageEndEvent),
        #[prost(message, tag = "4")]
        ToolCallStart(ToolCallStartEvent),
        #[prost(message, tag = "5")]
        ToolCallArgs(ToolCallArgsEvent),
        #[prost(message, tag = "6")]
        ToolCallEnd(ToolCallEndEvent),
        #[prost(message, tag = "7")]
        StateSnapshot(StateSnapshotEvent),
        #[prost(message, tag = "8")]
        StateDelta(StateDeltaEvent),
        #[prost(message, tag = "9")]
        MessagesSnapshot(MessagesSnapshotEvent),
        #[prost(message, tag = "10")]
        Raw(RawEvent),
        #[prost(message, tag = "11")]
        Custom(CustomEvent),
        #[prost(message, tag = "12")]
        RunStarted(RunStartedEvent),
        #[prost(message, tag = "13")]
        RunFinished(RunFinishedEvent),
        #[prost(message, tag = "14")]
        RunError(RunErrorEvent),
        #[prost(message, tag = "15")]
        StepStarted(StepStartedEvent),
        #[prost(message, tag = "16")]
        StepFinished(StepFinishedEvent),
        #[prost(message, tag = "17")]
        TextMessageChunk(TextMessageChunkEvent),
        #[prost(message, tag = "18")]
        ToolCallChunk(ToolCallChunkEvent),
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Event {
        #[prost(
            oneof = "EventKind",
            tags = "1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18"
        )]
        pub event: Option<EventKind>,
    }
}

/// Encodes one event body (without the length prefix).
pub fn encode_event(event: &Event) -> AguiResult<Vec<u8>> {
    Ok(to_pb(event)?.encode_to_vec())
}

/// Decodes one event body (without the length prefix).
pub fn decode_event(body: &[u8]) -> AguiResult<Event> {
    let message =
        pb::Event::decode(body).map_err(|e| AguiError::Decode(format!("invalid protobuf event: {e}")))?;
    from_pb(message)
}

fn to_pb(event: &Event) -> AguiResult<pb::Event> {
    use pb::EventKind as K;

    let base = Some(base_to_pb(event)?);
    let kind = match event {
        Event::TextMessageStart { message_id, .. } => K::TextMessageStart(pb::TextMessageStartEvent {
            base_event: base,
            message_id: message_id.clone(),
            role: Some("assistant".to_owned()),
        }),
        Event::TextMessageContent {
            message_id, delta, ..
        } => K::TextMessageContent(pb::TextMessageContentEvent {
            base_event: base,
            message_id: message_id.clone(),
            delta: delta.clone(),
        }),
        Event::TextMessageEnd { message_id, .. } => K::TextMessageEnd(pb::TextMessageEndEvent {
            base_event: base,
            message_id: message_id.clone(),
        }),
        Event::TextMessageChunk {
            message_id,
            role,
            delta,
            ..
        } => K::TextMessageChunk(pb::TextMessageChunkEvent {
            base_event: base,
            message_id: message_id.clone(),
            role: role.map(|_| "assistant".to_owned()),
            delta: delta.clone(),
        }),
        Event::ToolCallStart {
            tool_call_id,
            tool_call_name,
            parent_message_id,
            ..
        } => K::ToolCallStart(pb::ToolCallStartEvent {
            base_event: base,
            tool_call_id: tool_call_id.clone(),
            tool_call_name: tool_call_name.clone(),
            parent_message_id: parent_message_id.clone(),
        }),
        Event::ToolCallArgs {
            tool_call_id,
            delta,
            ..
        } => K::ToolCallArgs(pb::ToolCallArgsEvent {
            base_event: base,
            tool_call_id: tool_call_id.clone(),
            delta: delta.clone(),
        }),
        Event::ToolCallEnd { tool_call_id, .. } => K::ToolCallEnd(pb::ToolCallEndEvent {
            base_event: base,
            tool_call_id: tool_call_id.clone(),
        }),
        Event::ToolCallChunk {
            tool_call_id,
            tool_call_name,
            parent_message_id,
            delta,
            ..
        } => K::ToolCallChunk(pb::ToolCallChunkEvent {
            base_event: base,
            tool_call_id: tool_call_id.clone(),
            tool_call_name: tool_call_name.clone(),
            parent_message_id: parent_message_id.clone(),
            delta: delta.clone(),
        }),
        Event::StateSnapshot { snapshot, .. } => K::StateSnapshot(pb::StateSnapshotEvent {
            base_event: base,
            snapshot: Some(json_to_pb(snapshot)),
        }),
        Event::StateDelta { delta, .. } => K::StateDelta(pb::StateDeltaEvent {
            base_event: base,
            delta: delta.iter().map(patch_op_to_pb).collect(),
        }),
        Event::MessagesSnapshot { messages, .. } => K::MessagesSnapshot(pb::MessagesSnapshotEvent {
            base_event: base,
            messages: messages.iter().map(message_to_pb).collect(),
        }),
        Event::Raw { event, source, .. } => K::Raw(pb::RawEvent {
            base_event: base,
            event: Some(json_to_pb(event)),
            source: source.clone(),
        }),
        Event::Custom { name, value, .. } => K::Custom(pb::CustomEvent {
            base_event: base,
            name: name.clone(),
            value: Some(json_to_pb(value)),
        }),
        Event::RunStarted {
            thread_id, run_id, ..
        } => K::RunStarted(pb::RunStartedEvent {
            base_event: base,
            thread_id: thread_id.clone(),
            run_id: run_id.clone(),
        }),
        Event::RunFinished {
            thread_id, run_id, ..
        } => K::RunFinished(pb::RunFinishedEvent {
            base_event: base,
            thread_id: thread_id.clone(),
            run_id: run_id.clone(),
        }),
        Event::RunError { message, code, .. } => K::RunError(pb::RunErrorEvent {
            base_event: base,
            code: code.clone(),
            message: message.clone(),
        }),
        Event::StepStarted { step_name, .. } => K::StepStarted(pb::StepStartedEvent {
            base_event: base,
            step_name: step_name.clone(),
        }),
        Event::StepFinished { step_name, .. } => K::StepFinished(pb::StepFinishedEvent {
            base_event: base,
            step_name: step_name.clone(),
        }),
    };
    Ok(pb::Event { event: Some(kind) })
}

fn from_pb(message: pb::Event) -> AguiResult<Event> {
    use pb::EventKind as K;

    let Some(kind) = message.event else {
        return Err(AguiError::Decode("protobuf event has no payload".to_owned()));
    };
    let event = match kind {
        K::TextMessageStart(e) => {
            if let Some(role) = e.role.as_deref() {
                text_role_from_pb(role)?;
            }
            Event::TextMessageStart {
                message_id: e.message_id,
                role: TextMessageRole::Assistant,
                base: base_from_pb(e.base_event)?,
            }
        }
        K::TextMessageContent(e) => {
            if e.delta.is_empty() {
                return Err(AguiError::Decode(
                    "TEXT_MESSAGE_CONTENT delta must not be empty".to_owned(),
                ));
            }
            Event::TextMessageContent {
                message_id: e.message_id,
                delta: e.delta,
                base: base_from_pb(e.base_event)?,
            }
        }
        K::TextMessageEnd(e) => Event::TextMessageEnd {
            message_id: e.message_id,
            base: base_from_pb(e.base_event)?,
        },
        K::TextMessageChunk(e) => Event::TextMessageChunk {
            message_id: e.message_id,
            role: e.role.as_deref().map(text_role_from_pb).transpose()?,
            delta: e.delta,
            base: base_from_pb(e.base_event)?,
        },
        K::ToolCallStart(e) => Event::ToolCallStart {
            tool_call_id: e.tool_call_id,
            tool_call_name: e.tool_call_name,
            parent_message_id: e.parent_message_id,
            base: base_from_pb(e.base_event)?,
        },
        K::ToolCallArgs(e) => Event::ToolCallArgs {
            tool_call_id: e.tool_call_id,
            delta: e.delta,
            base: base_from_pb(e.base_event)?,
        },
        K::ToolCallEnd(e) => Event::ToolCallEnd {
            tool_call_id: e.tool_call_id,
            base: base_from_pb(e.base_event)?,
        },
        K::ToolCallChunk(e) => Event::ToolCallChunk {
            tool_call_id: e.tool_call_id,
            tool_call_name: e.tool_call_name,
            parent_message_id: e.parent_message_id,
            delta: e.delta,
            base: base_from_pb(e.base_event)?,
        },
        K::StateSnapshot(e) => Event::StateSnapshot {
            snapshot: e.snapshot.map(json_from_pb).unwrap_or_default(),
            base: base_from_pb(e.base_event)?,
        },
        K::StateDelta(e) => Event::StateDelta {
            delta: e
                .delta
                .into_iter()
                .map(patch_op_from_pb)
                .collect::<AguiResult<_>>()?,
            base: base_from_pb(e.base_event)?,
        },
        K::MessagesSnapshot(e) => Event::MessagesSnapshot {
            messages: e
                .messages
                .into_iter()
                .map(message_from_pb)
                .collect::<AguiResult<_>>()?,
            base: base_from_pb(e.base_event)?,
        },
        K::Raw(e) => Event::Raw {
            event: e.event.map(json_from_pb).unwrap_or_default(),
            source: e.source,
            base: base_from_pb(e.base_event)?,
        },
        K::Custom(e) => Event::Custom {
            name: e.name,
            value: e.value.map(json_from_pb).unwrap_or_default(),
            base: base_from_pb(e.base_event)?,
        },
        K::RunStarted(e) => Event::RunStarted {
            thread_id: e.thread_id,
            run_id: e.run_id,
            base: base_from_pb(e.base_event)?,
        },
        K::RunFinished(e) => Event::RunFinished {
            thread_id: e.thread_id,
            run_id: e.run_id,
            base: base_from_pb(e.base_event)?,
        },
        K::RunError(e) => Event::RunError {
            message: e.message,
            code: e.code,
            base: base_from_pb(e.base_event)?,
        },
        K::StepStarted(e) => Event::StepStarted {
            step_name: e.step_name,
            base: base_from_pb(e.base_event)?,
        },
        K::StepFinished(e) => Event::StepFinished {
            step_name: e.step_name,
            base: base_from_pb(e.base_event)?,
        },
    };
    Ok(event)
}

fn event_type_to_pb(event: &Event) -> pb::EventType {
    use agui_protocol::EventType as T;
    match event.event_type() {
        T::TextMessageStart => pb::EventType::TextMessageStart,
        T::TextMessageContent => pb::EventType::TextMessageContent,
        T::TextMessageEnd => pb::EventType::TextMessageEnd,
        T::TextMessageChunk => pb::EventType::TextMessageChunk,
        T::ToolCallStart => pb::EventType::ToolCallStart,
        T::ToolCallArgs => pb::EventType::ToolCallArgs,
        T::ToolCallEnd => pb::EventType::ToolCallEnd,
        T::ToolCallChunk => pb::EventType::ToolCallChunk,
        T::StateSnapshot => pb::EventType::StateSnapshot,
        T::StateDelta => pb::EventType::StateDelta,
        T::MessagesSnapshot => pb::EventType::MessagesSnapshot,
        T::Raw => pb::EventType::Raw,
        T::Custom => pb::EventType::Custom,
        T::RunStarted => pb::EventType::RunStarted,
        T::RunFinished => pb::EventType::RunFinished,
        T::RunError => pb::EventType::RunError,
        T::StepStarted => pb::EventType::StepStarted,
        T::StepFinished => pb::EventType::StepFinished,
    }
}

fn base_to_pb(event: &Event) -> AguiResult<pb::BaseEvent> {
    let base = event.base();
    let timestamp = base
        .timestamp
        .map(i64::try_from)
        .transpose()
        .map_err(|_| AguiError::Serialization("timestamp does not fit in int64".to_owned()))?;
    Ok(pb::BaseEvent {
        r#type: event_type_to_pb(event) as i32,
        timestamp,
        raw_event: base.raw_event.as_ref().map(json_to_pb),
    })
}

fn base_from_pb(base: Option<pb::BaseEvent>) -> AguiResult<BaseEvent> {
    let Some(base) = base else {
        return Ok(BaseEvent::default());
    };
    let timestamp = base
        .timestamp
        .map(u64::try_from)
        .transpose()
        .map_err(|_| AguiError::Decode("negative event timestamp".to_owned()))?;
    Ok(BaseEvent {
        timestamp,
        raw_event: base.raw_event.map(json_from_pb),
    })
}

fn text_role_from_pb(role: &str) -> AguiResult<TextMessageRole> {
    match role {
        "assistant" => Ok(TextMessageRole::Assistant),
        other => Err(AguiError::Decode(format!(
            "text message role must be 'assistant', got '{other}'"
        ))),
    }
}

fn patch_op_to_pb(op: &JsonPatchOp) -> pb::JsonPatchOperation {
    let kind = match op.op {
        PatchOpKind::Add => pb::JsonPatchOperationType::Add,
        PatchOpKind::Remove => pb::JsonPatchOperationType::Remove,
        PatchOpKind::Replace => pb::JsonPatchOperationType::Replace,
        PatchOpKind::Move => pb::JsonPatchOperationType::Move,
        PatchOpKind::Copy => pb::JsonPatchOperationType::Copy,
        PatchOpKind::Test => pb::JsonPatchOperationType::Test,
    };
    pb::JsonPatchOperation {
        op: kind as i32,
        path: op.path.clone(),
        from: op.from.clone(),
        value: op.value.as_ref().map(json_to_pb),
    }
}

fn patch_op_from_pb(op: pb::JsonPatchOperation) -> AguiResult<JsonPatchOp> {
    let kind = pb::JsonPatchOperationType::try_from(op.op)
        .map_err(|_| AguiError::Decode(format!("unknown JSON patch operation {}", op.op)))?;
    let kind = match kind {
        pb::JsonPatchOperationType::Add => PatchOpKind::Add,
        pb::JsonPatchOperationType::Remove => PatchOpKind::Remove,
        pb::JsonPatchOperationType::Replace => PatchOpKind::Replace,
        pb::JsonPatchOperationType::Move => PatchOpKind::Move,
        pb::JsonPatchOperationType::Copy => PatchOpKind::Copy,
        pb::JsonPatchOperationType::Test => PatchOpKind::Test,
    };
    Ok(JsonPatchOp {
        op: kind,
        path: op.path,
        value: op.value.map(json_from_pb),
        from: op.from,
    })
}

fn message_to_pb(message: &Message) -> pb::Message {
    let tool_calls = message
        .tool_calls()
        .iter()
        .map(|call| pb::ToolCall {
            id: call.id.clone(),
            r#type: "function".to_owned(),
            function: Some(pb::FunctionCall {
                name: call.function.name.clone(),
                arguments: call.function.arguments.clone(),
            }),
        })
        .collect();
    let (name, tool_call_id) = match message {
        Message::Developer { name, .. }
        | Message::System { name, .. }
        | Message::User { name, .. }
        | Message::Assistant { name, .. } => (name.clone(), None),
        Message::Tool { tool_call_id, .. } => (None, Some(tool_call_id.clone())),
    };
    let role = serde_json::to_value(message.role())
        .ok()
        .and_then(|v| v.as_str().map(str::to_owned))
        .unwrap_or_default();
    pb::Message {
        id: message.id().to_owned(),
        role,
        content: message.content().map(str::to_owned),
        name,
        tool_calls,
        tool_call_id,
    }
}

fn message_from_pb(message: pb::Message) -> AguiResult<Message> {
    let required = |content: Option<String>| {
        content.ok_or_else(|| {
            AguiError::Decode(format!("message '{}' is missing its content", message.id))
        })
    };
    let decoded = match message.role.as_str() {
        "developer" => Message::Developer {
            id: message.id.clone(),
            content: required(message.content.clone())?,
            name: message.name.clone(),
        },
        "system" => Message::System {
            id: message.id.clone(),
            content: required(message.content.clone())?,
            name: message.name.clone(),
        },
        "user" => Message::User {
            id: message.id.clone(),
            content: required(message.content.clone())?,
            name: message.name.clone(),
        },
        "tool" => Message::Tool {
            id: message.id.clone(),
            content: required(message.content.clone())?,
            tool_call_id: message.tool_call_id.clone().ok_or_else(|| {
                AguiError::Decode(format!("tool message '{}' has no toolCallId", message.id))
            })?,
        },
        "assistant" => {
            let tool_calls = message
                .tool_calls
                .iter()
                .map(tool_call_from_pb)
                .collect::<AguiResult<Vec<_>>>()?;
            Message::Assistant {
                id: message.id.clone(),
                content: message.content.clone(),
                name: message.name.clone(),
                tool_calls: (!tool_calls.is_empty()).then_some(tool_calls),
            }
        }
        other => {
            return Err(AguiError::Decode(format!("unknown message role '{other}'")));
        }
    };
    Ok(decoded)
}

fn tool_call_from_pb(call: &pb::ToolCall) -> AguiResult<ToolCall> {
    if call.r#type != "function" {
        return Err(AguiError::Decode(format!(
            "unsupported tool call type '{}'",
            call.r#type
        )));
    }
    let function = call.function.as_ref().ok_or_else(|| {
        AguiError::Decode(format!("tool call '{}' has no function", call.id))
    })?;
    Ok(ToolCall {
        id: call.id.clone(),
        call_type: ToolCallType::Function,
        function: FunctionCall {
            name: function.name.clone(),
            arguments: function.arguments.clone(),
        },
    })
}

/// Converts JSON into `google.protobuf.Value`. Numbers become doubles.
pub fn json_to_pb(value: &Value) -> prost_types::Value {
    let kind = match value {
        Value::Null => Kind::NullValue(prost_types::NullValue::NullValue as i32),
        Value::Bool(b) => Kind::BoolValue(*b),
        Value::Number(n) => Kind::NumberValue(n.as_f64().unwrap_or_default()),
        Value::String(s) => Kind::StringValue(s.clone()),
        Value::Array(items) => Kind::ListValue(ListValue {
            values: items.iter().map(json_to_pb).collect(),
        }),
        Value::Object(fields) => Kind::StructValue(Struct {
            fields: fields
                .iter()
                .map(|(key, value)| (key.clone(), json_to_pb(value)))
                .collect(),
        }),
    };
    prost_types::Value { kind: Some(kind) }
}

/// Converts `google.protobuf.Value` back into JSON.
///
/// Integral doubles within the exactly representable range come back as
/// JSON integers. `google.protobuf.Value` has a single double number kind,
/// so a JSON float with no fractional part (`2.0`, `-0.0`) also comes back
/// as an integer (`2`, `0`) and does not compare equal to the value that
/// was encoded.
pub fn json_from_pb(value: prost_types::Value) -> Value {
    match value.kind {
        None | Some(Kind::NullValue(_)) => Value::Null,
        Some(Kind::BoolValue(b)) => Value::Bool(b),
        Some(Kind::NumberValue(n)) => number_from_f64(n),
        Some(Kind::StringValue(s)) => Value::String(s),
        Some(Kind::ListValue(list)) => {
            Value::Array(list.values.into_iter().map(json_from_pb).collect())
        }
        Some(Kind::StructValue(object)) => Value::Object(
            object
                .fields
                .into_iter()
                .map(|(key, value)| (key, json_from_pb(value)))
                .collect::<Map<String, Value>>(),
        ),
    }
}

fn number_from_f64(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() <= MAX_SAFE_INTEGER {
        if n >= 0.0 {
            return Value::from(n as u64);
        }
        return Value::from(n as i64);
    }
    Number::from_f64(n).map_or(Value::Null, Value::Number)
}
