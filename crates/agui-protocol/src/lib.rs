//! # agui-protocol — AG-UI protocol contract
//!
//! Shared types and the agent port for streaming an agent run to a client.
//! No runtime dependencies (no tokio, no HTTP), so transports and pipelines
//! can all build on it.
//!
//! ## Module Overview
//!
//! - [`event`] — `Event` (18 kinds), `BaseEvent`, `EventType`
//! - [`message`] — `Message`, `ToolCall`, `Tool`, `Context`, `RunAgentInput`
//! - [`state`] — `AgentState`, `JsonPatchOp`, RFC 6902 application
//! - [`ports`] — the `Agent` trait and boxed stream aliases
//! - [`error`] — `AguiError`, `AguiResult`, `VerifyError`, `ChunkError`

pub mod error;
pub mod event;
pub mod message;
pub mod ports;
pub mod state;

pub use error::{AguiError, AguiResult, ChunkError, VerifyError};
pub use event::{BaseEvent, Event, EventType, TextMessageRole};
pub use message::{
    Context, FunctionCall, Message, Role, RunAgentInput, Tool, ToolCall, ToolCallType,
};
pub use ports::{Agent, EventStream, StateStream};
pub use state::{AgentState, JsonPatchOp, PatchApplyError, PatchOpKind, apply_patch};
