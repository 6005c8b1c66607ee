//! Error types for the AG-UI protocol.

use crate::event::EventType;
use thiserror::Error;

/// Structural violations rejected by the sequence validator.
///
/// Messages name the offending event kind and the precondition it broke, so
/// a misbehaving agent can be diagnosed from the error text alone.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum VerifyError {
    #[error(
        "Cannot send event type '{0}': The run has already errored with 'RUN_ERROR'. No further events can be sent."
    )]
    RunAlreadyErrored(EventType),
    #[error(
        "Cannot send event type '{0}': The run has already finished with 'RUN_FINISHED'. Start a new run with 'RUN_STARTED'."
    )]
    RunAlreadyFinished(EventType),
    #[error(
        "Cannot send event type '{0}' after 'TEXT_MESSAGE_START': Send 'TEXT_MESSAGE_END' first."
    )]
    InsideTextMessage(EventType),
    #[error("Cannot send event type '{0}' after 'TOOL_CALL_START': Send 'TOOL_CALL_END' first.")]
    InsideToolCall(EventType),
    #[error("First event must be 'RUN_STARTED'")]
    FirstEventNotRunStarted,
    #[error(
        "Cannot send multiple 'RUN_STARTED' events: A 'RUN_STARTED' event was already sent. Each run must have exactly one 'RUN_STARTED' event at the beginning."
    )]
    DuplicateRunStarted,
    #[error(
        "Cannot send 'TEXT_MESSAGE_START' event: A text message is already in progress. Complete it with 'TEXT_MESSAGE_END' first."
    )]
    TextMessageInProgress,
    #[error(
        "Cannot send 'TOOL_CALL_START' event: A tool call is already in progress. Complete it with 'TOOL_CALL_END' first."
    )]
    ToolCallInProgress,
    #[error(
        "Cannot send '{0}' event: No active text message found. Start a text message with 'TEXT_MESSAGE_START' first."
    )]
    NoActiveTextMessage(EventType),
    #[error(
        "Cannot send '{event}' event: Message ID mismatch. The ID '{id}' doesn't match the active message ID '{active}'."
    )]
    MessageIdMismatch {
        event: EventType,
        id: String,
        active: String,
    },
    #[error(
        "Cannot send '{0}' event: No active tool call found. Start a tool call with 'TOOL_CALL_START' first."
    )]
    NoActiveToolCall(EventType),
    #[error(
        "Cannot send '{event}' event: Tool call ID mismatch. The ID '{id}' doesn't match the active tool call ID '{active}'."
    )]
    ToolCallIdMismatch {
        event: EventType,
        id: String,
        active: String,
    },
    #[error("Step \"{0}\" is already active for 'STEP_STARTED'")]
    StepAlreadyActive(String),
    #[error("Cannot send 'STEP_FINISHED' for step \"{0}\" that was not started")]
    StepNotStarted(String),
    #[error("Cannot send 'RUN_FINISHED' while steps are still active: {0}")]
    StepsStillActive(String),
}

/// Chunk events that cannot be expanded into start/content/end triples.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ChunkError {
    #[error("First TEXT_MESSAGE_CHUNK must have a messageId")]
    MissingMessageId,
    #[error("First TOOL_CALL_CHUNK must have a toolCallId")]
    MissingToolCallId,
    #[error("First TOOL_CALL_CHUNK must have a toolCallName")]
    MissingToolCallName,
}

/// Errors that terminate an event stream or a run.
#[derive(Debug, Error)]
pub enum AguiError {
    #[error(transparent)]
    Verify(#[from] VerifyError),
    #[error(transparent)]
    Chunk(#[from] ChunkError),
    #[error("failed to decode event: {0}")]
    Decode(String),
    #[error("malformed frame: {0}")]
    Frame(String),
    #[error("invalid utf-8 at end of stream: {0} dangling byte(s)")]
    Utf8(usize),
    #[error("no headers event received before data events")]
    MissingHeaders,
    #[error("http request failed with status {status}: {body}")]
    Http { status: u16, body: String },
    #[error("transport error: {0}")]
    Transport(String),
    #[error("agent error: {0}")]
    Agent(String),
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for AguiError {
    fn from(error: serde_json::Error) -> Self {
        Self::Decode(error.to_string())
    }
}

/// Convenience result type for protocol operations.
pub type AguiResult<T> = Result<T, AguiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_messages_name_the_event_kind() {
        let err = VerifyError::NoActiveTextMessage(EventType::TextMessageContent);
        assert_eq!(
            err.to_string(),
            "Cannot send 'TEXT_MESSAGE_CONTENT' event: No active text message found. Start a text message with 'TEXT_MESSAGE_START' first."
        );
    }

    #[test]
    fn chunk_errors_convert_transparently() {
        let err: AguiError = ChunkError::MissingToolCallName.into();
        assert_eq!(err.to_string(), "First TOOL_CALL_CHUNK must have a toolCallName");
        assert!(matches!(err, AguiError::Chunk(ChunkError::MissingToolCallName)));
    }
}
