//! Structural validation of normalized event streams.

use agui_protocol::{AguiResult, Event, EventStream, EventType, VerifyError};
use async_stream::stream;
use futures_util::StreamExt;
use indexmap::IndexSet;
use tracing::{debug, warn};

/// Fold state of the sequence validator.
#[derive(Debug, Default)]
pub struct EventVerifier {
    active_message_id: Option<String>,
    active_tool_call_id: Option<String>,
    active_steps: IndexSet<String>,
    first_event_received: bool,
    run_finished: bool,
    run_error: bool,
}

impl EventVerifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Checks `event` against the current state and advances it.
    ///
    /// A rejected event leaves the state untouched, but callers are expected
    /// to stop feeding events after the first error.
    pub fn verify(&mut self, event: &Event) -> Result<(), VerifyError> {
        let event_type = event.event_type();

        if self.run_error {
            return Err(VerifyError::RunAlreadyErrored(event_type));
        }
        if self.run_finished && event_type != EventType::RunError {
            return Err(VerifyError::RunAlreadyFinished(event_type));
        }

        if self.active_message_id.is_some()
            && !matches!(
                event_type,
                EventType::TextMessageContent | EventType::TextMessageEnd | EventType::Raw
            )
        {
            return Err(VerifyError::InsideTextMessage(event_type));
        }
        if self.active_tool_call_id.is_some()
            && !matches!(
                event_type,
                EventType::ToolCallArgs | EventType::ToolCallEnd | EventType::Raw
            )
        {
            return Err(VerifyError::InsideToolCall(event_type));
        }

        if !self.first_event_received {
            if !matches!(event_type, EventType::RunStarted | EventType::RunError) {
                return Err(VerifyError::FirstEventNotRunStarted);
            }
            self.first_event_received = true;
        } else if event_type == EventType::RunStarted {
            return Err(VerifyError::DuplicateRunStarted);
        }

        match event {
            Event::TextMessageStart { message_id, .. } => {
                if self.active_message_id.is_some() {
                    return Err(VerifyError::TextMessageInProgress);
                }
                self.active_message_id = Some(message_id.clone());
            }
            Event::TextMessageContent { message_id, .. } => {
                self.check_message_id(event_type, message_id)?;
            }
            Event::TextMessageEnd { message_id, .. } => {
                self.check_message_id(event_type, message_id)?;
                self.active_message_id = None;
            }
            Event::ToolCallStart { tool_call_id, .. } => {
                if self.active_tool_call_id.is_some() {
                    return Err(VerifyError::ToolCallInProgress);
                }
                self.active_tool_call_id = Some(tool_call_id.clone());
            }
            Event::ToolCallArgs { tool_call_id, .. } => {
                self.check_tool_call_id(event_type, tool_call_id)?;
            }
            Event::ToolCallEnd { tool_call_id, .. } => {
                self.check_tool_call_id(event_type, tool_call_id)?;
                self.active_tool_call_id = None;
            }
            Event::StepStarted { step_name, .. } => {
                if self.active_steps.contains(step_name) {
                    return Err(VerifyError::StepAlreadyActive(step_name.clone()));
                }
                self.active_steps.insert(step_name.clone());
            }
            Event::StepFinished { step_name, .. } => {
                if !self.active_steps.shift_remove(step_name) {
                    return Err(VerifyError::StepNotStarted(step_name.clone()));
                }
            }
            Event::RunFinished { .. } => {
                if !self.active_steps.is_empty() {
                    let active: Vec<&str> = self.active_steps.iter().map(String::as_str).collect();
                    return Err(VerifyError::StepsStillActive(active.join(", ")));
                }
                self.run_finished = true;
            }
            Event::RunError { .. } => {
                self.run_error = true;
            }
            Event::TextMessageChunk { .. } | Event::ToolCallChunk { .. } => {
                warn!(%event_type, "chunk event reached the validator without normalization");
            }
            Event::StateSnapshot { .. }
            | Event::StateDelta { .. }
            | Event::MessagesSnapshot { .. }
            | Event::Raw { .. }
            | Event::Custom { .. }
            | Event::RunStarted { .. } => {}
        }

        Ok(())
    }

    fn check_message_id(&self, event: EventType, id: &str) -> Result<(), VerifyError> {
        match &self.active_message_id {
            None => Err(VerifyError::NoActiveTextMessage(event)),
            Some(active) if active != id => Err(VerifyError::MessageIdMismatch {
                event,
                id: id.to_owned(),
                active: active.clone(),
            }),
            Some(_) => Ok(()),
        }
    }

    fn check_tool_call_id(&self, event: EventType, id: &str) -> Result<(), VerifyError> {
        match &self.active_tool_call_id {
            None => Err(VerifyError::NoActiveToolCall(event)),
            Some(active) if active != id => Err(VerifyError::ToolCallIdMismatch {
                event,
                id: id.to_owned(),
                active: active.clone(),
            }),
            Some(_) => Ok(()),
        }
    }
}

/// Passes events through the validator; the first violation (or upstream
/// error) is yielded and ends the stream.
pub fn verify_events(events: EventStream) -> EventStream {
    Box::pin(stream! {
        let mut events = events;
        let mut verifier = EventVerifier::new();
        while let Some(item) = events.next().await {
            let event = match item {
                Ok(event) => event,
                Err(err) => {
                    yield Err(err);
                    return;
                }
            };
            if let Err(violation) = verifier.verify(&event) {
                warn!(error = %violation, "event stream rejected");
                yield AguiResult::Err(violation.into());
                return;
            }
            debug!(event_type = %event.event_type(), "event verified");
            yield Ok(event);
        }
    })
}
