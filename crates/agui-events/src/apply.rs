//! Folding validated events into message and state snapshots.

use crate::repair::parse_partial_json;
use agui_protocol::{
    AgentState, Event, EventStream, Message, RunAgentInput, StateStream, ToolCall, apply_patch,
};
use async_stream::stream;
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

/// Name of the `CUSTOM` event that registers predictive-state mappings.
pub const PREDICT_STATE_EVENT: &str = "PredictState";

/// Routes streaming arguments of `tool` into `state[state_key]`.
///
/// With `tool_argument` set, only that argument is copied; otherwise the
/// whole argument object is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PredictStateMapping {
    pub state_key: String,
    pub tool: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_argument: Option<String>,
}

/// Running fold of one event stream.
///
/// [`Projector::apply`] returns a fresh [`AgentState`] for every event that
/// changes what a client would render.
#[derive(Debug, Default)]
pub struct Projector {
    messages: Vec<Message>,
    state: Value,
    predict_state: Option<Vec<PredictStateMapping>>,
}

impl Projector {
    pub fn new(initial: AgentState) -> Self {
        Self {
            messages: initial.messages,
            state: initial.state,
            predict_state: None,
        }
    }

    pub fn from_input(input: &RunAgentInput) -> Self {
        Self::new(AgentState::new(input.messages.clone(), input.state.clone()))
    }

    pub fn snapshot(&self) -> AgentState {
        AgentState::new(self.messages.clone(), self.state.clone())
    }

    pub fn apply(&mut self, event: &Event) -> Option<AgentState> {
        let changed = match event {
            Event::TextMessageStart { message_id, .. } => {
                self.messages.push(Message::assistant(message_id.clone()));
                true
            }
            Event::TextMessageContent { delta, .. } => match self.messages.last_mut() {
                Some(message) => {
                    message.append_content(delta);
                    true
                }
                None => {
                    warn!("TEXT_MESSAGE_CONTENT without a message to append to");
                    false
                }
            },
            Event::ToolCallStart {
                tool_call_id,
                tool_call_name,
                parent_message_id,
                ..
            } => {
                self.start_tool_call(tool_call_id, tool_call_name, parent_message_id.as_deref());
                true
            }
            Event::ToolCallArgs { delta, .. } => self.append_tool_args(delta),
            Event::StateSnapshot { snapshot, .. } => {
                self.state = snapshot.clone();
                true
            }
            Event::StateDelta { delta, .. } => match apply_patch(&self.state, delta) {
                Ok(next) => {
                    self.state = next;
                    true
                }
                Err(err) => {
                    warn!(error = %err, ops = delta.len(), "dropping STATE_DELTA that failed to apply");
                    false
                }
            },
            Event::MessagesSnapshot { messages, .. } => {
                self.messages = messages.clone();
                true
            }
            Event::Custom { name, value, .. } if name == PREDICT_STATE_EVENT => {
                match serde_json::from_value::<Vec<PredictStateMapping>>(value.clone()) {
                    Ok(mappings) => self.predict_state = Some(mappings),
                    Err(err) => warn!(error = %err, "ignoring malformed PredictState mapping"),
                }
                false
            }
            Event::StepFinished { .. } => {
                self.predict_state = None;
                false
            }
            Event::TextMessageEnd { .. }
            | Event::TextMessageChunk { .. }
            | Event::ToolCallEnd { .. }
            | Event::ToolCallChunk { .. }
            | Event::Raw { .. }
            | Event::Custom { .. }
            | Event::RunStarted { .. }
            | Event::RunFinished { .. }
            | Event::RunError { .. }
            | Event::StepStarted { .. } => false,
        };

        if !changed {
            return None;
        }
        debug!(
            event_type = %event.event_type(),
            messages = self.messages.len(),
            "state snapshot"
        );
        Some(self.snapshot())
    }

    fn start_tool_call(&mut self, id: &str, name: &str, parent_message_id: Option<&str>) {
        let call = ToolCall::new(id, name);
        if let Some(parent) = parent_message_id
            && let Some(last) = self.messages.last_mut()
            && last.id() == parent
            && let Some(calls) = last.tool_calls_mut()
        {
            calls.push(call);
            return;
        }
        // A parent id already taken by another message falls back to the call id.
        let message_id = parent_message_id
            .filter(|parent| !self.messages.iter().any(|m| m.id() == *parent))
            .unwrap_or(id);
        let mut message = Message::Assistant {
            id: message_id.to_owned(),
            content: None,
            name: None,
            tool_calls: None,
        };
        if let Some(calls) = message.tool_calls_mut() {
            calls.push(call);
        }
        self.messages.push(message);
    }

    fn append_tool_args(&mut self, delta: &str) -> bool {
        let Some(call) = self
            .messages
            .last_mut()
            .and_then(Message::tool_calls_mut)
            .and_then(|calls| calls.last_mut())
        else {
            warn!("TOOL_CALL_ARGS without a tool call to append to");
            return false;
        };
        call.function.arguments.push_str(delta);

        let mapping = self
            .predict_state
            .as_ref()
            .and_then(|mappings| mappings.iter().find(|m| m.tool == call.function.name));
        if let Some(mapping) = mapping
            && let Some(args) = parse_partial_json(&call.function.arguments)
        {
            let value = match mapping.tool_argument.as_deref().and_then(|arg| args.get(arg)) {
                Some(argument) => argument.clone(),
                None => args,
            };
            if !self.state.is_object() {
                self.state = Value::Object(Map::new());
            }
            if let Value::Object(state) = &mut self.state {
                state.insert(mapping.state_key.clone(), value);
            }
        }
        true
    }
}

/// Projects `events` onto `initial`, yielding a snapshot per state change.
///
/// Upstream errors are forwarded and end the stream.
pub fn apply_events(initial: AgentState, events: EventStream) -> StateStream {
    Box::pin(stream! {
        let mut events = events;
        let mut projector = Projector::new(initial);
        while let Some(item) = events.next().await {
            match item {
                Ok(event) => {
                    if let Some(snapshot) = projector.apply(&event) {
                        yield Ok(snapshot);
                    }
                }
                Err(err) => {
                    yield Err(err);
                    return;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use agui_protocol::{AguiResult, JsonPatchOp, Role};
    use futures_util::stream;
    use serde_json::json;

    fn projector_with_state(state: Value) -> Projector {
        Projector::new(AgentState::new(Vec::new(), state))
    }

    fn predict(mappings: Value) -> Event {
        Event::custom(PREDICT_STATE_EVENT, mappings)
    }

    #[test]
    fn delta_replaces_and_failed_delta_is_dropped() {
        let mut projector = projector_with_state(json!({"count": 0}));

        let snapshot = projector.apply(&Event::state_delta(vec![JsonPatchOp::replace(
            "/count",
            json!(1),
        )]));
        assert_eq!(snapshot.map(|s| s.state), Some(json!({"count": 1})));

        let dropped = projector.apply(&Event::state_delta(vec![JsonPatchOp::replace(
            "/missing",
            json!(2),
        )]));
        assert!(dropped.is_none());
        assert_eq!(projector.snapshot().state, json!({"count": 1}));
    }

    #[test]
    fn text_message_accumulates_content() {
        let mut projector = Projector::default();
        assert!(projector.apply(&Event::run_started("t", "r")).is_none());
        assert!(projector.apply(&Event::text_message_start("m1")).is_some());
        projector.apply(&Event::text_message_content("m1", "Hel"));
        let snapshot = projector.apply(&Event::text_message_content("m1", "lo"));
        assert!(projector.apply(&Event::text_message_end("m1")).is_none());

        let messages = snapshot.map(|s| s.messages).unwrap_or_default();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].role(), Role::Assistant);
        assert_eq!(messages[0].content(), Some("Hello"));
    }

    #[test]
    fn tool_call_attaches_to_matching_parent() {
        let mut projector = Projector::default();
        projector.apply(&Event::text_message_start("m1"));
        projector.apply(&Event::tool_call_start("c1", "search", Some("m1".into())));
        let snapshot = projector.apply(&Event::tool_call_args("c1", "{\"q\":1}"));

        let messages = snapshot.map(|s| s.messages).unwrap_or_default();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].tool_calls()[0].function.arguments, "{\"q\":1}");
    }

    #[test]
    fn tool_call_without_matching_parent_gets_own_message() {
        let mut projector = Projector::new(AgentState::new(
            vec![Message::user("u1", "hi")],
            json!({}),
        ));
        projector.apply(&Event::tool_call_start("c1", "search", Some("u1".into())));
        projector.apply(&Event::tool_call_start("c2", "lookup", None));
        projector.apply(&Event::tool_call_start("c3", "fetch", Some("m9".into())));
        let messages = projector.snapshot().messages;

        assert_eq!(messages.len(), 4);
        assert_eq!(messages[1].id(), "c1");
        assert_eq!(messages[1].role(), Role::Assistant);
        assert_eq!(messages[1].tool_calls()[0].function.name, "search");
        assert_eq!(messages[2].id(), "c2");
        assert_eq!(messages[2].tool_calls()[0].function.name, "lookup");
        assert_eq!(messages[3].id(), "m9");

        let mut ids: Vec<&str> = messages.iter().map(Message::id).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), messages.len());
    }

    #[test]
    fn multi_byte_whitespace_in_arguments_does_not_break_projection() {
        let mut projector = projector_with_state(json!({}));
        projector.apply(&predict(json!([{"state_key": "k", "tool": "t"}])));
        projector.apply(&Event::tool_call_start("c1", "t", None));
        let snapshot = projector.apply(&Event::tool_call_args("c1", "{\"a\": tr\u{3000}u"));

        let snapshot = snapshot.unwrap_or_default();
        assert_eq!(snapshot.state, json!({}));
        assert_eq!(
            snapshot.messages[0].tool_calls()[0].function.arguments,
            "{\"a\": tr\u{3000}u"
        );

        let snapshot = projector.apply(&Event::tool_call_args("c1", "e, \"b\":\u{a0}1"));
        assert_eq!(snapshot.map(|s| s.state), Some(json!({})));
    }

    #[test]
    fn predictive_state_copies_named_argument() {
        let mut projector = projector_with_state(json!({"other": true}));
        projector.apply(&predict(json!([
            {"state_key": "draft", "tool": "write_document", "tool_argument": "document"}
        ])));
        projector.apply(&Event::tool_call_start("c1", "write_document", None));
        let snapshot = projector.apply(&Event::tool_call_args("c1", r#"{"document": "Once up"#));

        assert_eq!(
            snapshot.map(|s| s.state),
            Some(json!({"other": true, "draft": "Once up"}))
        );
    }

    #[test]
    fn predictive_state_without_argument_copies_whole_object() {
        let mut projector = projector_with_state(Value::Null);
        projector.apply(&predict(json!([{"state_key": "plan", "tool": "set_plan"}])));
        projector.apply(&Event::tool_call_start("c1", "set_plan", None));
        projector.apply(&Event::tool_call_args("c1", r#"{"steps": ["a", "b"#));

        assert_eq!(projector.snapshot().state, json!({"plan": {"steps": ["a", "b"]}}));
    }

    #[test]
    fn unparseable_arguments_still_update_messages() {
        let mut projector = projector_with_state(json!({}));
        projector.apply(&predict(json!([{"state_key": "k", "tool": "t"}])));
        projector.apply(&Event::tool_call_start("c1", "t", None));
        let snapshot = projector.apply(&Event::tool_call_args("c1", "not json"));

        let snapshot = snapshot.unwrap_or_default();
        assert_eq!(snapshot.state, json!({}));
        assert_eq!(snapshot.messages[0].tool_calls()[0].function.arguments, "not json");
    }

    #[test]
    fn step_finished_clears_mapping() {
        let mut projector = projector_with_state(json!({}));
        projector.apply(&predict(json!([{"state_key": "k", "tool": "t"}])));
        projector.apply(&Event::step_finished("s1"));
        projector.apply(&Event::tool_call_start("c1", "t", None));
        projector.apply(&Event::tool_call_args("c1", "{\"a\":1}"));

        assert_eq!(projector.snapshot().state, json!({}));
    }

    #[test]
    fn malformed_mapping_is_ignored() {
        let mut projector = projector_with_state(json!({}));
        assert!(projector.apply(&predict(json!({"tool": "t"}))).is_none());
        projector.apply(&Event::tool_call_start("c1", "t", None));
        projector.apply(&Event::tool_call_args("c1", "{}"));
        assert_eq!(projector.snapshot().state, json!({}));
    }

    #[test]
    fn snapshots_replace_wholesale() {
        let mut projector = projector_with_state(json!({"a": 1}));
        let state = projector.apply(&Event::state_snapshot(json!({"b": 2})));
        assert_eq!(state.map(|s| s.state), Some(json!({"b": 2})));

        let messages = projector.apply(&Event::messages_snapshot(vec![Message::user("u1", "x")]));
        assert_eq!(messages.map(|s| s.messages.len()), Some(1));
    }

    #[tokio::test]
    async fn replay_yields_identical_snapshots() -> anyhow::Result<()> {
        let events = vec![
            Event::run_started("t", "r"),
            Event::text_message_start("m1"),
            Event::text_message_content("m1", "hi"),
            Event::text_message_end("m1"),
            Event::state_delta(vec![JsonPatchOp::add("/n", json!(1))]),
            Event::run_finished("t", "r"),
        ];
        let run = |events: Vec<Event>| {
            let stream: EventStream = stream::iter(events.into_iter().map(Ok)).boxed();
            apply_events(AgentState::new(Vec::new(), json!({})), stream)
                .collect::<Vec<AguiResult<AgentState>>>()
        };
        let first = run(events.clone()).await.into_iter().collect::<AguiResult<Vec<_>>>()?;
        let second = run(events).await.into_iter().collect::<AguiResult<Vec<_>>>()?;

        assert_eq!(first.len(), 3);
        assert_eq!(first, second);
        assert_eq!(first[0].messages[0].content(), Some(""));
        assert_eq!(first[2].state, json!({"n": 1}));
        Ok(())
    }
}
