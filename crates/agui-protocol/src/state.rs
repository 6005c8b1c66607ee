//! Shared agent state and RFC 6902 patch operations.

use crate::message::Message;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Messages plus shared state, as seen by a client after folding events.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentState {
    pub messages: Vec<Message>,
    pub state: Value,
}

impl AgentState {
    pub fn new(messages: Vec<Message>, state: Value) -> Self {
        Self { messages, state }
    }
}

/// The six RFC 6902 verbs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatchOpKind {
    Add,
    Remove,
    Replace,
    Move,
    Copy,
    Test,
}

/// One RFC 6902 operation as it appears in a `STATE_DELTA` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonPatchOp {
    pub op: PatchOpKind,
    pub path: String,
    /// `Some(Value::Null)` is an explicit `null`, distinct from absence.
    #[serde(
        default,
        deserialize_with = "deserialize_some",
        skip_serializing_if = "Option::is_none"
    )]
    pub value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
}

fn deserialize_some<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

impl JsonPatchOp {
    pub fn add(path: impl Into<String>, value: Value) -> Self {
        Self::with_value(PatchOpKind::Add, path, value)
    }

    pub fn replace(path: impl Into<String>, value: Value) -> Self {
        Self::with_value(PatchOpKind::Replace, path, value)
    }

    pub fn test(path: impl Into<String>, value: Value) -> Self {
        Self::with_value(PatchOpKind::Test, path, value)
    }

    pub fn remove(path: impl Into<String>) -> Self {
        Self {
            op: PatchOpKind::Remove,
            path: path.into(),
            value: None,
            from: None,
        }
    }

    pub fn move_from(from: impl Into<String>, path: impl Into<String>) -> Self {
        Self::with_from(PatchOpKind::Move, from, path)
    }

    pub fn copy_from(from: impl Into<String>, path: impl Into<String>) -> Self {
        Self::with_from(PatchOpKind::Copy, from, path)
    }

    fn with_value(op: PatchOpKind, path: impl Into<String>, value: Value) -> Self {
        Self {
            op,
            path: path.into(),
            value: Some(value),
            from: None,
        }
    }

    fn with_from(op: PatchOpKind, from: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            op,
            path: path.into(),
            value: None,
            from: Some(from.into()),
        }
    }
}

#[derive(Debug, Error)]
pub enum PatchApplyError {
    #[error("invalid patch document: {0}")]
    InvalidPatch(String),
    #[error("patch could not be applied: {0}")]
    Apply(String),
}

/// Applies `ops` to a copy of `state` and returns the patched copy.
///
/// Either every operation applies or `state` is left as it was.
pub fn apply_patch(state: &Value, ops: &[JsonPatchOp]) -> Result<Value, PatchApplyError> {
    let document =
        serde_json::to_value(ops).map_err(|e| PatchApplyError::InvalidPatch(e.to_string()))?;
    let patch: json_patch::Patch = serde_json::from_value(document)
        .map_err(|e| PatchApplyError::InvalidPatch(e.to_string()))?;

    let mut next = state.clone();
    json_patch::patch(&mut next, &patch).map_err(|e| PatchApplyError::Apply(e.to_string()))?;
    Ok(next)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn replace_updates_value() -> anyhow::Result<()> {
        let next = apply_patch(&json!({"count": 0}), &[JsonPatchOp::replace("/count", json!(1))])?;
        assert_eq!(next, json!({"count": 1}));
        Ok(())
    }

    #[test]
    fn failed_patch_leaves_state_untouched() {
        let state = json!({"count": 0});
        let ops = [
            JsonPatchOp::replace("/count", json!(5)),
            JsonPatchOp::replace("/missing", json!(1)),
        ];
        let err = apply_patch(&state, &ops);
        assert!(matches!(err, Err(PatchApplyError::Apply(_))));
        assert_eq!(state, json!({"count": 0}));
    }

    #[test]
    fn move_and_copy_use_from_pointer() -> anyhow::Result<()> {
        let ops = [
            JsonPatchOp::copy_from("/a", "/b"),
            JsonPatchOp::move_from("/a", "/c"),
            JsonPatchOp::remove("/b"),
        ];
        let next = apply_patch(&json!({"a": [1, 2]}), &ops)?;
        assert_eq!(next, json!({"c": [1, 2]}));
        Ok(())
    }

    #[test]
    fn explicit_null_value_is_kept() -> anyhow::Result<()> {
        let op: JsonPatchOp =
            serde_json::from_value(json!({"op": "add", "path": "/x", "value": null}))?;
        assert_eq!(op.value, Some(Value::Null));
        let next = apply_patch(&json!({}), &[op])?;
        assert_eq!(next, json!({"x": null}));
        Ok(())
    }

    #[test]
    fn failing_test_op_is_an_error() {
        let ops = [JsonPatchOp::test("/count", json!(2))];
        assert!(apply_patch(&json!({"count": 1}), &ops).is_err());
    }
}
