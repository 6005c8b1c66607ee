//! Best-effort completion of truncated JSON.
//!
//! Streaming tool arguments are usually an unfinished JSON document. This
//! scanner closes the open string and containers, completes a cut-off
//! `true`/`false`/`null`, trims a dangling number suffix and drops members
//! that have a key but no value yet. It never tries to fix JSON that is
//! malformed rather than truncated; such input simply fails to parse.

use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Container {
    Object,
    Array,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// Object member expected or key being read.
    Key,
    /// Key read, `:` not seen yet.
    Colon,
    /// Value expected or scalar being read.
    Value,
    /// Value complete, `,` or closer expected.
    Done,
}

#[derive(Debug)]
struct Frame {
    container: Container,
    phase: Phase,
    /// Byte offset where the current member can be cut off, including its
    /// leading comma.
    member_start: usize,
}

/// Parses `input` as JSON, completing it first if it was cut off mid-stream.
///
/// Returns `None` when even the completed text does not parse.
pub fn parse_partial_json(input: &str) -> Option<Value> {
    if input.trim().is_empty() {
        return None;
    }
    if let Ok(value) = serde_json::from_str(input) {
        return Some(value);
    }
    serde_json::from_str(&repair_json(input)).ok()
}

/// Returns `input` with truncated tokens completed and open containers
/// closed.
pub fn repair_json(input: &str) -> String {
    let mut stack: Vec<Frame> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;
    let mut string_start = 0;

    for (i, c) in input.char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
                if let Some(top) = stack.last_mut() {
                    top.phase = match (top.container, top.phase) {
                        (Container::Object, Phase::Key) => Phase::Colon,
                        _ => Phase::Done,
                    };
                }
            }
            continue;
        }
        match c {
            '"' => {
                in_string = true;
                string_start = i;
            }
            '{' => stack.push(Frame {
                container: Container::Object,
                phase: Phase::Key,
                member_start: i + 1,
            }),
            '[' => stack.push(Frame {
                container: Container::Array,
                phase: Phase::Value,
                member_start: i + 1,
            }),
            '}' | ']' => {
                stack.pop();
                if let Some(top) = stack.last_mut() {
                    top.phase = Phase::Done;
                }
            }
            ':' => {
                if let Some(top) = stack.last_mut() {
                    top.phase = Phase::Value;
                }
            }
            ',' => {
                if let Some(top) = stack.last_mut() {
                    top.phase = match top.container {
                        Container::Object => Phase::Key,
                        Container::Array => Phase::Value,
                    };
                    top.member_start = i;
                }
            }
            _ => {}
        }
    }

    let mut out = input.to_owned();
    let top = stack.last();

    match top {
        Some(frame)
            if in_string
                && frame.container == Container::Object
                && frame.phase == Phase::Key =>
        {
            out.truncate(frame.member_start);
        }
        _ if in_string => {
            if escaped {
                out.pop();
            }
            drop_partial_unicode_escape(&mut out, string_start);
            out.push('"');
        }
        Some(frame) if matches!(frame.phase, Phase::Key | Phase::Colon) => {
            out.truncate(frame.member_start);
        }
        Some(frame) if frame.phase == Phase::Value => {
            if !complete_scalar(&mut out) {
                out.truncate(frame.member_start);
            }
        }
        None => {
            complete_scalar(&mut out);
        }
        Some(_) => {}
    }

    let trimmed = out.trim_end().len();
    out.truncate(trimmed);
    for frame in stack.iter().rev() {
        out.push(match frame.container {
            Container::Object => '}',
            Container::Array => ']',
        });
    }
    out
}

/// Completes the scalar at the end of `out`. Returns `false` when nothing
/// usable remains, so the caller should cut the member.
fn complete_scalar(out: &mut String) -> bool {
    let trimmed = out.trim_end().len();
    out.truncate(trimmed);
    let token_start = out
        .char_indices()
        .rfind(|&(_, c)| matches!(c, '{' | '[' | ',' | ':') || c.is_whitespace())
        .map_or(0, |(i, c)| i + c.len_utf8());
    let token = out[token_start..].to_owned();
    if token.is_empty() {
        return false;
    }

    for literal in ["true", "false", "null"] {
        if literal.starts_with(&token) {
            out.truncate(token_start);
            out.push_str(literal);
            return true;
        }
    }

    let number = token.trim_end_matches(['-', '+', '.', 'e', 'E']);
    if number.is_empty() {
        return false;
    }
    out.truncate(token_start + number.len());
    true
}

/// Removes a `\u` escape that lost some of its hex digits.
fn drop_partial_unicode_escape(out: &mut String, string_start: usize) {
    let Some(slash) = out[string_start..].rfind('\\').map(|i| string_start + i) else {
        return;
    };
    let tail = &out[slash + 1..];
    let is_partial = tail.starts_with('u')
        && tail.len() < 5
        && tail[1..].chars().all(|c| c.is_ascii_hexdigit());
    let preceding_slashes = out[..slash].chars().rev().take_while(|c| *c == '\\').count();
    if is_partial && preceding_slashes % 2 == 0 {
        out.truncate(slash);
    }
}
