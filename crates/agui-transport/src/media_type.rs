//! `Accept` header negotiation.
//!
//! Ranking follows the usual HTTP rules: quality first, then how
//! specifically an accept range matched (type, subtype, parameters), then
//! position in the header, then position in the list of offered types.
//! Ranges with `q=0` never match and an absent header means `*/*`.

/// Media type of length-prefixed protobuf event streams.
pub const AGUI_MEDIA_TYPE: &str = "application/vnd.ag-ui.event+proto";

/// Media type of SSE text event streams.
pub const SSE_MEDIA_TYPE: &str = "text/event-stream";

#[derive(Debug, Clone, PartialEq)]
struct MediaRange {
    kind: String,
    subtype: String,
    params: Vec<(String, String)>,
    q: f64,
    index: usize,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Priority {
    /// Position of the matching accept range, `None` if nothing matched.
    order: Option<usize>,
    q: f64,
    specificity: u8,
    /// Position in the offered list.
    index: usize,
}

/// Returns the entries of `provided` the client accepts, most preferred
/// first.
pub fn preferred_media_types<'a>(accept: Option<&str>, provided: &[&'a str]) -> Vec<&'a str> {
    let accepts = parse_accept(accept.unwrap_or("*/*"));
    let mut ranked: Vec<(Priority, &'a str)> = provided
        .iter()
        .enumerate()
        .map(|(index, offered)| (priority(offered, &accepts, index), *offered))
        .filter(|(priority, _)| priority.q > 0.0)
        .collect();
    ranked.sort_by(|(a, _), (b, _)| {
        b.q.total_cmp(&a.q)
            .then(b.specificity.cmp(&a.specificity))
            .then(a.order.cmp(&b.order))
            .then(a.index.cmp(&b.index))
    });
    ranked.into_iter().map(|(_, offered)| offered).collect()
}

/// Whether a client sending `accept` should get protobuf framing.
///
/// Protobuf wins only when it ranks strictly above SSE; ties keep SSE.
pub fn prefers_protobuf(accept: Option<&str>) -> bool {
    preferred_media_types(accept, &[SSE_MEDIA_TYPE, AGUI_MEDIA_TYPE]).first()
        == Some(&AGUI_MEDIA_TYPE)
}

/// Whether a response `Content-Type` announces protobuf framing.
pub fn is_protobuf_content_type(content_type: Option<&str>) -> bool {
    content_type
        .and_then(|value| value.split(';').next())
        .is_some_and(|essence| essence.trim().eq_ignore_ascii_case(AGUI_MEDIA_TYPE))
}

fn parse_accept(accept: &str) -> Vec<MediaRange> {
    split_quoted(accept, ',')
        .iter()
        .enumerate()
        .filter_map(|(index, entry)| parse_media_range(entry.trim(), index))
        .collect()
}

fn parse_media_range(input: &str, index: usize) -> Option<MediaRange> {
    let (essence, params) = match input.split_once(';') {
        Some((essence, params)) => (essence.trim(), Some(params)),
        None => (input.trim(), None),
    };
    let (kind, subtype) = essence.split_once('/')?;
    if kind.is_empty()
        || subtype.is_empty()
        || kind.contains(char::is_whitespace)
        || subtype.contains(char::is_whitespace)
    {
        return None;
    }

    let mut range = MediaRange {
        kind: kind.to_owned(),
        subtype: subtype.to_owned(),
        params: Vec::new(),
        q: 1.0,
        index,
    };
    for param in params.map(|p| split_quoted(p, ';')).unwrap_or_default() {
        let param = param.trim();
        let (key, value) = param.split_once('=').unwrap_or((param, ""));
        let key = key.trim().to_ascii_lowercase();
        let value = unquote(value.trim());
        if key == "q" {
            range.q = value.parse().unwrap_or(0.0);
            break;
        }
        range.params.push((key, value.to_owned()));
    }
    Some(range)
}

/// Best match of `offered` against every accept range.
fn priority(offered: &str, accepts: &[MediaRange], index: usize) -> Priority {
    let mut best = Priority {
        order: None,
        q: 0.0,
        specificity: 0,
        index,
    };
    let Some(offered) = parse_media_range(offered, 0) else {
        return best;
    };
    for range in accepts {
        let Some(specificity) = specificity(&offered, range) else {
            continue;
        };
        let better = specificity
            .cmp(&best.specificity)
            .then(range.q.total_cmp(&best.q))
            .then(Some(range.index).cmp(&best.order))
            .is_gt();
        if better {
            best = Priority {
                order: Some(range.index),
                q: range.q,
                specificity,
                index,
            };
        }
    }
    best
}

fn specificity(offered: &MediaRange, range: &MediaRange) -> Option<u8> {
    let mut s = 0;
    if range.kind.eq_ignore_ascii_case(&offered.kind) {
        s |= 4;
    } else if range.kind != "*" {
        return None;
    }
    if range.subtype.eq_ignore_ascii_case(&offered.subtype) {
        s |= 2;
    } else if range.subtype != "*" {
        return None;
    }
    if !range.params.is_empty() {
        let all_match = range.params.iter().all(|(key, value)| {
            let offered_value = offered
                .params
                .iter()
                .find(|(k, _)| k == key)
                .map_or("", |(_, v)| v.as_str());
            value == "*" || value.eq_ignore_ascii_case(offered_value)
        });
        if !all_match {
            return None;
        }
        s |= 1;
    }
    Some(s)
}

/// Splits on `separator` outside double quotes.
fn split_quoted(input: &str, separator: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut quoted = false;
    for (i, c) in input.char_indices() {
        if c == '"' {
            quoted = !quoted;
        } else if c == separator && !quoted {
            parts.push(&input[start..i]);
            start = i + c.len_utf8();
        }
    }
    parts.push(&input[start..]);
    parts
}

fn unquote(value: &str) -> &str {
    value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    const OFFERED: [&str; 3] = ["text/html", "application/json", "text/plain"];

    #[test]
    fn absent_header_accepts_everything_in_offered_order() {
        assert_eq!(preferred_media_types(None, &OFFERED), OFFERED.to_vec());
    }

    #[test]
    fn quality_then_specificity_then_order() {
        let accept = Some("text/*;q=0.5, application/json, text/plain;q=0.5");
        assert_eq!(
            preferred_media_types(accept, &OFFERED),
            vec!["application/json", "text/plain", "text/html"]
        );
    }

    #[test]
    fn zero_quality_excludes() {
        let accept = Some("*/*, text/html;q=0");
        assert_eq!(
            preferred_media_types(accept, &OFFERED),
            vec!["application/json", "text/plain"]
        );
    }

    #[test]
    fn parameters_must_match() {
        let accept = Some("text/plain;charset=utf-8");
        assert!(preferred_media_types(accept, &["text/plain"]).is_empty());
        assert_eq!(
            preferred_media_types(accept, &["text/plain;charset=UTF-8"]),
            vec!["text/plain;charset=UTF-8"]
        );
    }

    #[test]
    fn quoted_separators_are_not_split() {
        let accept = Some(r#"text/plain;foo="a,b;c", application/json;q=0.1"#);
        assert_eq!(
            preferred_media_types(accept, &["application/json", r#"text/plain;foo="a,b;c""#]),
            vec![r#"text/plain;foo="a,b;c""#, "application/json"]
        );
    }

    #[test]
    fn protobuf_only_when_strictly_preferred() {
        assert!(prefers_protobuf(Some(AGUI_MEDIA_TYPE)));
        assert!(prefers_protobuf(Some(
            "application/vnd.ag-ui.event+proto, text/event-stream;q=0.9"
        )));
        assert!(!prefers_protobuf(Some(
            "text/event-stream, application/vnd.ag-ui.event+proto;q=0.5"
        )));
        assert!(!prefers_protobuf(Some("*/*")));
        assert!(!prefers_protobuf(None));
        assert!(!prefers_protobuf(Some("text/event-stream")));
    }

    #[test]
    fn content_type_essence_is_case_insensitive() {
        assert!(is_protobuf_content_type(Some(
            "Application/VND.ag-ui.event+proto; charset=binary"
        )));
        assert!(!is_protobuf_content_type(Some("text/event-stream")));
        assert!(!is_protobuf_content_type(None));
    }
}
