//! Defensive parsing of raw oracle output.
//!
//! The oracle is asked for a bare JSON list but routinely wraps it in
//! markdown fences, prefixes it with prose, or trails commentary after it.
//! [`parse_response`] recovers the payload or returns a [`ParseFailure`]
//! that keeps the raw text for the diagnostic artifact.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};
use tracing::debug;

/// One entry of a decoded payload: field name → value.
pub type PayloadEntry = Map<String, Value>;

/// Prefix with which the extraction adapter reports oracle exceptions.
pub const ERROR_MARKER: &str = "error";

/// Bracket spans tried before falling back to the greedy match.
const MAX_CANDIDATES: usize = 16;

/// Why a response produced no records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The response was empty or whitespace.
    Empty,
    /// The response is an error report from the oracle call.
    OracleError,
    /// No bracketed structure anywhere in the text.
    NoStructure,
    /// A structure was found but decoded to zero entries.
    EmptyPayload,
    /// A structure was found but is not valid JSON, or not a list of objects.
    Malformed,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Empty => "empty",
            Self::OracleError => "oracle_error",
            Self::NoStructure => "no_structure",
            Self::EmptyPayload => "empty_payload",
            Self::Malformed => "malformed",
        }
    }

    /// True when the oracle answered but had nothing to extract.
    pub fn is_no_data(&self) -> bool {
        matches!(self, Self::Empty | Self::NoStructure | Self::EmptyPayload)
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A response that yielded no structured payload.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{kind}: {cause}")]
pub struct ParseFailure {
    pub kind: FailureKind,
    pub cause: String,
    /// The oracle text exactly as received.
    pub raw: String,
}

impl ParseFailure {
    pub fn new(kind: FailureKind, cause: impl Into<String>, raw: &str) -> Self {
        Self {
            kind,
            cause: cause.into(),
            raw: raw.to_string(),
        }
    }
}

/// Progress of the span search over the unfenced text.
#[derive(Debug)]
enum SpanState<'a> {
    /// Balanced candidate spans, in order of their opening bracket.
    Balanced(Vec<&'a str>),
    /// No balanced span; greedy first-opener..last-closer fallback.
    Greedy(&'a str),
    /// No opener at all.
    Missing,
}

/// Extract the structured payload from raw oracle text.
pub fn parse_response(raw: &str) -> Result<Vec<PayloadEntry>, ParseFailure> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ParseFailure::new(FailureKind::Empty, "empty response", raw));
    }

    if starts_with_error_marker(trimmed) {
        let first_line = trimmed.lines().next().unwrap_or(trimmed);
        return Err(ParseFailure::new(FailureKind::OracleError, first_line, raw));
    }

    let body = strip_fences(trimmed);

    let mut first_error: Option<String> = None;
    // A span that decodes to no entries (a footnote like `[1]`) is not the
    // payload; keep looking, and report it only if nothing better turns up.
    let mut decoded_empty = false;
    match locate_spans(body) {
        SpanState::Balanced(spans) => {
            for span in spans {
                match decode(span) {
                    Ok(entries) if !entries.is_empty() => return Ok(entries),
                    Ok(_) => {
                        debug!(len = span.len(), "candidate span has no entries");
                        decoded_empty = true;
                    }
                    Err(e) => {
                        debug!(error = %e, len = span.len(), "candidate span rejected");
                        first_error.get_or_insert(e);
                    }
                }
            }
            if let SpanState::Greedy(span) = greedy_span(body) {
                match decode(span) {
                    Ok(entries) if !entries.is_empty() => return Ok(entries),
                    Ok(_) => decoded_empty = true,
                    Err(_) => {}
                }
            }
        }
        SpanState::Greedy(span) => match decode(span) {
            Ok(entries) if !entries.is_empty() => return Ok(entries),
            Ok(_) => decoded_empty = true,
            Err(e) => first_error = Some(e),
        },
        SpanState::Missing => {
            return Err(ParseFailure::new(
                FailureKind::NoStructure,
                "no JSON array or object found",
                raw,
            ));
        }
    }

    if decoded_empty {
        return Err(ParseFailure::new(
            FailureKind::EmptyPayload,
            "payload contains no entries",
            raw,
        ));
    }

    Err(ParseFailure::new(
        FailureKind::Malformed,
        first_error.unwrap_or_else(|| "unparsable structure".into()),
        raw,
    ))
}

fn starts_with_error_marker(text: &str) -> bool {
    text.get(..ERROR_MARKER.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(ERROR_MARKER))
}

/// Remove a leading ```` ```lang ```` fence and a fence closing the text.
fn strip_fences(text: &str) -> &str {
    static OPEN_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"^```[A-Za-z0-9_-]*[ \t]*\r?\n?").expect("valid regex"));
    static CLOSE_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\r?\n?```[ \t]*$").expect("valid regex"));

    let start = OPEN_RE.find(text).map_or(0, |m| m.end());
    let rest = &text[start..];
    let end = CLOSE_RE.find(rest).map_or(rest.len(), |m| m.start());
    rest[..end].trim()
}

/// Collect balanced, string-aware bracket spans starting at each opener.
fn locate_spans(text: &str) -> SpanState<'_> {
    let mut spans = Vec::new();
    let mut search_from = 0;

    while spans.len() < MAX_CANDIDATES {
        let Some(offset) = text[search_from..].find(['[', '{']) else {
            break;
        };
        let start = search_from + offset;
        // An unclosed opener swallows the rest of the text, so nothing
        // after it is top-level.
        let Some(len) = balanced_end(&text[start..]) else {
            break;
        };
        spans.push(&text[start..start + len]);
        search_from = start + len;
    }

    if spans.is_empty() {
        greedy_span(text)
    } else {
        SpanState::Balanced(spans)
    }
}

/// Length of the balanced structure at the start of `text`, if it closes.
fn balanced_end(text: &str) -> Option<usize> {
    let mut stack: Vec<char> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in text.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '[' => stack.push(']'),
            '{' => stack.push('}'),
            ']' | '}' => {
                if stack.pop() != Some(c) {
                    return None;
                }
                if stack.is_empty() {
                    return Some(i + c.len_utf8());
                }
            }
            _ => {}
        }
    }
    None
}

/// First opener through the last matching closer, or to the end of the
/// text when it never closes.
fn greedy_span(text: &str) -> SpanState<'_> {
    let Some(start) = text.find(['[', '{']) else {
        return SpanState::Missing;
    };
    let closer = if text[start..].starts_with('[') { ']' } else { '}' };
    match text.rfind(closer) {
        Some(end) if end > start => SpanState::Greedy(&text[start..=end]),
        _ => SpanState::Greedy(&text[start..]),
    }
}

/// Decode a span into payload entries.
///
/// A bare object is one entry; an object wrapping a single list of objects
/// (`{"buildings": [...]}`) is unwrapped.
fn decode(span: &str) -> Result<Vec<PayloadEntry>, String> {
    let value: Value = serde_json::from_str(span).map_err(|e| e.to_string())?;
    match value {
        Value::Array(items) => Ok(objects_only(items)),
        Value::Object(mut map) => {
            let list_keys: Vec<String> = map
                .iter()
                .filter(|(_, v)| is_object_list(v))
                .map(|(k, _)| k.clone())
                .collect();
            if let [key] = list_keys.as_slice() {
                if let Some(Value::Array(items)) = map.remove(key) {
                    return Ok(objects_only(items));
                }
            }
            Ok(vec![map])
        }
        other => Err(format!("expected a list of objects, got {}", json_kind(&other))),
    }
}

fn is_object_list(value: &Value) -> bool {
    matches!(value, Value::Array(items) if !items.is_empty() && items.iter().all(Value::is_object))
}

fn objects_only(items: Vec<Value>) -> Vec<PayloadEntry> {
    items
        .into_iter()
        .filter_map(|item| match item {
            Value::Object(map) => Some(map),
            other => {
                debug!(kind = json_kind(&other), "skipping non-object payload entry");
                None
            }
        })
        .collect()
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture(name: &str) -> String {
        std::fs::read_to_string(format!(
            "{}/../../../fixtures/oracle/{name}",
            env!("CARGO_MANIFEST_DIR")
        ))
        .expect("read oracle fixture")
    }

    #[test]
    fn fenced_payload_with_trailing_prose() {
        let raw = "```json\n[{\"building_name\":\"X\"}]\n``` extra text after";
        let entries = parse_response(raw).expect("parse");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0]["building_name"], "X");
    }

    #[test]
    fn error_marker_is_a_failure_not_a_crash() {
        let failure = parse_response("Error: timeout").unwrap_err();
        assert_eq!(failure.kind, FailureKind::OracleError);
        assert_eq!(failure.cause, "Error: timeout");
        assert_eq!(failure.raw, "Error: timeout");
        assert!(!failure.kind.is_no_data());
    }

    #[test]
    fn empty_response_is_no_data() {
        let failure = parse_response("  \n ").unwrap_err();
        assert_eq!(failure.kind, FailureKind::Empty);
        assert!(failure.kind.is_no_data());
    }

    #[test]
    fn prose_without_structure() {
        let failure = parse_response("No buildings were discussed.").unwrap_err();
        assert_eq!(failure.kind, FailureKind::NoStructure);
    }

    #[test]
    fn empty_list_is_no_data() {
        let failure = parse_response("```json\n[]\n```").unwrap_err();
        assert_eq!(failure.kind, FailureKind::EmptyPayload);
        assert!(failure.kind.is_no_data());
    }

    #[test]
    fn truncated_json_is_malformed() {
        let raw = fixture("truncated.txt");
        let failure = parse_response(&raw).unwrap_err();
        assert_eq!(failure.kind, FailureKind::Malformed);
        assert_eq!(failure.raw, raw);
    }

    #[test]
    fn prose_brackets_before_payload_are_skipped() {
        let raw = fixture("prose-wrapped.txt");
        let entries = parse_response(&raw).expect("parse");
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0]["building_name"], "The Parker");
        assert_eq!(entries[1]["building_name"], "Fulbrix");
    }

    #[test]
    fn footnote_brackets_before_payload_are_skipped() {
        let raw = "Found one building [1]:\n[{\"building_name\":\"Fulbrix\"}]";
        let entries = parse_response(raw).expect("parse");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0]["building_name"], "Fulbrix");
    }

    #[test]
    fn empty_list_before_payload_is_skipped() {
        let raw = "Earlier notes: []\n\n[{\"building_name\":\"The Parker\"}]";
        let entries = parse_response(raw).expect("parse");
        assert_eq!(entries[0]["building_name"], "The Parker");
    }

    #[test]
    fn brackets_inside_strings_do_not_end_the_span() {
        let raw = r#"[{"building_name":"Left Bank","notes":"client said ] is fine }"}]"#;
        let entries = parse_response(raw).expect("parse");
        assert_eq!(entries[0]["notes"], "client said ] is fine }");
    }

    #[test]
    fn single_object_becomes_one_entry() {
        let entries = parse_response(r#"{"building_name":"Coppia","status":"sent"}"#)
            .expect("parse");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0]["status"], "sent");
    }

    #[test]
    fn wrapped_list_is_unwrapped() {
        let raw = r#"{"buildings":[{"building_name":"A"},{"building_name":"B"}]}"#;
        let entries = parse_response(raw).expect("parse");
        assert_eq!(entries.len(), 2);
    }

    #[test]
    fn non_object_entries_are_dropped() {
        let entries = parse_response(r#"["stray", {"building_name":"Union West"}, 7]"#)
            .expect("parse");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0]["building_name"], "Union West");
    }

    #[test]
    fn list_of_scalars_has_no_entries() {
        let failure = parse_response("Result: [1, 2, 3]").unwrap_err();
        assert_eq!(failure.kind, FailureKind::EmptyPayload);
    }

    #[test]
    fn unclosed_bracket_is_malformed() {
        let failure = parse_response("\"just a string\" [oops").unwrap_err();
        assert_eq!(failure.kind, FailureKind::Malformed);
    }

    #[test]
    fn scalar_json_is_malformed() {
        assert_eq!(decode("42").unwrap_err(), "expected a list of objects, got number");
    }
}
