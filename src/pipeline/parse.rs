//! Response parsing: pull the JSON object out of the model's free-form reply.
//!
//! Two paths, tried in order:
//!
//! 1. **Strict** (when `strict_json` is on) — the whole reply, after trimming
//!    and removing one surrounding ```` ```json ```` fence, must be a JSON
//!    object.
//! 2. **Brace scan** — take the span from the first `{` to the last `}` and
//!    parse that. This assumes the reply holds exactly one object and that any
//!    commentary around it has no braces of its own.
//!
//! Path 2 is the only path when `strict_json` is off; when it is on, reaching
//! path 2 means the model ignored the contract and is logged as degraded.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use thiserror::Error;
use tracing::warn;

/// Why a reply could not be turned into a JSON object.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("no JSON object in reply")]
    NoObject,

    #[error("invalid JSON: {0}")]
    InvalidJson(String),

    #[error("reply JSON is a {0}, not an object")]
    NotAnObject(&'static str),
}

static RE_JSON_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```[A-Za-z]*\s*\n(.*?)\n?```$").unwrap());

/// Parse `reply` into a JSON object, strictly first if `strict` is set.
pub fn parse_reply(reply: &str, strict: bool) -> Result<Value, ParseError> {
    if strict {
        match parse_strict(reply) {
            Ok(v) => return Ok(v),
            Err(e) => warn!("Reply broke the JSON-only contract ({e}); falling back to brace scan"),
        }
    }
    parse_brace_span(reply)
}

/// The whole reply (minus one optional code fence) must be a JSON object.
pub fn parse_strict(reply: &str) -> Result<Value, ParseError> {
    let trimmed = reply.trim();
    let body = match RE_JSON_FENCE.captures(trimmed) {
        Some(caps) => caps.get(1).map_or("", |m| m.as_str()),
        None => trimmed,
    };
    if body.is_empty() {
        return Err(ParseError::NoObject);
    }
    let value: Value =
        serde_json::from_str(body).map_err(|e| ParseError::InvalidJson(e.to_string()))?;
    ensure_object(value)
}

/// Parse the span from the first `{` to the last `}` inclusive.
pub fn parse_brace_span(reply: &str) -> Result<Value, ParseError> {
    let start = reply.find('{').ok_or(ParseError::NoObject)?;
    let end = reply.rfind('}').ok_or(ParseError::NoObject)?;
    if end < start {
        return Err(ParseError::NoObject);
    }
    let value: Value = serde_json::from_str(&reply[start..=end])
        .map_err(|e| ParseError::InvalidJson(e.to_string()))?;
    ensure_object(value)
}

fn ensure_object(value: Value) -> Result<Value, ParseError> {
    match value {
        Value::Object(_) => Ok(value),
        Value::Array(_) => Err(ParseError::NotAnObject("list")),
        Value::String(_) => Err(ParseError::NotAnObject("string")),
        Value::Number(_) => Err(ParseError::NotAnObject("number")),
        Value::Bool(_) => Err(ParseError::NotAnObject("bool")),
        Value::Null => Err(ParseError::NotAnObject("null")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const SAMPLE: &str = r#"{"date":"01/02/2024","muscle_group":"Legs","workouts":[{"exercise_name":"Squat","sets":[{"set_number":1,"weight":"100kg","reps":8}]}]}"#;

    #[test]
    fn brace_span_recovers_object_inside_commentary() {
        let direct: Value = serde_json::from_str(SAMPLE).unwrap();
        for (prefix, suffix) in [
            ("", ""),
            ("Here is the data:\n", "\nLet me know if you need more."),
            ("```json\n", "\n```"),
            ("Sure! ", " (weights in kg)"),
        ] {
            let reply = format!("{prefix}{SAMPLE}{suffix}");
            assert_eq!(parse_brace_span(&reply).unwrap(), direct, "reply: {reply}");
        }
    }

    #[test]
    fn strict_accepts_bare_and_fenced_objects() {
        let direct: Value = serde_json::from_str(SAMPLE).unwrap();
        assert_eq!(parse_strict(SAMPLE).unwrap(), direct);
        assert_eq!(parse_strict(&format!("  {SAMPLE}\n")).unwrap(), direct);
        assert_eq!(parse_strict(&format!("```json\n{SAMPLE}\n```")).unwrap(), direct);
        assert_eq!(parse_strict(&format!("```\n{SAMPLE}\n```")).unwrap(), direct);
    }

    #[test]
    fn strict_rejects_commentary_but_parse_reply_degrades() {
        let reply = format!("Here you go: {SAMPLE}");
        assert!(matches!(parse_strict(&reply), Err(ParseError::InvalidJson(_))));
        assert_eq!(
            parse_reply(&reply, true).unwrap(),
            serde_json::from_str::<Value>(SAMPLE).unwrap()
        );
    }

    #[test]
    fn no_braces_is_no_object() {
        assert_eq!(parse_reply("I could not read the page.", true), Err(ParseError::NoObject));
        assert_eq!(parse_brace_span("} backwards {"), Err(ParseError::NoObject));
        assert_eq!(parse_strict("   "), Err(ParseError::NoObject));
    }

    #[test]
    fn braces_in_commentary_break_the_scan() {
        let reply = format!("{SAMPLE} and also {{notes}}");
        assert!(matches!(parse_brace_span(&reply), Err(ParseError::InvalidJson(_))));
    }

    #[test]
    fn top_level_must_be_object() {
        assert_eq!(parse_strict("[1, 2]"), Err(ParseError::NotAnObject("list")));
        assert_eq!(parse_reply("\"text\"", true), Err(ParseError::NoObject));
    }

    #[test]
    fn nested_objects_survive() {
        let v = parse_reply(r#"note {"a": {"b": {"c": 1}}} end"#, false).unwrap();
        assert_eq!(v, json!({"a": {"b": {"c": 1}}}));
    }
}
