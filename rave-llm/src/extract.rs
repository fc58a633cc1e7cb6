//! JSON extraction from free-text model replies
//!
//! Models wrap their JSON in prose, code fences or apologies. The scanner
//! walks the reply looking for an opening `{` or `[`, follows it to the
//! matching close (string and escape aware) and parses that span. A span
//! that parses but is rejected is skipped as a whole; its interior is not
//! searched for a smaller match.

use rave_core::ExtractionError;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

/// Outcome of looking for structured data in a reply.
#[derive(Debug, Clone, PartialEq)]
pub enum ParseResult<T> {
    /// A span parsed and was accepted.
    Ok(T),
    /// Delimiters were present but nothing usable parsed. `raw` is the first
    /// offending span.
    Malformed { raw: String, reason: String },
    /// The reply contains no `{` or `[` at all.
    NotFound,
}

impl<T> ParseResult<T> {
    pub fn is_ok(&self) -> bool {
        matches!(self, ParseResult::Ok(_))
    }

    pub fn ok(self) -> Option<T> {
        match self {
            ParseResult::Ok(value) => Some(value),
            _ => None,
        }
    }

    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> ParseResult<U> {
        match self {
            ParseResult::Ok(value) => ParseResult::Ok(f(value)),
            ParseResult::Malformed { raw, reason } => ParseResult::Malformed { raw, reason },
            ParseResult::NotFound => ParseResult::NotFound,
        }
    }

    pub fn into_result(self) -> Result<T, ExtractionError> {
        match self {
            ParseResult::Ok(value) => Ok(value),
            ParseResult::Malformed { raw, reason } => Err(ExtractionError::Malformed { raw, reason }),
            ParseResult::NotFound => Err(ExtractionError::NotFound),
        }
    }
}

/// First JSON object or array in `text`.
pub fn extract_json(text: &str) -> ParseResult<Value> {
    scan(text, b"{[", Ok)
}

/// First JSON object in `text`; arrays are not considered.
pub fn extract_object(text: &str) -> ParseResult<Map<String, Value>> {
    scan(text, b"{", |value| match value {
        Value::Object(map) => Ok(map),
        other => Err(format!("expected object, found {}", type_name(&other))),
    })
}

/// First JSON span in `text` that deserializes into `T`.
pub fn extract_as<T: DeserializeOwned>(text: &str) -> ParseResult<T> {
    scan(text, b"{[", |value| {
        serde_json::from_value::<T>(value).map_err(|e| e.to_string())
    })
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Span {
    /// Exclusive end of the balanced span.
    Balanced(usize),
    Mismatched,
    Unterminated,
}

/// Follow the delimiter at `start` to its matching close.
///
/// Works on bytes: the delimiters and quote are ASCII and never occur inside
/// a multi-byte UTF-8 sequence.
///
/// Every opener passed outside a string gets its own outcome written to
/// `memo`: a walk starting there would see the same bytes in the same
/// string state, so it would end the same way. Later starts reuse it, which
/// keeps a reply full of unclosed braces linear.
fn balanced_end(bytes: &[u8], start: usize, memo: &mut [Option<Span>]) -> Span {
    // (expected close, opener position)
    let mut open: Vec<(u8, usize)> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for (offset, &b) in bytes[start..].iter().enumerate() {
        let pos = start + offset;
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => open.push((b'}', pos)),
            b'[' => open.push((b']', pos)),
            b'}' | b']' => match open.pop() {
                Some((expected, opener)) if expected == b => {
                    memo[opener] = Some(Span::Balanced(pos + 1));
                    if open.is_empty() {
                        return Span::Balanced(pos + 1);
                    }
                }
                Some((_, opener)) => {
                    memo[opener] = Some(Span::Mismatched);
                    return settle(&open, memo, Span::Mismatched);
                }
                None => return settle(&open, memo, Span::Mismatched),
            },
            _ => {}
        }
    }
    settle(&open, memo, Span::Unterminated)
}

/// Record `outcome` for every opener still waiting for its close.
fn settle(open: &[(u8, usize)], memo: &mut [Option<Span>], outcome: Span) -> Span {
    for &(_, opener) in open {
        memo[opener] = Some(outcome);
    }
    outcome
}

fn scan<T, F>(text: &str, openers: &[u8], mut accept: F) -> ParseResult<T>
where
    F: FnMut(Value) -> Result<T, String>,
{
    let bytes = text.as_bytes();
    let mut memo: Vec<Option<Span>> = vec![None; bytes.len()];
    let mut first_failure: Option<(String, String)> = None;
    let mut record = |raw: &str, reason: String| {
        if first_failure.is_none() {
            first_failure = Some((raw.to_string(), reason));
        }
    };

    let mut i = 0;
    while i < bytes.len() {
        if !openers.contains(&bytes[i]) {
            i += 1;
            continue;
        }
        let span = match memo[i] {
            Some(span) => span,
            None => balanced_end(bytes, i, &mut memo),
        };
        match span {
            Span::Balanced(end) => {
                let raw = &text[i..end];
                match serde_json::from_str::<Value>(raw) {
                    Ok(value) => match accept(value) {
                        Ok(accepted) => return ParseResult::Ok(accepted),
                        Err(reason) => {
                            record(raw, reason);
                            i = end;
                        }
                    },
                    Err(e) => {
                        record(raw, e.to_string());
                        i = end;
                    }
                }
            }
            Span::Mismatched => {
                record(&text[i..], "mismatched delimiters".to_string());
                i += 1;
            }
            Span::Unterminated => {
                record(&text[i..], "unterminated JSON value".to_string());
                i += 1;
            }
        }
    }

    match first_failure {
        Some((raw, reason)) => ParseResult::Malformed { raw, reason },
        None => ParseResult::NotFound,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[test]
    fn test_extracts_object_from_prose() {
        let reply = "Sure! {\"count\": 42}";
        assert_eq!(extract_json(reply), ParseResult::Ok(json!({"count": 42})));
    }

    #[test]
    fn test_no_json_is_not_found() {
        assert_eq!(extract_json("no json here"), ParseResult::NotFound);
        assert_eq!(
            extract_json("no json here").into_result(),
            Err(ExtractionError::NotFound)
        );
    }

    #[test]
    fn test_nested_braces_and_strings() {
        let reply = r#"Here you go:
```json
{"name": "Jeff Mills", "tags": ["detroit", "{not a brace}"], "meta": {"x": "a \"quoted\" }"}}
```
Hope that helps {really}."#;
        let value = extract_json(reply).ok().unwrap();
        assert_eq!(value["name"], "Jeff Mills");
        assert_eq!(value["tags"][1], "{not a brace}");
        assert_eq!(value["meta"]["x"], "a \"quoted\" }");
    }

    #[test]
    fn test_skips_prose_braces_before_json() {
        let reply = "Rating {see below}: {\"recommendation\": \"approve\"}";
        assert_eq!(
            extract_json(reply),
            ParseResult::Ok(json!({"recommendation": "approve"}))
        );
    }

    #[test]
    fn test_truncated_reply_is_malformed() {
        let reply = "Result: {\"recommendation\": \"approve\", \"pros\": [\"tight";
        match extract_json(reply) {
            ParseResult::Malformed { raw, reason } => {
                assert!(raw.starts_with("{\"recommendation\""));
                assert!(reason.contains("unterminated"));
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_invalid_outer_span_is_not_mined_for_inner_values() {
        let reply = "{\"a\": {\"b\": 1},}";
        assert!(matches!(extract_json(reply), ParseResult::Malformed { .. }));
    }

    #[test]
    fn test_extract_object_ignores_arrays() {
        let reply = "Notes [1] and {\"ok\": true}";
        let map = extract_object(reply).ok().unwrap();
        assert_eq!(map.get("ok"), Some(&json!(true)));
        assert_eq!(extract_json(reply), ParseResult::Ok(json!([1])));
    }

    #[derive(Debug, Deserialize, PartialEq)]
    struct Verdict {
        recommendation: String,
        confidence: f64,
    }

    #[test]
    fn test_extract_as_skips_spans_of_the_wrong_shape() {
        let reply = "Refs [1, 2]. Answer: {\"recommendation\": \"reject\", \"confidence\": 0.7}";
        assert_eq!(
            extract_as::<Verdict>(reply),
            ParseResult::Ok(Verdict {
                recommendation: "reject".to_string(),
                confidence: 0.7,
            })
        );
    }

    #[test]
    fn test_extract_as_reports_shape_mismatch_as_malformed() {
        let reply = "{\"recommendation\": \"reject\"}";
        match extract_as::<Verdict>(reply) {
            ParseResult::Malformed { reason, .. } => assert!(reason.contains("confidence")),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_unclosed_outer_brace_still_finds_inner_object() {
        let reply = "Rating {see below: {\"a\": 1} and [2, {\"b\": 3}";
        assert_eq!(extract_json(reply), ParseResult::Ok(json!({"a": 1})));

        let reply = "{ [ {\"c\": true} ] ";
        assert_eq!(extract_json(reply), ParseResult::Ok(json!([{"c": true}])));
    }

    #[test]
    fn test_mismatch_inside_unclosed_brace() {
        let reply = "{ [ } {\"ok\": 1}";
        assert_eq!(extract_json(reply), ParseResult::Ok(json!({"ok": 1})));
    }

    #[test]
    fn test_long_run_of_unclosed_braces() {
        let reply = format!("{}{{\"x\": 1", "{".repeat(200_000));
        match extract_json(&reply) {
            ParseResult::Malformed { reason, .. } => assert!(reason.contains("unterminated")),
            other => panic!("unexpected: {:?}", other),
        }

        let mut reply = "[".repeat(100_000);
        reply.push_str("{\"x\": 1}");
        assert_eq!(extract_json(&reply), ParseResult::Ok(json!({"x": 1})));
    }

    #[test]
    fn test_map_preserves_variants() {
        let missing: ParseResult<i32> = ParseResult::NotFound;
        assert_eq!(missing.map(|v| v + 1), ParseResult::NotFound);
        assert_eq!(ParseResult::Ok(1).map(|v| v + 1), ParseResult::Ok(2));
    }

    mod prop {
        use super::*;
        use proptest::prelude::*;
        use proptest::prelude::prop;

        fn json_object() -> impl Strategy<Value = Value> {
            let leaf = prop_oneof![
                any::<i64>().prop_map(Value::from),
                any::<bool>().prop_map(Value::from),
                "[a-z{}\\[\\]\" ]{0,10}".prop_map(Value::from),
            ];
            let nested = leaf.prop_recursive(3, 16, 4, |inner| {
                prop_oneof![
                    prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
                    prop::collection::btree_map("[a-z]{1,6}", inner, 0..4)
                        .prop_map(|m| Value::Object(m.into_iter().collect())),
                ]
            });
            prop::collection::btree_map("[a-z]{1,6}", nested, 0..5)
                .prop_map(|m| Value::Object(m.into_iter().collect()))
        }

        proptest! {
            #[test]
            fn prop_extraction_ignores_surrounding_prose(
                before in "[A-Za-z0-9 .,!?:'\n-]{0,40}",
                after in "[A-Za-z0-9 .,!?:'\n-]{0,40}",
                value in json_object(),
            ) {
                let text = format!("{}{}{}", before, value, after);
                prop_assert_eq!(extract_json(&text), ParseResult::Ok(value));
            }

            #[test]
            fn prop_brace_free_text_is_not_found(text in "[A-Za-z0-9 .,!?:'\"\n-]{0,80}") {
                prop_assert_eq!(extract_json(&text), ParseResult::NotFound);
            }
        }
    }
}
