//! Request body field readers
//!
//! Bodies are loose JSON objects; every reader reports the offending field
//! by name.

use rave_core::{EntityId, RaveResult, ValidationError};
use serde_json::Value;
use std::ops::RangeInclusive;

fn missing(field: &str) -> ValidationError {
    ValidationError::RequiredFieldMissing {
        field: field.to_string(),
    }
}

fn invalid(field: &str, reason: impl Into<String>) -> ValidationError {
    ValidationError::InvalidValue {
        field: field.to_string(),
        reason: reason.into(),
    }
}

fn present<'a>(body: &'a Value, field: &str) -> Option<&'a Value> {
    body.get(field).filter(|v| !v.is_null())
}

/// The `action` field, or `""` when absent.
pub fn action(body: &Value) -> &str {
    body.get("action").and_then(Value::as_str).unwrap_or("").trim()
}

/// Non-blank string, trimmed.
pub fn required_str(body: &Value, field: &str) -> RaveResult<String> {
    optional_str(body, field)?.ok_or_else(|| missing(field).into())
}

/// Trimmed string; blank counts as absent.
pub fn optional_str(body: &Value, field: &str) -> RaveResult<Option<String>> {
    match present(body, field) {
        None => Ok(None),
        Some(Value::String(s)) => {
            let s = s.trim();
            Ok((!s.is_empty()).then(|| s.to_string()))
        }
        Some(_) => Err(invalid(field, "must be a string").into()),
    }
}

/// Integer within `range`, `default` when absent.
pub fn u32_in(body: &Value, field: &str, range: RangeInclusive<u32>, default: u32) -> RaveResult<u32> {
    let Some(value) = present(body, field) else {
        return Ok(default);
    };
    let n = value
        .as_u64()
        .ok_or_else(|| invalid(field, "must be a non-negative integer"))?;
    u32::try_from(n)
        .ok()
        .filter(|n| range.contains(n))
        .ok_or_else(|| {
            invalid(
                field,
                format!("must be between {} and {}", range.start(), range.end()),
            )
            .into()
        })
}

pub fn required_i64(body: &Value, field: &str) -> RaveResult<i64> {
    present(body, field)
        .ok_or_else(|| missing(field))?
        .as_i64()
        .ok_or_else(|| invalid(field, "must be an integer").into())
}

pub fn required_bool(body: &Value, field: &str) -> RaveResult<bool> {
    present(body, field)
        .ok_or_else(|| missing(field))?
        .as_bool()
        .ok_or_else(|| invalid(field, "must be a boolean").into())
}

pub fn optional_bool(body: &Value, field: &str, default: bool) -> RaveResult<bool> {
    match present(body, field) {
        None => Ok(default),
        Some(v) => v
            .as_bool()
            .ok_or_else(|| invalid(field, "must be a boolean").into()),
    }
}

pub fn required_id(body: &Value, field: &str) -> RaveResult<EntityId> {
    let raw = required_str(body, field)?;
    raw.parse()
        .map_err(|_| invalid(field, format!("'{}' is not a UUID", raw)).into())
}

/// Array of strings; absent means empty. Blank items are dropped.
pub fn string_list(body: &Value, field: &str) -> RaveResult<Vec<String>> {
    match present(body, field) {
        None => Ok(Vec::new()),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| -> RaveResult<String> {
                item.as_str()
                    .map(|s| s.trim().to_string())
                    .ok_or_else(|| invalid(field, "items must be strings").into())
            })
            .filter(|item| item.as_ref().map_or(true, |s| !s.is_empty()))
            .collect(),
        Some(_) => Err(invalid(field, "must be an array of strings").into()),
    }
}
