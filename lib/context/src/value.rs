//! Coercions over JSON context values.
//!
//! Context values arrive as loosely-typed JSON. Operators need a textual
//! view, a numeric view and a notion of "empty"; all three live here so
//! every rule type coerces the same way.

use serde_json::Value as JsonValue;
use std::borrow::Cow;

/// Returns the textual form of a value.
///
/// Strings are returned verbatim, numbers and booleans in their JSON form,
/// arrays and objects as compact JSON. Null has no textual form.
#[must_use]
pub fn as_text(value: &JsonValue) -> Option<Cow<'_, str>> {
    match value {
        JsonValue::Null => None,
        JsonValue::String(s) => Some(Cow::Borrowed(s.as_str())),
        JsonValue::Bool(b) => Some(Cow::Borrowed(if *b { "true" } else { "false" })),
        JsonValue::Number(n) => Some(Cow::Owned(n.to_string())),
        other => Some(Cow::Owned(other.to_string())),
    }
}

/// Returns the numeric form of a value.
///
/// JSON numbers convert directly. Strings convert when their trimmed
/// content parses as a finite float.
#[must_use]
pub fn as_number(value: &JsonValue) -> Option<f64> {
    match value {
        JsonValue::Number(n) => n.as_f64(),
        JsonValue::String(s) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
        _ => None,
    }
}

/// Returns true when a value is absent or carries no content.
#[must_use]
pub fn is_blank(value: Option<&JsonValue>) -> bool {
    match value {
        None | Some(JsonValue::Null) => true,
        Some(JsonValue::String(s)) => s.trim().is_empty(),
        Some(JsonValue::Array(items)) => items.is_empty(),
        Some(JsonValue::Object(map)) => map.is_empty(),
        Some(_) => false,
    }
}
