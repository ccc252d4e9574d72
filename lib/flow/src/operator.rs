//! Comparison operator semantics.
//!
//! `apply` is shared by every rule type that compares a context value
//! against a configured one. An absent (or null) context value fails every
//! operator except `is_empty` and `not_equals`.

use crate::condition::Operator;
use chatflow_context::value::{as_number, as_text, is_blank};
use regex::RegexBuilder;
use serde_json::Value as JsonValue;
use std::borrow::Cow;
use tracing::debug;

/// Applies `operator` to an actual context value and the configured value.
///
/// Never panics. Operands that cannot be coerced make the comparison false.
#[must_use]
pub fn apply(
    operator: Operator,
    actual: Option<&JsonValue>,
    expected: &JsonValue,
    case_sensitive: bool,
) -> bool {
    match (operator, actual.filter(|v| !v.is_null())) {
        (Operator::IsEmpty, actual) => is_blank(actual),
        (Operator::NotEmpty, actual) => !is_blank(actual),
        (Operator::NotEquals, None) => true,
        (_, None) => false,
        (Operator::Equals, Some(actual)) => equals(actual, expected, case_sensitive),
        (Operator::NotEquals, Some(actual)) => !equals(actual, expected, case_sensitive),
        (Operator::Contains, Some(actual)) => contains(actual, expected, case_sensitive),
        (Operator::NotContains, Some(actual)) => !contains(actual, expected, case_sensitive),
        (Operator::StartsWith, Some(actual)) => {
            text_test(actual, expected, case_sensitive, |a, e| a.starts_with(e))
        }
        (Operator::EndsWith, Some(actual)) => {
            text_test(actual, expected, case_sensitive, |a, e| a.ends_with(e))
        }
        (Operator::GreaterThan, Some(actual)) => compare(actual, expected, |a, e| a > e),
        (Operator::LessThan, Some(actual)) => compare(actual, expected, |a, e| a < e),
        (Operator::GreaterEqual, Some(actual)) => compare(actual, expected, |a, e| a >= e),
        (Operator::LessEqual, Some(actual)) => compare(actual, expected, |a, e| a <= e),
        (Operator::InList, Some(actual)) => in_list(actual, expected, case_sensitive),
        (Operator::NotInList, Some(actual)) => !in_list(actual, expected, case_sensitive),
        (Operator::MatchesRegex, Some(actual)) => matches_regex(actual, expected, case_sensitive),
    }
}

fn fold(text: &str, case_sensitive: bool) -> Cow<'_, str> {
    if case_sensitive {
        Cow::Borrowed(text)
    } else {
        Cow::Owned(text.to_lowercase())
    }
}

/// Numeric equality when either side is a JSON number and both coerce,
/// textual equality otherwise. Two numeric strings compare as text, so
/// `"0501"` and `"501"` stay distinct.
fn equals(actual: &JsonValue, expected: &JsonValue, case_sensitive: bool) -> bool {
    if actual.is_number() || expected.is_number() {
        if let (Some(a), Some(e)) = (as_number(actual), as_number(expected)) {
            return a == e;
        }
    }
    text_test(actual, expected, case_sensitive, |a, e| a == e)
}

fn contains(actual: &JsonValue, expected: &JsonValue, case_sensitive: bool) -> bool {
    match actual {
        JsonValue::Array(items) => items
            .iter()
            .any(|item| equals(item, expected, case_sensitive)),
        _ => text_test(actual, expected, case_sensitive, |a, e| a.contains(e)),
    }
}

fn text_test(
    actual: &JsonValue,
    expected: &JsonValue,
    case_sensitive: bool,
    test: impl Fn(&str, &str) -> bool,
) -> bool {
    match (as_text(actual), as_text(expected)) {
        (Some(a), Some(e)) => test(&*fold(&a, case_sensitive), &*fold(&e, case_sensitive)),
        _ => false,
    }
}

fn compare(actual: &JsonValue, expected: &JsonValue, test: impl Fn(f64, f64) -> bool) -> bool {
    match (as_number(actual), as_number(expected)) {
        (Some(a), Some(e)) => test(a, e),
        _ => false,
    }
}

/// The configured list is a JSON array or a comma-separated string.
fn list_items(expected: &JsonValue) -> Vec<Cow<'_, str>> {
    match expected {
        JsonValue::Array(items) => items.iter().filter_map(as_text).collect(),
        JsonValue::String(raw) => raw
            .split(',')
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .map(Cow::Borrowed)
            .collect(),
        other => as_text(other).into_iter().collect(),
    }
}

fn in_list(actual: &JsonValue, expected: &JsonValue, case_sensitive: bool) -> bool {
    let Some(actual) = as_text(actual) else {
        return false;
    };
    let actual = fold(actual.trim(), case_sensitive);
    list_items(expected)
        .iter()
        .any(|item| fold(item.trim(), case_sensitive) == actual)
}

fn matches_regex(actual: &JsonValue, expected: &JsonValue, case_sensitive: bool) -> bool {
    let (Some(text), Some(pattern)) = (as_text(actual), as_text(expected)) else {
        return false;
    };
    match RegexBuilder::new(&pattern)
        .case_insensitive(!case_sensitive)
        .build()
    {
        Ok(regex) => regex.is_match(&text),
        Err(error) => {
            debug!(pattern = %pattern, %error, "invalid regex, treating as no match");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn check(op: Operator, actual: JsonValue, expected: JsonValue) -> bool {
        apply(op, Some(&actual), &expected, true)
    }

    #[test]
    fn equality_is_numeric_when_a_number_is_involved() {
        assert!(check(Operator::Equals, json!(5), json!("5")));
        assert!(check(Operator::Equals, json!("5.0"), json!(5)));
        assert!(!check(Operator::Equals, json!("0501"), json!("501")));
        assert!(check(Operator::Equals, json!(false), json!("false")));
        assert!(check(Operator::NotEquals, json!("gold"), json!("vip")));
    }

    #[test]
    fn case_folding() {
        assert!(!apply(Operator::Equals, Some(&json!("VIP")), &json!("vip"), true));
        assert!(apply(Operator::Equals, Some(&json!("VIP")), &json!("vip"), false));
        assert!(apply(Operator::StartsWith, Some(&json!("Hello")), &json!("he"), false));
    }

    #[test]
    fn absent_values() {
        let expected = json!("x");
        assert!(apply(Operator::IsEmpty, None, &expected, true));
        assert!(apply(Operator::NotEquals, None, &expected, true));
        assert!(apply(Operator::IsEmpty, Some(&JsonValue::Null), &expected, true));
        for op in [
            Operator::Equals,
            Operator::Contains,
            Operator::NotContains,
            Operator::StartsWith,
            Operator::EndsWith,
            Operator::GreaterThan,
            Operator::LessEqual,
            Operator::NotEmpty,
            Operator::InList,
            Operator::NotInList,
            Operator::MatchesRegex,
        ] {
            assert!(!apply(op, None, &expected, true), "{op:?} on absent value");
        }
    }

    #[test]
    fn contains_checks_array_membership() {
        assert!(check(Operator::Contains, json!(["a", "vip"]), json!("vip")));
        assert!(!check(Operator::Contains, json!(["a", "vipx"]), json!("vip")));
        assert!(check(Operator::Contains, json!("very vip"), json!("vip")));
        assert!(check(Operator::NotContains, json!("regular"), json!("vip")));
    }

    #[test]
    fn numeric_comparisons() {
        assert!(check(Operator::GreaterThan, json!(150), json!(100)));
        assert!(check(Operator::GreaterEqual, json!("100"), json!(100)));
        assert!(check(Operator::LessThan, json!(" 3 "), json!("10")));
        assert!(!check(Operator::LessThan, json!("abc"), json!(10)));
        assert!(!check(Operator::GreaterThan, json!(150), json!("abc")));
        assert!(!check(Operator::GreaterEqual, json!(150), json!("abc")));
    }

    #[test]
    fn list_membership() {
        assert!(check(Operator::InList, json!("gold"), json!("silver, gold ,platinum")));
        assert!(check(Operator::InList, json!("gold"), json!(["silver", "gold"])));
        assert!(check(Operator::InList, json!(2), json!([1, 2, 3])));
        assert!(check(Operator::NotInList, json!("bronze"), json!("silver,gold")));
        assert!(apply(Operator::InList, Some(&json!("GOLD")), &json!("gold"), false));
    }

    #[test]
    fn regex_operator() {
        assert!(check(Operator::MatchesRegex, json!("order 1234"), json!(r"\d{4}")));
        assert!(!check(Operator::MatchesRegex, json!("order"), json!(r"\d{4}")));
        assert!(!check(Operator::MatchesRegex, json!("order"), json!("(unclosed")));
        assert!(apply(Operator::MatchesRegex, Some(&json!("YES")), &json!("^yes$"), false));
    }

    #[test]
    fn blankness_operators() {
        assert!(check(Operator::IsEmpty, json!("  "), json!(null)));
        assert!(check(Operator::NotEmpty, json!("x"), json!(null)));
        assert!(!check(Operator::NotEmpty, json!([]), json!(null)));
    }
}
