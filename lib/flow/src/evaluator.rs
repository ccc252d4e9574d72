//! Single-rule evaluation.
//!
//! Evaluation is total: a malformed rule, a bad pattern, an unknown
//! timezone or a missing value all yield `false`, never an error.

use crate::condition::{
    AttributeRule, ConditionRule, FunctionCallOperator, RegexRule, RegexTarget, RuleKind,
    TimeOperator, TimeRule,
};
use crate::operator::apply;
use chatflow_context::ExecutionContext;
use chrono::{DateTime, NaiveTime, Utc};
use chrono_tz::Tz;
use regex::RegexBuilder;
use serde_json::Value as JsonValue;
use tracing::{debug, trace};

/// Evaluates one rule against the context.
#[must_use]
pub fn evaluate_rule(rule: &ConditionRule, ctx: &ExecutionContext) -> bool {
    let outcome = match &rule.kind {
        RuleKind::Contact(attr) => attribute(attr, |path| ctx.contact_value(path)),
        RuleKind::Conversation(attr) => attribute(attr, |path| ctx.conversation_value(path)),
        RuleKind::ContextVariable(var) => apply(
            var.operator,
            ctx.variable(var.variable_path.trim()),
            &var.value,
            var.case_sensitive,
        ),
        RuleKind::UserInput(input) => {
            let message = JsonValue::String(ctx.last_user_message.clone());
            apply(input.operator, Some(&message), &input.value, input.case_sensitive)
        }
        RuleKind::Intent(intent) => {
            ctx.intent_matches(&intent.intent_name, intent.confidence_threshold)
        }
        RuleKind::TimeCondition(time) => time_of_day(time, ctx.now),
        RuleKind::Regex(regex) => pattern(regex, ctx),
        RuleKind::PreviousNode(prev) => ctx.has_visited(&prev.node_id) == prev.visited,
        RuleKind::FunctionCall(call) => {
            ctx.has_called(&call.function_name) == (call.operator == FunctionCallOperator::Called)
        }
    };

    trace!(rule_id = %rule.id, rule_type = rule.kind.type_name(), outcome, "rule evaluated");
    outcome
}

fn attribute<'a>(
    attr: &AttributeRule,
    resolve: impl FnOnce(&str) -> Option<&'a JsonValue>,
) -> bool {
    let actual = attr.path().and_then(resolve);
    apply(attr.operator, actual, &attr.value, attr.case_sensitive)
}

fn pattern(rule: &RegexRule, ctx: &ExecutionContext) -> bool {
    let target = match rule.target {
        RegexTarget::LastUserMessage => ctx.last_user_message.as_str(),
    };
    match RegexBuilder::new(&rule.pattern)
        .case_insensitive(!rule.case_sensitive)
        .build()
    {
        Ok(regex) => regex.is_match(target),
        Err(error) => {
            debug!(pattern = %rule.pattern, %error, "invalid regex rule");
            false
        }
    }
}

fn parse_time_of_day(raw: Option<&str>) -> Option<NaiveTime> {
    let raw = raw?.trim();
    NaiveTime::parse_from_str(raw, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M"))
        .ok()
}

fn time_of_day(rule: &TimeRule, now: DateTime<Utc>) -> bool {
    let tz = match rule.timezone.as_deref().map(str::trim).filter(|tz| !tz.is_empty()) {
        None => Tz::UTC,
        Some(name) => match name.parse::<Tz>() {
            Ok(tz) => tz,
            Err(_) => {
                debug!(timezone = name, "unknown timezone in time condition");
                return false;
            }
        },
    };
    let local = now.with_timezone(&tz).time();

    match rule.operator {
        TimeOperator::Between => {
            let (Some(start), Some(end)) = (
                parse_time_of_day(rule.start_time.as_deref()),
                parse_time_of_day(rule.end_time.as_deref()),
            ) else {
                debug!("time window bounds missing or malformed");
                return false;
            };
            if start <= end {
                start <= local && local <= end
            } else {
                local >= start || local <= end
            }
        }
        TimeOperator::After => {
            parse_time_of_day(rule.value.as_deref()).is_some_and(|at| local > at)
        }
        TimeOperator::Before => {
            parse_time_of_day(rule.value.as_deref()).is_some_and(|at| local < at)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn rule(value: JsonValue) -> ConditionRule {
        serde_json::from_value(value).expect("valid rule")
    }

    fn at(hour: u32, minute: u32) -> ExecutionContext {
        ExecutionContext::new(Utc.with_ymd_and_hms(2024, 5, 1, hour, minute, 0).unwrap())
    }

    fn ctx() -> ExecutionContext {
        at(9, 30)
            .with_contact(json!({
                "name": "Dana",
                "custom_attributes": { "category": "vip" }
            }))
            .with_variable("order", json!({ "total": 150 }))
            .with_conversation_meta(json!({ "channel": "whatsapp" }))
            .with_message("I want a REFUND for order 1234")
            .with_visited("welcome")
            .with_function_call("lookup_order", Utc::now())
            .with_intent("refund", 0.85)
    }

    #[test]
    fn contact_attribute() {
        let r = rule(json!({
            "id": "c", "type": "contact", "variable_path": "custom_attributes.category",
            "operator": "equals", "value": "vip"
        }));
        assert!(evaluate_rule(&r, &ctx()));

        let missing = rule(json!({
            "id": "c", "type": "contact", "variable_path": "custom_attributes.tier",
            "operator": "equals", "value": "vip"
        }));
        assert!(!evaluate_rule(&missing, &ctx()));
    }

    #[test]
    fn conversation_attribute() {
        let r = rule(json!({
            "type": "conversation", "field": "channel", "operator": "in_list",
            "value": "sms, whatsapp"
        }));
        assert!(evaluate_rule(&r, &ctx()));
    }

    #[test]
    fn context_variable() {
        let r = rule(json!({
            "type": "context_variable", "variable_path": "order.total",
            "operator": "greater_than", "value": 100
        }));
        assert!(evaluate_rule(&r, &ctx()));
    }

    #[test]
    fn user_input_respects_case_flag() {
        let sensitive = rule(json!({
            "type": "user_input", "operator": "contains", "value": "refund"
        }));
        let insensitive = rule(json!({
            "type": "user_input", "operator": "contains", "value": "refund",
            "case_sensitive": false
        }));
        assert!(!evaluate_rule(&sensitive, &ctx()));
        assert!(evaluate_rule(&insensitive, &ctx()));
    }

    #[test]
    fn intent_threshold() {
        let met = rule(json!({ "type": "intent", "intent_name": "refund" }));
        let strict = rule(json!({
            "type": "intent", "intent_name": "refund", "confidence_threshold": 0.9
        }));
        assert!(evaluate_rule(&met, &ctx()));
        assert!(!evaluate_rule(&strict, &ctx()));
    }

    #[test]
    fn time_window_in_timezone() {
        // 09:30 UTC is 11:30 in Paris during summer time.
        let r = rule(json!({
            "type": "time_condition", "operator": "between",
            "start_time": "11:00", "end_time": "12:00", "timezone": "Europe/Paris"
        }));
        assert!(evaluate_rule(&r, &ctx()));

        let utc = rule(json!({
            "type": "time_condition", "operator": "between",
            "start_time": "11:00", "end_time": "12:00"
        }));
        assert!(!evaluate_rule(&utc, &ctx()));
    }

    #[test]
    fn time_window_is_inclusive_and_wraps_midnight() {
        let night = rule(json!({
            "type": "time_condition", "operator": "between",
            "start_time": "22:00", "end_time": "06:00"
        }));
        assert!(evaluate_rule(&night, &at(23, 15)));
        assert!(evaluate_rule(&night, &at(2, 0)));
        assert!(evaluate_rule(&night, &at(22, 0)));
        assert!(evaluate_rule(&night, &at(6, 0)));
        assert!(!evaluate_rule(&night, &at(12, 0)));
    }

    #[test]
    fn after_and_before_are_strict() {
        let after = rule(json!({ "type": "time_condition", "operator": "after", "value": "09:30" }));
        let before = rule(json!({ "type": "time_condition", "operator": "before", "value": "09:30:00" }));
        assert!(!evaluate_rule(&after, &at(9, 30)));
        assert!(!evaluate_rule(&before, &at(9, 30)));
        assert!(evaluate_rule(&after, &at(9, 31)));
        assert!(evaluate_rule(&before, &at(9, 29)));
    }

    #[test]
    fn malformed_time_rules_are_false() {
        let bad_tz = rule(json!({
            "type": "time_condition", "operator": "after", "value": "00:00",
            "timezone": "Mars/Olympus"
        }));
        let bad_time = rule(json!({
            "type": "time_condition", "operator": "before", "value": "25:99"
        }));
        let missing = rule(json!({ "type": "time_condition", "operator": "between" }));
        assert!(!evaluate_rule(&bad_tz, &ctx()));
        assert!(!evaluate_rule(&bad_time, &ctx()));
        assert!(!evaluate_rule(&missing, &ctx()));
    }

    #[test]
    fn regex_rule() {
        let digits = rule(json!({ "type": "regex", "pattern": r"\b\d{4}\b" }));
        let folded = rule(json!({ "type": "regex", "pattern": "refund", "case_sensitive": false }));
        let invalid = rule(json!({ "type": "regex", "pattern": "[unclosed" }));
        assert!(evaluate_rule(&digits, &ctx()));
        assert!(evaluate_rule(&folded, &ctx()));
        assert!(!evaluate_rule(&invalid, &ctx()));
    }

    #[test]
    fn phone_number_pattern() {
        let phone = rule(json!({ "type": "regex", "pattern": "^[0-9]{10}$" }));
        let unbalanced = rule(json!({ "type": "regex", "pattern": "((" }));
        assert!(evaluate_rule(&phone, &at(9, 30).with_message("0501234567")));
        assert!(!evaluate_rule(&phone, &at(9, 30).with_message("abc")));
        assert!(!evaluate_rule(&unbalanced, &at(9, 30).with_message("((")));
    }

    #[test]
    fn non_numeric_threshold_never_matches() {
        let r = rule(json!({
            "type": "context_variable", "variable_path": "order.total",
            "operator": "greater_than", "value": "abc"
        }));
        assert!(!evaluate_rule(&r, &ctx()));
    }

    #[test]
    fn previous_node_and_function_call() {
        let visited = rule(json!({ "type": "previous_node", "node_id": "welcome" }));
        let not_visited = rule(json!({
            "type": "previous_node", "node_id": "checkout", "visited": false
        }));
        let called = rule(json!({ "type": "function_call", "function_name": "lookup_order" }));
        let not_called = rule(json!({
            "type": "function_call", "function_name": "lookup_order", "operator": "not_called"
        }));
        assert!(evaluate_rule(&visited, &ctx()));
        assert!(evaluate_rule(&not_visited, &ctx()));
        assert!(evaluate_rule(&called, &ctx()));
        assert!(!evaluate_rule(&not_called, &ctx()));
    }
}
