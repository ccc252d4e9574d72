//! Edge resolution.
//!
//! Outgoing edges are tried in descending priority; edges of equal
//! priority keep their declaration order. The first edge whose condition
//! holds wins.

use crate::edge::{EdgeCondition, FlowEdge};
use crate::group::evaluate_conditions;
use chatflow_context::ExecutionContext;
use std::cmp::Reverse;
use tracing::trace;

/// Picks the winning edge among `edges`, or `None` if nothing matches.
///
/// `awaiting_reply` is true when the conversation is processing a user
/// reply after having paused; only then can `wait_user_reply` edges match.
#[must_use]
pub fn resolve_edge<'a, I>(
    edges: I,
    ctx: &ExecutionContext,
    awaiting_reply: bool,
) -> Option<&'a FlowEdge>
where
    I: IntoIterator<Item = &'a FlowEdge>,
{
    let mut ordered: Vec<&FlowEdge> = edges.into_iter().collect();
    ordered.sort_by_key(|edge| Reverse(edge.priority));
    ordered
        .into_iter()
        .find(|edge| edge_matches(edge, ctx, awaiting_reply))
}

/// Tests a single edge condition.
#[must_use]
pub fn edge_matches(edge: &FlowEdge, ctx: &ExecutionContext, awaiting_reply: bool) -> bool {
    let matched = match &edge.condition {
        EdgeCondition::Always => true,
        EdgeCondition::Condition(conditions) => evaluate_conditions(conditions, ctx),
        EdgeCondition::Keyword { keywords } => {
            let message = ctx.last_user_message.to_lowercase();
            keywords
                .iter()
                .map(|keyword| keyword.trim())
                .filter(|keyword| !keyword.is_empty())
                .any(|keyword| message.contains(&keyword.to_lowercase()))
        }
        EdgeCondition::Intent {
            intent_name,
            confidence_threshold,
        } => ctx.intent_matches(intent_name, *confidence_threshold),
        EdgeCondition::UserInput { expected_input } => {
            match expected_input.as_deref().filter(|input| !input.is_empty()) {
                Some(expected) => ctx.last_user_message == expected,
                None => !ctx.last_user_message.trim().is_empty(),
            }
        }
        EdgeCondition::WaitUserReply => awaiting_reply,
    };
    trace!(edge_id = %edge.id, matched, "edge evaluated");
    matched
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn keyword(id: &str, words: &[&str], priority: i32) -> FlowEdge {
        FlowEdge::new(
            id,
            "menu",
            id,
            EdgeCondition::Keyword {
                keywords: words.iter().map(|w| (*w).to_owned()).collect(),
            },
        )
        .with_priority(priority)
    }

    fn said(message: &str) -> ExecutionContext {
        ExecutionContext::new(Utc::now()).with_message(message)
    }

    #[test]
    fn higher_priority_wins() {
        let edges = vec![
            FlowEdge::new("fallback", "menu", "fallback", EdgeCondition::Always),
            keyword("sales", &["buy"], 10),
        ];
        let winner = resolve_edge(&edges, &said("I want to BUY"), false).expect("edge");
        assert_eq!(winner.id, "sales");
    }

    #[test]
    fn ties_keep_declaration_order() {
        let edges = vec![keyword("first", &["hi"], 1), keyword("second", &["hi"], 1)];
        let winner = resolve_edge(&edges, &said("hi"), false).expect("edge");
        assert_eq!(winner.id, "first");
    }

    #[test]
    fn blank_keywords_never_match() {
        let edges = vec![keyword("blank", &["", "  "], 0)];
        assert!(resolve_edge(&edges, &said("anything"), false).is_none());
    }

    #[test]
    fn wait_edges_need_awaiting_flag() {
        let edges = vec![FlowEdge::new("wait", "q", "a", EdgeCondition::WaitUserReply)];
        assert!(resolve_edge(&edges, &said("ok"), false).is_none());
        assert!(resolve_edge(&edges, &said("ok"), true).is_some());
    }

    #[test]
    fn user_input_matching() {
        let exact = FlowEdge::new(
            "exact",
            "q",
            "a",
            EdgeCondition::UserInput {
                expected_input: Some("1".into()),
            },
        );
        let any = FlowEdge::new("any", "q", "b", EdgeCondition::UserInput { expected_input: None });

        assert!(edge_matches(&exact, &said("1"), false));
        assert!(!edge_matches(&exact, &said("12"), false));
        assert!(edge_matches(&any, &said("whatever"), false));
        assert!(!edge_matches(&any, &said("   "), false));
    }

    #[test]
    fn intent_edges() {
        let edge = FlowEdge::new(
            "intent",
            "q",
            "a",
            EdgeCondition::Intent {
                intent_name: "buy".into(),
                confidence_threshold: 0.8,
            },
        );
        assert!(edge_matches(&edge, &said("").with_intent("buy", 0.8), false));
        assert!(!edge_matches(&edge, &said("").with_intent("buy", 0.79), false));
    }

    #[test]
    fn nothing_matches() {
        let edges = vec![keyword("sales", &["buy"], 0)];
        assert!(resolve_edge(&edges, &said("hello"), true).is_none());
        assert!(resolve_edge(Vec::<&FlowEdge>::new(), &said("hello"), true).is_none());
    }
}
