//! Rule group evaluation.

use crate::condition::{ConditionsConfig, LogicalOperator};
use crate::evaluator::evaluate_rule;
use chatflow_context::ExecutionContext;

/// Evaluates a rule group, short-circuiting in declaration order.
///
/// An empty AND group holds; an empty OR group does not.
#[must_use]
pub fn evaluate_conditions(config: &ConditionsConfig, ctx: &ExecutionContext) -> bool {
    let mut rules = config.rules.iter();
    match config.operator {
        LogicalOperator::And => rules.all(|rule| evaluate_rule(rule, ctx)),
        LogicalOperator::Or => rules.any(|rule| evaluate_rule(rule, ctx)),
    }
}
