//! Branch resolution for condition nodes.

use crate::error::RoutingError;
use crate::group::evaluate_conditions;
use crate::node::{ConditionNodeConfig, FlowNode, NodeKind};
use chatflow_context::{ExecutionContext, interpolate};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// One outcome of a condition node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Branch {
    pub name: String,
    /// The evaluation result this branch is selected for.
    pub conditions_met: bool,
    pub next_node: String,
    /// Message sent when the branch is taken. May hold placeholders.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl Branch {
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        conditions_met: bool,
        next_node: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            conditions_met,
            next_node: next_node.into(),
            message: None,
        }
    }

    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// The branch picked for a condition node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchDecision {
    pub branch: String,
    pub next_node: String,
    /// The branch message with placeholders resolved.
    pub message: Option<String>,
    /// The evaluation result of the node's rule group.
    pub conditions_met: bool,
    /// True if the default branch was used because no branch matched.
    pub used_default: bool,
}

/// Resolves the branch for a condition node.
///
/// # Errors
///
/// Returns `NotConditionNode` for any other node type and
/// `NoMatchingBranch` if no branch matches and the default is missing.
pub fn resolve_branch(
    node: &FlowNode,
    ctx: &ExecutionContext,
) -> Result<BranchDecision, RoutingError> {
    let NodeKind::Condition(config) = &node.kind else {
        return Err(RoutingError::NotConditionNode {
            node_id: node.id.clone(),
        });
    };
    resolve_condition(&node.id, config, ctx)
}

pub(crate) fn resolve_condition(
    node_id: &str,
    config: &ConditionNodeConfig,
    ctx: &ExecutionContext,
) -> Result<BranchDecision, RoutingError> {
    let conditions_met = evaluate_conditions(&config.conditions, ctx);

    let (branch, used_default) = match config
        .branches
        .iter()
        .find(|branch| branch.conditions_met == conditions_met)
    {
        Some(branch) => (branch, false),
        None => (
            config
                .default_branch()
                .ok_or_else(|| RoutingError::NoMatchingBranch {
                    node_id: node_id.to_owned(),
                })?,
            true,
        ),
    };

    debug!(
        node_id,
        branch = %branch.name,
        conditions_met,
        used_default,
        "condition branch selected"
    );

    Ok(BranchDecision {
        branch: branch.name.clone(),
        next_node: branch.next_node.clone(),
        message: branch.message.as_deref().map(|m| interpolate(m, ctx)),
        conditions_met,
        used_default,
    })
}
