//! Error types for the flow crate.
//!
//! - `DefinitionError`: a stored flow failed validation at load time
//! - `RoutingError`: the engine could not produce a decision for a node
//!
//! Condition evaluation never errors. Malformed rules evaluate to false.

use std::fmt;

/// Errors raised while loading or validating a flow definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DefinitionError {
    /// The definition document is not valid JSON for a flow.
    Parse { reason: String },
    /// Two nodes share the same id.
    DuplicateNode { node_id: String },
    /// An edge references a node that does not exist.
    DanglingEdge { edge_id: String, node_id: String },
    /// A condition node has no default branch configured.
    MissingDefaultBranch { node_id: String },
    /// A condition node's default branch is not one of its branches.
    UnknownDefaultBranch { node_id: String, branch: String },
    /// A node config references a node that does not exist.
    UnknownNodeReference { node_id: String, reference: String },
    /// A node config does not match the schema for its type.
    InvalidNodeConfig {
        node_id: String,
        node_type: String,
        reason: String,
    },
    /// An edge condition config does not match its condition type.
    InvalidEdgeConfig { edge_id: String, reason: String },
}

impl fmt::Display for DefinitionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parse { reason } => write!(f, "invalid flow document: {reason}"),
            Self::DuplicateNode { node_id } => write!(f, "duplicate node id: {node_id}"),
            Self::DanglingEdge { edge_id, node_id } => {
                write!(f, "edge {edge_id} references unknown node {node_id}")
            }
            Self::MissingDefaultBranch { node_id } => {
                write!(f, "condition node {node_id} has no default branch")
            }
            Self::UnknownDefaultBranch { node_id, branch } => {
                write!(
                    f,
                    "condition node {node_id} names default branch '{branch}' which does not exist"
                )
            }
            Self::UnknownNodeReference { node_id, reference } => {
                write!(f, "node {node_id} references unknown node {reference}")
            }
            Self::InvalidNodeConfig {
                node_id,
                node_type,
                reason,
            } => {
                write!(f, "invalid {node_type} config on node {node_id}: {reason}")
            }
            Self::InvalidEdgeConfig { edge_id, reason } => {
                write!(f, "invalid condition config on edge {edge_id}: {reason}")
            }
        }
    }
}

impl std::error::Error for DefinitionError {}

/// Errors raised while stepping a loaded flow.
///
/// Each of these means the flow is misconfigured for the current
/// conversation. Hosts surface them rather than guessing a next node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoutingError {
    /// The requested node is not part of the flow.
    NodeNotFound { node_id: String },
    /// Branch resolution was requested for a node that is not a condition node.
    NotConditionNode { node_id: String },
    /// No branch matched and the default branch could not be found.
    NoMatchingBranch { node_id: String },
    /// Outgoing edges exist but none matched and none waits for a reply.
    NoViableTransition { node_id: String },
}

impl RoutingError {
    /// Returns the id of the node the error refers to.
    #[must_use]
    pub fn node_id(&self) -> &str {
        match self {
            Self::NodeNotFound { node_id }
            | Self::NotConditionNode { node_id }
            | Self::NoMatchingBranch { node_id }
            | Self::NoViableTransition { node_id } => node_id,
        }
    }
}

impl fmt::Display for RoutingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NodeNotFound { node_id } => write!(f, "node not found: {node_id}"),
            Self::NotConditionNode { node_id } => {
                write!(f, "node {node_id} is not a condition node")
            }
            Self::NoMatchingBranch { node_id } => {
                write!(f, "no branch of condition node {node_id} could be selected")
            }
            Self::NoViableTransition { node_id } => {
                write!(f, "no outgoing edge of node {node_id} matched")
            }
        }
    }
}

impl std::error::Error for RoutingError {}
