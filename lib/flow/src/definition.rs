//! Stored flow definitions.

use crate::edge::{EdgeRecord, FlowEdge};
use crate::error::DefinitionError;
use crate::node::{FlowNode, NodeRecord};
use chatflow_core::FlowId;
use serde::{Deserialize, Serialize};

/// A flow as authored: nodes and edges in declaration order.
///
/// A definition is not validated as a whole. Build a [`crate::Flow`]
/// from it to check cross-references.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowDefinition {
    #[serde(default)]
    pub id: FlowId,
    #[serde(default)]
    pub name: String,
    pub nodes: Vec<FlowNode>,
    #[serde(default)]
    pub edges: Vec<FlowEdge>,
}

/// A definition with untyped node and edge records.
#[derive(Deserialize)]
struct RawDefinition {
    #[serde(default)]
    id: FlowId,
    #[serde(default)]
    name: String,
    nodes: Vec<NodeRecord>,
    #[serde(default)]
    edges: Vec<EdgeRecord>,
}

impl FlowDefinition {
    /// Creates an empty definition.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: FlowId::new(),
            name: name.into(),
            nodes: Vec::new(),
            edges: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_node(mut self, node: FlowNode) -> Self {
        self.nodes.push(node);
        self
    }

    #[must_use]
    pub fn with_edge(mut self, edge: FlowEdge) -> Self {
        self.edges.push(edge);
        self
    }

    /// Parses a stored definition.
    ///
    /// Unlike plain deserialization, node and edge problems are reported
    /// as structured [`DefinitionError`]s rather than a parse message.
    ///
    /// # Errors
    ///
    /// Returns `Parse` for malformed JSON and the specific node or edge
    /// error for invalid configs.
    pub fn from_json(json: &str) -> Result<Self, DefinitionError> {
        let raw: RawDefinition = serde_json::from_str(json).map_err(|e| DefinitionError::Parse {
            reason: e.to_string(),
        })?;

        let nodes = raw
            .nodes
            .into_iter()
            .map(FlowNode::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        let edges = raw
            .edges
            .into_iter()
            .map(FlowEdge::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            id: raw.id,
            name: raw.name,
            nodes,
            edges,
        })
    }
}
