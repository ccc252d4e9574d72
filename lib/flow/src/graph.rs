//! Validated flow graph using petgraph.
//!
//! Building a [`Flow`] checks every cross-reference once, so routing can
//! rely on node ids resolving.

use crate::definition::FlowDefinition;
use crate::edge::FlowEdge;
use crate::error::DefinitionError;
use crate::node::{FlowNode, NodeKind};
use chatflow_core::FlowId;
use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use std::collections::HashMap;
use tracing::debug;

/// A loaded, validated flow.
#[derive(Debug, Clone)]
pub struct Flow {
    id: FlowId,
    name: String,
    graph: DiGraph<FlowNode, FlowEdge>,
    /// Map from node id to petgraph's NodeIndex for O(1) lookup.
    node_index_map: HashMap<String, NodeIndex>,
}

impl Flow {
    /// Builds a flow from a definition.
    ///
    /// # Errors
    ///
    /// Returns an error if node ids repeat, an edge references a missing
    /// node, or a node config names a node that does not exist.
    pub fn new(definition: FlowDefinition) -> Result<Self, DefinitionError> {
        let mut graph = DiGraph::with_capacity(definition.nodes.len(), definition.edges.len());
        let mut node_index_map = HashMap::with_capacity(definition.nodes.len());

        for node in definition.nodes {
            if node_index_map.contains_key(&node.id) {
                return Err(DefinitionError::DuplicateNode { node_id: node.id });
            }
            let id = node.id.clone();
            let index = graph.add_node(node);
            node_index_map.insert(id, index);
        }

        for edge in definition.edges {
            let source = lookup(&node_index_map, &edge, &edge.source)?;
            let target = lookup(&node_index_map, &edge, &edge.target)?;
            graph.add_edge(source, target, edge);
        }

        for node in graph.node_weights() {
            if let Some(missing) = node
                .references()
                .into_iter()
                .find(|reference| !node_index_map.contains_key(*reference))
            {
                return Err(DefinitionError::UnknownNodeReference {
                    node_id: node.id.clone(),
                    reference: missing.to_owned(),
                });
            }
        }

        debug!(
            flow_id = %definition.id,
            nodes = graph.node_count(),
            edges = graph.edge_count(),
            "flow loaded"
        );

        Ok(Self {
            id: definition.id,
            name: definition.name,
            graph,
            node_index_map,
        })
    }

    /// Parses and validates a stored definition.
    ///
    /// # Errors
    ///
    /// See [`FlowDefinition::from_json`] and [`Flow::new`].
    pub fn from_json(json: &str) -> Result<Self, DefinitionError> {
        Self::new(FlowDefinition::from_json(json)?)
    }

    #[must_use]
    pub fn id(&self) -> FlowId {
        self.id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns a node by id.
    #[must_use]
    pub fn node(&self, node_id: &str) -> Option<&FlowNode> {
        let index = self.node_index_map.get(node_id)?;
        self.graph.node_weight(*index)
    }

    /// Returns all nodes in declaration order.
    pub fn nodes(&self) -> impl Iterator<Item = &FlowNode> {
        self.graph.node_weights()
    }

    #[must_use]
    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Returns the outgoing edges of a node in declaration order.
    ///
    /// Unknown nodes have no outgoing edges.
    #[must_use]
    pub fn outgoing(&self, node_id: &str) -> Vec<&FlowEdge> {
        let Some(index) = self.node_index_map.get(node_id) else {
            return Vec::new();
        };
        let mut edges: Vec<_> = self
            .graph
            .edges_directed(*index, Direction::Outgoing)
            .collect();
        // petgraph yields the most recently added edge first.
        edges.sort_by_key(|edge| edge.id());
        edges.into_iter().map(|edge| edge.weight()).collect()
    }

    /// Returns the node a new conversation starts at.
    ///
    /// That is the first `start` node, or else the first node without
    /// incoming edges.
    #[must_use]
    pub fn start_node(&self) -> Option<&FlowNode> {
        self.graph
            .node_indices()
            .find(|index| matches!(self.graph[*index].kind, NodeKind::Start))
            .or_else(|| {
                self.graph.node_indices().find(|index| {
                    self.graph
                        .edges_directed(*index, Direction::Incoming)
                        .next()
                        .is_none()
                })
            })
            .map(|index| &self.graph[index])
    }

    /// Rebuilds the stored definition.
    #[must_use]
    pub fn to_definition(&self) -> FlowDefinition {
        let mut edges: Vec<_> = self.graph.edge_references().collect();
        edges.sort_by_key(|edge| edge.id());
        FlowDefinition {
            id: self.id,
            name: self.name.clone(),
            nodes: self.graph.node_weights().cloned().collect(),
            edges: edges.into_iter().map(|edge| edge.weight().clone()).collect(),
        }
    }
}

fn lookup(
    index: &HashMap<String, NodeIndex>,
    edge: &FlowEdge,
    node_id: &str,
) -> Result<NodeIndex, DefinitionError> {
    index
        .get(node_id)
        .copied()
        .ok_or_else(|| DefinitionError::DanglingEdge {
            edge_id: edge.id.clone(),
            node_id: node_id.to_owned(),
        })
}
