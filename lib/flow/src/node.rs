//! Flow node types and configurations.
//!
//! Stored nodes are `{ node_id, node_type, config }` records with an
//! untyped config. Loading turns them into a typed [`NodeKind`], so every
//! config is checked once and routing never parses JSON.

use crate::branch::Branch;
use crate::condition::ConditionsConfig;
use crate::delay::{DelayConfig, ScheduledAction};
use crate::error::DefinitionError;
use serde::de::DeserializeOwned;
use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value as JsonValue};

/// Config for a `message` node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageNodeConfig {
    /// Message text. May hold `{{...}}` placeholders.
    pub content: String,
}

/// Config for a `condition` node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionNodeConfig {
    pub conditions: ConditionsConfig,
    #[serde(default)]
    pub branches: Vec<Branch>,
    /// Name of the branch used when none matches the evaluation result.
    #[serde(default)]
    pub default_branch: String,
}

impl ConditionNodeConfig {
    /// Returns the configured default branch.
    #[must_use]
    pub fn default_branch(&self) -> Option<&Branch> {
        self.branches
            .iter()
            .find(|branch| branch.name == self.default_branch)
    }
}

/// The typed behaviour of a node.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    /// Entry point of the flow.
    Start,
    /// Terminal node.
    End,
    /// Sends a message and moves on.
    Message(MessageNodeConfig),
    /// Branches on a rule group.
    Condition(ConditionNodeConfig),
    /// Waits before continuing.
    Delay(DelayConfig),
    /// Any other node type (AI response, function call, handoff, ...).
    /// Routing treats it as a plain node with outgoing edges.
    Other { node_type: String, config: JsonValue },
}

impl NodeKind {
    /// Returns the wire name of the node type.
    #[must_use]
    pub fn node_type(&self) -> &str {
        match self {
            Self::Start => "start",
            Self::End => "end",
            Self::Message(_) => "message",
            Self::Condition(_) => "condition",
            Self::Delay(_) => "delay",
            Self::Other { node_type, .. } => node_type,
        }
    }
}

/// A node of a flow.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "NodeRecord")]
pub struct FlowNode {
    /// Node id, unique within the flow.
    pub id: String,
    pub kind: NodeKind,
}

impl FlowNode {
    #[must_use]
    pub fn new(id: impl Into<String>, kind: NodeKind) -> Self {
        Self { id: id.into(), kind }
    }

    #[must_use]
    pub fn start(id: impl Into<String>) -> Self {
        Self::new(id, NodeKind::Start)
    }

    #[must_use]
    pub fn end(id: impl Into<String>) -> Self {
        Self::new(id, NodeKind::End)
    }

    #[must_use]
    pub fn message(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self::new(
            id,
            NodeKind::Message(MessageNodeConfig {
                content: content.into(),
            }),
        )
    }

    #[must_use]
    pub fn condition(id: impl Into<String>, config: ConditionNodeConfig) -> Self {
        Self::new(id, NodeKind::Condition(config))
    }

    #[must_use]
    pub fn delay(id: impl Into<String>, config: DelayConfig) -> Self {
        Self::new(id, NodeKind::Delay(config))
    }

    /// Returns the delay config if this is a delay node.
    #[must_use]
    pub fn delay_config(&self) -> Option<&DelayConfig> {
        match &self.kind {
            NodeKind::Delay(config) => Some(config),
            _ => None,
        }
    }

    /// Ids of other nodes named by this node's config.
    pub(crate) fn references(&self) -> Vec<&str> {
        match &self.kind {
            NodeKind::Condition(config) => config
                .branches
                .iter()
                .map(|branch| branch.next_node.as_str())
                .collect(),
            NodeKind::Delay(DelayConfig {
                scheduled_action: ScheduledAction::RestartFlow { restart_from_node },
                ..
            }) => vec![restart_from_node.as_str()],
            _ => Vec::new(),
        }
    }

    /// Checks node-local invariants.
    fn validate(&self) -> Result<(), DefinitionError> {
        match &self.kind {
            NodeKind::Condition(config) => {
                if config.default_branch.trim().is_empty() {
                    return Err(DefinitionError::MissingDefaultBranch {
                        node_id: self.id.clone(),
                    });
                }
                if config.default_branch().is_none() {
                    return Err(DefinitionError::UnknownDefaultBranch {
                        node_id: self.id.clone(),
                        branch: config.default_branch.clone(),
                    });
                }
                Ok(())
            }
            NodeKind::Delay(config) => {
                config
                    .validate()
                    .map_err(|reason| DefinitionError::InvalidNodeConfig {
                        node_id: self.id.clone(),
                        node_type: "delay".into(),
                        reason,
                    })
            }
            _ => Ok(()),
        }
    }
}

/// The stored shape of a node.
#[derive(Debug, Deserialize)]
pub(crate) struct NodeRecord {
    #[serde(alias = "id")]
    node_id: String,
    #[serde(alias = "type")]
    node_type: String,
    #[serde(default)]
    config: JsonValue,
}

fn typed_config<T: DeserializeOwned>(record: &NodeRecord) -> Result<T, DefinitionError> {
    T::deserialize(&record.config).map_err(|e| DefinitionError::InvalidNodeConfig {
        node_id: record.node_id.clone(),
        node_type: record.node_type.clone(),
        reason: e.to_string(),
    })
}

impl TryFrom<NodeRecord> for FlowNode {
    type Error = DefinitionError;

    fn try_from(record: NodeRecord) -> Result<Self, Self::Error> {
        let kind = match record.node_type.as_str() {
            "start" => NodeKind::Start,
            "end" => NodeKind::End,
            "message" => NodeKind::Message(typed_config(&record)?),
            "condition" => NodeKind::Condition(typed_config(&record)?),
            "delay" => NodeKind::Delay(typed_config(&record)?),
            _ => NodeKind::Other {
                node_type: record.node_type,
                config: record.config,
            },
        };
        let node = Self {
            id: record.node_id,
            kind,
        };
        node.validate()?;
        Ok(node)
    }
}

impl Serialize for FlowNode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("FlowNode", 3)?;
        state.serialize_field("node_id", &self.id)?;
        state.serialize_field("node_type", self.kind.node_type())?;
        match &self.kind {
            NodeKind::Start | NodeKind::End => {
                state.serialize_field("config", &Map::<String, JsonValue>::new())?;
            }
            NodeKind::Message(config) => state.serialize_field("config", config)?,
            NodeKind::Condition(config) => state.serialize_field("config", config)?,
            NodeKind::Delay(config) => state.serialize_field("config", config)?,
            NodeKind::Other { config, .. } => state.serialize_field("config", config)?,
        }
        state.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(value: JsonValue) -> Result<FlowNode, DefinitionError> {
        let record: NodeRecord = serde_json::from_value(value).expect("record shape");
        FlowNode::try_from(record)
    }

    #[test]
    fn parses_known_types() {
        let node = parse(json!({
            "node_id": "hello", "node_type": "message", "config": { "content": "Hi!" }
        }))
        .expect("message node");
        assert_eq!(node, FlowNode::message("hello", "Hi!"));

        let node = parse(json!({ "id": "s", "type": "start" })).expect("start node");
        assert_eq!(node.kind, NodeKind::Start);
    }

    #[test]
    fn unknown_types_are_kept_untyped() {
        let node = parse(json!({
            "node_id": "ai", "node_type": "ai_response", "config": { "prompt": "Be nice" }
        }))
        .expect("other node");
        assert_eq!(node.kind.node_type(), "ai_response");
        let NodeKind::Other { config, .. } = &node.kind else {
            panic!("expected untyped node");
        };
        assert_eq!(config["prompt"], "Be nice");
    }

    #[test]
    fn invalid_config_is_rejected() {
        let err = parse(json!({ "node_id": "m", "node_type": "message", "config": {} }))
            .expect_err("content is required");
        assert!(matches!(
            err,
            DefinitionError::InvalidNodeConfig { ref node_id, ref node_type, .. }
                if node_id == "m" && node_type == "message"
        ));
    }

    #[test]
    fn condition_requires_default_branch() {
        let config = json!({
            "conditions": { "operator": "AND", "rules": [] },
            "branches": [{ "name": "yes", "conditions_met": true, "next_node": "a" }]
        });
        let err = parse(json!({ "node_id": "c", "node_type": "condition", "config": config }))
            .expect_err("missing default");
        assert_eq!(err, DefinitionError::MissingDefaultBranch { node_id: "c".into() });

        let mut config = config;
        config["default_branch"] = json!("no");
        let err = parse(json!({ "node_id": "c", "node_type": "condition", "config": config }))
            .expect_err("unknown default");
        assert_eq!(
            err,
            DefinitionError::UnknownDefaultBranch {
                node_id: "c".into(),
                branch: "no".into()
            }
        );
    }

    #[test]
    fn delay_config_is_validated() {
        let err = parse(json!({
            "node_id": "d", "node_type": "delay",
            "config": { "timing_mode": "absolute_date" }
        }))
        .expect_err("execute_at required");
        assert!(err.to_string().contains("execute_at"));
    }

    #[test]
    fn serializes_in_stored_shape() {
        let node = FlowNode::delay("wait", DelayConfig::fixed(60));
        let value = serde_json::to_value(&node).expect("serialize");
        assert_eq!(value["node_id"], "wait");
        assert_eq!(value["node_type"], "delay");
        assert_eq!(value["config"]["seconds"], 60);

        let back: FlowNode = serde_json::from_value(value).expect("deserialize");
        assert_eq!(back, node);
    }

    #[test]
    fn references_cover_branches_and_restart_target() {
        let node = FlowNode::delay(
            "d",
            DelayConfig::fixed(5).with_action(ScheduledAction::RestartFlow {
                restart_from_node: "start".into(),
            }),
        );
        assert_eq!(node.references(), vec!["start"]);
    }
}
