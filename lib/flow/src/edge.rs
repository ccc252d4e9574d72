//! Flow edges and their conditions.
//!
//! Stored edges carry a `condition_type` and a loosely shaped
//! `condition_config`. Loading classifies them into an [`EdgeCondition`]
//! so that only the fields relevant to the type survive.

use crate::condition::{ConditionsConfig, DEFAULT_CONFIDENCE_THRESHOLD};
use crate::error::DefinitionError;
use serde::{Deserialize, Serialize};

/// The wire name of an edge condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionType {
    Always,
    Condition,
    Keyword,
    Intent,
    UserInput,
    WaitUserReply,
}

/// When an edge may be taken.
#[derive(Debug, Clone, PartialEq)]
pub enum EdgeCondition {
    /// Always matches.
    Always,
    /// Matches when the rule group holds.
    Condition(ConditionsConfig),
    /// Matches when the last user message contains any keyword,
    /// case-insensitively.
    Keyword { keywords: Vec<String> },
    /// Matches when the detected intent meets the threshold.
    Intent {
        intent_name: String,
        confidence_threshold: f64,
    },
    /// Matches the exact user message, or any non-blank message when no
    /// expected input is configured.
    UserInput { expected_input: Option<String> },
    /// Matches only while the conversation is awaiting a user reply.
    WaitUserReply,
}

impl EdgeCondition {
    /// Returns the wire name of the condition.
    #[must_use]
    pub fn condition_type(&self) -> ConditionType {
        match self {
            Self::Always => ConditionType::Always,
            Self::Condition(_) => ConditionType::Condition,
            Self::Keyword { .. } => ConditionType::Keyword,
            Self::Intent { .. } => ConditionType::Intent,
            Self::UserInput { .. } => ConditionType::UserInput,
            Self::WaitUserReply => ConditionType::WaitUserReply,
        }
    }
}

/// A directed transition between two nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "EdgeRecord", into = "EdgeRecord")]
pub struct FlowEdge {
    pub id: String,
    pub source: String,
    pub target: String,
    pub condition: EdgeCondition,
    pub label: String,
    /// Higher priorities are evaluated first.
    pub priority: i32,
}

impl FlowEdge {
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        source: impl Into<String>,
        target: impl Into<String>,
        condition: EdgeCondition,
    ) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            target: target.into(),
            condition,
            label: String::new(),
            priority: 0,
        }
    }

    #[must_use]
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Returns true if this edge only matches while awaiting a reply.
    #[must_use]
    pub fn waits_for_reply(&self) -> bool {
        self.condition == EdgeCondition::WaitUserReply
    }
}

/// Union of the fields any condition type may carry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct EdgeConditionConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    conditions: Option<ConditionsConfig>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    keywords: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    intent_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    confidence_threshold: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    expected_input: Option<String>,
}

/// The stored shape of an edge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct EdgeRecord {
    #[serde(alias = "edge_id")]
    id: String,
    #[serde(alias = "source_node")]
    source: String,
    #[serde(alias = "target_node")]
    target: String,
    condition_type: ConditionType,
    #[serde(default)]
    condition_config: Option<EdgeConditionConfig>,
    #[serde(default)]
    label: String,
    #[serde(default)]
    priority: i32,
}

impl TryFrom<EdgeRecord> for FlowEdge {
    type Error = DefinitionError;

    fn try_from(record: EdgeRecord) -> Result<Self, Self::Error> {
        let config = record.condition_config.unwrap_or_default();
        let invalid = |reason: &str| DefinitionError::InvalidEdgeConfig {
            edge_id: record.id.clone(),
            reason: reason.to_owned(),
        };

        let condition = match record.condition_type {
            ConditionType::Always => EdgeCondition::Always,
            ConditionType::WaitUserReply => EdgeCondition::WaitUserReply,
            ConditionType::Condition => EdgeCondition::Condition(
                config
                    .conditions
                    .ok_or_else(|| invalid("condition edge requires conditions"))?,
            ),
            ConditionType::Keyword => {
                let keywords: Vec<String> = config
                    .keywords
                    .into_iter()
                    .map(|k| k.trim().to_owned())
                    .filter(|k| !k.is_empty())
                    .collect();
                if keywords.is_empty() {
                    return Err(invalid("keyword edge requires at least one keyword"));
                }
                EdgeCondition::Keyword { keywords }
            }
            ConditionType::Intent => EdgeCondition::Intent {
                intent_name: config
                    .intent_name
                    .filter(|name| !name.trim().is_empty())
                    .ok_or_else(|| invalid("intent edge requires intent_name"))?,
                confidence_threshold: config
                    .confidence_threshold
                    .unwrap_or(DEFAULT_CONFIDENCE_THRESHOLD),
            },
            ConditionType::UserInput => EdgeCondition::UserInput {
                expected_input: config.expected_input.filter(|input| !input.is_empty()),
            },
        };

        Ok(Self {
            id: record.id,
            source: record.source,
            target: record.target,
            condition,
            label: record.label,
            priority: record.priority,
        })
    }
}

impl From<FlowEdge> for EdgeRecord {
    fn from(edge: FlowEdge) -> Self {
        let condition_type = edge.condition.condition_type();
        let mut config = EdgeConditionConfig::default();
        match edge.condition {
            EdgeCondition::Always | EdgeCondition::WaitUserReply => {}
            EdgeCondition::Condition(conditions) => config.conditions = Some(conditions),
            EdgeCondition::Keyword { keywords } => config.keywords = keywords,
            EdgeCondition::Intent {
                intent_name,
                confidence_threshold,
            } => {
                config.intent_name = Some(intent_name);
                config.confidence_threshold = Some(confidence_threshold);
            }
            EdgeCondition::UserInput { expected_input } => config.expected_input = expected_input,
        }
        Self {
            id: edge.id,
            source: edge.source,
            target: edge.target,
            condition_type,
            condition_config: Some(config),
            label: edge.label,
            priority: edge.priority,
        }
    }
}
