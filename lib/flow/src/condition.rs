//! Condition rules and rule groups.
//!
//! A rule is a single predicate over the execution context. Rules are
//! stored as JSON objects discriminated by `type`:
//!
//! ```json
//! { "id": "r1", "type": "contact", "variable_path": "custom_attributes.category",
//!   "operator": "equals", "value": "vip" }
//! ```
//!
//! Rules are grouped into a [`ConditionsConfig`] combined with AND or OR.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Confidence threshold used when an intent rule or edge does not set one.
pub const DEFAULT_CONFIDENCE_THRESHOLD: f64 = 0.8;

fn default_true() -> bool {
    true
}

fn default_confidence_threshold() -> f64 {
    DEFAULT_CONFIDENCE_THRESHOLD
}

/// How the rules of a group are combined.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogicalOperator {
    /// Every rule must hold. An empty group holds.
    #[default]
    #[serde(rename = "AND", alias = "and")]
    And,
    /// At least one rule must hold. An empty group does not hold.
    #[serde(rename = "OR", alias = "or")]
    Or,
}

/// A group of rules combined with a logical operator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConditionsConfig {
    #[serde(default)]
    pub operator: LogicalOperator,
    #[serde(default)]
    pub rules: Vec<ConditionRule>,
}

impl ConditionsConfig {
    /// A group that holds when every rule holds.
    #[must_use]
    pub fn all(rules: Vec<ConditionRule>) -> Self {
        Self {
            operator: LogicalOperator::And,
            rules,
        }
    }

    /// A group that holds when any rule holds.
    #[must_use]
    pub fn any(rules: Vec<ConditionRule>) -> Self {
        Self {
            operator: LogicalOperator::Or,
            rules,
        }
    }
}

/// A single condition rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionRule {
    /// Rule id, unique within its group. Used for tracing only.
    #[serde(default)]
    pub id: String,
    #[serde(flatten)]
    pub kind: RuleKind,
}

impl ConditionRule {
    #[must_use]
    pub fn new(id: impl Into<String>, kind: RuleKind) -> Self {
        Self {
            id: id.into(),
            kind,
        }
    }
}

/// The typed payload of a rule, tagged by `type` on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RuleKind {
    /// Compares a contact attribute.
    Contact(AttributeRule),
    /// Compares a conversation attribute.
    Conversation(AttributeRule),
    /// Compares a flow variable.
    ContextVariable(VariableRule),
    /// Compares the last user message.
    UserInput(InputRule),
    /// Tests the detected intent.
    Intent(IntentRule),
    /// Tests the local wall-clock time.
    TimeCondition(TimeRule),
    /// Matches a pattern against the last user message.
    Regex(RegexRule),
    /// Tests whether a node has been visited.
    PreviousNode(PreviousNodeRule),
    /// Tests whether a function has been called.
    FunctionCall(FunctionCallRule),
}

impl RuleKind {
    /// Returns the wire name of the rule type.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Contact(_) => "contact",
            Self::Conversation(_) => "conversation",
            Self::ContextVariable(_) => "context_variable",
            Self::UserInput(_) => "user_input",
            Self::Intent(_) => "intent",
            Self::TimeCondition(_) => "time_condition",
            Self::Regex(_) => "regex",
            Self::PreviousNode(_) => "previous_node",
            Self::FunctionCall(_) => "function_call",
        }
    }
}

/// Comparison operators shared by attribute, variable and input rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    Equals,
    NotEquals,
    Contains,
    NotContains,
    StartsWith,
    EndsWith,
    GreaterThan,
    LessThan,
    GreaterEqual,
    LessEqual,
    IsEmpty,
    NotEmpty,
    InList,
    NotInList,
    MatchesRegex,
}

/// Rule over a contact or conversation attribute.
///
/// The attribute is addressed by `variable_path`, falling back to `field`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeRule {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variable_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    pub operator: Operator,
    #[serde(default)]
    pub value: JsonValue,
    #[serde(default = "default_true")]
    pub case_sensitive: bool,
}

impl AttributeRule {
    /// Returns the attribute path, ignoring blank entries.
    #[must_use]
    pub fn path(&self) -> Option<&str> {
        self.variable_path
            .as_deref()
            .filter(|p| !p.trim().is_empty())
            .or_else(|| self.field.as_deref().filter(|p| !p.trim().is_empty()))
            .map(str::trim)
    }
}

/// Rule over a flow variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableRule {
    #[serde(default)]
    pub variable_path: String,
    pub operator: Operator,
    #[serde(default)]
    pub value: JsonValue,
    #[serde(default = "default_true")]
    pub case_sensitive: bool,
}

/// Rule over the last user message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputRule {
    pub operator: Operator,
    #[serde(default)]
    pub value: JsonValue,
    #[serde(default = "default_true")]
    pub case_sensitive: bool,
}

/// Rule over the detected intent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentRule {
    pub intent_name: String,
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f64,
}

/// Time-of-day comparisons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeOperator {
    /// Inclusive window `[start_time, end_time]`, wrapping past midnight.
    Between,
    /// Strictly after `value`.
    After,
    /// Strictly before `value`.
    Before,
}

/// Rule over the local time of day.
///
/// Times are `HH:MM` or `HH:MM:SS`. The timezone is an IANA name and
/// defaults to UTC.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeRule {
    pub operator: TimeOperator,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
}

/// Text a regex rule is matched against.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegexTarget {
    #[default]
    LastUserMessage,
}

/// Rule matching a regular expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegexRule {
    pub pattern: String,
    #[serde(default)]
    pub target: RegexTarget,
    #[serde(default = "default_true")]
    pub case_sensitive: bool,
}

/// Rule over the set of visited nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreviousNodeRule {
    pub node_id: String,
    /// When false the rule holds for nodes that were *not* visited.
    #[serde(default = "default_true")]
    pub visited: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FunctionCallOperator {
    #[default]
    Called,
    NotCalled,
}

/// Rule over the recorded function calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCallRule {
    pub function_name: String,
    #[serde(default)]
    pub operator: FunctionCallOperator,
}
