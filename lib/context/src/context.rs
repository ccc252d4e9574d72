//! The execution context snapshot.
//!
//! A context is built fresh for every inbound conversation event and
//! discarded once the engine has produced its decision. Nothing in the
//! core mutates it during evaluation.

use crate::path::resolve_path;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::borrow::Cow;
use std::collections::HashSet;

/// An intent detected upstream of the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedIntent {
    /// Intent name as produced by the classifier.
    pub name: String,
    /// Classifier confidence (0.0 - 1.0).
    pub confidence: f64,
}

/// A function (tool) invocation recorded for the conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    /// Function name.
    pub name: String,
    /// When the call happened.
    pub called_at: DateTime<Utc>,
}

/// Read-only snapshot of a conversation at the moment of a decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionContext {
    /// Contact record, including `additional_attributes` and `custom_attributes`.
    #[serde(default)]
    pub contact: Map<String, JsonValue>,
    /// Flow variables collected so far.
    #[serde(default)]
    pub context_variables: Map<String, JsonValue>,
    /// The most recent inbound user message.
    #[serde(default)]
    pub last_user_message: String,
    /// Ids of nodes already executed in this conversation.
    #[serde(default)]
    pub visited_nodes: HashSet<String>,
    /// Function calls in call order.
    #[serde(default)]
    pub function_calls: Vec<FunctionCall>,
    /// The evaluation instant.
    #[serde(default = "Utc::now")]
    pub now: DateTime<Utc>,
    /// Conversation metadata (channel, status, labels, ...).
    #[serde(default)]
    pub conversation_meta: Map<String, JsonValue>,
    /// Intent detected for the last user message, if any.
    #[serde(default)]
    pub detected_intent: Option<DetectedIntent>,
}

impl ExecutionContext {
    /// Creates an empty context evaluated at `now`.
    #[must_use]
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            contact: Map::new(),
            context_variables: Map::new(),
            last_user_message: String::new(),
            visited_nodes: HashSet::new(),
            function_calls: Vec::new(),
            now,
            conversation_meta: Map::new(),
            detected_intent: None,
        }
    }

    /// Replaces the contact record. Non-object values leave it empty.
    #[must_use]
    pub fn with_contact(mut self, contact: JsonValue) -> Self {
        self.contact = into_map(contact);
        self
    }

    /// Sets a single context variable.
    #[must_use]
    pub fn with_variable(mut self, key: impl Into<String>, value: JsonValue) -> Self {
        self.context_variables.insert(key.into(), value);
        self
    }

    /// Replaces all context variables. Non-object values leave them empty.
    #[must_use]
    pub fn with_variables(mut self, variables: JsonValue) -> Self {
        self.context_variables = into_map(variables);
        self
    }

    /// Replaces the conversation metadata. Non-object values leave it empty.
    #[must_use]
    pub fn with_conversation_meta(mut self, meta: JsonValue) -> Self {
        self.conversation_meta = into_map(meta);
        self
    }

    /// Sets the last user message.
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.last_user_message = message.into();
        self
    }

    /// Marks a node as visited.
    #[must_use]
    pub fn with_visited(mut self, node_id: impl Into<String>) -> Self {
        self.visited_nodes.insert(node_id.into());
        self
    }

    /// Records a function call.
    #[must_use]
    pub fn with_function_call(mut self, name: impl Into<String>, called_at: DateTime<Utc>) -> Self {
        self.function_calls.push(FunctionCall {
            name: name.into(),
            called_at,
        });
        self
    }

    /// Sets the detected intent.
    #[must_use]
    pub fn with_intent(mut self, name: impl Into<String>, confidence: f64) -> Self {
        self.detected_intent = Some(DetectedIntent {
            name: name.into(),
            confidence,
        });
        self
    }

    /// Resolves a dot path against the contact record.
    #[must_use]
    pub fn contact_value(&self, path: &str) -> Option<&JsonValue> {
        resolve_path(&self.contact, path)
    }

    /// Resolves a dot path against the context variables.
    #[must_use]
    pub fn variable(&self, path: &str) -> Option<&JsonValue> {
        resolve_path(&self.context_variables, path)
    }

    /// Resolves a dot path against the conversation metadata.
    #[must_use]
    pub fn conversation_value(&self, path: &str) -> Option<&JsonValue> {
        resolve_path(&self.conversation_meta, path)
    }

    /// Resolves a namespaced reference such as `context.order.id`.
    ///
    /// Namespaces: `context` (variables), `contact`, `conversation`. The
    /// bare names `last_user_message` and `now` are also recognised.
    #[must_use]
    pub fn lookup(&self, reference: &str) -> Option<Cow<'_, JsonValue>> {
        match reference {
            "last_user_message" => {
                return Some(Cow::Owned(JsonValue::String(self.last_user_message.clone())));
            }
            "now" => return Some(Cow::Owned(JsonValue::String(self.now.to_rfc3339()))),
            _ => {}
        }

        let (namespace, path) = reference.split_once('.')?;
        let value = match namespace {
            "context" => self.variable(path),
            "contact" => self.contact_value(path),
            "conversation" => self.conversation_value(path),
            _ => None,
        };
        value.map(Cow::Borrowed)
    }

    /// Returns true if the node has been visited.
    #[must_use]
    pub fn has_visited(&self, node_id: &str) -> bool {
        self.visited_nodes.contains(node_id)
    }

    /// Returns true if the function has been called at least once.
    #[must_use]
    pub fn has_called(&self, function_name: &str) -> bool {
        self.function_calls.iter().any(|call| call.name == function_name)
    }

    /// Returns true if the detected intent is `name` at or above `threshold`.
    #[must_use]
    pub fn intent_matches(&self, name: &str, threshold: f64) -> bool {
        self.detected_intent
            .as_ref()
            .is_some_and(|intent| intent.name == name && intent.confidence >= threshold)
    }
}

fn into_map(value: JsonValue) -> Map<String, JsonValue> {
    match value {
        JsonValue::Object(map) => map,
        _ => Map::new(),
    }
}
