//! Line-delimited JSON wire types for the runner.

use chatflow_context::DetectedIntent;
use chatflow_core::{ConversationId, TimerId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value as JsonValue;

/// A user message read from stdin.
#[derive(Debug, Clone, Deserialize)]
pub struct InboundMessage {
    /// Accepts a bare ULID or the prefixed `conv_` form.
    #[serde(deserialize_with = "conversation_id")]
    pub conversation_id: ConversationId,
    #[serde(default)]
    pub text: String,
    /// Contact fields to merge into the conversation's contact record.
    #[serde(default)]
    pub contact: Option<JsonValue>,
    /// Variables to merge into the conversation's context variables.
    #[serde(default)]
    pub variables: Option<JsonValue>,
    #[serde(default)]
    pub intent: Option<DetectedIntent>,
    /// Functions the host invoked for this message.
    #[serde(default)]
    pub function_calls: Vec<String>,
}

fn conversation_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<ConversationId, D::Error> {
    let raw = String::deserialize(deserializer)?;
    raw.parse().map_err(serde::de::Error::custom)
}

/// A decision written to stdout.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Outbound {
    /// Text to send to the user.
    Message {
        conversation_id: ConversationId,
        node_id: String,
        text: String,
    },
    /// The conversation moved between nodes.
    Moved {
        conversation_id: ConversationId,
        from: String,
        to: String,
    },
    /// The conversation waits for the next user message.
    Waiting {
        conversation_id: ConversationId,
        node_id: String,
    },
    /// A non-blocking delay was armed.
    Armed {
        conversation_id: ConversationId,
        node_id: String,
        handle: TimerId,
        due_at: DateTime<Utc>,
    },
    /// A blocking delay suspended the conversation.
    Suspended {
        conversation_id: ConversationId,
        node_id: String,
        handle: TimerId,
        resume_at: DateTime<Utc>,
    },
    TimerReset {
        conversation_id: ConversationId,
        node_id: String,
        handle: TimerId,
        due_at: DateTime<Utc>,
    },
    TimerCancelled {
        conversation_id: ConversationId,
        node_id: String,
        handle: TimerId,
    },
    /// The flow reached its end.
    Ended {
        conversation_id: ConversationId,
        node_id: String,
    },
    /// No decision could be made; the conversation is stopped.
    Misconfigured {
        conversation_id: ConversationId,
        node_id: Option<String>,
        reason: String,
    },
}
