//! Strongly-typed identifiers.
//!
//! Flows and conversations get ULID ids. [`TimerId`] is the scheduler's
//! timer handle. The scheduler keeps at most one timer per (conversation,
//! delay node), but every arm, including a re-arm that replaces a live
//! timer, mints a new handle. A handle therefore names one timer instance:
//! once that instance is replaced, cancelled or fired, its handle is
//! unknown to the scheduler and a late fire, cancel or host resumption
//! carrying it is a no-op instead of acting on the replacement.
//!
//! Each type renders with its own prefix (`tmr_01H...`) and parses with or
//! without it.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ulid::Ulid;

/// Error returned when parsing an ID from a string fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseIdError {
    /// The type of ID that failed to parse.
    pub id_type: &'static str,
    /// The reason for the parse failure.
    pub reason: String,
}

impl fmt::Display for ParseIdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed to parse {}: {}", self.id_type, self.reason)
    }
}

impl std::error::Error for ParseIdError {}

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident, $prefix:expr) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Ulid);

        impl $name {
            /// Creates a new ID with a randomly generated ULID.
            #[must_use]
            pub fn new() -> Self {
                Self(Ulid::new())
            }

            /// Creates an ID from a ULID.
            #[must_use]
            pub const fn from_ulid(ulid: Ulid) -> Self {
                Self(ulid)
            }

            /// Returns the underlying ULID.
            #[must_use]
            pub const fn as_ulid(&self) -> Ulid {
                self.0
            }

            /// Returns the prefix used for display formatting.
            #[must_use]
            pub const fn prefix() -> &'static str {
                $prefix
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}_{}", $prefix, self.0)
            }
        }

        impl FromStr for $name {
            type Err = ParseIdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let raw = s.strip_prefix(concat!($prefix, "_")).unwrap_or(s);
                Ulid::from_str(raw).map(Self).map_err(|e| ParseIdError {
                    id_type: stringify!($name),
                    reason: e.to_string(),
                })
            }
        }

        impl From<Ulid> for $name {
            fn from(ulid: Ulid) -> Self {
                Self(ulid)
            }
        }
    };
}

define_id!(
    /// Unique identifier for a stored flow definition.
    FlowId,
    "flow"
);

define_id!(
    /// Unique identifier for a conversation driven by a flow.
    ConversationId,
    "conv"
);

define_id!(
    /// Handle for a delay timer owned by the scheduler.
    ///
    /// A fresh handle is minted every time a timer is armed, so a handle
    /// never outlives the timer instance it was issued for.
    TimerId,
    "tmr"
);

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn conversation_id_display_format() {
        let id = ConversationId::new();
        assert!(id.to_string().starts_with("conv_"));
    }

    #[test]
    fn timer_handles_are_fresh() {
        let handles: HashSet<TimerId> = (0..64).map(|_| TimerId::new()).collect();
        assert_eq!(handles.len(), 64);
    }

    #[test]
    fn timer_id_display_format() {
        let id = TimerId::new();
        assert!(id.to_string().starts_with("tmr_"));
    }

    #[test]
    fn parse_with_prefix() {
        let id = FlowId::new();
        let parsed: FlowId = id.to_string().parse().expect("should parse");
        assert_eq!(id, parsed);
    }

    #[test]
    fn parse_without_prefix() {
        let ulid = Ulid::new();
        let id: ConversationId = ulid.to_string().parse().expect("should parse");
        assert_eq!(id.as_ulid(), ulid);
    }

    #[test]
    fn parse_rejects_foreign_prefix() {
        let id = TimerId::new();
        let result: Result<ConversationId, _> = id.to_string().parse();
        let err = result.expect_err("tmr_ prefix is not a conversation id");
        assert_eq!(err.id_type, "ConversationId");
    }

    #[test]
    fn serializes_as_bare_ulid() {
        let id = ConversationId::new();
        let json = serde_json::to_string(&id).expect("serialize");
        assert_eq!(json, format!("\"{}\"", id.as_ulid()));
        let parsed: ConversationId = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(id, parsed);
    }
}
