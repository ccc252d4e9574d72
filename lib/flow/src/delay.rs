//! Delay node configuration.
//!
//! The flow crate only models the config. Arming, resetting and firing
//! timers is the scheduler's job.

use serde::{Deserialize, Serialize};

/// How a delay's due time is computed and whether user messages reset it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimingMode {
    /// Due `seconds` after arming.
    #[default]
    FixedDelay,
    /// Due `seconds` after arming, pushed back by each user message when
    /// `reset_on_user_response` is set.
    DelayFromLastMessage,
    /// Due at `execute_at` interpreted in `timezone`.
    AbsoluteDate,
}

/// What happens when a delay fires.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScheduledAction {
    /// Resume routing from the delay node's outgoing edges.
    #[default]
    ContinueFlow,
    /// Send a message. Content may hold `{{...}}` placeholders.
    Message { content: String },
    /// Jump to another node of the flow.
    RestartFlow { restart_from_node: String },
}

/// Config for a `delay` node.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelayConfig {
    /// Delay length for the relative timing modes.
    #[serde(default)]
    pub seconds: u64,
    /// Suspend the conversation in place until the delay elapses.
    #[serde(default)]
    pub blocking: bool,
    #[serde(default)]
    pub timing_mode: TimingMode,
    #[serde(default)]
    pub reset_on_user_response: bool,
    #[serde(default)]
    pub cancel_on_user_response: bool,
    /// Target timestamp for `absolute_date`. May be a placeholder such as
    /// `{{context.reminder_at}}`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execute_at: Option<String>,
    /// IANA timezone for `execute_at`. Defaults to UTC.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
    #[serde(default)]
    pub scheduled_action: ScheduledAction,
}

impl DelayConfig {
    /// A fixed delay of `seconds` that continues the flow.
    #[must_use]
    pub fn fixed(seconds: u64) -> Self {
        Self {
            seconds,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_blocking(mut self, blocking: bool) -> Self {
        self.blocking = blocking;
        self
    }

    #[must_use]
    pub fn with_timing_mode(mut self, mode: TimingMode) -> Self {
        self.timing_mode = mode;
        self
    }

    #[must_use]
    pub fn with_reset_on_user_response(mut self, reset: bool) -> Self {
        self.reset_on_user_response = reset;
        self
    }

    #[must_use]
    pub fn with_cancel_on_user_response(mut self, cancel: bool) -> Self {
        self.cancel_on_user_response = cancel;
        self
    }

    #[must_use]
    pub fn with_execute_at(mut self, execute_at: impl Into<String>) -> Self {
        self.execute_at = Some(execute_at.into());
        self
    }

    #[must_use]
    pub fn with_timezone(mut self, timezone: impl Into<String>) -> Self {
        self.timezone = Some(timezone.into());
        self
    }

    #[must_use]
    pub fn with_action(mut self, action: ScheduledAction) -> Self {
        self.scheduled_action = action;
        self
    }

    /// Returns true if user messages can reset this delay.
    #[must_use]
    pub fn resets_on_reply(&self) -> bool {
        self.reset_on_user_response && self.timing_mode == TimingMode::DelayFromLastMessage
    }

    /// Checks the parts of the config that do not depend on other nodes.
    pub(crate) fn validate(&self) -> Result<(), String> {
        if self.timing_mode == TimingMode::AbsoluteDate
            && self.execute_at.as_deref().is_none_or(|at| at.trim().is_empty())
        {
            return Err("absolute_date requires execute_at".into());
        }
        if let ScheduledAction::RestartFlow { restart_from_node } = &self.scheduled_action {
            if restart_from_node.trim().is_empty() {
                return Err("restart_flow requires restart_from_node".into());
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn defaults_to_fixed_continue() {
        let config: DelayConfig = serde_json::from_value(json!({ "seconds": 30 })).expect("parse");
        assert_eq!(config, DelayConfig::fixed(30));
        assert_eq!(config.scheduled_action, ScheduledAction::ContinueFlow);
        assert!(!config.blocking);
    }

    #[test]
    fn parses_full_config() {
        let config: DelayConfig = serde_json::from_value(json!({
            "seconds": 600,
            "timing_mode": "delay_from_last_message",
            "reset_on_user_response": true,
            "scheduled_action": { "type": "message", "content": "Still there, {{contact.name}}?" }
        }))
        .expect("parse");
        assert!(config.resets_on_reply());
        assert_eq!(
            config.scheduled_action,
            ScheduledAction::Message {
                content: "Still there, {{contact.name}}?".into()
            }
        );
    }

    #[test]
    fn reset_only_applies_to_last_message_mode() {
        let fixed = DelayConfig::fixed(10).with_reset_on_user_response(true);
        assert!(!fixed.resets_on_reply());
    }

    #[test]
    fn absolute_date_requires_execute_at() {
        let config = DelayConfig::default().with_timing_mode(TimingMode::AbsoluteDate);
        assert!(config.validate().is_err());
        assert!(config.with_execute_at("2030-01-01T09:00").validate().is_ok());
    }

    #[test]
    fn restart_requires_target() {
        let config = DelayConfig::fixed(5).with_action(ScheduledAction::RestartFlow {
            restart_from_node: " ".into(),
        });
        assert!(config.validate().is_err());
    }
}
