//! Delay timers and their state machine.
//!
//! ```text
//! PENDING ──────────────► FIRED        (blocking)
//! ARMED ──► ARMED (reset) ──► FIRED    (non-blocking)
//!   └──────────────────────► CANCELLED
//! ```
//!
//! Fired and cancelled timers are terminal and leave the scheduler's table.

use crate::error::{SchedulerError, TimerStateError};
use crate::schedule::after;
use chatflow_core::{ConversationId, TimerId};
use chatflow_flow::{DelayConfig, ScheduledAction, TimingMode};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimerState {
    /// Blocking delay; the host suspends the conversation until due.
    Pending,
    /// Non-blocking delay waiting for its due time.
    Armed,
    /// The delay elapsed and its action was handed out.
    Fired,
    /// The delay was cancelled.
    Cancelled,
}

impl TimerState {
    /// Returns true if no further transition is possible.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Fired | Self::Cancelled)
    }

    fn allows(self, to: Self) -> bool {
        matches!(
            (self, to),
            (Self::Pending, Self::Fired | Self::Cancelled)
                | (Self::Armed, Self::Armed | Self::Fired | Self::Cancelled)
        )
    }
}

impl fmt::Display for TimerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pending => "pending",
            Self::Armed => "armed",
            Self::Fired => "fired",
            Self::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// A delay timer for one (conversation, node) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timer {
    pub handle: TimerId,
    pub conversation_id: ConversationId,
    pub node_id: String,
    pub state: TimerState,
    pub mode: TimingMode,
    pub blocking: bool,
    pub seconds: u64,
    pub reset_on_user_response: bool,
    pub cancel_on_user_response: bool,
    /// Action to run on fire, with message placeholders already resolved.
    pub action: ScheduledAction,
    pub armed_at: DateTime<Utc>,
    pub due_at: DateTime<Utc>,
    pub reset_count: u32,
}

impl Timer {
    /// Creates a timer for a delay node with a fresh handle.
    #[must_use]
    pub fn new(
        conversation_id: ConversationId,
        node_id: impl Into<String>,
        config: &DelayConfig,
        action: ScheduledAction,
        armed_at: DateTime<Utc>,
        due_at: DateTime<Utc>,
    ) -> Self {
        Self {
            handle: TimerId::new(),
            conversation_id,
            node_id: node_id.into(),
            state: if config.blocking {
                TimerState::Pending
            } else {
                TimerState::Armed
            },
            mode: config.timing_mode,
            blocking: config.blocking,
            seconds: config.seconds,
            reset_on_user_response: config.reset_on_user_response,
            cancel_on_user_response: config.cancel_on_user_response,
            action,
            armed_at,
            due_at,
            reset_count: 0,
        }
    }

    #[must_use]
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        now >= self.due_at
    }

    /// Returns true if a user message pushes this timer back.
    #[must_use]
    pub fn resets_on_reply(&self) -> bool {
        self.reset_on_user_response && self.mode == TimingMode::DelayFromLastMessage
    }

    fn transition(&mut self, to: TimerState) -> Result<(), TimerStateError> {
        if !self.state.allows(to) {
            return Err(TimerStateError {
                handle: self.handle,
                from: self.state,
                to,
            });
        }
        self.state = to;
        Ok(())
    }

    /// Recomputes the due time from `now`.
    ///
    /// # Errors
    ///
    /// Fails unless the timer is armed, or if the new due time overflows.
    pub fn reset(&mut self, now: DateTime<Utc>) -> Result<DateTime<Utc>, SchedulerError> {
        let due_at = after(now, self.seconds)?;
        self.transition(TimerState::Armed)?;
        self.due_at = due_at;
        self.reset_count += 1;
        Ok(due_at)
    }

    /// Marks the timer cancelled.
    ///
    /// # Errors
    ///
    /// Fails if the timer is already terminal.
    pub fn cancel(&mut self) -> Result<(), TimerStateError> {
        self.transition(TimerState::Cancelled)
    }

    /// Marks the timer fired.
    ///
    /// # Errors
    ///
    /// Fails if the timer is already terminal.
    pub fn fire(&mut self) -> Result<(), TimerStateError> {
        self.transition(TimerState::Fired)
    }
}

/// Instruction handed to the host when a timer fires.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resumption {
    pub handle: TimerId,
    pub conversation_id: ConversationId,
    /// The delay node that fired.
    pub node_id: String,
    pub action: ScheduledAction,
    pub blocking: bool,
    pub due_at: DateTime<Utc>,
    pub fired_at: DateTime<Utc>,
}

impl Resumption {
    pub(crate) fn from_timer(timer: Timer, fired_at: DateTime<Utc>) -> Self {
        Self {
            handle: timer.handle,
            conversation_id: timer.conversation_id,
            node_id: timer.node_id,
            action: timer.action,
            blocking: timer.blocking,
            due_at: timer.due_at,
            fired_at,
        }
    }
}
