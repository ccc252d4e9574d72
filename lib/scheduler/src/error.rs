//! Error types for the scheduler crate.
//!
//! - `SchedulerError`: arming or addressing a timer failed
//! - `TimerStateError`: a timer was asked for an illegal state transition
//! - `DeliveryError`: the host could not accept a resumption

use crate::timer::TimerState;
use chatflow_core::TimerId;
use std::fmt;

/// Errors from scheduler operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulerError {
    /// The node handed to `arm_delay` is not a delay node.
    NotADelayNode { node_id: String, node_type: String },
    /// `execute_at` is missing or could not be parsed.
    InvalidExecuteAt { value: String, reason: String },
    /// The timezone is not a known IANA zone.
    InvalidTimezone { timezone: String },
    /// The delay does not fit in a timestamp.
    DurationOutOfRange { seconds: u64 },
    /// No live timer has this handle.
    TimerNotFound { handle: TimerId },
    /// A timer rejected a transition.
    InvalidTransition(TimerStateError),
}

impl fmt::Display for SchedulerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotADelayNode { node_id, node_type } => {
                write!(f, "node {node_id} is a {node_type} node, not a delay node")
            }
            Self::InvalidExecuteAt { value, reason } => {
                write!(f, "invalid execute_at '{value}': {reason}")
            }
            Self::InvalidTimezone { timezone } => write!(f, "invalid timezone: {timezone}"),
            Self::DurationOutOfRange { seconds } => {
                write!(f, "delay of {seconds}s is out of range")
            }
            Self::TimerNotFound { handle } => write!(f, "timer not found: {handle}"),
            Self::InvalidTransition(inner) => write!(f, "{inner}"),
        }
    }
}

impl std::error::Error for SchedulerError {}

impl From<TimerStateError> for SchedulerError {
    fn from(err: TimerStateError) -> Self {
        Self::InvalidTransition(err)
    }
}

/// An illegal timer state transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimerStateError {
    pub handle: TimerId,
    pub from: TimerState,
    pub to: TimerState,
}

impl fmt::Display for TimerStateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "timer {} cannot transition from {} to {}",
            self.handle, self.from, self.to
        )
    }
}

impl std::error::Error for TimerStateError {}

/// The host could not accept a resumption.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryError {
    pub reason: String,
}

impl DeliveryError {
    #[must_use]
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl fmt::Display for DeliveryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "resumption delivery failed: {}", self.reason)
    }
}

impl std::error::Error for DeliveryError {}
