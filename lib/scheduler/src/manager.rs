//! The delay scheduler.
//!
//! Owns every live timer, keyed by (conversation, node). All transitions
//! happen inside one lock, so a reset or cancel racing a fire is ordered:
//! whichever runs second sees an unknown handle and does nothing.

use crate::error::SchedulerError;
use crate::schedule::due_at;
use crate::timer::{Resumption, Timer, TimerState};
use chatflow_context::{ExecutionContext, has_placeholders, interpolate};
use chatflow_core::{ConversationId, TimerId};
use chatflow_flow::{FlowNode, NodeKind, ScheduledAction};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, instrument, warn};

/// Result of arming a delay node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DelayOutcome {
    /// The host must suspend the conversation until `resume_at`, then call
    /// [`DelayScheduler::on_timer_fire`].
    Blocking {
        handle: TimerId,
        resume_at: DateTime<Utc>,
    },
    /// The conversation goes on; the timer fires in the background.
    Armed {
        handle: TimerId,
        due_at: DateTime<Utc>,
    },
}

impl DelayOutcome {
    #[must_use]
    pub fn handle(&self) -> TimerId {
        match self {
            Self::Blocking { handle, .. } | Self::Armed { handle, .. } => *handle,
        }
    }

    #[must_use]
    pub fn due_at(&self) -> DateTime<Utc> {
        match self {
            Self::Blocking { resume_at, .. } => *resume_at,
            Self::Armed { due_at, .. } => *due_at,
        }
    }
}

/// What a user message did to a timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TimerEventKind {
    Reset {
        previous_due_at: DateTime<Utc>,
        due_at: DateTime<Utc>,
    },
    Cancelled,
}

/// A transition applied to a live timer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerEvent {
    pub handle: TimerId,
    pub conversation_id: ConversationId,
    pub node_id: String,
    pub kind: TimerEventKind,
}

impl TimerEvent {
    fn new(timer: &Timer, kind: TimerEventKind) -> Self {
        Self {
            handle: timer.handle,
            conversation_id: timer.conversation_id,
            node_id: timer.node_id.clone(),
            kind,
        }
    }
}

/// Why a fire request did nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum IgnoreReason {
    /// The handle was fired, cancelled or replaced already.
    UnknownHandle,
    /// The timer is live but not due yet.
    NotDue { due_at: DateTime<Utc> },
}

/// Result of a fire request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FireOutcome {
    Fired(Resumption),
    Ignored(IgnoreReason),
}

#[derive(Debug, Default)]
struct TimerTable {
    by_conversation: HashMap<ConversationId, BTreeMap<String, Timer>>,
    by_handle: HashMap<TimerId, (ConversationId, String)>,
}

impl TimerTable {
    /// Inserts a timer, returning the one it replaced.
    fn insert(&mut self, timer: Timer) -> Option<Timer> {
        self.by_handle
            .insert(timer.handle, (timer.conversation_id, timer.node_id.clone()));
        let replaced = self
            .by_conversation
            .entry(timer.conversation_id)
            .or_default()
            .insert(timer.node_id.clone(), timer);
        if let Some(old) = &replaced {
            self.by_handle.remove(&old.handle);
        }
        replaced
    }

    fn get(&self, handle: TimerId) -> Option<&Timer> {
        let (conversation_id, node_id) = self.by_handle.get(&handle)?;
        self.by_conversation.get(conversation_id)?.get(node_id)
    }

    fn remove(&mut self, handle: TimerId) -> Option<Timer> {
        let (conversation_id, node_id) = self.by_handle.remove(&handle)?;
        let timers = self.by_conversation.get_mut(&conversation_id)?;
        let timer = timers.remove(&node_id);
        if timers.is_empty() {
            self.by_conversation.remove(&conversation_id);
        }
        timer
    }

    fn timers(&self) -> impl Iterator<Item = &Timer> {
        self.by_conversation.values().flat_map(BTreeMap::values)
    }
}

/// Owner of all delay timers.
#[derive(Debug, Default)]
pub struct DelayScheduler {
    table: Mutex<TimerTable>,
}

impl DelayScheduler {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every critical section leaves the table consistent, so a poisoned
    /// lock is still safe to use.
    fn lock(&self) -> MutexGuard<'_, TimerTable> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Arms a timer for a delay node.
    ///
    /// An existing timer for the same (conversation, node) is replaced and
    /// its handle becomes a no-op.
    ///
    /// # Errors
    ///
    /// Fails if `node` is not a delay node or its due time cannot be
    /// computed.
    #[instrument(skip_all, fields(conversation_id = %conversation_id, node_id = %node.id))]
    pub fn arm_delay(
        &self,
        conversation_id: ConversationId,
        node: &FlowNode,
        ctx: &ExecutionContext,
    ) -> chatflow_core::Result<DelayOutcome, SchedulerError> {
        let NodeKind::Delay(config) = &node.kind else {
            return Err(SchedulerError::NotADelayNode {
                node_id: node.id.clone(),
                node_type: node.kind.node_type().to_owned(),
            }
            .into());
        };

        let due_at = due_at(config, ctx)?;
        let action = match &config.scheduled_action {
            ScheduledAction::Message { content } if has_placeholders(content) => {
                ScheduledAction::Message {
                    content: interpolate(content, ctx),
                }
            }
            other => other.clone(),
        };
        let timer = Timer::new(conversation_id, node.id.clone(), config, action, ctx.now, due_at);
        let handle = timer.handle;
        let outcome = if timer.blocking {
            DelayOutcome::Blocking {
                handle,
                resume_at: due_at,
            }
        } else {
            DelayOutcome::Armed { handle, due_at }
        };

        if let Some(replaced) = self.lock().insert(timer) {
            debug!(replaced = %replaced.handle, "replaced existing timer");
        }
        info!(%handle, %due_at, blocking = config.blocking, "delay armed");
        Ok(outcome)
    }

    /// Applies a user message to the conversation's armed timers.
    ///
    /// Cancel wins over reset when a timer has both flags. Pending
    /// (blocking) timers are unaffected.
    #[instrument(skip_all, fields(conversation_id = %conversation_id))]
    pub fn on_user_message(
        &self,
        conversation_id: ConversationId,
        now: DateTime<Utc>,
    ) -> Vec<TimerEvent> {
        let mut table = self.lock();
        let Some(timers) = table.by_conversation.get_mut(&conversation_id) else {
            return Vec::new();
        };

        let mut events = Vec::new();
        for timer in timers
            .values_mut()
            .filter(|timer| timer.state == TimerState::Armed)
        {
            if timer.cancel_on_user_response {
                match timer.cancel() {
                    Ok(()) => events.push(TimerEvent::new(timer, TimerEventKind::Cancelled)),
                    Err(error) => warn!(%error, "cancel rejected"),
                }
            } else if timer.resets_on_reply() {
                let previous_due_at = timer.due_at;
                match timer.reset(now) {
                    Ok(due_at) => events.push(TimerEvent::new(
                        timer,
                        TimerEventKind::Reset {
                            previous_due_at,
                            due_at,
                        },
                    )),
                    Err(error) => warn!(%error, "reset rejected"),
                }
            }
        }

        for event in &events {
            match event.kind {
                TimerEventKind::Cancelled => {
                    table.remove(event.handle);
                    info!(
                        handle = %event.handle,
                        node_id = %event.node_id,
                        "delay cancelled by user message"
                    );
                }
                TimerEventKind::Reset { due_at, .. } => {
                    info!(
                        handle = %event.handle,
                        node_id = %event.node_id,
                        %due_at,
                        "delay reset by user message"
                    );
                }
            }
        }
        events
    }

    /// Fires a timer if it is live and due.
    ///
    /// The timer is removed in the same critical section, so a second
    /// fire (or a racing cancel) observes an unknown handle.
    #[instrument(skip_all, fields(handle = %handle))]
    pub fn on_timer_fire(&self, handle: TimerId, now: DateTime<Utc>) -> FireOutcome {
        let mut table = self.lock();
        let Some(timer) = table.get(handle) else {
            debug!("fire ignored: unknown handle");
            return FireOutcome::Ignored(IgnoreReason::UnknownHandle);
        };
        if !timer.is_due(now) {
            let due_at = timer.due_at;
            debug!(%due_at, "fire ignored: not due");
            return FireOutcome::Ignored(IgnoreReason::NotDue { due_at });
        }

        let Some(mut timer) = table.remove(handle) else {
            return FireOutcome::Ignored(IgnoreReason::UnknownHandle);
        };
        if let Err(error) = timer.fire() {
            warn!(%error, "fire rejected");
            return FireOutcome::Ignored(IgnoreReason::UnknownHandle);
        }
        info!(node_id = %timer.node_id, conversation_id = %timer.conversation_id, "delay fired");
        FireOutcome::Fired(Resumption::from_timer(timer, now))
    }

    /// Cancels a live timer.
    ///
    /// # Errors
    ///
    /// Returns `TimerNotFound` if the handle is not live.
    pub fn cancel(&self, handle: TimerId) -> chatflow_core::Result<TimerEvent, SchedulerError> {
        let mut table = self.lock();
        let mut timer = table
            .remove(handle)
            .ok_or(SchedulerError::TimerNotFound { handle })?;
        timer.cancel().map_err(SchedulerError::from)?;
        info!(%handle, node_id = %timer.node_id, "delay cancelled");
        Ok(TimerEvent::new(&timer, TimerEventKind::Cancelled))
    }

    /// Cancels every live timer of a conversation.
    pub fn cancel_conversation(&self, conversation_id: ConversationId) -> Vec<TimerEvent> {
        let mut table = self.lock();
        let Some(timers) = table.by_conversation.remove(&conversation_id) else {
            return Vec::new();
        };
        let mut events = Vec::with_capacity(timers.len());
        for mut timer in timers.into_values() {
            table.by_handle.remove(&timer.handle);
            match timer.cancel() {
                Ok(()) => events.push(TimerEvent::new(&timer, TimerEventKind::Cancelled)),
                Err(error) => warn!(%error, "cancel rejected"),
            }
        }
        info!(%conversation_id, cancelled = events.len(), "conversation timers cancelled");
        events
    }

    /// Handles of armed timers due at `now`, earliest first.
    ///
    /// Blocking timers are not included; their host owns the wake-up.
    #[must_use]
    pub fn due_timers(&self, now: DateTime<Utc>) -> Vec<TimerId> {
        let table = self.lock();
        let mut due: Vec<_> = table
            .timers()
            .filter(|timer| timer.state == TimerState::Armed && timer.is_due(now))
            .map(|timer| (timer.due_at, timer.handle))
            .collect();
        due.sort();
        due.into_iter().map(|(_, handle)| handle).collect()
    }

    /// The earliest due time of any live timer.
    #[must_use]
    pub fn next_due_at(&self) -> Option<DateTime<Utc>> {
        self.lock().timers().map(|timer| timer.due_at).min()
    }

    /// A snapshot of a live timer.
    #[must_use]
    pub fn timer(&self, handle: TimerId) -> Option<Timer> {
        self.lock().get(handle).cloned()
    }

    /// Number of live timers.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.lock().by_handle.len()
    }
}
