//! Conversation sessions driven by the flow engine and the delay scheduler.
//!
//! The host is synchronous: it turns one inbound event (a user message or
//! a fired timer) into a list of [`Outbound`] decisions. Waiting happens
//! outside, in the timer driver and the blocking-delay sleepers.
//!
//! A non-blocking delay arms its timer and the flow carries on past the
//! delay node in the same run. A blocking delay suspends the conversation
//! until its timer fires.

use crate::error::RunnerError;
use crate::event::{InboundMessage, Outbound};
use chatflow_context::{DetectedIntent, ExecutionContext, FunctionCall, interpolate};
use chatflow_core::{ConversationId, TimerId};
use chatflow_flow::{Flow, FlowEngine, NodeKind, RoutingError, ScheduledAction, Step};
use chatflow_scheduler::{DelayOutcome, DelayScheduler, Resumption, TimerEvent, TimerEventKind};
use chrono::{DateTime, Utc};
use serde_json::{Map, Value as JsonValue, json};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Upper bound on node transitions per inbound event.
const MAX_STEPS: usize = 64;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
enum Position {
    /// Not started; the next message starts the flow.
    #[default]
    Idle,
    /// Waiting for a reply at a node with `wait_user_reply` edges.
    Awaiting(String),
    /// At a blocking delay node; replies are recorded only.
    Suspended { node_id: String, handle: TimerId },
}

#[derive(Debug, Default)]
struct Session {
    position: Position,
    /// Non-blocking timers this conversation still expects to fire.
    armed: HashSet<TimerId>,
    contact: Map<String, JsonValue>,
    variables: Map<String, JsonValue>,
    last_message: String,
    visited: HashSet<String>,
    function_calls: Vec<FunctionCall>,
    intent: Option<DetectedIntent>,
}

impl Session {
    fn absorb(&mut self, message: InboundMessage, now: DateTime<Utc>) {
        if let Some(JsonValue::Object(contact)) = message.contact {
            self.contact.extend(contact);
        }
        if let Some(JsonValue::Object(variables)) = message.variables {
            self.variables.extend(variables);
        }
        self.last_message = message.text;
        self.intent = message.intent;
        self.function_calls.extend(
            message
                .function_calls
                .into_iter()
                .map(|name| FunctionCall { name, called_at: now }),
        );
    }

    fn context(&self, conversation_id: ConversationId, now: DateTime<Utc>) -> ExecutionContext {
        let mut ctx = ExecutionContext::new(now)
            .with_message(self.last_message.clone())
            .with_conversation_meta(json!({ "id": conversation_id.to_string() }));
        ctx.contact = self.contact.clone();
        ctx.context_variables = self.variables.clone();
        ctx.visited_nodes = self.visited.clone();
        ctx.function_calls = self.function_calls.clone();
        ctx.detected_intent = self.intent.clone();
        ctx
    }

    /// Returns true if `resumption` belongs to a timer this session still
    /// waits on. A non-blocking handle is consumed by the check.
    fn accepts(&mut self, resumption: &Resumption) -> bool {
        if resumption.blocking {
            matches!(
                &self.position,
                Position::Suspended { handle, .. } if *handle == resumption.handle
            )
        } else {
            self.armed.remove(&resumption.handle)
        }
    }
}

/// How a run begins.
enum Entry {
    /// Arrive at a node: record the visit, send its message, then step.
    Enter(String),
    /// Route a user reply out of a waiting node.
    Reply(String),
    /// Route out of a delay node without waiting for a reply.
    Continue(String),
}

/// Drives one flow for many conversations.
pub struct Host {
    engine: FlowEngine,
    scheduler: Arc<DelayScheduler>,
    start_node: String,
    sessions: HashMap<ConversationId, Session>,
}

impl Host {
    /// Creates a host for `flow`.
    ///
    /// # Errors
    ///
    /// Returns `NoStartNode` if the flow has no entry node.
    pub fn new(flow: Flow, scheduler: Arc<DelayScheduler>) -> Result<Self, RunnerError> {
        let start_node = flow.start_node().ok_or(RunnerError::NoStartNode)?.id.clone();
        Ok(Self {
            engine: FlowEngine::new(flow),
            scheduler,
            start_node,
            sessions: HashMap::new(),
        })
    }

    #[must_use]
    pub fn scheduler(&self) -> &Arc<DelayScheduler> {
        &self.scheduler
    }

    /// The node a conversation is waiting at, if any.
    #[must_use]
    pub fn current_node(&self, conversation_id: ConversationId) -> Option<&str> {
        match &self.sessions.get(&conversation_id)?.position {
            Position::Idle => None,
            Position::Awaiting(node_id) | Position::Suspended { node_id, .. } => Some(node_id),
        }
    }

    /// Number of conversations in progress.
    #[must_use]
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Handles a user message.
    #[instrument(skip_all, fields(conversation_id = %message.conversation_id))]
    pub fn on_message(&mut self, message: InboundMessage, now: DateTime<Utc>) -> Vec<Outbound> {
        let conversation_id = message.conversation_id;
        let events = self.scheduler.on_user_message(conversation_id, now);
        let session = self.sessions.entry(conversation_id).or_default();
        session.absorb(message, now);

        let mut run = Run::new(&self.engine, &self.scheduler, conversation_id, now);
        run.out.extend(events.into_iter().map(timer_event));

        match session.position.clone() {
            Position::Idle => {
                session.visited.clear();
                run.drive(session, Entry::Enter(self.start_node.clone()));
            }
            Position::Awaiting(node_id) => run.drive(session, Entry::Reply(node_id)),
            Position::Suspended { node_id, .. } => {
                debug!(%node_id, "message recorded while suspended");
            }
        }
        let Run { out, stopped, .. } = run;
        self.evict_if(stopped, conversation_id);
        out
    }

    /// Handles a fired timer.
    ///
    /// Resumptions for timers the conversation no longer waits on are
    /// ignored. A `continue_flow` from a non-blocking delay only moves the
    /// conversation if it still sits at the delay node.
    #[instrument(
        skip_all,
        fields(conversation_id = %resumption.conversation_id, node_id = %resumption.node_id)
    )]
    pub fn on_resumption(&mut self, resumption: Resumption, now: DateTime<Utc>) -> Vec<Outbound> {
        let conversation_id = resumption.conversation_id;
        let Some(session) = self.sessions.get_mut(&conversation_id) else {
            warn!("resumption for unknown conversation");
            return Vec::new();
        };
        if !session.accepts(&resumption) {
            debug!("stale resumption ignored");
            return Vec::new();
        }

        let mut run = Run::new(&self.engine, &self.scheduler, conversation_id, now);
        let node_id = resumption.node_id;
        match resumption.action {
            ScheduledAction::Message { content } => {
                run.out.push(Outbound::Message {
                    conversation_id,
                    node_id: node_id.clone(),
                    text: content,
                });
                if resumption.blocking {
                    run.drive(session, Entry::Continue(node_id));
                }
            }
            ScheduledAction::RestartFlow { restart_from_node } => {
                info!(%restart_from_node, "restarting flow");
                run.release(session, resumption.handle);
                run.drive(session, Entry::Enter(restart_from_node));
            }
            ScheduledAction::ContinueFlow => {
                let at_delay =
                    matches!(&session.position, Position::Awaiting(at) if *at == node_id);
                if resumption.blocking || at_delay {
                    run.drive(session, Entry::Continue(node_id));
                } else {
                    debug!(position = ?session.position, "conversation moved past the delay");
                }
            }
        }
        let Run { out, stopped, .. } = run;
        self.evict_if(stopped, conversation_id);
        out
    }

    /// Drops the session of a conversation that has stopped.
    fn evict_if(&mut self, stopped: bool, conversation_id: ConversationId) {
        if stopped && self.sessions.remove(&conversation_id).is_some() {
            debug!(sessions = self.sessions.len(), "session evicted");
        }
    }
}

fn timer_event(event: TimerEvent) -> Outbound {
    match event.kind {
        TimerEventKind::Reset { due_at, .. } => Outbound::TimerReset {
            conversation_id: event.conversation_id,
            node_id: event.node_id,
            handle: event.handle,
            due_at,
        },
        TimerEventKind::Cancelled => Outbound::TimerCancelled {
            conversation_id: event.conversation_id,
            node_id: event.node_id,
            handle: event.handle,
        },
    }
}

/// One inbound event's walk through the flow.
struct Run<'a> {
    engine: &'a FlowEngine,
    scheduler: &'a DelayScheduler,
    conversation_id: ConversationId,
    now: DateTime<Utc>,
    out: Vec<Outbound>,
    stopped: bool,
}

impl<'a> Run<'a> {
    fn new(
        engine: &'a FlowEngine,
        scheduler: &'a DelayScheduler,
        conversation_id: ConversationId,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            engine,
            scheduler,
            conversation_id,
            now,
            out: Vec::new(),
            stopped: false,
        }
    }

    fn drive(&mut self, session: &mut Session, entry: Entry) {
        let mut entry = entry;
        for _ in 0..MAX_STEPS {
            let (node_id, step) = match entry {
                Entry::Enter(node_id) => {
                    self.arrive(session, &node_id);
                    let ctx = session.context(self.conversation_id, self.now);
                    let step = self.engine.step(&node_id, &ctx, false);
                    (node_id, step)
                }
                Entry::Reply(node_id) => {
                    let ctx = session.context(self.conversation_id, self.now);
                    let step = self.engine.route(&node_id, &ctx, true);
                    (node_id, step)
                }
                Entry::Continue(node_id) => {
                    let ctx = session.context(self.conversation_id, self.now);
                    let step = self.engine.successor(&node_id, &ctx);
                    (node_id, step)
                }
            };

            match step {
                Ok(Step::Next { node_id: to, message }) => {
                    if let Some(text) = message {
                        self.out.push(Outbound::Message {
                            conversation_id: self.conversation_id,
                            node_id: node_id.clone(),
                            text,
                        });
                    }
                    self.out.push(Outbound::Moved {
                        conversation_id: self.conversation_id,
                        from: node_id,
                        to: to.clone(),
                    });
                    entry = Entry::Enter(to);
                }
                Ok(Step::AwaitReply { node_id }) => {
                    self.out.push(Outbound::Waiting {
                        conversation_id: self.conversation_id,
                        node_id: node_id.clone(),
                    });
                    session.position = Position::Awaiting(node_id);
                    return;
                }
                Ok(Step::Delay { node_id, .. }) => match self.arm(session, node_id) {
                    Some(next) => entry = next,
                    None => return,
                },
                Ok(Step::End { node_id }) => {
                    self.out.push(Outbound::Ended {
                        conversation_id: self.conversation_id,
                        node_id,
                    });
                    self.stop(session);
                    return;
                }
                Err(error) => {
                    self.misconfigured(session, &error);
                    return;
                }
            }
        }

        warn!(max_steps = MAX_STEPS, "step limit exceeded");
        self.out.push(Outbound::Misconfigured {
            conversation_id: self.conversation_id,
            node_id: None,
            reason: format!("more than {MAX_STEPS} transitions without waiting"),
        });
        self.stop(session);
    }

    fn arrive(&mut self, session: &mut Session, node_id: &str) {
        session.visited.insert(node_id.to_owned());
        let engine = self.engine;
        let Some(node) = engine.flow().node(node_id) else {
            return;
        };
        if let NodeKind::Message(config) = &node.kind {
            let ctx = session.context(self.conversation_id, self.now);
            self.out.push(Outbound::Message {
                conversation_id: self.conversation_id,
                node_id: node_id.to_owned(),
                text: interpolate(&config.content, &ctx),
            });
        }
    }

    /// Arms the delay at `node_id`. Returns where the run carries on, or
    /// `None` if it stops here.
    fn arm(&mut self, session: &mut Session, node_id: String) -> Option<Entry> {
        let engine = self.engine;
        let Some(node) = engine.flow().node(&node_id) else {
            self.misconfigured(session, &RoutingError::NodeNotFound { node_id });
            return None;
        };
        let ctx = session.context(self.conversation_id, self.now);
        match self.scheduler.arm_delay(self.conversation_id, node, &ctx) {
            Ok(DelayOutcome::Blocking { handle, resume_at }) => {
                self.out.push(Outbound::Suspended {
                    conversation_id: self.conversation_id,
                    node_id: node_id.clone(),
                    handle,
                    resume_at,
                });
                session.position = Position::Suspended { node_id, handle };
                None
            }
            Ok(DelayOutcome::Armed { handle, due_at }) => {
                self.out.push(Outbound::Armed {
                    conversation_id: self.conversation_id,
                    node_id: node_id.clone(),
                    handle,
                    due_at,
                });
                let scheduler = self.scheduler;
                session.armed.retain(|armed| scheduler.timer(*armed).is_some());
                session.armed.insert(handle);
                Some(Entry::Continue(node_id))
            }
            Err(report) => {
                warn!(%node_id, error = %report, "delay could not be armed");
                self.out.push(Outbound::Misconfigured {
                    conversation_id: self.conversation_id,
                    node_id: Some(node_id),
                    reason: report.to_string(),
                });
                self.stop(session);
                None
            }
        }
    }

    /// Cancels the blocking delay the conversation is suspended on, unless
    /// it is `fired` itself.
    fn release(&mut self, session: &mut Session, fired: TimerId) {
        let Position::Suspended { handle, .. } = session.position else {
            return;
        };
        if handle == fired {
            return;
        }
        match self.scheduler.cancel(handle) {
            Ok(event) => self.out.push(timer_event(event)),
            Err(report) => debug!(%handle, error = %report, "suspended delay already gone"),
        }
        session.position = Position::Idle;
    }

    fn misconfigured(&mut self, session: &mut Session, error: &RoutingError) {
        warn!(node_id = %error.node_id(), %error, "flow misconfigured");
        self.out.push(Outbound::Misconfigured {
            conversation_id: self.conversation_id,
            node_id: Some(error.node_id().to_owned()),
            reason: error.to_string(),
        });
        self.stop(session);
    }

    /// Ends the conversation and drops its timers.
    fn stop(&mut self, session: &mut Session) {
        session.position = Position::Idle;
        session.armed.clear();
        self.stopped = true;
        let events = self.scheduler.cancel_conversation(self.conversation_id);
        self.out.extend(events.into_iter().map(timer_event));
    }
}
