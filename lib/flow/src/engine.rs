//! The flow engine facade.
//!
//! The host calls [`FlowEngine::step`] for the node a conversation is at
//! and acts on the returned [`Step`]. The engine holds no conversation
//! state; everything it needs arrives in the execution context.

use crate::branch::resolve_condition;
use crate::delay::DelayConfig;
use crate::error::RoutingError;
use crate::graph::Flow;
use crate::node::{FlowNode, NodeKind};
use crate::routing::resolve_edge;
use chatflow_context::ExecutionContext;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, instrument};

/// The engine's decision for one node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum Step {
    /// Move to `node_id`, sending `message` first if present.
    Next {
        node_id: String,
        message: Option<String>,
    },
    /// Hand the delay node to the scheduler.
    Delay { node_id: String, config: DelayConfig },
    /// Stay on `node_id` until the next user message.
    AwaitReply { node_id: String },
    /// The conversation reached the end of the flow at `node_id`.
    End { node_id: String },
}

/// Stateless decision engine over a loaded flow.
#[derive(Debug, Clone)]
pub struct FlowEngine {
    flow: Arc<Flow>,
}

impl FlowEngine {
    #[must_use]
    pub fn new(flow: Flow) -> Self {
        Self {
            flow: Arc::new(flow),
        }
    }

    #[must_use]
    pub fn flow(&self) -> &Flow {
        &self.flow
    }

    /// Decides what happens at `node_id`.
    ///
    /// # Errors
    ///
    /// Returns a [`RoutingError`] when the node is unknown or no transition
    /// can be chosen. Both mean the flow is misconfigured.
    #[instrument(skip(self, ctx), fields(flow_id = %self.flow.id()))]
    pub fn step(
        &self,
        node_id: &str,
        ctx: &ExecutionContext,
        awaiting_reply: bool,
    ) -> Result<Step, RoutingError> {
        let node = self.node(node_id)?;
        let step = match &node.kind {
            NodeKind::End => Step::End {
                node_id: node.id.clone(),
            },
            NodeKind::Condition(config) => {
                let decision = resolve_condition(&node.id, config, ctx)?;
                Step::Next {
                    node_id: decision.next_node,
                    message: decision.message,
                }
            }
            NodeKind::Delay(config) => Step::Delay {
                node_id: node.id.clone(),
                config: config.clone(),
            },
            NodeKind::Start | NodeKind::Message(_) | NodeKind::Other { .. } => {
                self.resolve(node, ctx, awaiting_reply)?
            }
        };
        debug!(?step, "step decided");
        Ok(step)
    }

    /// Resolves where a fired `continue_flow` delay goes next.
    ///
    /// # Errors
    ///
    /// Same as [`FlowEngine::step`].
    pub fn successor(&self, node_id: &str, ctx: &ExecutionContext) -> Result<Step, RoutingError> {
        self.route(node_id, ctx, false)
    }

    /// Runs edge resolution for `node_id` regardless of its node type.
    ///
    /// Hosts use this for a user reply that arrives while a conversation
    /// waits on a delay node.
    ///
    /// # Errors
    ///
    /// Same as [`FlowEngine::step`].
    pub fn route(
        &self,
        node_id: &str,
        ctx: &ExecutionContext,
        awaiting_reply: bool,
    ) -> Result<Step, RoutingError> {
        let node = self.node(node_id)?;
        self.resolve(node, ctx, awaiting_reply)
    }

    fn node(&self, node_id: &str) -> Result<&FlowNode, RoutingError> {
        self.flow.node(node_id).ok_or_else(|| RoutingError::NodeNotFound {
            node_id: node_id.to_owned(),
        })
    }

    fn resolve(
        &self,
        node: &FlowNode,
        ctx: &ExecutionContext,
        awaiting_reply: bool,
    ) -> Result<Step, RoutingError> {
        let edges = self.flow.outgoing(&node.id);
        if edges.is_empty() {
            return Ok(Step::End {
                node_id: node.id.clone(),
            });
        }

        if let Some(edge) = resolve_edge(edges.iter().copied(), ctx, awaiting_reply) {
            debug!(edge_id = %edge.id, target = %edge.target, "edge selected");
            return Ok(Step::Next {
                node_id: edge.target.clone(),
                message: None,
            });
        }

        if !awaiting_reply && edges.iter().any(|edge| edge.waits_for_reply()) {
            return Ok(Step::AwaitReply {
                node_id: node.id.clone(),
            });
        }

        Err(RoutingError::NoViableTransition {
            node_id: node.id.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    /// greet -> (keyword "yes", p5) check | (always, p1) fallback
    /// ask   -> (wait_user_reply) answer
    fn engine() -> FlowEngine {
        let flow = Flow::from_json(
            &json!({
                "name": "support",
                "nodes": [
                    { "node_id": "start", "node_type": "start" },
                    { "node_id": "greet", "node_type": "message", "config": { "content": "Hi" } },
                    { "node_id": "check", "node_type": "condition", "config": {
                        "conditions": { "operator": "AND", "rules": [{
                            "id": "r", "type": "contact", "variable_path": "blocked",
                            "operator": "equals", "value": false
                        }]},
                        "branches": [
                            { "name": "ok", "conditions_met": true, "next_node": "ask",
                              "message": "Great, {{contact.name}}" },
                            { "name": "blocked", "conditions_met": false, "next_node": "bye" }
                        ],
                        "default_branch": "blocked"
                    }},
                    { "node_id": "fallback", "node_type": "message", "config": { "content": "?" } },
                    { "node_id": "ask", "node_type": "message", "config": { "content": "Name?" } },
                    { "node_id": "answer", "node_type": "ai_response", "config": {} },
                    { "node_id": "wait", "node_type": "delay", "config": { "seconds": 60 } },
                    { "node_id": "stuck", "node_type": "message", "config": { "content": "x" } },
                    { "node_id": "bye", "node_type": "end" }
                ],
                "edges": [
                    { "id": "e0", "source": "start", "target": "greet", "condition_type": "always" },
                    { "id": "e1", "source": "greet", "target": "fallback",
                      "condition_type": "always", "priority": 1 },
                    { "id": "e2", "source": "greet", "target": "check",
                      "condition_type": "keyword",
                      "condition_config": { "keywords": ["yes"] }, "priority": 5 },
                    { "id": "e3", "source": "ask", "target": "answer",
                      "condition_type": "wait_user_reply" },
                    { "id": "e4", "source": "wait", "target": "bye", "condition_type": "always" },
                    { "id": "e5", "source": "stuck", "target": "bye",
                      "condition_type": "keyword", "condition_config": { "keywords": ["go"] } }
                ]
            })
            .to_string(),
        )
        .expect("valid flow");
        FlowEngine::new(flow)
    }

    fn ctx(message: &str, blocked: bool) -> ExecutionContext {
        ExecutionContext::new(Utc::now())
            .with_message(message)
            .with_contact(json!({ "name": "Dana", "blocked": blocked }))
    }

    #[test]
    fn keyword_edge_beats_lower_priority_always() {
        let step = engine().step("greet", &ctx("yes please", false), false).expect("step");
        assert_eq!(
            step,
            Step::Next {
                node_id: "check".into(),
                message: None
            }
        );
        let step = engine().step("greet", &ctx("nope", false), false).expect("step");
        assert_eq!(
            step,
            Step::Next {
                node_id: "fallback".into(),
                message: None
            }
        );
    }

    #[test]
    fn condition_node_follows_branch() {
        let step = engine().step("check", &ctx("", false), false).expect("step");
        assert_eq!(
            step,
            Step::Next {
                node_id: "ask".into(),
                message: Some("Great, Dana".into())
            }
        );
        let step = engine().step("check", &ctx("", true), false).expect("step");
        assert_eq!(
            step,
            Step::Next {
                node_id: "bye".into(),
                message: None
            }
        );
    }

    #[test]
    fn wait_edges_pause_then_resume() {
        let engine = engine();
        let step = engine.step("ask", &ctx("", false), false).expect("step");
        assert_eq!(step, Step::AwaitReply { node_id: "ask".into() });

        let step = engine.step("ask", &ctx("Dana", false), true).expect("step");
        assert_eq!(
            step,
            Step::Next {
                node_id: "answer".into(),
                message: None
            }
        );
    }

    #[test]
    fn delay_and_end_nodes() {
        let engine = engine();
        let step = engine.step("wait", &ctx("", false), false).expect("step");
        assert!(matches!(step, Step::Delay { ref node_id, ref config }
            if node_id == "wait" && config.seconds == 60));

        assert_eq!(
            engine.successor("wait", &ctx("", false)).expect("successor"),
            Step::Next {
                node_id: "bye".into(),
                message: None
            }
        );
        assert_eq!(
            engine.step("bye", &ctx("", false), false).expect("step"),
            Step::End { node_id: "bye".into() }
        );
        assert_eq!(
            engine.step("answer", &ctx("", false), false).expect("step"),
            Step::End { node_id: "answer".into() }
        );
    }

    #[test]
    fn misconfiguration_is_reported() {
        let engine = engine();
        assert_eq!(
            engine.step("stuck", &ctx("hello", false), false),
            Err(RoutingError::NoViableTransition { node_id: "stuck".into() })
        );
        assert_eq!(
            engine.step("ghost", &ctx("", false), false),
            Err(RoutingError::NodeNotFound { node_id: "ghost".into() })
        );
    }
}
