//! Flow model and decision engine for chatflow.
//!
//! This crate provides the pure half of the flow execution core:
//!
//! - **Conditions**: typed condition rules, operators and AND/OR groups
//! - **Nodes and Edges**: per-type node configs and classified edges, validated at load
//! - **Branch Resolver**: picks the branch of a condition node
//! - **Edge Resolver**: picks the winning outgoing edge by priority
//! - **Flow Graph**: a validated, indexed flow definition
//! - **Engine**: a single `step` entry point for the host runtime
//!
//! Nothing in this crate blocks, allocates timers or mutates shared state.

pub mod branch;
pub mod condition;
pub mod definition;
pub mod delay;
pub mod edge;
pub mod engine;
pub mod error;
pub mod evaluator;
pub mod graph;
pub mod group;
pub mod node;
pub mod operator;
pub mod routing;

pub use branch::{Branch, BranchDecision, resolve_branch};
pub use condition::{ConditionRule, ConditionsConfig, LogicalOperator, Operator, RuleKind};
pub use definition::FlowDefinition;
pub use delay::{DelayConfig, ScheduledAction, TimingMode};
pub use edge::{ConditionType, EdgeCondition, FlowEdge};
pub use engine::{FlowEngine, Step};
pub use error::{DefinitionError, RoutingError};
pub use evaluator::evaluate_rule;
pub use graph::Flow;
pub use group::evaluate_conditions;
pub use node::{ConditionNodeConfig, FlowNode, MessageNodeConfig, NodeKind};
pub use routing::resolve_edge;
