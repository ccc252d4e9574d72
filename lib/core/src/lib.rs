//! Core types shared by every chatflow crate.
//!
//! This crate provides the strongly-typed identifiers and the `Result`
//! alias used throughout the flow execution core.

pub mod error;
pub mod id;

pub use error::Result;
pub use id::{ConversationId, FlowId, ParseIdError, TimerId};
