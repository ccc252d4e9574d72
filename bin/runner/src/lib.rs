//! Reference host for chatflow.
//!
//! Reads user messages as JSON lines on stdin, drives one flow through the
//! engine and the delay scheduler, and writes decisions as JSON lines on
//! stdout.

pub mod config;
pub mod error;
pub mod event;
pub mod host;

pub use config::RunnerConfig;
pub use error::RunnerError;
pub use event::{InboundMessage, Outbound};
pub use host::Host;
