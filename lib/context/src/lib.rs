//! Execution context for the chatflow core.
//!
//! This crate provides:
//!
//! - **Execution Context**: the read-only snapshot a decision is evaluated against
//! - **Path Resolution**: dot-notation lookup into contact, variable and metadata maps
//! - **Value Coercion**: text, number and blankness views over JSON values
//! - **Templates**: `{{context.var}}` placeholder interpolation

pub mod context;
pub mod path;
pub mod template;
pub mod value;

pub use context::{DetectedIntent, ExecutionContext, FunctionCall};
pub use path::resolve_path;
pub use template::{has_placeholders, interpolate};
