//! Runner start-up and I/O errors.

use chatflow_flow::DefinitionError;
use std::fmt;
use std::path::PathBuf;

/// Errors that stop the runner.
#[derive(Debug)]
pub enum RunnerError {
    /// Configuration could not be loaded.
    Config { details: String },
    /// The flow file could not be read.
    FlowFile { path: PathBuf, details: String },
    /// The flow definition is invalid.
    InvalidFlow(DefinitionError),
    /// The flow has no node to start conversations at.
    NoStartNode,
    /// Reading stdin or writing stdout failed.
    Io { details: String },
}

impl fmt::Display for RunnerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config { details } => write!(f, "failed to load configuration: {details}"),
            Self::FlowFile { path, details } => {
                write!(f, "failed to read flow file '{}': {details}", path.display())
            }
            Self::InvalidFlow(inner) => write!(f, "invalid flow: {inner}"),
            Self::NoStartNode => write!(f, "flow has no start node"),
            Self::Io { details } => write!(f, "i/o error: {details}"),
        }
    }
}

impl std::error::Error for RunnerError {}

impl From<DefinitionError> for RunnerError {
    fn from(err: DefinitionError) -> Self {
        Self::InvalidFlow(err)
    }
}

impl From<std::io::Error> for RunnerError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            details: err.to_string(),
        }
    }
}
