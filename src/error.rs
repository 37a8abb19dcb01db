//! Error types for the coordination core.

use thiserror::Error;

use crate::task::TaskState;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Connect/publish/subscribe failure. Fatal for the hosting agent.
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("No handler registered for '{0}'")]
    DispatchMiss(String),

    #[error("Task not found: {0}")]
    TaskNotFound(String),

    #[error("Cannot {action} task in state: {state}")]
    InvalidStateTransition { action: &'static str, state: TaskState },

    #[error("Task {task_id} did not complete within {waited_ms} ms")]
    Timeout { task_id: String, waited_ms: u128 },

    #[error("Agent unavailable: {0}")]
    AgentUnavailable(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn transport(s: impl Into<String>) -> Self {
        Error::Transport(s.into())
    }

    /// True for failures the hosting process is expected to die on.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Transport(_))
    }
}
