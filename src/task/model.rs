//! Task records and their lifecycle state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

/// Free-form caller context attached to a task.
pub type Context = serde_json::Map<String, Value>;

/// Task execution states.
///
/// ```text
/// pending ──> running ──> completed
///    │           ├──────> failed
///    └───────────┴──────> cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl TaskState {
    pub const ALL: [TaskState; 5] = [
        TaskState::Pending,
        TaskState::Running,
        TaskState::Completed,
        TaskState::Failed,
        TaskState::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskState::Pending => "pending",
            TaskState::Running => "running",
            TaskState::Completed => "completed",
            TaskState::Failed => "failed",
            TaskState::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskState::Completed | TaskState::Failed | TaskState::Cancelled)
    }

    pub fn can_transition_to(&self, next: TaskState) -> bool {
        use TaskState::*;
        matches!(
            (self, next),
            (Pending, Running)
                | (Pending, Cancelled)
                | (Running, Completed)
                | (Running, Failed)
                | (Running, Cancelled)
        )
    }
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TaskState {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        TaskState::ALL
            .iter()
            .copied()
            .find(|state| state.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| Error::Other(format!("Unknown task state: {}", s)))
    }
}

/// Message roles in a task conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    User,
    Agent,
    System,
}

/// Task artifact (input attachment or produced output).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    #[serde(default = "new_id")]
    pub id: String,
    /// "text", "json", "image" or "file"
    #[serde(rename = "type")]
    pub kind: String,
    pub content: Value,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl Artifact {
    pub fn new(kind: impl Into<String>, content: Value) -> Self {
        Self {
            id: new_id(),
            kind: kind.into(),
            content,
            name: None,
            mime_type: None,
            created_at: Utc::now(),
        }
    }

    pub fn text(content: impl Into<String>) -> Self {
        Self::new("text", Value::String(content.into()))
    }

    pub fn json(content: Value) -> Self {
        Self::new("json", content).with_mime_type("application/json")
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }
}

/// One entry of the append-only task conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub role: MessageRole,
    pub content: String,
    #[serde(default)]
    pub artifacts: Vec<Artifact>,
    #[serde(default)]
    pub metadata: Option<Value>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskInput {
    #[serde(default)]
    pub skill_id: Option<String>,
    pub message: String,
    #[serde(default)]
    pub context: Option<Context>,
    #[serde(default)]
    pub artifacts: Vec<Artifact>,
}

impl TaskInput {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            skill_id: None,
            message: message.into(),
            context: None,
            artifacts: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskOutput {
    pub message: String,
    #[serde(default)]
    pub artifacts: Vec<Artifact>,
    #[serde(default)]
    pub metadata: Option<Value>,
}

/// A trackable unit of asynchronous work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub state: TaskState,
    pub input: TaskInput,
    /// Set only when completed.
    #[serde(default)]
    pub output: Option<TaskOutput>,
    #[serde(default)]
    pub messages: Vec<Message>,
    /// Set only when failed.
    #[serde(default)]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub metadata: Option<Value>,
}

impl Task {
    /// Create a pending task.
    pub fn new(input: TaskInput) -> Self {
        let now = Utc::now();
        Self {
            id: new_id(),
            state: TaskState::Pending,
            input,
            output: None,
            messages: Vec::new(),
            error: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
            metadata: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// pending -> running
    pub fn start(&mut self) -> Result<()> {
        self.transition("start", TaskState::Running)
    }

    /// running -> completed
    pub fn complete(&mut self, output: TaskOutput) -> Result<()> {
        self.transition("complete", TaskState::Completed)?;
        self.output = Some(output);
        self.completed_at = Some(self.updated_at);
        Ok(())
    }

    /// running -> failed
    pub fn fail(&mut self, error: impl Into<String>) -> Result<()> {
        self.transition("fail", TaskState::Failed)?;
        self.error = Some(error.into());
        Ok(())
    }

    /// pending|running -> cancelled
    pub fn cancel(&mut self) -> Result<()> {
        self.transition("cancel", TaskState::Cancelled)
    }

    /// Append to the conversation log.
    pub fn add_message(&mut self, role: MessageRole, content: impl Into<String>, artifacts: Vec<Artifact>) -> &Message {
        self.messages.push(Message {
            id: new_id(),
            role,
            content: content.into(),
            artifacts,
            metadata: None,
            created_at: Utc::now(),
        });
        self.updated_at = Utc::now();
        &self.messages[self.messages.len() - 1]
    }

    fn transition(&mut self, action: &'static str, next: TaskState) -> Result<()> {
        if !self.state.can_transition_to(next) {
            return Err(Error::InvalidStateTransition {
                action,
                state: self.state,
            });
        }
        self.state = next;
        self.updated_at = Utc::now();
        Ok(())
    }
}

fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
