//! Asynchronous task protocol.
//!
//! A task is created pending, resolved in the background by a
//! [`TaskResolver`], and polled by clients until it reaches a terminal state.

pub mod agent;
pub mod model;
pub mod repository;
pub mod service;

pub use agent::{connect_task_agent, TaskAction, TASK_AGENT};
pub use model::{Artifact, Context, Message, MessageRole, Task, TaskInput, TaskOutput, TaskState};
pub use repository::{MemoryTaskRepository, TaskPage, TaskQuery, TaskRepository, DEFAULT_PAGE_SIZE};
pub use service::{Resolution, ResolveError, RetentionPolicy, TaskResolver, TaskService};
