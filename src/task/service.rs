//! Task lifecycle service: create, resolve in the background, cancel, list.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};
use thiserror::Error;
use tokio::sync::Notify;

use super::model::{Artifact, Context, MessageRole, Task, TaskInput, TaskOutput};
use super::repository::{TaskPage, TaskQuery, TaskRepository};
use crate::error::{Error, Result};

/// What a resolver produced for a task.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Resolution {
    pub response: String,
    pub artifacts: Vec<Artifact>,
    pub metadata: Option<Value>,
}

#[derive(Error, Debug)]
pub enum ResolveError {
    /// The resolving agent cannot be reached; the task falls back to echo.
    #[error("Agent unavailable: {0}")]
    Unavailable(String),

    #[error("{0}")]
    Failed(String),
}

/// Turns a task's input into a result. Owned by the surrounding agents.
#[async_trait]
pub trait TaskResolver: Send + Sync {
    async fn resolve(
        &self,
        message: &str,
        skill_id: Option<&str>,
        context: Option<&Context>,
    ) -> std::result::Result<Resolution, ResolveError>;
}

/// How long finished tasks are kept.
#[derive(Debug, Clone, Copy)]
pub struct RetentionPolicy {
    pub max_age: Duration,
    pub max_tasks: Option<usize>,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            max_age: Duration::from_secs(3600),
            max_tasks: Some(10_000),
        }
    }
}

/// Front door of the task API.
///
/// Resolution runs on a detached tokio task. Cancelling a running task wakes
/// that worker, which stops awaiting the resolver and drops its result.
#[derive(Clone)]
pub struct TaskService {
    repository: Arc<dyn TaskRepository>,
    resolver: Option<Arc<dyn TaskResolver>>,
    cancellations: Arc<Mutex<HashMap<String, Arc<Notify>>>>,
    retention: RetentionPolicy,
}

impl TaskService {
    pub fn new(repository: Arc<dyn TaskRepository>, resolver: Option<Arc<dyn TaskResolver>>) -> Self {
        Self {
            repository,
            resolver,
            cancellations: Arc::new(Mutex::new(HashMap::new())),
            retention: RetentionPolicy::default(),
        }
    }

    pub fn with_retention(mut self, retention: RetentionPolicy) -> Self {
        self.retention = retention;
        self
    }

    /// Store a pending task and schedule its resolution. Returns at once.
    pub async fn create_task(
        &self,
        skill_id: Option<String>,
        message: impl Into<String>,
        context: Option<Context>,
    ) -> Result<Task> {
        let mut input = TaskInput::new(message);
        input.skill_id = skill_id;
        input.context = context;

        let mut task = Task::new(input);
        task.add_message(MessageRole::User, task.input.message.clone(), Vec::new());
        let id = task.id.clone();

        self.repository.insert(task.clone()).await?;
        self.track(&id);
        tracing::info!("Created task {} (skill: {:?})", id, task.input.skill_id);

        let service = self.clone();
        tokio::spawn(async move {
            if let Err(e) = service.process(&id).await {
                tracing::debug!("Task {} not processed: {}", id, e);
            }
        });

        Ok(task)
    }

    /// Run one task: pending -> running -> completed|failed.
    pub async fn process(&self, id: &str) -> Result<Task> {
        let result = self.run(id).await;
        self.untrack(id);
        result
    }

    async fn run(&self, id: &str) -> Result<Task> {
        let task = self.repository.update(id, &mut |task: &mut Task| task.start()).await?;
        tracing::debug!("Task {} running", id);

        let input = task.input;
        let Some(resolver) = self.resolver.clone() else {
            return self.finish_degraded(id, &input.message, "No resolution agent configured").await;
        };

        let message = input.message.clone();
        // Own task so a panicking resolver surfaces as a JoinError.
        let mut job = tokio::spawn(async move {
            resolver
                .resolve(&input.message, input.skill_id.as_deref(), input.context.as_ref())
                .await
        });

        let cancelled = self.cancel_signal(id);
        let resolved = tokio::select! {
            joined = &mut job => joined.unwrap_or_else(|e| {
                Err(ResolveError::Failed(if e.is_panic() {
                    format!("resolver panicked: {}", panic_message(e.into_panic()))
                } else {
                    format!("resolver aborted: {}", e)
                }))
            }),
            _ = cancelled.notified() => {
                job.abort();
                tracing::info!("Task {} cancelled while resolving, result discarded", id);
                return self.repository.get(id).await;
            }
        };

        let outcome = match resolved {
            Ok(resolution) => {
                let output = TaskOutput {
                    message: resolution.response,
                    artifacts: resolution.artifacts,
                    metadata: resolution.metadata,
                };
                self.repository
                    .update(id, &mut |task: &mut Task| {
                        task.complete(output.clone())?;
                        task.add_message(MessageRole::Agent, output.message.clone(), output.artifacts.clone());
                        Ok(())
                    })
                    .await
            }
            Err(ResolveError::Unavailable(reason)) => {
                tracing::warn!("Resolver unavailable for task {}: {}", id, reason);
                self.finish_degraded(id, &message, &reason).await
            }
            Err(e) => {
                let error = e.to_string();
                tracing::error!("Task {} failed: {}", id, error);
                self.repository
                    .update(id, &mut |task: &mut Task| {
                        task.fail(error.clone())?;
                        task.add_message(MessageRole::System, error.clone(), Vec::new());
                        Ok(())
                    })
                    .await
            }
        };

        match &outcome {
            Ok(task) => tracing::info!("Task {} {}", id, task.state),
            Err(e) => tracing::info!("Task {} result dropped: {}", id, e),
        }
        outcome
    }

    /// Complete by echoing the input when nobody can resolve it.
    async fn finish_degraded(&self, id: &str, message: &str, reason: &str) -> Result<Task> {
        tracing::warn!("{}", Error::AgentUnavailable(reason.to_string()));
        let output = TaskOutput {
            message: format!("Processed: {}", message),
            artifacts: Vec::new(),
            metadata: Some(json!({ "note": reason, "degraded": true })),
        };
        self.repository
            .update(id, &mut |task: &mut Task| {
                task.complete(output.clone())?;
                task.add_message(MessageRole::Agent, output.message.clone(), Vec::new());
                Ok(())
            })
            .await
    }

    pub async fn get_task(&self, id: &str) -> Result<Task> {
        self.repository.get(id).await
    }

    /// Cancel a pending or running task.
    pub async fn cancel_task(&self, id: &str) -> Result<Task> {
        let task = self.repository.update(id, &mut |task: &mut Task| task.cancel()).await?;
        if let Some(signal) = self.existing_signal(id) {
            signal.notify_one();
        }
        tracing::info!("Task {} cancelled", id);
        Ok(task)
    }

    /// Append a follow-up user message to a task that is still live.
    pub async fn add_message(&self, id: &str, content: &str) -> Result<Task> {
        self.repository
            .update(id, &mut |task: &mut Task| {
                if task.is_terminal() {
                    return Err(Error::InvalidStateTransition {
                        action: "message",
                        state: task.state,
                    });
                }
                task.add_message(MessageRole::User, content, Vec::new());
                Ok(())
            })
            .await
    }

    pub async fn list_tasks(&self, query: &TaskQuery) -> Result<TaskPage> {
        self.repository.list(query).await
    }

    /// Evict finished tasks per the retention policy.
    pub async fn prune(&self) -> Result<usize> {
        let max_age = chrono::Duration::from_std(self.retention.max_age)
            .map_err(|e| Error::Config(format!("Invalid retention: {}", e)))?;
        let removed = self
            .repository
            .prune(Utc::now() - max_age, self.retention.max_tasks)
            .await?;
        if removed > 0 {
            tracing::info!("Pruned {} finished tasks", removed);
        }
        Ok(removed)
    }

    fn track(&self, id: &str) {
        if let Ok(mut signals) = self.cancellations.lock() {
            signals.insert(id.to_string(), Arc::new(Notify::new()));
        }
    }

    fn untrack(&self, id: &str) {
        if let Ok(mut signals) = self.cancellations.lock() {
            signals.remove(id);
        }
    }

    fn existing_signal(&self, id: &str) -> Option<Arc<Notify>> {
        self.cancellations.lock().ok()?.get(id).cloned()
    }

    fn cancel_signal(&self, id: &str) -> Arc<Notify> {
        self.existing_signal(id).unwrap_or_else(|| Arc::new(Notify::new()))
    }
}

fn panic_message(panic: Box<dyn std::any::Any + Send>) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
