//! HTTP client for a remote task API, with polling until completion.

use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::time::Instant;

use crate::card::AgentCard;
use crate::config::ClientSettings;
use crate::error::{Error, Result};
use crate::task::{Context, Task, TaskOutput, TaskPage, TaskQuery, TaskState};

/// Status view of a task, as returned by get and cancel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskStatus {
    pub id: String,
    pub state: TaskState,
    #[serde(default)]
    pub output: Option<TaskOutput>,
    #[serde(default)]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }
}

pub struct PollingClient {
    client: Client,
    base_url: String,
    poll_interval: Duration,
    max_wait: Duration,
}

impl PollingClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        Self::from_settings(&ClientSettings {
            base_url: base_url.into(),
            ..Default::default()
        })
    }

    pub fn from_settings(settings: &ClientSettings) -> Result<Self> {
        let client = Client::builder().timeout(settings.request_timeout()).build()?;
        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            poll_interval: settings.poll_interval(),
            max_wait: settings.max_wait(),
        })
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait = max_wait;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn get_agent_card(&self) -> Result<AgentCard> {
        self.send(self.client.get(format!("{}/.well-known/agent.json", self.base_url)))
            .await
    }

    pub async fn create_task(
        &self,
        message: &str,
        skill_id: Option<&str>,
        context: Option<&Context>,
    ) -> Result<Task> {
        let body = json!({
            "message": message,
            "skill_id": skill_id,
            "context": context,
        });
        self.send(self.client.post(self.tasks_url()).json(&body)).await
    }

    pub async fn get_task(&self, task_id: &str) -> Result<TaskStatus> {
        self.send(self.client.get(self.task_url(task_id))).await
    }

    /// Full task including its conversation log.
    pub async fn get_task_detail(&self, task_id: &str) -> Result<Task> {
        self.send(self.client.get(self.task_url(task_id))).await
    }

    pub async fn cancel_task(&self, task_id: &str) -> Result<TaskStatus> {
        self.send(self.client.post(format!("{}/cancel", self.task_url(task_id))))
            .await
    }

    pub async fn send_message(&self, task_id: &str, message: &str) -> Result<Task> {
        self.send(
            self.client
                .post(format!("{}/messages", self.task_url(task_id)))
                .json(&json!({ "message": message })),
        )
        .await
    }

    pub async fn list_tasks(&self, query: &TaskQuery) -> Result<TaskPage> {
        let mut params = vec![
            ("limit", query.limit.to_string()),
            ("offset", query.offset.to_string()),
        ];
        if let Some(state) = query.state {
            params.push(("state", state.to_string()));
        }
        self.send(self.client.get(self.tasks_url()).query(&params)).await
    }

    /// Poll with the configured interval and deadline.
    pub async fn wait(&self, task_id: &str) -> Result<TaskStatus> {
        self.wait_for_completion(task_id, self.poll_interval, self.max_wait)
            .await
    }

    /// Poll until the task is terminal, or fail with `Timeout` once
    /// `max_wait` has elapsed.
    pub async fn wait_for_completion(
        &self,
        task_id: &str,
        poll_interval: Duration,
        max_wait: Duration,
    ) -> Result<TaskStatus> {
        let started = Instant::now();
        let deadline = started + max_wait;

        loop {
            let status = self.get_task(task_id).await?;
            if status.is_terminal() {
                tracing::debug!("Task {} {} after {:?}", task_id, status.state, started.elapsed());
                return Ok(status);
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(Error::Timeout {
                    task_id: task_id.to_string(),
                    waited_ms: started.elapsed().as_millis(),
                });
            }
            tokio::time::sleep(poll_interval.min(deadline - now)).await;
        }
    }

    fn tasks_url(&self) -> String {
        format!("{}/a2a/tasks", self.base_url)
    }

    fn task_url(&self, task_id: &str) -> String {
        format!("{}/a2a/tasks/{}", self.base_url, task_id)
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<serde_json::Value>(&body)
                .ok()
                .and_then(|v| v.get("detail").and_then(|d| d.as_str()).map(str::to_string))
                .unwrap_or(body);
            return Err(Error::Api {
                status: status.as_u16(),
                message,
            });
        }
        Ok(response.json().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::card::default_card;
    use crate::config::Settings;
    use crate::task::{MemoryTaskRepository, Resolution, ResolveError, TaskResolver, TaskService};
    use crate::web::{create_app_router, AppState};
    use async_trait::async_trait;
    use std::sync::Arc;

    /// Answers after a fixed delay.
    struct SlowResolver(Duration);

    #[async_trait]
    impl TaskResolver for SlowResolver {
        async fn resolve(
            &self,
            message: &str,
            _skill_id: Option<&str>,
            _context: Option<&Context>,
        ) -> std::result::Result<Resolution, ResolveError> {
            tokio::time::sleep(self.0).await;
            Ok(Resolution {
                response: format!("done: {}", message),
                ..Default::default()
            })
        }
    }

    async fn serve(resolver: Option<Arc<dyn TaskResolver>>) -> PollingClient {
        let service = TaskService::new(Arc::new(MemoryTaskRepository::new()), resolver);
        let app = create_app_router(AppState::new(service, default_card(&Settings::default())));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        PollingClient::new(format!("http://{}/", addr)).unwrap()
    }

    #[tokio::test]
    async fn test_wait_returns_soon_after_completion() {
        let client = serve(Some(Arc::new(SlowResolver(Duration::from_millis(300))))).await;
        let task = client.create_task("beach", None, None).await.unwrap();
        assert_eq!(task.state, TaskState::Pending);

        let started = std::time::Instant::now();
        let status = client
            .wait_for_completion(&task.id, Duration::from_millis(100), Duration::from_secs(1))
            .await
            .unwrap();
        let elapsed = started.elapsed();

        assert_eq!(status.state, TaskState::Completed);
        assert_eq!(status.output.unwrap().message, "done: beach");
        assert!(elapsed >= Duration::from_millis(250), "{:?}", elapsed);
        assert!(elapsed < Duration::from_millis(700), "{:?}", elapsed);
    }

    #[tokio::test]
    async fn test_wait_times_out() {
        let client = serve(Some(Arc::new(SlowResolver(Duration::from_secs(60))))).await;
        let task = client.create_task("forever", None, None).await.unwrap();

        let started = std::time::Instant::now();
        let err = client
            .wait_for_completion(&task.id, Duration::from_millis(100), Duration::from_secs(1))
            .await
            .unwrap_err();
        let elapsed = started.elapsed();

        assert!(matches!(err, Error::Timeout { ref task_id, .. } if *task_id == task.id));
        assert!(elapsed >= Duration::from_secs(1), "{:?}", elapsed);
        assert!(elapsed < Duration::from_millis(1500), "{:?}", elapsed);
    }

    #[tokio::test]
    async fn test_cancel_and_errors() {
        let client = serve(Some(Arc::new(SlowResolver(Duration::from_secs(60))))).await;
        let task = client.create_task("slow", Some("book_package"), None).await.unwrap();

        let cancelled = client.cancel_task(&task.id).await.unwrap();
        assert_eq!(cancelled.state, TaskState::Cancelled);

        let again = client.cancel_task(&task.id).await.unwrap_err();
        assert!(matches!(
            again,
            Error::Api { status: 400, ref message } if message == "Cannot cancel task in state: cancelled"
        ));

        let missing = client.get_task("nope").await.unwrap_err();
        assert!(matches!(missing, Error::Api { status: 404, .. }));
    }

    #[tokio::test]
    async fn test_card_messages_and_listing() {
        let client = serve(Some(Arc::new(SlowResolver(Duration::from_secs(60))))).await;

        let card = client.get_agent_card().await.unwrap();
        assert_eq!(card.skills.len(), 6);

        let task = client.create_task("plan", None, None).await.unwrap();
        let updated = client.send_message(&task.id, "for two").await.unwrap();
        assert_eq!(updated.messages.len(), 2);
        assert_eq!(client.get_task_detail(&task.id).await.unwrap().messages.len(), 2);

        let page = client
            .list_tasks(&TaskQuery {
                state: Some(TaskState::Running),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.tasks[0].id, task.id);
    }
}
