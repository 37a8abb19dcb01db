//! Task storage behind an injectable repository interface.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use super::model::{Task, TaskState};
use crate::error::{Error, Result};

pub const DEFAULT_PAGE_SIZE: usize = 20;

/// Filter and page for listing tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskQuery {
    #[serde(default)]
    pub state: Option<TaskState>,
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default)]
    pub offset: usize,
}

fn default_limit() -> usize {
    DEFAULT_PAGE_SIZE
}

impl Default for TaskQuery {
    fn default() -> Self {
        Self {
            state: None,
            limit: DEFAULT_PAGE_SIZE,
            offset: 0,
        }
    }
}

/// One page of tasks, newest first. `total` counts matches before paging.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskPage {
    pub tasks: Vec<Task>,
    pub total: usize,
    pub limit: usize,
    pub offset: usize,
}

/// Mutation applied atomically by [`TaskRepository::update`].
pub type TaskMutation<'a> = &'a mut (dyn FnMut(&mut Task) -> Result<()> + Send);

/// Storage for tasks.
#[async_trait]
pub trait TaskRepository: Send + Sync {
    async fn insert(&self, task: Task) -> Result<()>;

    /// Snapshot of one task. Unknown id is `TaskNotFound`.
    async fn get(&self, id: &str) -> Result<Task>;

    /// Apply `mutation` to the stored task and return the new snapshot.
    ///
    /// If the mutation fails the stored task is left untouched.
    async fn update(&self, id: &str, mutation: TaskMutation<'_>) -> Result<Task>;

    async fn list(&self, query: &TaskQuery) -> Result<TaskPage>;

    /// Drop terminal tasks last updated before `cutoff`, then the oldest
    /// terminal tasks until at most `max_tasks` remain. Returns how many
    /// were removed.
    async fn prune(&self, cutoff: DateTime<Utc>, max_tasks: Option<usize>) -> Result<usize>;

    async fn count(&self) -> Result<usize>;
}

/// Process-local repository. Tasks do not survive a restart.
#[derive(Debug, Default)]
pub struct MemoryTaskRepository {
    tasks: RwLock<HashMap<String, Task>>,
}

impl MemoryTaskRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TaskRepository for MemoryTaskRepository {
    async fn insert(&self, task: Task) -> Result<()> {
        let mut tasks = self.tasks.write().await;
        if tasks.contains_key(&task.id) {
            return Err(Error::Other(format!("Duplicate task id: {}", task.id)));
        }
        tasks.insert(task.id.clone(), task);
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Task> {
        self.tasks
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| Error::TaskNotFound(id.to_string()))
    }

    async fn update(&self, id: &str, mutation: TaskMutation<'_>) -> Result<Task> {
        let mut tasks = self.tasks.write().await;
        let stored = tasks
            .get_mut(id)
            .ok_or_else(|| Error::TaskNotFound(id.to_string()))?;

        let mut draft = stored.clone();
        mutation(&mut draft)?;
        *stored = draft.clone();
        Ok(draft)
    }

    async fn list(&self, query: &TaskQuery) -> Result<TaskPage> {
        let tasks = self.tasks.read().await;
        let mut matching: Vec<&Task> = tasks
            .values()
            .filter(|task| query.state.map_or(true, |state| task.state == state))
            .collect();

        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));

        let total = matching.len();
        let page = matching
            .into_iter()
            .skip(query.offset)
            .take(query.limit)
            .cloned()
            .collect();

        Ok(TaskPage {
            tasks: page,
            total,
            limit: query.limit,
            offset: query.offset,
        })
    }

    async fn prune(&self, cutoff: DateTime<Utc>, max_tasks: Option<usize>) -> Result<usize> {
        let mut tasks = self.tasks.write().await;
        let before = tasks.len();

        tasks.retain(|_, task| !(task.is_terminal() && task.updated_at < cutoff));

        if let Some(max) = max_tasks {
            if tasks.len() > max {
                let mut terminal: Vec<(DateTime<Utc>, String)> = tasks
                    .values()
                    .filter(|task| task.is_terminal())
                    .map(|task| (task.updated_at, task.id.clone()))
                    .collect();
                terminal.sort();

                let excess = tasks.len() - max;
                for (_, id) in terminal.into_iter().take(excess) {
                    tasks.remove(&id);
                }
            }
        }

        Ok(before - tasks.len())
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.tasks.read().await.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::model::{TaskInput, TaskOutput};
    use chrono::Duration;

    fn task_at(message: &str, created_at: DateTime<Utc>, state: TaskState) -> Task {
        let mut task = Task::new(TaskInput::new(message));
        task.created_at = created_at;
        task.updated_at = created_at;
        task.state = state;
        task
    }

    async fn seeded() -> (MemoryTaskRepository, DateTime<Utc>) {
        let repo = MemoryTaskRepository::new();
        let base = Utc::now() - Duration::hours(1);
        let states = [
            TaskState::Completed,
            TaskState::Pending,
            TaskState::Completed,
            TaskState::Failed,
            TaskState::Completed,
        ];
        for (i, state) in states.into_iter().enumerate() {
            let task = task_at(&format!("t{}", i), base + Duration::seconds(i as i64), state);
            repo.insert(task).await.unwrap();
        }
        (repo, base)
    }

    #[tokio::test]
    async fn test_get_unknown_is_not_found() {
        let repo = MemoryTaskRepository::new();
        let err = repo.get("missing").await.unwrap_err();
        assert!(matches!(err, Error::TaskNotFound(id) if id == "missing"));
    }

    #[tokio::test]
    async fn test_list_filters_and_sorts_newest_first() {
        let (repo, _) = seeded().await;
        let page = repo
            .list(&TaskQuery {
                state: Some(TaskState::Completed),
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(page.total, 3);
        let messages: Vec<&str> = page.tasks.iter().map(|t| t.input.message.as_str()).collect();
        assert_eq!(messages, vec!["t4", "t2", "t0"]);
        assert!(page.tasks.iter().all(|t| t.state == TaskState::Completed));
    }

    #[tokio::test]
    async fn test_list_paginates_after_counting() {
        let (repo, _) = seeded().await;
        let page = repo
            .list(&TaskQuery {
                state: None,
                limit: 2,
                offset: 1,
            })
            .await
            .unwrap();

        assert_eq!(page.total, 5);
        assert_eq!(page.limit, 2);
        assert_eq!(page.offset, 1);
        let messages: Vec<&str> = page.tasks.iter().map(|t| t.input.message.as_str()).collect();
        assert_eq!(messages, vec!["t3", "t2"]);

        let past_end = repo
            .list(&TaskQuery {
                state: None,
                limit: 10,
                offset: 50,
            })
            .await
            .unwrap();
        assert!(past_end.tasks.is_empty());
        assert_eq!(past_end.total, 5);
    }

    #[tokio::test]
    async fn test_failed_update_leaves_task_untouched() {
        let repo = MemoryTaskRepository::new();
        let mut task = Task::new(TaskInput::new("x"));
        task.start().unwrap();
        task.complete(TaskOutput {
            message: "done".into(),
            artifacts: Vec::new(),
            metadata: None,
        })
        .unwrap();
        let id = task.id.clone();
        repo.insert(task.clone()).await.unwrap();

        let err = repo
            .update(&id, &mut |task: &mut Task| {
                task.error = Some("scribbled".into());
                task.cancel()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidStateTransition { .. }));
        assert_eq!(repo.get(&id).await.unwrap(), task);
    }

    #[tokio::test]
    async fn test_duplicate_insert_rejected() {
        let repo = MemoryTaskRepository::new();
        let task = Task::new(TaskInput::new("x"));
        repo.insert(task.clone()).await.unwrap();
        assert!(repo.insert(task).await.is_err());
    }

    #[tokio::test]
    async fn test_prune_keeps_live_tasks() {
        let (repo, base) = seeded().await;

        // Everything terminal is older than the cutoff; the pending task stays.
        let removed = repo.prune(base + Duration::hours(2), None).await.unwrap();
        assert_eq!(removed, 4);
        assert_eq!(repo.count().await.unwrap(), 1);
        let remaining = repo.list(&TaskQuery::default()).await.unwrap();
        assert_eq!(remaining.tasks[0].state, TaskState::Pending);
    }

    #[tokio::test]
    async fn test_prune_caps_oldest_terminal_first() {
        let (repo, base) = seeded().await;

        let removed = repo.prune(base - Duration::hours(1), Some(3)).await.unwrap();
        assert_eq!(removed, 2);
        let left: Vec<String> = repo
            .list(&TaskQuery::default())
            .await
            .unwrap()
            .tasks
            .into_iter()
            .map(|t| t.input.message)
            .collect();
        assert_eq!(left, vec!["t4", "t3", "t1"]);
    }
}
