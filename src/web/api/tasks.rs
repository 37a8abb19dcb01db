//! API endpoints for tasks.

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    Json,
};
use serde::Deserialize;

use super::{ApiError, ApiResult};
use crate::task::{Context, Task, TaskPage, TaskQuery, TaskState, DEFAULT_PAGE_SIZE};
use crate::web::AppState;

const MAX_PAGE_SIZE: usize = 100;

/// Create task request.
#[derive(Deserialize)]
pub struct CreateTaskRequest {
    #[serde(default)]
    pub skill_id: Option<String>,
    pub message: String,
    #[serde(default)]
    pub context: Option<Context>,
}

/// Follow-up message request.
#[derive(Deserialize)]
pub struct AddMessageRequest {
    pub message: String,
}

/// Query string of the list endpoint.
#[derive(Deserialize, Default)]
pub struct ListParams {
    pub state: Option<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl ListParams {
    fn into_query(self) -> Result<TaskQuery, ApiError> {
        let state = self
            .state
            .filter(|s| !s.is_empty())
            .map(|s| s.parse::<TaskState>())
            .transpose()
            .map_err(|e| ApiError::bad_request(e.to_string()))?;

        Ok(TaskQuery {
            state,
            limit: self.limit.unwrap_or(DEFAULT_PAGE_SIZE).min(MAX_PAGE_SIZE),
            offset: self.offset.unwrap_or(0),
        })
    }
}

/// Create a task. Returns the pending task at once.
pub async fn create_task(
    State(state): State<AppState>,
    payload: Result<Json<CreateTaskRequest>, JsonRejection>,
) -> ApiResult<Task> {
    let Json(payload) = payload?;
    let task = state
        .service
        .create_task(payload.skill_id, payload.message, payload.context)
        .await?;
    Ok(Json(task))
}

/// Get a task snapshot.
pub async fn get_task(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Task> {
    Ok(Json(state.service.get_task(&id).await?))
}

/// Cancel a pending or running task.
pub async fn cancel_task(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Task> {
    Ok(Json(state.service.cancel_task(&id).await?))
}

/// Append a user message to a live task.
pub async fn add_message(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<AddMessageRequest>, JsonRejection>,
) -> ApiResult<Task> {
    let Json(payload) = payload?;
    Ok(Json(state.service.add_message(&id, &payload.message).await?))
}

/// List tasks, newest first.
pub async fn list_tasks(
    State(state): State<AppState>,
    params: Result<Query<ListParams>, QueryRejection>,
) -> ApiResult<TaskPage> {
    let Query(params) = params?;
    let query = params.into_query()?;
    Ok(Json(state.service.list_tasks(&query).await?))
}
