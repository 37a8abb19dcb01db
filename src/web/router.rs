//! Route definitions for web server.

use axum::{
    routing::{get, post},
    Router,
};

use super::{api, AppState};

/// Create the task API router.
pub fn create_api_router() -> Router<AppState> {
    Router::new()
        .route("/tasks", get(api::list_tasks).post(api::create_task))
        .route("/tasks/:id", get(api::get_task))
        .route("/tasks/:id/cancel", post(api::cancel_task))
        .route("/tasks/:id/messages", post(api::add_message))
}

/// Create the full app router.
pub fn create_app_router(state: AppState) -> Router {
    Router::new()
        .route("/.well-known/agent.json", get(api::get_agent_card))
        .nest("/a2a", create_api_router())
        .route("/health", get(health_check))
        .with_state(state)
}

/// Health check endpoint.
async fn health_check() -> &'static str {
    "OK"
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::card::default_card;
    use crate::config::Settings;
    use crate::task::{MemoryTaskRepository, Task, TaskService, TaskState};
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use serde_json::{json, Value};
    use std::sync::Arc;
    use std::time::Duration;
    use tower::ServiceExt;

    fn app() -> Router {
        let service = TaskService::new(Arc::new(MemoryTaskRepository::new()), None);
        create_app_router(AppState::new(service, default_card(&Settings::default())))
    }

    async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => request
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => request.body(Body::empty()).unwrap(),
        };

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    async fn create(app: &Router, message: &str) -> Task {
        let (status, body) = call(app, "POST", "/a2a/tasks", Some(json!({ "message": message }))).await;
        assert_eq!(status, StatusCode::OK);
        serde_json::from_value(body).unwrap()
    }

    async fn settle(app: &Router, id: &str) -> Value {
        for _ in 0..100 {
            let (_, body) = call(app, "GET", &format!("/a2a/tasks/{}", id), None).await;
            if body["state"] != "pending" && body["state"] != "running" {
                return body;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("task {} never settled", id);
    }

    #[tokio::test]
    async fn test_agent_card() {
        let (status, body) = call(&app(), "GET", "/.well-known/agent.json", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["name"], "vacanceai-orchestrator");
        assert_eq!(body["skills"][1]["id"], "book_package");
    }

    #[tokio::test]
    async fn test_create_then_poll() {
        let app = app();
        let task = create(&app, "hello").await;
        assert_eq!(task.state, TaskState::Pending);

        let done = settle(&app, &task.id).await;
        assert_eq!(done["state"], "completed");
        assert_eq!(done["output"]["message"], "Processed: hello");
        assert!(done["completed_at"].is_string());
    }

    #[tokio::test]
    async fn test_unknown_task_is_404() {
        let app = app();
        let (status, body) = call(&app, "GET", "/a2a/tasks/missing", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["detail"], "Task not found");

        let (status, _) = call(&app, "POST", "/a2a/tasks/missing/cancel", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_cancel_completed_is_400() {
        let app = app();
        let task = create(&app, "hello").await;
        settle(&app, &task.id).await;

        let (status, body) = call(&app, "POST", &format!("/a2a/tasks/{}/cancel", task.id), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["detail"], "Cannot cancel task in state: completed");
    }

    #[tokio::test]
    async fn test_message_on_finished_task_is_400() {
        let app = app();
        let task = create(&app, "hello").await;
        settle(&app, &task.id).await;

        let (status, _) = call(
            &app,
            "POST",
            &format!("/a2a/tasks/{}/messages", task.id),
            Some(json!({ "message": "and more" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_list_with_filter_and_paging() {
        let app = app();
        for message in ["a", "b", "c"] {
            let task = create(&app, message).await;
            settle(&app, &task.id).await;
        }

        let (status, body) = call(&app, "GET", "/a2a/tasks?state=completed&limit=2&offset=0", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total"], 3);
        assert_eq!(body["limit"], 2);
        assert_eq!(body["tasks"].as_array().unwrap().len(), 2);
        assert_eq!(body["tasks"][0]["input"]["message"], "c");

        let (_, pending) = call(&app, "GET", "/a2a/tasks?state=pending", None).await;
        assert_eq!(pending["total"], 0);
    }

    #[tokio::test]
    async fn test_list_rejects_unknown_state() {
        let (status, body) = call(&app(), "GET", "/a2a/tasks?state=done", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["detail"].as_str().unwrap().contains("done"));
    }

    #[tokio::test]
    async fn test_malformed_requests_get_detail_body() {
        let app = app();

        let (status, body) = call(&app, "POST", "/a2a/tasks", Some(json!({ "skill_id": "search_vacations" }))).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(body["detail"].as_str().unwrap().contains("message"));

        let task = create(&app, "hello").await;
        let (status, body) = call(&app, "POST", &format!("/a2a/tasks/{}/messages", task.id), Some(json!({}))).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(body["detail"].is_string());

        let (status, body) = call(&app, "GET", "/a2a/tasks?limit=-1", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["detail"].as_str().unwrap().contains("query string"));
    }

    #[tokio::test]
    async fn test_health() {
        let response = app()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
