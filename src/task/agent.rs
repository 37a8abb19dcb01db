//! Task service exposed as an agent on the pub/sub transport.
//!
//! Other in-process agents send `create_task`, `get_task` or `cancel_task`
//! to this agent's inbox and get the task back as a RESPONSE envelope.

use std::sync::Arc;

use serde_json::{json, Value};

use super::model::Task;
use super::service::TaskService;
use crate::config::TransportSettings;
use crate::error::Result;
use crate::protocol::{Envelope, Payload};
use crate::transport::{handler_fn, Action, AgentRuntime, Broker, HandlerError, Publisher};

/// Inbox name of the task agent.
pub const TASK_AGENT: &str = "orchestrator";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskAction {
    CreateTask,
    GetTask,
    CancelTask,
}

impl Action for TaskAction {
    const ALL: &'static [Self] = &[Self::CreateTask, Self::GetTask, Self::CancelTask];

    fn key(&self) -> &'static str {
        match self {
            Self::CreateTask => "create_task",
            Self::GetTask => "get_task",
            Self::CancelTask => "cancel_task",
        }
    }
}

/// Connect a runtime serving `service` and register every task action.
pub async fn connect_task_agent(
    settings: &TransportSettings,
    broker: Arc<dyn Broker>,
    service: TaskService,
) -> Result<AgentRuntime<TaskAction>> {
    let mut runtime = AgentRuntime::from_settings(TASK_AGENT, settings, broker);
    runtime.connect().await?;

    for action in TaskAction::ALL.iter().copied() {
        let service = service.clone();
        runtime.register_handler(
            action,
            handler_fn(move |envelope, publisher| {
                let service = service.clone();
                async move { handle(action, &service, envelope, publisher).await }
            }),
        );
    }
    Ok(runtime)
}

async fn handle(
    action: TaskAction,
    service: &TaskService,
    envelope: Envelope,
    publisher: Publisher,
) -> std::result::Result<(), HandlerError> {
    let outcome = match action {
        TaskAction::CreateTask => {
            let message = str_field(envelope.payload(), "message")?;
            let skill_id = envelope.payload().get("skill_id").and_then(Value::as_str).map(str::to_string);
            let context = envelope.payload().get("context").and_then(Value::as_object).cloned();
            service.create_task(skill_id, message, context).await
        }
        TaskAction::GetTask => service.get_task(str_field(envelope.payload(), "task_id")?).await,
        TaskAction::CancelTask => service.cancel_task(str_field(envelope.payload(), "task_id")?).await,
    };

    let body = match &outcome {
        Ok(task) => task_payload(task)?,
        Err(e) => json!({ "error": e.to_string() }),
    };
    let Value::Object(payload) = body else {
        return Err(HandlerError::failed("task did not serialize to an object"));
    };
    publisher.reply(&envelope, payload).await?;

    outcome.map(drop).map_err(|e| HandlerError::failed(e.to_string()))
}

fn str_field<'a>(payload: &'a Payload, field: &str) -> std::result::Result<&'a str, HandlerError> {
    payload
        .get(field)
        .and_then(Value::as_str)
        .ok_or_else(|| HandlerError::InvalidPayload(format!("missing '{}'", field)))
}

fn task_payload(task: &Task) -> std::result::Result<Value, HandlerError> {
    let task = serde_json::to_value(task).map_err(|e| HandlerError::failed(e.to_string()))?;
    Ok(json!({ "task": task }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{MemoryTaskRepository, TaskState};
    use crate::transport::{MemoryBroker, SendOptions, Subscription};
    use std::time::Duration;

    fn payload(value: Value) -> Payload {
        value.as_object().cloned().unwrap()
    }

    async fn recv(sub: &mut Box<dyn Subscription>) -> Option<Envelope> {
        match tokio::time::timeout(Duration::from_millis(500), sub.next_message()).await {
            Ok(Ok(Some(raw))) => Some(Envelope::from_json(&raw).unwrap()),
            _ => None,
        }
    }

    #[tokio::test]
    async fn test_bus_requests_reach_task_service() {
        let settings = TransportSettings {
            channel_prefix: "vacance".into(),
            ..Default::default()
        };
        let memory = MemoryBroker::from_settings(&settings);
        let broker: Arc<dyn Broker> = Arc::new(memory.clone());
        let service = TaskService::new(Arc::new(MemoryTaskRepository::new()), None);

        let mut runtime = connect_task_agent(&settings, Arc::clone(&broker), service.clone())
            .await
            .unwrap();
        assert_eq!(memory.subscriber_count("vacance:orchestrator"), 1);
        let stop = runtime.stop_handle();
        let running = tokio::spawn(async move { runtime.listen().await });

        let mut frontend = broker.subscribe("vacance:frontend").await.unwrap();
        let sender = Publisher::new("frontend", "vacance", Arc::clone(&broker));

        let request = sender
            .send(
                TASK_AGENT,
                payload(json!({"action": "create_task", "message": "un week-end à Rome"})),
                SendOptions::default(),
            )
            .await
            .unwrap();
        let response = recv(&mut frontend).await.unwrap();
        assert!(response.answers(request.message_id()));
        let task_id = response.payload()["task"]["id"].as_str().unwrap().to_string();
        assert_eq!(response.payload()["task"]["input"]["message"], "un week-end à Rome");

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(service.get_task(&task_id).await.unwrap().state, TaskState::Completed);

        sender
            .send(
                TASK_AGENT,
                payload(json!({"action": "cancel_task", "task_id": task_id})),
                SendOptions::default(),
            )
            .await
            .unwrap();
        let response = recv(&mut frontend).await.unwrap();
        assert!(response.payload()["error"].as_str().unwrap().contains("completed"));

        stop.stop();
        let stats = running.await.unwrap().unwrap();
        assert_eq!(stats.handled, 1);
        assert_eq!(stats.failed, 1);
    }

    #[tokio::test]
    async fn test_missing_field_is_a_handler_failure() {
        let settings = TransportSettings::default();
        let broker: Arc<dyn Broker> = Arc::new(MemoryBroker::from_settings(&settings));
        let service = TaskService::new(Arc::new(MemoryTaskRepository::new()), None);

        let mut runtime = connect_task_agent(&settings, Arc::clone(&broker), service).await.unwrap();
        let stop = runtime.stop_handle();
        let running = tokio::spawn(async move { runtime.listen().await });

        Publisher::new("frontend", "agent", Arc::clone(&broker))
            .send(TASK_AGENT, payload(json!({"action": "get_task"})), SendOptions::default())
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        stop.stop();
        let stats = running.await.unwrap().unwrap();
        assert_eq!(stats.failed, 1);
    }
}
