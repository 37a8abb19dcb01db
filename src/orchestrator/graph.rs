//! Two-branch dispatch: classify, then run exactly one agent.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

use super::classify::{classify, AgentKind};
use crate::task::{Artifact, Context, Resolution, ResolveError, TaskResolver};

const DATA_FALLBACK: &str = "Une erreur s'est produite lors de l'accès aux données.";
const INTERACTIVE_FALLBACK: &str =
    "Je rencontre un problème technique. Pouvez-vous reformuler votre demande?";

/// Input handed to an agent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Invocation {
    pub message: String,
    /// Whole caller context. Only the data agent receives it.
    pub context: Option<Context>,
    pub history: Option<Value>,
    pub user: Option<Value>,
    pub conversation_id: Option<String>,
    pub page: Option<Value>,
}

impl Invocation {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Default::default()
        }
    }

    fn for_data(message: &str, context: Option<&Context>) -> Self {
        Self {
            context: context.cloned(),
            ..Self::new(message)
        }
    }

    fn for_interactive(message: &str, context: Option<&Context>) -> Self {
        let field = |key: &str| context.and_then(|c| c.get(key)).filter(|v| !v.is_null()).cloned();
        Self {
            history: field("history"),
            user: field("user"),
            conversation_id: field("conversation_id").map(|v| match v {
                Value::String(s) => s,
                other => other.to_string(),
            }),
            page: field("page"),
            ..Self::new(message)
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AgentReply {
    pub response: String,
    pub ui_actions: Vec<Value>,
}

#[derive(Error, Debug)]
pub enum InvokeError {
    #[error("Agent unavailable: {0}")]
    Unavailable(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{0}")]
    Failed(String),
}

/// One specialist agent.
#[async_trait]
pub trait AgentInvoker: Send + Sync {
    async fn invoke(&self, invocation: Invocation) -> Result<AgentReply, InvokeError>;
}

/// Outcome of one routed request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrchestratorResult {
    pub response: String,
    pub agent_type: AgentKind,
    #[serde(default)]
    pub ui_actions: Vec<Value>,
    #[serde(default)]
    pub error: Option<String>,
    pub metadata: Value,
}

/// Routes each request to the data agent or the interactive agent.
#[derive(Clone)]
pub struct Orchestrator {
    data: Arc<dyn AgentInvoker>,
    interactive: Arc<dyn AgentInvoker>,
}

impl Orchestrator {
    pub fn new(data: Arc<dyn AgentInvoker>, interactive: Arc<dyn AgentInvoker>) -> Self {
        Self { data, interactive }
    }

    /// Route and run one request. Agent failures become a fallback reply
    /// with `error` set; this never fails.
    pub async fn process_request(
        &self,
        message: &str,
        skill_id: Option<&str>,
        context: Option<&Context>,
    ) -> OrchestratorResult {
        let kind = classify(message, skill_id);
        tracing::info!(
            "Routing request to '{}' agent | message='{}'",
            kind,
            message.chars().take(100).collect::<String>()
        );

        let (invoker, invocation, fallback) = match kind {
            AgentKind::Database => (&self.data, Invocation::for_data(message, context), DATA_FALLBACK),
            AgentKind::Interactive => (
                &self.interactive,
                Invocation::for_interactive(message, context),
                INTERACTIVE_FALLBACK,
            ),
        };

        let (response, ui_actions, error) = match invoker.invoke(invocation).await {
            Ok(reply) => (reply.response, reply.ui_actions, None),
            Err(e) => {
                let error = match kind {
                    AgentKind::Database => format!("Database agent error: {}", e),
                    AgentKind::Interactive => format!("UI agent error: {}", e),
                };
                tracing::error!("{}", error);
                (fallback.to_string(), Vec::new(), Some(error))
            }
        };

        OrchestratorResult {
            response,
            agent_type: kind,
            ui_actions,
            error,
            metadata: json!({
                "skill_id": skill_id,
                "routed_to": kind,
            }),
        }
    }
}

#[async_trait]
impl TaskResolver for Orchestrator {
    async fn resolve(
        &self,
        message: &str,
        skill_id: Option<&str>,
        context: Option<&Context>,
    ) -> Result<Resolution, ResolveError> {
        let result = self.process_request(message, skill_id, context).await;

        let mut metadata = result.metadata;
        if let (Some(error), Some(map)) = (&result.error, metadata.as_object_mut()) {
            map.insert("error".to_string(), Value::String(error.clone()));
        }

        let mut artifacts = Vec::new();
        if !result.ui_actions.is_empty() {
            artifacts.push(Artifact::json(Value::Array(result.ui_actions)).with_name("ui_actions"));
        }

        Ok(Resolution {
            response: result.response,
            artifacts,
            metadata: Some(metadata),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Records every invocation and answers with a canned reply.
    #[derive(Default)]
    struct RecordingAgent {
        calls: Mutex<Vec<Invocation>>,
        fail: bool,
    }

    impl RecordingAgent {
        fn failing() -> Self {
            Self {
                fail: true,
                ..Default::default()
            }
        }

        fn calls(&self) -> Vec<Invocation> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl AgentInvoker for RecordingAgent {
        async fn invoke(&self, invocation: Invocation) -> Result<AgentReply, InvokeError> {
            let message = invocation.message.clone();
            self.calls.lock().unwrap().push(invocation);
            if self.fail {
                return Err(InvokeError::Failed("model overloaded".into()));
            }
            Ok(AgentReply {
                response: format!("answer to {}", message),
                ui_actions: vec![json!({"name": "show_recommendations"})],
            })
        }
    }

    fn context(value: Value) -> Context {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_exactly_one_leaf_runs() {
        let data = Arc::new(RecordingAgent::default());
        let ui = Arc::new(RecordingAgent::default());
        let orchestrator = Orchestrator::new(data.clone(), ui.clone());

        let result = orchestrator.process_request("Show me hotel reports", None, None).await;
        assert_eq!(result.agent_type, AgentKind::Database);
        assert_eq!(result.response, "answer to Show me hotel reports");
        assert_eq!(result.metadata["routed_to"], "database");
        assert!(result.metadata["skill_id"].is_null());
        assert_eq!(data.calls().len(), 1);
        assert!(ui.calls().is_empty());
    }

    #[tokio::test]
    async fn test_interactive_receives_mapped_context() {
        let data = Arc::new(RecordingAgent::default());
        let ui = Arc::new(RecordingAgent::default());
        let orchestrator = Orchestrator::new(data.clone(), ui.clone());
        let ctx = context(json!({
            "history": [{"role": "user", "content": "hi"}],
            "user": {"name": "Léa"},
            "conversation_id": "conv-1",
            "page": {"path": "/packages/42"},
            "secret": "not forwarded",
        }));

        let result = orchestrator
            .process_request("book it", Some("book_package"), Some(&ctx))
            .await;
        assert_eq!(result.agent_type, AgentKind::Interactive);
        assert_eq!(result.ui_actions.len(), 1);
        assert_eq!(result.metadata["skill_id"], "book_package");

        let call = &ui.calls()[0];
        assert_eq!(call.conversation_id.as_deref(), Some("conv-1"));
        assert_eq!(call.user.as_ref().unwrap()["name"], "Léa");
        assert_eq!(call.page.as_ref().unwrap()["path"], "/packages/42");
        assert!(call.history.as_ref().unwrap().is_array());
        assert!(call.context.is_none());
    }

    #[tokio::test]
    async fn test_data_receives_whole_context() {
        let data = Arc::new(RecordingAgent::default());
        let orchestrator = Orchestrator::new(data.clone(), Arc::new(RecordingAgent::default()));
        let ctx = context(json!({"user_id": 7}));

        orchestrator.process_request("count bookings", None, Some(&ctx)).await;
        assert_eq!(data.calls()[0].context.as_ref(), Some(&ctx));
    }

    #[tokio::test]
    async fn test_leaf_failure_becomes_fallback() {
        let orchestrator = Orchestrator::new(
            Arc::new(RecordingAgent::failing()),
            Arc::new(RecordingAgent::failing()),
        );

        let data = orchestrator.process_request("sql please", None, None).await;
        assert_eq!(data.response, DATA_FALLBACK);
        assert_eq!(data.error.as_deref(), Some("Database agent error: model overloaded"));

        let ui = orchestrator.process_request("a trip", None, None).await;
        assert_eq!(ui.response, INTERACTIVE_FALLBACK);
        assert!(ui.error.unwrap().starts_with("UI agent error"));
        assert!(ui.ui_actions.is_empty());
    }

    #[tokio::test]
    async fn test_resolver_carries_metadata_and_actions() {
        let orchestrator = Orchestrator::new(
            Arc::new(RecordingAgent::failing()),
            Arc::new(RecordingAgent::default()),
        );

        let ok = orchestrator.resolve("find a trip", Some("search_vacations"), None).await.unwrap();
        assert_eq!(ok.artifacts.len(), 1);
        assert_eq!(ok.artifacts[0].name.as_deref(), Some("ui_actions"));
        assert_eq!(ok.metadata.as_ref().unwrap()["routed_to"], "ui");

        let degraded = orchestrator.resolve("export data", None, None).await.unwrap();
        assert_eq!(degraded.response, DATA_FALLBACK);
        assert!(degraded.metadata.unwrap()["error"].is_string());
    }
}
