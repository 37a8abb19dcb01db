//! Agents backed by an Ollama-compatible chat endpoint.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::classify::AgentKind;
use super::graph::{AgentInvoker, AgentReply, InvokeError, Invocation};
use crate::config::LlmSettings;

const HISTORY_WINDOW: usize = 10;

/// Function tools the interactive agent is offered. Calls to them come back
/// as `ui_actions` for the frontend.
fn ui_tools() -> Vec<Value> {
    let package_id = json!({ "type": "string", "description": "UUID of the package" });
    vec![
        tool(
            "search_vacation",
            "Search for vacation packages and display results in the interface",
            json!({
                "destination": { "type": "string", "description": "Where the user wants to go (e.g. Maldives, Japan, beach)" },
                "budget_max": { "type": "number", "description": "Maximum budget per person in euros" },
                "duration_days": { "type": "integer", "description": "Preferred trip duration" },
                "travel_type": {
                    "type": "string",
                    "enum": ["beach", "mountain", "city", "adventure", "romantic", "family"]
                },
                "num_travelers": { "type": "integer", "description": "Number of people traveling" }
            }),
            &[],
        ),
        tool(
            "show_package_details",
            "Display detailed information about a specific package",
            json!({ "package_id": package_id }),
            &["package_id"],
        ),
        tool(
            "start_booking_flow",
            "Start the booking process for a package",
            json!({
                "package_id": package_id,
                "start_date": { "type": "string", "description": "Pre-filled start date (YYYY-MM-DD)" },
                "num_persons": { "type": "integer", "description": "Pre-filled number of travelers" }
            }),
            &["package_id"],
        ),
        tool(
            "add_to_favorites_action",
            "Add a package to the user's favorites",
            json!({ "package_id": package_id }),
            &["package_id"],
        ),
        tool(
            "navigate_to_page",
            "Navigate to a specific page in the application",
            json!({
                "page": { "type": "string", "enum": ["home", "search", "bookings", "favorites", "profile"] }
            }),
            &["page"],
        ),
        tool(
            "show_recommendations",
            "Show personalized vacation recommendations",
            json!({
                "preferences": { "type": "array", "items": { "type": "string" } },
                "budget_range": { "type": "string", "enum": ["low", "medium", "high", "luxury"] }
            }),
            &[],
        ),
    ]
}

fn tool(name: &str, description: &str, properties: Value, required: &[&str]) -> Value {
    json!({
        "type": "function",
        "function": {
            "name": name,
            "description": description,
            "parameters": {
                "type": "object",
                "properties": properties,
                "required": required,
            }
        }
    })
}

fn tool_name(tool: &Value) -> Option<&str> {
    tool.get("function")?.get("name")?.as_str()
}

const DATA_PROMPT: &str = "Tu es l'agent de base de données de VacanceAI.

Tu gères toutes les opérations de données pour les packages vacances: \
recherche par critères (prix, durée, destination, type), détails d'un package, \
destinations disponibles, réservations et favoris.

Retourne toujours des résultats formatés et pertinents. \
Si aucun résultat, suggère des alternatives.";

const INTERACTIVE_PROMPT: &str = "Tu es l'assistant VacanceAI, un conseiller vacances expert et amical.

Aide à trouver le package idéal selon les envies et le budget, explique ce qui est inclus, \
guide la réservation et propose des recommandations personnalisées.

Sois concis mais informatif, formate clairement les prix \
et termine par une question ou une proposition d'action.";

pub struct LlmInvoker {
    client: Client,
    base_url: String,
    model: String,
    system_prompt: String,
    tools: Vec<Value>,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "<[Value]>::is_empty")]
    tools: &'a [Value],
    stream: bool,
}

#[derive(Serialize, Deserialize, Debug, PartialEq)]
struct ChatMessage {
    role: String,
    content: String,
}

impl ChatMessage {
    fn new(role: &str, content: impl Into<String>) -> Self {
        Self {
            role: role.to_string(),
            content: content.into(),
        }
    }
}

#[derive(Deserialize)]
struct ChatResponse {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: String,
    #[serde(default)]
    tool_calls: Vec<ToolCall>,
}

#[derive(Deserialize)]
struct ToolCall {
    function: Value,
}

impl LlmInvoker {
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        system_prompt: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, InvokeError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            system_prompt: system_prompt.into(),
            tools: Vec::new(),
        })
    }

    /// Offer function tools to the model.
    pub fn with_tools(mut self, tools: Vec<Value>) -> Self {
        self.tools = tools;
        self
    }

    /// Invoker for one agent kind, or `None` when no endpoint is configured.
    pub fn for_agent(kind: AgentKind, settings: &LlmSettings) -> Result<Option<Self>, InvokeError> {
        let Some(base_url) = settings.base_url.as_deref() else {
            return Ok(None);
        };
        let (prompt, tools) = match kind {
            AgentKind::Database => (DATA_PROMPT, Vec::new()),
            AgentKind::Interactive => (INTERACTIVE_PROMPT, ui_tools()),
        };
        let invoker = Self::new(
            base_url,
            settings.model.clone(),
            prompt,
            Duration::from_secs(settings.timeout_seconds),
        )?;
        Ok(Some(invoker.with_tools(tools)))
    }

    fn offers(&self, name: &str) -> bool {
        self.tools.iter().any(|tool| tool_name(tool) == Some(name))
    }

    fn build_messages(&self, invocation: &Invocation) -> Vec<ChatMessage> {
        let mut messages = vec![ChatMessage::new("system", self.system_prompt.as_str())];

        if let Some(Value::Array(history)) = &invocation.history {
            let start = history.len().saturating_sub(HISTORY_WINDOW);
            for entry in &history[start..] {
                let Some(content) = entry.get("content").and_then(Value::as_str) else {
                    continue;
                };
                let role = match entry.get("role").and_then(Value::as_str) {
                    Some("user") => "user",
                    _ => "assistant",
                };
                messages.push(ChatMessage::new(role, content));
            }
        }

        let mut content = invocation.message.clone();
        if let Some(user) = &invocation.user {
            content.push_str(&format!("\n[Contexte utilisateur: {}]", user));
        }
        if let Some(page) = &invocation.page {
            content.push_str(&format!("\n[Page: {}]", page));
        }
        if let Some(context) = &invocation.context {
            content.push_str(&format!("\n[Contexte: {}]", Value::Object(context.clone())));
        }
        messages.push(ChatMessage::new("user", content));
        messages
    }
}

#[async_trait]
impl AgentInvoker for LlmInvoker {
    async fn invoke(&self, invocation: Invocation) -> Result<AgentReply, InvokeError> {
        let request = ChatRequest {
            model: &self.model,
            messages: self.build_messages(&invocation),
            tools: &self.tools,
            stream: false,
        };

        let response = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() {
                    InvokeError::Unavailable(e.to_string())
                } else {
                    InvokeError::Http(e)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(InvokeError::Failed(format!("chat endpoint returned {}: {}", status, body)));
        }

        let chat_response: ChatResponse = response.json().await?;
        let ui_actions = chat_response
            .message
            .tool_calls
            .into_iter()
            .map(|call| call.function)
            .filter(|function| {
                function
                    .get("name")
                    .and_then(Value::as_str)
                    .map_or(false, |name| self.offers(name))
            })
            .collect();

        Ok(AgentReply {
            response: chat_response.message.content,
            ui_actions,
        })
    }
}
