//! Orchestrator: routes each request to the data agent or the interactive agent.

pub mod classify;
pub mod graph;
pub mod llm;

pub use classify::{classify, skill_route, AgentKind};
pub use graph::{AgentInvoker, AgentReply, InvokeError, Invocation, Orchestrator, OrchestratorResult};
pub use llm::LlmInvoker;

use std::sync::Arc;

use crate::config::LlmSettings;

/// Build an orchestrator over LLM-backed agents, or `None` when no
/// endpoint is configured.
pub fn from_settings(settings: &LlmSettings) -> Result<Option<Orchestrator>, InvokeError> {
    let data = LlmInvoker::for_agent(AgentKind::Database, settings)?;
    let interactive = LlmInvoker::for_agent(AgentKind::Interactive, settings)?;
    Ok(match (data, interactive) {
        (Some(data), Some(interactive)) => Some(Orchestrator::new(Arc::new(data), Arc::new(interactive))),
        _ => None,
    })
}
