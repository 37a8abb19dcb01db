//! Request classification: which agent handles a message.

use serde::{Deserialize, Serialize};

/// The two specialist agents behind the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AgentKind {
    /// Data and reporting queries.
    #[serde(rename = "database")]
    Database,
    /// Conversational travel assistant.
    #[serde(rename = "ui")]
    Interactive,
}

impl AgentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentKind::Database => "database",
            AgentKind::Interactive => "ui",
        }
    }
}

impl std::fmt::Display for AgentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

const SKILL_ROUTES: &[(&str, AgentKind)] = &[
    ("search_vacations", AgentKind::Interactive),
    ("book_package", AgentKind::Interactive),
    ("get_recommendations", AgentKind::Interactive),
    ("chat_assistant", AgentKind::Interactive),
    ("query_database", AgentKind::Database),
    ("get_data", AgentKind::Database),
];

const DATA_TERMS: &[&str] = &[
    "query",
    "database",
    "sql",
    "data",
    "report",
    "statistics",
    "count",
    "list all",
    "export",
];

const TRAVEL_TERMS: &[&str] = &[
    "book",
    "reserve",
    "search",
    "find",
    "show",
    "recommend",
    "help",
    "want",
    "looking for",
    "vacation",
    "holiday",
    "trip",
    "travel",
    "destination",
    "package",
    "price",
    "budget",
    "je cherche",
    "je veux",
    "montre",
    "réserve",
];

/// Route by skill when one is given, otherwise by message keywords.
///
/// Unknown skills go to the interactive agent. Data terms win over travel
/// terms, so "show me hotel reports" is a data query.
pub fn classify(message: &str, skill_id: Option<&str>) -> AgentKind {
    if let Some(skill_id) = skill_id {
        return skill_route(skill_id).unwrap_or(AgentKind::Interactive);
    }

    let m = message.to_lowercase();
    if has_any(&m, DATA_TERMS) {
        return AgentKind::Database;
    }
    if has_any(&m, TRAVEL_TERMS) {
        return AgentKind::Interactive;
    }
    AgentKind::Interactive
}

/// Agent a skill id is bound to, if it is a known skill.
pub fn skill_route(skill_id: &str) -> Option<AgentKind> {
    SKILL_ROUTES
        .iter()
        .find(|(id, _)| *id == skill_id)
        .map(|(_, kind)| *kind)
}

fn has_any(message: &str, terms: &[&str]) -> bool {
    terms.iter().any(|term| message.contains(term))
}
