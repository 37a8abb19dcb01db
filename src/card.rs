//! Agent card served at `/.well-known/agent.json`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::Settings;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentCapabilities {
    #[serde(default)]
    pub streaming: bool,
    #[serde(default)]
    pub push_notifications: bool,
    #[serde(default)]
    pub state_persistence: bool,
}

/// One capability a caller can ask for by id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Skill {
    pub id: String,
    pub name: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_schema: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<Value>,
}

impl Skill {
    pub fn new(id: &str, name: &str, description: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            description: description.to_string(),
            input_schema: None,
            output_schema: None,
        }
    }
}

/// Static descriptor of this agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentCard {
    pub name: String,
    pub description: String,
    pub url: String,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub capabilities: AgentCapabilities,
    #[serde(default)]
    pub skills: Vec<Skill>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authentication: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

fn default_version() -> String {
    "1.0.0".to_string()
}

impl AgentCard {
    pub fn skill(&self, id: &str) -> Option<&Skill> {
        self.skills.iter().find(|skill| skill.id == id)
    }
}

/// Card of the orchestrator, built from settings.
pub fn default_card(settings: &Settings) -> AgentCard {
    let message_schema = serde_json::json!({
        "type": "object",
        "properties": { "message": { "type": "string" } },
        "required": ["message"],
    });

    let mut skills = vec![
        Skill::new(
            "search_vacations",
            "Search Vacations",
            "Search for vacation packages based on user preferences",
        ),
        Skill::new("book_package", "Book Package", "Create a booking for a vacation package"),
        Skill::new(
            "get_recommendations",
            "Get Recommendations",
            "Get personalized vacation recommendations",
        ),
        Skill::new("chat_assistant", "Chat Assistant", "Interactive vacation planning assistant"),
        Skill::new("query_database", "Query Database", "Answer reporting questions over booking data"),
        Skill::new("get_data", "Get Data", "Fetch raw records from the booking database"),
    ];
    for skill in &mut skills {
        skill.input_schema = Some(message_schema.clone());
    }

    AgentCard {
        name: settings.agent.name.clone(),
        description: settings.agent.description.clone(),
        url: settings.public_url(),
        version: settings.agent.version.clone(),
        capabilities: AgentCapabilities {
            streaming: false,
            push_notifications: false,
            state_persistence: true,
        },
        skills,
        authentication: None,
        metadata: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::{classify, AgentKind};

    #[test]
    fn test_default_card_shape() {
        let card = default_card(&Settings::default());
        assert_eq!(card.name, "vacanceai-orchestrator");
        assert_eq!(card.url, "http://localhost:8000");
        assert_eq!(card.version, "1.0.0");
        assert!(card.capabilities.state_persistence);

        let ids: Vec<&str> = card.skills.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(
            ids,
            vec![
                "search_vacations",
                "book_package",
                "get_recommendations",
                "chat_assistant",
                "query_database",
                "get_data"
            ]
        );
    }

    #[test]
    fn test_every_skill_is_routable() {
        let card = default_card(&Settings::default());
        assert_eq!(classify("", Some("query_database")), AgentKind::Database);
        for skill in &card.skills {
            // Skills route by table, never by message keywords.
            let by_skill = classify("show me the sales report", Some(&skill.id));
            let expected = if skill.id == "query_database" || skill.id == "get_data" {
                AgentKind::Database
            } else {
                AgentKind::Interactive
            };
            assert_eq!(by_skill, expected, "{}", skill.id);
        }
    }

    #[test]
    fn test_optional_fields_omitted() {
        let value = serde_json::to_value(default_card(&Settings::default())).unwrap();
        assert!(value.get("authentication").is_none());
        assert_eq!(value["capabilities"]["push_notifications"], false);

        let parsed: AgentCard = serde_json::from_value(value).unwrap();
        assert!(parsed.skill("book_package").is_some());
        assert!(parsed.skill("teleport").is_none());
    }
}
