//! Message envelopes with correlation IDs for tracking agent communication.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::types::{MessageType, Payload, Priority};

/// Payload fields consulted, in order, for the dispatch key.
pub const DISPATCH_FIELDS: [&str; 2] = ["action", "task"];

/// The unit exchanged between agents.
///
/// Fields are private: an envelope cannot change after construction. Build one
/// with [`EnvelopeBuilder`] or [`Envelope::reply`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    message_id: String,
    from_agent: String,
    to_agent: String,
    message_type: MessageType,
    timestamp: DateTime<Utc>,
    payload: Payload,
    #[serde(default)]
    callback_id: Option<String>,
    #[serde(default)]
    correlation_id: Option<String>,
    #[serde(default)]
    priority: Priority,
}

impl Envelope {
    /// Create a request envelope with a fresh id.
    pub fn request(from_agent: impl Into<String>, to_agent: impl Into<String>, payload: Payload) -> Self {
        EnvelopeBuilder::from(from_agent)
            .to(to_agent)
            .payload(payload)
            .build()
    }

    /// Create a response addressed back to the sender of `self`.
    ///
    /// The response answers this message (`callback_id`) and stays in its
    /// workflow (`correlation_id`).
    pub fn reply(&self, payload: Payload) -> Self {
        let mut builder = EnvelopeBuilder::from(self.to_agent.clone())
            .to(self.from_agent.clone())
            .message_type(MessageType::Response)
            .priority(self.priority)
            .callback_id(self.message_id.clone())
            .payload(payload);
        if let Some(correlation_id) = &self.correlation_id {
            builder = builder.correlation_id(correlation_id.clone());
        }
        builder.build()
    }

    pub fn message_id(&self) -> &str {
        &self.message_id
    }

    pub fn from_agent(&self) -> &str {
        &self.from_agent
    }

    pub fn to_agent(&self) -> &str {
        &self.to_agent
    }

    pub fn message_type(&self) -> MessageType {
        self.message_type
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn callback_id(&self) -> Option<&str> {
        self.callback_id.as_deref()
    }

    pub fn correlation_id(&self) -> Option<&str> {
        self.correlation_id.as_deref()
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    /// Key used to pick a handler: `payload.action`, else `payload.task`.
    pub fn dispatch_key(&self) -> Option<&str> {
        DISPATCH_FIELDS
            .iter()
            .find_map(|field| self.payload.get(*field).and_then(|v| v.as_str()))
    }

    /// Check if this envelope answers the given message.
    pub fn answers(&self, message_id: &str) -> bool {
        self.message_type == MessageType::Response && self.callback_id.as_deref() == Some(message_id)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_json(raw: &str) -> serde_json::Result<Self> {
        serde_json::from_str(raw)
    }
}

/// Builder for creating envelopes with fluent API.
pub struct EnvelopeBuilder {
    from_agent: String,
    to_agent: String,
    message_type: MessageType,
    payload: Payload,
    callback_id: Option<String>,
    correlation_id: Option<String>,
    priority: Priority,
}

impl EnvelopeBuilder {
    /// Start building an envelope from an agent.
    pub fn from(agent: impl Into<String>) -> Self {
        Self {
            from_agent: agent.into(),
            to_agent: String::new(),
            message_type: MessageType::Request,
            payload: Payload::new(),
            callback_id: None,
            correlation_id: None,
            priority: Priority::Normal,
        }
    }

    /// Address to a single agent.
    pub fn to(mut self, agent: impl Into<String>) -> Self {
        self.to_agent = agent.into();
        self
    }

    pub fn message_type(mut self, message_type: MessageType) -> Self {
        self.message_type = message_type;
        self
    }

    pub fn payload(mut self, payload: Payload) -> Self {
        self.payload = payload;
        self
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn callback_id(mut self, id: impl Into<String>) -> Self {
        self.callback_id = Some(id.into());
        self
    }

    pub fn correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }

    /// Build the envelope, stamping a fresh id and the current time.
    pub fn build(self) -> Envelope {
        Envelope {
            message_id: generate_id(),
            from_agent: self.from_agent,
            to_agent: self.to_agent,
            message_type: self.message_type,
            timestamp: Utc::now(),
            payload: self.payload,
            callback_id: self.callback_id,
            correlation_id: self.correlation_id,
            priority: self.priority,
        }
    }
}

fn generate_id() -> String {
    ulid::Ulid::new().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload(value: serde_json::Value) -> Payload {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_envelope_creation() {
        let envelope = Envelope::request("orchestrator", "vision", payload(json!({"action": "analyze_ui"})));

        assert_eq!(envelope.from_agent(), "orchestrator");
        assert_eq!(envelope.to_agent(), "vision");
        assert_eq!(envelope.message_type(), MessageType::Request);
        assert_eq!(envelope.priority(), Priority::Normal);
        assert!(!envelope.message_id().is_empty());
        assert!(envelope.correlation_id().is_none());
    }

    #[test]
    fn test_ids_are_unique() {
        let a = Envelope::request("a", "b", Payload::new());
        let b = Envelope::request("a", "b", Payload::new());
        assert_ne!(a.message_id(), b.message_id());
    }

    #[test]
    fn test_reply_links_request() {
        let request = EnvelopeBuilder::from("orchestrator")
            .to("form")
            .correlation_id("booking-42")
            .priority(Priority::High)
            .payload(payload(json!({"task": "fill_form"})))
            .build();
        let response = request.reply(payload(json!({"status": "ok"})));

        assert_eq!(response.from_agent(), "form");
        assert_eq!(response.to_agent(), "orchestrator");
        assert_eq!(response.message_type(), MessageType::Response);
        assert_eq!(response.callback_id(), Some(request.message_id()));
        assert_eq!(response.correlation_id(), Some("booking-42"));
        assert_eq!(response.priority(), Priority::High);
        assert!(response.answers(request.message_id()));
        assert!(!request.answers(request.message_id()));
    }

    #[test]
    fn test_dispatch_key_prefers_action() {
        let both = Envelope::request("a", "b", payload(json!({"task": "t", "action": "a"})));
        assert_eq!(both.dispatch_key(), Some("a"));

        let task_only = Envelope::request("a", "b", payload(json!({"task": "validate"})));
        assert_eq!(task_only.dispatch_key(), Some("validate"));

        let non_string = Envelope::request("a", "b", payload(json!({"action": 3})));
        assert_eq!(non_string.dispatch_key(), None);
    }

    #[test]
    fn test_wire_format() {
        let envelope = EnvelopeBuilder::from("decision")
            .to("validation")
            .message_type(MessageType::Event)
            .priority(Priority::Low)
            .payload(payload(json!({"task": "audit"})))
            .build();

        let value: serde_json::Value = serde_json::from_str(&envelope.to_json().unwrap()).unwrap();
        assert_eq!(value["message_type"], "event");
        assert_eq!(value["priority"], "low");
        assert_eq!(value["to_agent"], "validation");
        assert!(value["callback_id"].is_null());
        assert!(value["timestamp"].is_string());

        let decoded = Envelope::from_json(&envelope.to_json().unwrap()).unwrap();
        assert_eq!(decoded, envelope);
    }

    #[test]
    fn test_missing_optional_fields_default() {
        let raw = r#"{
            "message_id": "m1",
            "from_agent": "a",
            "to_agent": "b",
            "message_type": "request",
            "timestamp": "2025-01-01T00:00:00Z",
            "payload": {"task": "test"}
        }"#;
        let envelope = Envelope::from_json(raw).unwrap();
        assert_eq!(envelope.priority(), Priority::Normal);
        assert!(envelope.callback_id().is_none());
    }
}
