//! vacance-a2a library root.
//!
//! Coordination core of the VacanceAI agents: an envelope pub/sub transport
//! with a per-agent runtime, an asynchronous task API with agent-card
//! discovery, an orchestrator routing requests to the data or interactive
//! agent, and a polling client.

pub mod card;
pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod logging;
pub mod orchestrator;
pub mod protocol;
pub mod task;
pub mod transport;
pub mod web;

pub use card::{default_card, AgentCard, AgentCapabilities, Skill};
pub use cli::Commands;
pub use client::{PollingClient, TaskStatus};
pub use config::{load_settings, Settings};
pub use error::{Error, Result};
pub use orchestrator::{classify, AgentKind, Orchestrator};
pub use protocol::{Envelope, EnvelopeBuilder, MessageType, Priority};
pub use task::{Task, TaskService, TaskState};
pub use transport::{AgentRuntime, Broker, MemoryBroker};
pub use web::{create_app_router, run_server, AppState};
