//! Configuration loading for vacance-a2a.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};

/// Get the vacance-a2a home directory (~/.vacance-a2a).
pub fn get_home_dir() -> Result<PathBuf> {
    let home = directories::UserDirs::new()
        .ok_or_else(|| Error::Config("Could not determine home directory".to_string()))?;

    Ok(home.home_dir().join(".vacance-a2a"))
}

/// Get the settings file path.
pub fn get_settings_path() -> Result<PathBuf> {
    Ok(get_home_dir()?.join("settings.json"))
}

/// Load settings from ~/.vacance-a2a/settings.json
pub fn load_settings() -> Result<Settings> {
    load_settings_from(&get_settings_path()?)
}

/// Load and validate settings from an explicit file.
pub fn load_settings_from(path: &Path) -> Result<Settings> {
    if !path.exists() {
        return Err(Error::Config(format!(
            "Settings file not found at {}",
            path.display()
        )));
    }

    let content = std::fs::read_to_string(path)?;
    let settings: Settings = serde_json::from_str(&content)?;
    validate_settings(&settings)?;

    tracing::debug!("Loaded settings from {}", path.display());
    Ok(settings)
}

/// Load settings or return default if not found.
pub fn load_settings_or_default() -> Settings {
    load_settings().unwrap_or_else(|e| {
        tracing::warn!("Failed to load settings: {}, using defaults", e);
        Settings::default()
    })
}

fn validate_settings(settings: &Settings) -> Result<()> {
    if settings.transport.channel_prefix.is_empty() || settings.transport.channel_prefix.contains(':') {
        return Err(Error::Config(format!(
            "transport.channel_prefix '{}' must be non-empty and contain no ':'",
            settings.transport.channel_prefix
        )));
    }
    if settings.transport.capacity == 0 {
        return Err(Error::Config("transport.capacity must be positive".to_string()));
    }
    if settings.client.poll_interval_ms == 0 {
        return Err(Error::Config("client.poll_interval_ms must be positive".to_string()));
    }
    if settings.tasks.max_tasks == Some(0) {
        return Err(Error::Config("tasks.max_tasks must be positive when set".to_string()));
    }
    Ok(())
}

/// Identity advertised in the agent card.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct AgentSettings {
    #[serde(default = "default_agent_name")]
    pub name: String,
    #[serde(default = "default_agent_description")]
    pub description: String,
    /// Public URL; defaults to the bound server address.
    pub url: Option<String>,
    #[serde(default = "default_agent_version")]
    pub version: String,
}

fn default_agent_name() -> String {
    "vacanceai-orchestrator".to_string()
}

fn default_agent_description() -> String {
    "VacanceAI Orchestrator Agent - Routes requests to specialized agents".to_string()
}

fn default_agent_version() -> String {
    "1.0.0".to_string()
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            name: default_agent_name(),
            description: default_agent_description(),
            url: None,
            version: default_agent_version(),
        }
    }
}

/// Pub/sub transport configuration.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct TransportSettings {
    #[serde(default = "default_channel_prefix")]
    pub channel_prefix: String,
    /// Per-channel buffer before slow listeners start losing messages.
    #[serde(default = "default_capacity")]
    pub capacity: usize,
}

fn default_channel_prefix() -> String {
    "agent".to_string()
}

fn default_capacity() -> usize {
    crate::transport::memory::DEFAULT_CAPACITY
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            channel_prefix: default_channel_prefix(),
            capacity: default_capacity(),
        }
    }
}

/// HTTP server configuration.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Task retention.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct TaskSettings {
    #[serde(default = "default_retention_seconds")]
    pub retention_seconds: u64,
    #[serde(default = "default_max_tasks")]
    pub max_tasks: Option<usize>,
    #[serde(default = "default_prune_interval_seconds")]
    pub prune_interval_seconds: u64,
}

fn default_retention_seconds() -> u64 {
    3600
}

fn default_max_tasks() -> Option<usize> {
    Some(10_000)
}

fn default_prune_interval_seconds() -> u64 {
    60
}

impl Default for TaskSettings {
    fn default() -> Self {
        Self {
            retention_seconds: default_retention_seconds(),
            max_tasks: default_max_tasks(),
            prune_interval_seconds: default_prune_interval_seconds(),
        }
    }
}

impl TaskSettings {
    pub fn retention(&self) -> crate::task::RetentionPolicy {
        crate::task::RetentionPolicy {
            max_age: Duration::from_secs(self.retention_seconds),
            max_tasks: self.max_tasks,
        }
    }
}

/// Polling client defaults.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ClientSettings {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_max_wait_seconds")]
    pub max_wait_seconds: u64,
    #[serde(default = "default_request_timeout_seconds")]
    pub request_timeout_seconds: u64,
}

fn default_base_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_max_wait_seconds() -> u64 {
    60
}

fn default_request_timeout_seconds() -> u64 {
    30
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            poll_interval_ms: default_poll_interval_ms(),
            max_wait_seconds: default_max_wait_seconds(),
            request_timeout_seconds: default_request_timeout_seconds(),
        }
    }
}

impl ClientSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn max_wait(&self) -> Duration {
        Duration::from_secs(self.max_wait_seconds)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }
}

/// Ollama-compatible chat endpoint backing the two agents.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct LlmSettings {
    /// Unset means no agents: tasks complete in degraded echo mode.
    pub base_url: Option<String>,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_llm_timeout_seconds")]
    pub timeout_seconds: u64,
}

fn default_model() -> String {
    "llama3.2".to_string()
}

fn default_llm_timeout_seconds() -> u64 {
    120
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            base_url: None,
            model: default_model(),
            timeout_seconds: default_llm_timeout_seconds(),
        }
    }
}

/// vacance-a2a settings.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct Settings {
    #[serde(default)]
    pub agent: AgentSettings,

    #[serde(default)]
    pub transport: TransportSettings,

    #[serde(default)]
    pub server: ServerSettings,

    #[serde(default)]
    pub tasks: TaskSettings,

    #[serde(default)]
    pub client: ClientSettings,

    #[serde(default)]
    pub llm: LlmSettings,
}

impl Settings {
    /// URL advertised in the agent card.
    pub fn public_url(&self) -> String {
        self.agent.url.clone().unwrap_or_else(|| {
            let host = if self.server.host == "0.0.0.0" {
                "localhost"
            } else {
                self.server.host.as_str()
            };
            format!("http://{}:{}", host, self.server.port)
        })
    }
}
