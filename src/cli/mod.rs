//! CLI commands for vacance-a2a using clap.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};

use crate::card::default_card;
use crate::client::{PollingClient, TaskStatus};
use crate::config::{load_settings_from, load_settings_or_default, Settings};
use crate::task::{connect_task_agent, Context, MemoryTaskRepository, TaskQuery, TaskResolver, TaskService, TaskState};
use crate::transport::{Broker, MemoryBroker};
use crate::web::{run_server, AppState, WebServerConfig};

/// vacance-a2a - Coordination core of the VacanceAI agents.
#[derive(Parser)]
#[command(name = "vacance-a2a")]
#[command(version)]
#[command(about = "Task API, agent card and routing for the VacanceAI agents", long_about = None)]
pub struct Commands {
    /// Settings file (default: ~/.vacance-a2a/settings.json)
    #[arg(long, global = true, env = "VACANCE_A2A_SETTINGS")]
    pub settings: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the task API server
    Serve {
        /// Bind address
        #[arg(long, env = "VACANCE_A2A_HOST")]
        host: Option<String>,

        /// Port
        #[arg(long, short, env = "VACANCE_A2A_PORT")]
        port: Option<u16>,

        /// Ollama-compatible endpoint for the agents
        #[arg(long, env = "VACANCE_A2A_LLM_URL")]
        llm_url: Option<String>,
    },

    /// Fetch the agent card of a remote agent
    Card {
        /// Agent base URL
        #[arg(long, env = "VACANCE_A2A_URL")]
        url: Option<String>,
    },

    /// Task commands against a remote agent
    Task {
        /// Agent base URL
        #[arg(long, global = true, env = "VACANCE_A2A_URL")]
        url: Option<String>,

        #[command(subcommand)]
        command: TaskCommand,
    },

    /// Print the effective settings
    Config,
}

#[derive(Subcommand)]
pub enum TaskCommand {
    /// Create a task
    Create {
        /// Message
        message: String,

        /// Skill ID
        #[arg(long)]
        skill: Option<String>,

        /// Context as a JSON object
        #[arg(long)]
        context: Option<String>,

        /// Wait for a terminal state
        #[arg(long)]
        wait: bool,
    },

    /// Show a task
    Get {
        /// Task ID
        task_id: String,
    },

    /// Cancel a task
    Cancel {
        /// Task ID
        task_id: String,
    },

    /// List tasks
    List {
        /// State filter
        #[arg(long)]
        state: Option<TaskState>,

        #[arg(long, default_value = "20")]
        limit: usize,

        #[arg(long, default_value = "0")]
        offset: usize,
    },

    /// Poll a task until it finishes
    Wait {
        /// Task ID
        task_id: String,

        /// Poll interval in milliseconds
        #[arg(long)]
        interval_ms: Option<u64>,

        /// Give up after this many seconds
        #[arg(long)]
        max_wait: Option<u64>,
    },

    /// Send a follow-up message
    Message {
        /// Task ID
        task_id: String,

        /// Message
        message: String,
    },
}

impl Commands {
    /// Run the command.
    pub async fn run(&self) -> Result<()> {
        let settings = self.load_settings()?;
        match &self.command {
            Command::Serve { host, port, llm_url } => {
                cmd_serve(settings, host.clone(), *port, llm_url.clone()).await
            }
            Command::Card { url } => cmd_card(&settings, url.as_deref()).await,
            Command::Task { url, command } => cmd_task(&settings, url.as_deref(), command).await,
            Command::Config => cmd_config(&settings),
        }
    }

    fn load_settings(&self) -> Result<Settings> {
        match &self.settings {
            Some(path) => load_settings_from(path)
                .with_context(|| format!("Failed to load settings from {}", path.display())),
            None => Ok(load_settings_or_default()),
        }
    }
}

// Command implementations

async fn cmd_serve(
    mut settings: Settings,
    host: Option<String>,
    port: Option<u16>,
    llm_url: Option<String>,
) -> Result<()> {
    if let Some(host) = host {
        settings.server.host = host;
    }
    if let Some(port) = port {
        settings.server.port = port;
    }
    if llm_url.is_some() {
        settings.llm.base_url = llm_url;
    }

    let resolver: Option<Arc<dyn TaskResolver>> = match crate::orchestrator::from_settings(&settings.llm)? {
        Some(orchestrator) => {
            tracing::info!("Agents backed by {}", settings.llm.base_url.as_deref().unwrap_or_default());
            Some(Arc::new(orchestrator))
        }
        None => {
            tracing::warn!("No llm.base_url configured; tasks complete in degraded echo mode");
            None
        }
    };

    let service = TaskService::new(Arc::new(MemoryTaskRepository::new()), resolver)
        .with_retention(settings.tasks.retention());
    spawn_pruner(service.clone(), Duration::from_secs(settings.tasks.prune_interval_seconds.max(1)));

    let broker: Arc<dyn Broker> = Arc::new(MemoryBroker::from_settings(&settings.transport));
    let mut agent = connect_task_agent(&settings.transport, broker, service.clone()).await?;
    tracing::info!("Task agent listening on {}", agent.channel());
    tokio::spawn(async move {
        if let Err(e) = agent.listen().await {
            tracing::error!("Task agent stopped: {}", e);
        }
    });

    let card = default_card(&settings);
    println!("Serving {} at {}", card.name, card.url);

    run_server(WebServerConfig::from(&settings.server), AppState::new(service, card)).await?;
    Ok(())
}

fn spawn_pruner(service: TaskService, every: Duration) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            if let Err(e) = service.prune().await {
                tracing::error!("Task pruning failed: {}", e);
            }
        }
    });
}

fn client(settings: &Settings, url: Option<&str>) -> Result<PollingClient> {
    let mut client_settings = settings.client.clone();
    if let Some(url) = url {
        client_settings.base_url = url.to_string();
    }
    Ok(PollingClient::from_settings(&client_settings)?)
}

async fn cmd_card(settings: &Settings, url: Option<&str>) -> Result<()> {
    let client = client(settings, url)?;
    let card = client.get_agent_card().await?;

    println!("{} v{}", card.name, card.version);
    println!("  {}", card.description);
    println!("  url: {}", card.url);
    println!("Skills:");
    for skill in &card.skills {
        println!("  {:<20} {}", skill.id, skill.description);
    }
    Ok(())
}

async fn cmd_task(settings: &Settings, url: Option<&str>, command: &TaskCommand) -> Result<()> {
    let client = client(settings, url)?;

    match command {
        TaskCommand::Create {
            message,
            skill,
            context,
            wait,
        } => {
            let context = context.as_deref().map(parse_context).transpose()?;
            let task = client
                .create_task(message, skill.as_deref(), context.as_ref())
                .await?;
            println!("Created task {} ({})", task.id, task.state);
            if *wait {
                print_status(&client.wait(&task.id).await?);
            }
        }
        TaskCommand::Get { task_id } => {
            let task = client.get_task_detail(task_id).await?;
            println!("{}", serde_json::to_string_pretty(&task)?);
        }
        TaskCommand::Cancel { task_id } => {
            print_status(&client.cancel_task(task_id).await?);
        }
        TaskCommand::List { state, limit, offset } => {
            let page = client
                .list_tasks(&TaskQuery {
                    state: *state,
                    limit: *limit,
                    offset: *offset,
                })
                .await?;
            if page.tasks.is_empty() {
                println!("No tasks found.");
            }
            for task in &page.tasks {
                println!(
                    "{}  {:<10} {}  {}",
                    task.id,
                    task.state,
                    task.created_at.format("%Y-%m-%d %H:%M:%S"),
                    truncate(&task.input.message, 60)
                );
            }
            println!("{} of {} (offset {})", page.tasks.len(), page.total, page.offset);
        }
        TaskCommand::Wait {
            task_id,
            interval_ms,
            max_wait,
        } => {
            let interval = interval_ms
                .map(Duration::from_millis)
                .unwrap_or_else(|| settings.client.poll_interval());
            let max_wait = max_wait
                .map(Duration::from_secs)
                .unwrap_or_else(|| settings.client.max_wait());
            print_status(&client.wait_for_completion(task_id, interval, max_wait).await?);
        }
        TaskCommand::Message { task_id, message } => {
            let task = client.send_message(task_id, message).await?;
            println!("Task {} now has {} messages", task.id, task.messages.len());
        }
    }
    Ok(())
}

fn cmd_config(settings: &Settings) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(settings)?);
    Ok(())
}

fn parse_context(raw: &str) -> Result<Context> {
    let value: serde_json::Value = serde_json::from_str(raw).context("--context must be JSON")?;
    match value {
        serde_json::Value::Object(map) => Ok(map),
        _ => anyhow::bail!("--context must be a JSON object"),
    }
}

fn print_status(status: &TaskStatus) {
    println!("Task {}: {}", status.id, status.state);
    if let Some(output) = &status.output {
        println!("{}", output.message);
    }
    if let Some(error) = &status.error {
        println!("Error: {}", error);
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let cut: String = s.chars().take(max.saturating_sub(3)).collect();
    format!("{}...", cut)
}
