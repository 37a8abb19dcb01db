//! Web server module (Axum + task API).

use std::sync::Arc;

use crate::card::AgentCard;
use crate::task::TaskService;

pub mod api;
pub mod router;
pub mod server;

pub use router::create_app_router;
pub use server::{run_server, WebServerConfig};

/// Shared state of every handler.
#[derive(Clone)]
pub struct AppState {
    pub service: TaskService,
    pub card: Arc<AgentCard>,
}

impl AppState {
    pub fn new(service: TaskService, card: AgentCard) -> Self {
        Self {
            service,
            card: Arc::new(card),
        }
    }
}
