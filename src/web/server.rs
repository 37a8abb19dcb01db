//! Web server using Axum.

use std::net::SocketAddr;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use super::{router::create_app_router, AppState};
use crate::config::ServerSettings;
use crate::error::{Error, Result};

/// Largest accepted request body.
const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Web server configuration.
pub struct WebServerConfig {
    pub port: u16,
    pub host: String,
}

impl Default for WebServerConfig {
    fn default() -> Self {
        Self {
            port: 8000,
            host: "0.0.0.0".to_string(),
        }
    }
}

impl From<&ServerSettings> for WebServerConfig {
    fn from(settings: &ServerSettings) -> Self {
        Self {
            port: settings.port,
            host: settings.host.clone(),
        }
    }
}

/// Run the web server until the process is stopped.
pub async fn run_server(config: WebServerConfig, state: AppState) -> Result<()> {
    let app = create_app_router(state)
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .map_err(|e| Error::Config(format!("Invalid address: {}", e)))?;

    tracing::info!("Starting task API on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app).await?;

    Ok(())
}
