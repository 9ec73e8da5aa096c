//! HTTP server setup and routing

use axum::{
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tracing::{error, info};

use crate::config::UiConfig;
use crate::error::{Error, Result};
use crate::player::PlayerHandle;

/// Shared state passed to all handlers
pub struct AppState {
    pub player: PlayerHandle,
    /// Stream URI shown in status
    pub stream: String,
    pub started: Instant,
}

/// Control surface for one player
pub struct WebServer {
    config: UiConfig,
    state: Arc<AppState>,
}

impl WebServer {
    pub fn new(config: UiConfig, player: PlayerHandle, stream: impl Into<String>) -> Self {
        Self {
            config,
            state: Arc::new(AppState {
                player,
                stream: stream.into(),
                started: Instant::now(),
            }),
        }
    }

    /// All routes, with state attached
    pub fn router(&self) -> Router {
        Router::new()
            .route("/api/status", get(super::handlers::get_status))
            .route("/api/play", post(super::handlers::play))
            .route("/api/pause", post(super::handlers::pause))
            .route("/api/stop", post(super::handlers::stop))
            .route("/ws", get(super::websocket::ws_handler))
            .with_state(self.state.clone())
            .layer(CorsLayer::permissive())
    }

    pub fn addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.config.bind_address, self.config.http_port)
            .parse()
            .map_err(|e| Error::Config(format!("invalid ui bind address: {}", e)))
    }

    /// Serve until the listener fails
    pub async fn run(self) -> Result<()> {
        let addr = self.addr()?;
        let app = self.router();

        let listener = tokio::net::TcpListener::bind(addr).await?;
        info!("Web UI listening on http://{}", addr);

        axum::serve(listener, app).await?;
        Ok(())
    }

    /// Serve on a background task
    pub fn start_background(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            if let Err(e) = self.run().await {
                error!("Web UI stopped: {}", e);
            }
        })
    }
}
