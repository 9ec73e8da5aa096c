//! HTTP API handlers

use axum::{extract::State, http::StatusCode, Json};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::PlayerError;
use crate::player::{PlaybackState, StateChange};
use crate::ui::server::AppState;

/// API response wrapper
#[derive(Debug, serde::Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(msg.into()),
        }
    }
}

/// Player status
#[derive(Debug, serde::Serialize)]
pub struct PlayerStatus {
    pub state: PlaybackState,
    pub last_change: StateChange,
    pub stream: String,
    pub observers: usize,
    pub dropped_events: u64,
    pub uptime_seconds: u64,
}

/// Get player status
pub async fn get_status(State(state): State<Arc<AppState>>) -> Json<ApiResponse<PlayerStatus>> {
    let publisher = state.player.publisher();
    let last_change = publisher.current();

    let status = PlayerStatus {
        state: last_change.state,
        last_change,
        stream: state.stream.clone(),
        observers: publisher.subscriber_count(),
        dropped_events: publisher.dropped_count(),
        uptime_seconds: state.started.elapsed().as_secs(),
    };

    Json(ApiResponse::ok(status))
}

fn command_failed(e: PlayerError) -> (StatusCode, Json<ApiResponse<()>>) {
    let status = match e {
        PlayerError::FocusDenied => StatusCode::CONFLICT,
        PlayerError::InvalidSource(_) => StatusCode::BAD_REQUEST,
        PlayerError::Transport(_) => StatusCode::BAD_GATEWAY,
        PlayerError::Closed => StatusCode::SERVICE_UNAVAILABLE,
    };
    warn!("Command rejected: {}", e);
    (status, Json(ApiResponse::error(e.to_string())))
}

/// Start playback; waits for the focus verdict
pub async fn play(State(state): State<Arc<AppState>>) -> (StatusCode, Json<ApiResponse<()>>) {
    debug!("POST /api/play");
    match state.player.request_play().await {
        Ok(()) => (StatusCode::OK, Json(ApiResponse::ok(()))),
        Err(e) => command_failed(e),
    }
}

/// Pause playback
pub async fn pause(State(state): State<Arc<AppState>>) -> (StatusCode, Json<ApiResponse<()>>) {
    debug!("POST /api/pause");
    match state.player.pause() {
        Ok(()) => (StatusCode::ACCEPTED, Json(ApiResponse::ok(()))),
        Err(e) => command_failed(e),
    }
}

/// Stop playback
pub async fn stop(State(state): State<Arc<AppState>>) -> (StatusCode, Json<ApiResponse<()>>) {
    debug!("POST /api/stop");
    match state.player.stop() {
        Ok(()) => (StatusCode::ACCEPTED, Json(ApiResponse::ok(()))),
        Err(e) => command_failed(e),
    }
}
