//! WebSocket event feed
//!
//! Each socket is one observer. It receives the current state immediately and
//! then every published event as JSON. Text frames `play`, `pause` and `stop`
//! are accepted as commands.

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::player::{ObserverId, PlayerEvent};
use crate::ui::server::AppState;

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(mut socket: WebSocket, state: Arc<AppState>) {
    let id = ObserverId::random();
    let mut events = state.player.subscribe(id.clone());
    info!("WebSocket observer {} connected", id);

    let snapshot = PlayerEvent::StateChanged(state.player.current());
    if !send_event(&mut socket, &snapshot).await {
        state.player.unsubscribe(&id);
        return;
    }

    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else { break };
                if !send_event(&mut socket, &event).await {
                    break;
                }
            }
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => handle_command(&state, text.trim()),
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    state.player.unsubscribe(&id);
    info!("WebSocket observer {} disconnected", id);
}

fn handle_command(state: &AppState, command: &str) {
    let result = match command {
        "play" => state.player.play(),
        "pause" => state.player.pause(),
        "stop" => state.player.stop(),
        other => {
            warn!("Unknown WebSocket command {:?}", other);
            return;
        }
    };
    if let Err(e) = result {
        warn!("WebSocket command {} failed: {}", command, e);
    }
}

async fn send_event(socket: &mut WebSocket, event: &PlayerEvent) -> bool {
    let json = match serde_json::to_string(event) {
        Ok(json) => json,
        Err(e) => {
            warn!("Failed to serialize event: {}", e);
            return true;
        }
    };
    if socket.send(Message::Text(json)).await.is_err() {
        debug!("WebSocket send failed; closing");
        return false;
    }
    true
}
