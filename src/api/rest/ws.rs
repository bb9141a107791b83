use std::collections::HashSet;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use futures::SinkExt;
use futures::StreamExt;
use serde::Deserialize;
use tracing::{info, warn};

use crate::state::AppState;

#[derive(Deserialize)]
pub struct WsParams {
    /// Comma-separated room names (`ride:<id>`, `driver:<id>`, `user:<id>`,
    /// `drivers`, `passengers`). No rooms means every event.
    pub rooms: Option<String>,
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<WsParams>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let rooms: Option<HashSet<String>> = params.rooms.map(|raw| {
        raw.split(',')
            .map(|room| room.trim().to_string())
            .filter(|room| !room.is_empty())
            .collect()
    });

    ws.on_upgrade(move |socket| handle_socket(socket, state, rooms))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>, rooms: Option<HashSet<String>>) {
    let (mut sender, mut receiver) = socket.split();
    let mut rx = state.notifier.subscribe();

    info!("websocket client connected");

    let send_task = tokio::spawn(async move {
        while let Ok(event) = rx.recv().await {
            if let Some(rooms) = &rooms {
                if !rooms.contains(&event.room) {
                    continue;
                }
            }

            let json = match serde_json::to_string(&event) {
                Ok(json) => json,
                Err(err) => {
                    warn!(error = %err, "failed to serialize event for ws");
                    continue;
                }
            };

            if sender.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
    });

    let recv_task = tokio::spawn(async move {
        while let Some(Ok(_msg)) = receiver.next().await {}
    });

    tokio::select! {
        _ = send_task => {},
        _ = recv_task => {},
    }

    info!("websocket client disconnected");
}
