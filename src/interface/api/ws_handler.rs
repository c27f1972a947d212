//! WebSocket notification streaming handler

use super::softphone_handler::AppState;
use crate::application::Notification;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, error, info, warn};

/// WebSocket handler
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    let notifications = state.softphone.subscribe();
    ws.on_upgrade(move |socket| handle_socket(socket, notifications))
}

/// Handle WebSocket connection
async fn handle_socket(socket: WebSocket, mut rx: broadcast::Receiver<Notification>) {
    let (mut sender, mut receiver) = socket.split();

    info!("Agent UI connected to notifications");

    let mut send_task = tokio::spawn(async move {
        loop {
            let notification = match rx.recv().await {
                Ok(notification) => notification,
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Notification stream lagged; {} dropped", skipped);
                    continue;
                }
                Err(RecvError::Closed) => break,
            };
            match serde_json::to_string(&notification) {
                Ok(json) => {
                    if sender.send(Message::Text(json)).await.is_err() {
                        debug!("Failed to send notification to WebSocket client");
                        break;
                    }
                }
                Err(e) => {
                    error!("Failed to serialize notification: {}", e);
                }
            }
        }
    });

    // The UI only listens; incoming frames are drained until close
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            if let Message::Close(_) = msg {
                debug!("Received close message");
                break;
            }
        }
    });

    tokio::select! {
        _ = (&mut send_task) => recv_task.abort(),
        _ = (&mut recv_task) => send_task.abort(),
    }

    info!("Agent UI disconnected from notifications");
}
