//! WebSocket push channel.
//!
//! Each socket is registered with the delivery engine for its whole lifetime.
//! A writer task forwards broadcast frames to the client; the reader loop hands
//! text frames to the acknowledgment handler. Whichever side finishes first
//! tears the other down.

use axum::Router;
use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use axum::routing::get;
use futures_util::{SinkExt, StreamExt};

use linkcast_delivery::DeliveryHandle;
use linkcast_delivery::ack::handle_text_frame;

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/", get(ws_handler))
}

/// GET /ws — Upgrade to a push-channel connection.
async fn ws_handler(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state.delivery))
}

async fn handle_socket(socket: WebSocket, delivery: DeliveryHandle) {
    let (connection_id, mut frames) = match delivery.connect().await {
        Ok(connection) => connection,
        Err(e) => {
            tracing::warn!(error = %e, "Rejecting WebSocket connection");
            return;
        }
    };
    tracing::info!(connection_id = %connection_id, "New WebSocket connection established");

    let (mut sink, mut stream) = socket.split();

    let mut writer = tokio::spawn(async move {
        while let Some(frame) = frames.recv().await {
            if let Err(e) = sink.send(Message::Text(String::from(&*frame).into())).await {
                tracing::debug!(error = %e, "WebSocket send failed");
                return;
            }
        }
        // Engine released this connection.
        let _ = sink.send(Message::Close(None)).await;
    });

    let inbound = delivery.clone();
    let mut reader = tokio::spawn(async move {
        while let Some(message) = stream.next().await {
            match message {
                Ok(Message::Text(text)) => {
                    if let Err(e) = handle_text_frame(&inbound, text.as_str()).await {
                        tracing::warn!(error = %e, "Dropping inbound frame");
                        break;
                    }
                }
                Ok(Message::Close(_)) => break,
                Ok(_) => {}
                Err(e) => {
                    tracing::debug!(error = %e, "WebSocket receive failed");
                    break;
                }
            }
        }
    });

    tokio::select! {
        _ = &mut writer => reader.abort(),
        _ = &mut reader => writer.abort(),
    }

    let _ = delivery.disconnect(connection_id).await;
    tracing::info!(connection_id = %connection_id, "WebSocket connection closed");
}
