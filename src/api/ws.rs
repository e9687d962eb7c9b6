//! WebSocket transport for the notification hub (GET /ws)

use std::sync::Arc;

use axum::extract::ws::Message;
use axum::extract::ws::WebSocket;
use axum::extract::State;
use axum::extract::WebSocketUpgrade;
use axum::response::Response;
use futures::SinkExt;
use futures::StreamExt;
use tracing::debug;

use crate::api::handlers::AppState;
use crate::notify::NotificationHub;
use crate::notify::SessionHandle;

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state.hub))
}

/// Pump hub messages out and client frames in until either side stops
async fn handle_socket(socket: WebSocket, hub: Arc<NotificationHub>) {
    let SessionHandle {
        client_id,
        mut receiver,
    } = hub.connect().await;
    let (mut sink, mut stream) = socket.split();

    let mut writer = tokio::spawn(async move {
        while let Some(text) = receiver.recv().await {
            if sink.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
    });

    let reader_hub = Arc::clone(&hub);
    let mut reader = tokio::spawn(async move {
        while let Some(Ok(frame)) = stream.next().await {
            match frame {
                Message::Text(text) => reader_hub.handle_client_message(client_id, &text).await,
                Message::Close(_) => break,
                // Ping/pong frames are answered by the transport
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut writer => reader.abort(),
        _ = &mut reader => writer.abort(),
    }

    debug!("WebSocket for client {} closed", client_id);
    hub.disconnect(client_id).await;
}
