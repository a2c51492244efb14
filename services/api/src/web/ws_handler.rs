//! services/api/src/web/ws_handler.rs
//!
//! This is the main entry point and control loop for a push-channel WebSocket
//! connection. It registers the socket, handles the join handshake, tracks
//! acknowledgments, and tears the socket down on disconnect.

use crate::web::state::AppState;
use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
    Extension,
};
use bookstore_core::domain::AuthUser;
use futures::{SinkExt, StreamExt};
use push_channel::protocol::{ClientFrame, ServerFrame};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::web::registry::CONN_CHANNEL_BUFFER_SIZE;

/// How long a frame may stay unacknowledged before it is logged (not retried).
const ACK_TIMEOUT: Duration = Duration::from_secs(30);
const ACK_SWEEP_INTERVAL: Duration = Duration::from_secs(10);

/// The handler for upgrading HTTP requests to WebSocket connections.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(app_state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, app_state, auth))
}

async fn handle_socket(socket: WebSocket, app_state: Arc<AppState>, auth: AuthUser) {
    info!("New push connection established for user: {}", auth.user_id);

    let (mut sender, mut receiver) = socket.split();

    // All outbound frames go through this channel so the fan-out component
    // never touches the socket directly.
    let (tx, mut rx) = mpsc::channel::<Message>(CONN_CHANNEL_BUFFER_SIZE);
    let conn_id = app_state.registry.register(tx.clone());

    let writer = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if sender.send(msg).await.is_err() {
                break;
            }
        }
    });

    let mut ack_sweep = tokio::time::interval(ACK_SWEEP_INTERVAL);
    ack_sweep.reset();

    loop {
        tokio::select! {
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        handle_client_frame(&text, conn_id, &app_state, auth, &tx).await;
                    }
                    Some(Ok(Message::Close(_))) => {
                        info!("Client sent close message.");
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!("WebSocket error: {e}");
                        break;
                    }
                    None => {
                        info!("Client disconnected.");
                        break;
                    }
                }
            }
            _ = ack_sweep.tick() => {
                for ack_id in app_state.registry.take_stale_acks(conn_id, ACK_TIMEOUT) {
                    warn!(%conn_id, ack_id, "push frame never acknowledged");
                }
            }
        }
    }

    // Cleanup: drop the socket from its room; the client repairs the
    // connection and backfills over REST.
    app_state.registry.unregister(conn_id);
    writer.abort();
    info!("Push connection closed for user: {}", auth.user_id);
}

/// Helper function to handle the logic for different `ClientFrame` variants.
async fn handle_client_frame(
    text: &str,
    conn_id: crate::web::registry::ConnId,
    app_state: &Arc<AppState>,
    auth: AuthUser,
    tx: &mpsc::Sender<Message>,
) {
    let frame = match serde_json::from_str::<ClientFrame>(text) {
        Ok(frame) => frame,
        Err(e) => {
            warn!("Failed to deserialize client frame: {e}");
            return;
        }
    };

    match frame {
        ClientFrame::Join { user_id } => {
            // A socket may only join the room of the user it authenticated as.
            if user_id != auth.user_id {
                warn!(
                    "Join for room {} rejected: socket belongs to {}",
                    user_id, auth.user_id
                );
                send_frame(
                    tx,
                    &ServerFrame::Error {
                        message: "Unauthorized: cannot join another user's room.".to_string(),
                    },
                )
                .await;
                return;
            }

            app_state.registry.join(conn_id, user_id);
            send_frame(tx, &ServerFrame::Joined { user_id }).await;

            // Join-time snapshot so a reconnecting client is current even
            // before its REST backfill lands.
            app_state.push.push_state(user_id).await;
        }
        ClientFrame::Ack { ack_id } => {
            if !app_state.registry.resolve_ack(conn_id, ack_id) {
                warn!(%conn_id, ack_id, "acknowledgment for unknown frame");
            }
        }
    }
}

async fn send_frame(tx: &mpsc::Sender<Message>, frame: &ServerFrame) {
    match serde_json::to_string(frame) {
        Ok(json) => {
            if tx.send(Message::Text(json.into())).await.is_err() {
                warn!("Failed to queue frame for send.");
            }
        }
        Err(e) => warn!("Failed to serialize frame: {e}"),
    }
}
