// WebSocket endpoint for live verification and match updates.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::Response;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::errors::ApiError;
use crate::hub::{Subscription, WsEnvelope};
use crate::server::http::authenticate;
use crate::server::AppState;

#[derive(Debug, Deserialize)]
pub struct VerifyWsQuery {
    pub game_slug: Option<String>,
}

/// `GET /v1/bots/verification`: upgrade and subscribe the caller to status
/// updates for their bots, optionally narrowed to one game.
pub async fn verify_ws(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<VerifyWsQuery>,
) -> Result<Response, ApiError> {
    let session = authenticate(&state, &headers).await?;
    let sub = Subscription {
        user_id: session.id,
        game_slug: query.game_slug.unwrap_or_default(),
        session_id: Uuid::new_v4().to_string(),
    };
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, sub)))
}

/// Session task pair: a writer pushing hub messages out, and this task
/// reaping the socket until the client goes away.
async fn handle_socket(socket: WebSocket, state: AppState, sub: Subscription) {
    tracing::info!(
        user_id = sub.user_id,
        game_slug = %sub.game_slug,
        session_id = %sub.session_id,
        "status subscriber connected"
    );

    let updates = state.hub.register(sub.clone()).await;
    let (sender, receiver) = socket.split();
    let writer = tokio::spawn(write_status_updates(sender, updates));

    wait_for_close(receiver).await;

    // dropping the table entry closes the update channel, ending the writer
    state.hub.unregister(sub.clone()).await;
    let _ = writer.await;

    tracing::info!(session_id = %sub.session_id, "status subscriber disconnected");
}

async fn write_status_updates(
    mut sender: SplitSink<WebSocket, Message>,
    mut updates: broadcast::Receiver<WsEnvelope>,
) {
    loop {
        match updates.recv().await {
            Ok(envelope) => match serde_json::to_string(&envelope) {
                Ok(text) => {
                    if sender.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
                Err(error) => {
                    tracing::error!(%error, "serializing status update");
                }
            },
            // the session fell behind and the channel dropped old updates
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                tracing::warn!(missed, "status subscriber lagging");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
    let _ = sender.close().await;
}

/// Inbound payloads are ignored; the socket only matters as a liveness
/// signal.
async fn wait_for_close(mut receiver: SplitStream<WebSocket>) {
    while let Some(message) = receiver.next().await {
        match message {
            Ok(Message::Close(_)) | Err(_) => break,
            Ok(_) => {}
        }
    }
}
