use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    http::StatusCode,
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tracing::{info, warn};

use crate::app::AppState;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WsParams {
    pub user_id: Option<String>,
}

/// Axum handler — upgrades HTTP to WebSocket at GET /ws?userId=…
///
/// Subscription is per user: the connection is registered on upgrade and
/// dropped on disconnect; proactive frames for that user are pushed here.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<WsParams>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let Some(user_id) = params.user_id.filter(|u| !u.trim().is_empty()) else {
        return (StatusCode::BAD_REQUEST, "userId query parameter is required").into_response();
    };
    ws.on_upgrade(move |socket| handle_connection(socket, state, user_id))
}

/// Runs for the lifetime of one WebSocket connection.
async fn handle_connection(socket: WebSocket, state: Arc<AppState>, user_id: String) {
    let conn_id = uuid::Uuid::new_v4().to_string();
    info!(conn_id = %conn_id, user_id = %user_id, "new push subscriber");

    let mut push_rx = state.push.subscribe(&user_id, &conn_id);
    let (mut tx, mut rx) = socket.split();

    loop {
        tokio::select! {
            // proactive frame → forward to this client
            frame = push_rx.recv() => {
                match frame {
                    Some(payload) => {
                        if tx.send(Message::Text(payload.into())).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }

            // client sent us something — the push channel is one-way, so
            // only connection lifecycle messages matter
            msg = rx.next() => {
                match msg {
                    Some(Ok(Message::Ping(data))) => {
                        let _ = tx.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        warn!(conn_id = %conn_id, error = %e, "ws receive error");
                        break;
                    }
                    _ => {}
                }
            }
        }
    }

    state.push.unsubscribe(&user_id, &conn_id);
    info!(conn_id = %conn_id, user_id = %user_id, "push subscriber disconnected");
}
