//! HTTP transport (§6): `POST /api/command`, `GET /api/events`
//! (WebSocket broadcast), `GET /health`, `POST /api/shutdown`.

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};

use nerve_protocol::{Command, CommandResult, EventFrame};

use crate::state::GatewayState;

pub fn router(state: GatewayState) -> Router {
    Router::new()
        .route("/api/command", post(command))
        .route("/api/events", get(events))
        .route("/health", get(health))
        .route("/api/shutdown", post(shutdown))
        .with_state(state)
}

async fn command(State(state): State<GatewayState>, Json(cmd): Json<Command>) -> Json<CommandResult> {
    Json(state.engine.execute(cmd).await)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn shutdown(State(state): State<GatewayState>) -> Json<Value> {
    tracing::info!("shutdown requested via /api/shutdown");
    state.shutdown.notify_one();
    Json(json!({ "shutting_down": true }))
}

async fn events(ws: WebSocketUpgrade, State(state): State<GatewayState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| broadcast_events(socket, state))
}

async fn broadcast_events(socket: WebSocket, state: GatewayState) {
    let (mut ws_sink, mut ws_stream) = socket.split();
    let mut rx = state.sink.subscribe();

    // Reader side only exists to notice the client closing the
    // connection; `GET /api/events` never reads anything meaningful
    // from the client. Its exit races the writer loop below via the
    // send failure that follows a dropped connection.
    let reader = tokio::spawn(async move { while matches!(ws_stream.next().await, Some(Ok(_))) {} });

    loop {
        match rx.recv().await {
            Ok(event) => {
                let frame: EventFrame = event.into();
                let Ok(text) = serde_json::to_string(&frame) else { continue };
                if ws_sink.send(Message::Text(text)).await.is_err() {
                    break;
                }
            }
            Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
            Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
        }
    }

    reader.abort();
}
