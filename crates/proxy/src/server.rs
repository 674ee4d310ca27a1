//! The HTTP surface each proxy instance serves on its ephemeral port
//! (§4.13): `POST /v1/messages` (passthrough or transform, depending
//! on the node's configured provider), `GET /health`, and the
//! accepted-but-ignored event-logging sink some CLIs call
//! unconditionally.

use std::sync::Arc;

use axum::extract::State;
use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use axum::response::{IntoResponse, Json};
use axum::routing::{get, post};
use axum::Router;
use futures_util::stream::Stream;
use serde_json::{json, Value};

use nerve_domain::config::{ProviderSpec, ProxyConfig};
use nerve_domain::error::Error;

use crate::passthrough::PassthroughProxy;
use crate::tool_id_mapper::ToolIdMapper;
use crate::transform::{self, AnthropicSseEncoder};

#[derive(Clone, Copy, PartialEq, Eq)]
pub enum ProxyKind {
    Passthrough,
    Transform,
}

#[derive(Clone)]
struct AppState {
    kind: ProxyKind,
    provider: Arc<ProviderSpec>,
    passthrough: Arc<PassthroughProxy>,
    client: reqwest::Client,
    mapper: Arc<ToolIdMapper>,
}

pub fn build_router(kind: ProxyKind, provider: ProviderSpec, config: Arc<ProxyConfig>) -> Router {
    let provider = Arc::new(provider);
    let passthrough = Arc::new(PassthroughProxy::new(provider.base_url.clone(), provider.api_key.clone(), provider.model.clone(), &config));
    let state = AppState { kind, provider, passthrough, client: reqwest::Client::new(), mapper: Arc::new(ToolIdMapper::new()) };

    Router::new()
        .route("/v1/messages", post(messages))
        .route("/health", get(health))
        .route("/api/event_logging/batch", post(event_logging_batch))
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

async fn event_logging_batch() -> impl IntoResponse {
    Json(json!({ "accepted": true }))
}

async fn messages(State(state): State<AppState>, Json(body): Json<Value>) -> axum::response::Response {
    match state.kind {
        ProxyKind::Passthrough => passthrough_messages(state, body).await,
        ProxyKind::Transform => transform_messages(state, body).await,
    }
}

async fn passthrough_messages(state: AppState, body: Value) -> axum::response::Response {
    match state.passthrough.forward(body).await {
        Ok((status, value)) => {
            let code = axum::http::StatusCode::from_u16(status).unwrap_or(axum::http::StatusCode::BAD_GATEWAY);
            (code, Json(value)).into_response()
        }
        Err(e) => error_response(&e),
    }
}

async fn transform_messages(state: AppState, body: Value) -> axum::response::Response {
    let streaming = body.get("stream").and_then(Value::as_bool).unwrap_or(false);
    let openai_body = transform::anthropic_request_to_openai(&body, state.provider.model.as_deref(), &state.mapper);

    let request = state
        .client
        .post(format!("{}/chat/completions", state.provider.base_url))
        .bearer_auth(&state.provider.api_key)
        .json(&openai_body);

    if streaming {
        return stream_transform_response(request, state.mapper.clone()).await;
    }

    let resp = match request.send().await {
        Ok(r) => r,
        Err(e) => return error_response(&Error::Http(e.to_string())),
    };
    let status = resp.status();
    let value: Value = match resp.json().await {
        Ok(v) => v,
        Err(e) => return error_response(&Error::Http(e.to_string())),
    };
    if !status.is_success() {
        let message = value.get("error").and_then(|e| e.get("message")).and_then(Value::as_str).unwrap_or("upstream error").to_string();
        return error_response(&Error::Upstream { status: status.as_u16(), message });
    }

    Json(transform::openai_response_to_anthropic(&value, &state.mapper)).into_response()
}

async fn stream_transform_response(request: reqwest::RequestBuilder, mapper: Arc<ToolIdMapper>) -> axum::response::Response {
    let resp = match request.send().await {
        Ok(r) => r,
        Err(e) => return error_response(&Error::Http(e.to_string())),
    };
    if !resp.status().is_success() {
        let status = resp.status().as_u16();
        let text = resp.text().await.unwrap_or_default();
        return error_response(&Error::Upstream { status, message: text });
    }

    let stream = make_anthropic_sse_stream(resp, mapper);
    Sse::new(stream).keep_alive(KeepAlive::default()).into_response()
}

fn make_anthropic_sse_stream(
    mut resp: reqwest::Response,
    mapper: Arc<ToolIdMapper>,
) -> impl Stream<Item = Result<SseEvent, std::convert::Infallible>> {
    async_stream::stream! {
        let mut encoder = AnthropicSseEncoder::new();
        let mut buffer = String::new();

        loop {
            match resp.chunk().await {
                Ok(Some(bytes)) => {
                    buffer.push_str(&String::from_utf8_lossy(&bytes));
                    for data in drain_data_lines(&mut buffer) {
                        for frame in encoder.feed(&data, &mapper) {
                            yield Ok(SseEvent::default().event(frame.event).data(frame.data.to_string()));
                        }
                    }
                }
                Ok(None) => break,
                Err(_) => break,
            }
        }
    }
}

fn drain_data_lines(buffer: &mut String) -> Vec<String> {
    let mut out = Vec::new();
    loop {
        let Some(pos) = buffer.find('\n') else { break };
        let line = buffer[..pos].trim_end_matches('\r').to_string();
        buffer.drain(..=pos);
        if let Some(data) = line.strip_prefix("data:") {
            out.push(data.trim_start().to_string());
        }
    }
    out
}

fn error_response(err: &Error) -> axum::response::Response {
    let status = match err {
        Error::Upstream { status, .. } => axum::http::StatusCode::from_u16(*status).unwrap_or(axum::http::StatusCode::BAD_GATEWAY),
        Error::CircuitOpen(_) => axum::http::StatusCode::SERVICE_UNAVAILABLE,
        _ => axum::http::StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(transform::upstream_error_to_anthropic(&err.to_string()))).into_response()
}
