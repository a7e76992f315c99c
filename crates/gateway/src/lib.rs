//! HTTP gateway hosting an MCP server.
//!
//! - `GET /sse` opens a session. The first event is `endpoint`, naming the
//!   URL to POST messages to; server messages follow as `message` events.
//! - `POST /message?sessionId=<id>` feeds one JSON-RPC message into a session.
//! - `GET /ws` runs a session over a WebSocket, one message per text frame.
//! - `GET /health` reports status.

pub mod config;
pub mod sessions;

use anyhow::Result;
use axum::{
    extract::{
        ws::{Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    http::StatusCode,
    response::{
        sse::{Event as SseEvent, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use sessions::{Bridge, SessionHub};
use std::convert::Infallible;
use std::sync::Arc;
use tokio_stream::{Stream, StreamExt};
use toolmesh_mcp::protocol::{JsonRpcError, JsonRpcResponse};
use toolmesh_mcp::{McpServer, Transport};
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, TraceLayer},
};
use uuid::Uuid;

pub use config::GatewayConfig;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub server: McpServer,
    pub sessions: Arc<SessionHub>,
}

impl AppState {
    pub fn new(server: McpServer) -> Self {
        Self {
            server,
            sessions: Arc::new(SessionHub::new()),
        }
    }
}

/// Start the gateway
pub async fn serve(addr: &str, state: AppState) -> Result<()> {
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Gateway listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

/// Create the gateway router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/sse", get(sse_handler))
        .route("/message", post(message_handler))
        .route("/ws", get(ws_handler))
        .layer(TraceLayer::new_for_http().make_span_with(DefaultMakeSpan::new()))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Health check endpoint
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let registry = state.server.registry();
    Json(json!({
        "status": "ok",
        "service": state.server.info().name,
        "version": env!("CARGO_PKG_VERSION"),
        "security_level": registry.security_level(),
        "tools": registry.len(),
        "sessions": state.sessions.len(),
    }))
}

/// Removes the session when the event stream is dropped.
struct SessionGuard {
    hub: Arc<SessionHub>,
    id: Uuid,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.hub.detach(&self.id);
    }
}

async fn sse_handler(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<SseEvent, Infallible>>> {
    let (id, bridge) = state.sessions.open(&state.server);
    let guard = SessionGuard {
        hub: state.sessions.clone(),
        id,
    };

    let endpoint = SseEvent::default()
        .event("endpoint")
        .data(format!("/message?sessionId={id}"));

    let messages = futures_util::stream::unfold((bridge, guard), |(bridge, guard)| async move {
        match bridge.receive().await {
            Ok(Some(message)) => {
                let event = SseEvent::default().event("message").data(message.to_string());
                Some((Ok::<_, Infallible>(event), (bridge, guard)))
            }
            Ok(None) => None,
            Err(err) => {
                tracing::warn!(session = %guard.id, error = %err, "Session bridge failed");
                None
            }
        }
    });

    Sse::new(tokio_stream::once(Ok::<_, Infallible>(endpoint)).chain(messages))
        .keep_alive(KeepAlive::default())
}

#[derive(Debug, Deserialize)]
struct MessageQuery {
    #[serde(rename = "sessionId")]
    session_id: Uuid,
}

async fn message_handler(
    State(state): State<AppState>,
    Query(query): Query<MessageQuery>,
    body: String,
) -> Response {
    let Some(bridge) = state.sessions.get(&query.session_id) else {
        return (StatusCode::NOT_FOUND, Json(json!({"error": "unknown session"}))).into_response();
    };

    let message: Value = match serde_json::from_str(&body) {
        Ok(message @ Value::Object(_)) => message,
        Ok(_) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({"error": "message must be a JSON object"})),
            )
                .into_response()
        }
        Err(err) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({"error": format!("invalid JSON: {err}")})),
            )
                .into_response()
        }
    };

    match bridge.send(message).await {
        Ok(()) => StatusCode::ACCEPTED.into_response(),
        Err(err) => {
            tracing::debug!(session = %query.session_id, error = %err, "Session is gone");
            (StatusCode::GONE, Json(json!({"error": "session closed"}))).into_response()
        }
    }
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Pump frames between one WebSocket and its MCP session
async fn handle_socket(mut socket: WebSocket, state: AppState) {
    let (id, bridge) = state.sessions.open(&state.server);

    loop {
        tokio::select! {
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    if !forward(&bridge, &mut socket, text.as_str()).await {
                        break;
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(err)) => {
                    tracing::debug!(session = %id, error = %err, "WebSocket receive failed");
                    break;
                }
            },
            outgoing = bridge.receive() => match outgoing {
                Ok(Some(message)) => {
                    if socket.send(Message::Text(message.to_string().into())).await.is_err() {
                        break;
                    }
                }
                _ => break,
            },
        }
    }

    state.sessions.close(&id).await;
}

/// Hand one text frame to the session. Malformed frames are answered with a
/// parse error and the connection stays open. Returns false once the
/// session is gone.
async fn forward(bridge: &Bridge, socket: &mut WebSocket, text: &str) -> bool {
    match serde_json::from_str::<Value>(text) {
        Ok(message @ Value::Object(_)) => bridge.send(message).await.is_ok(),
        _ => {
            let reply = JsonRpcResponse::error(
                Value::Null,
                JsonRpcError::parse_error("frame is not a JSON object"),
            );
            let text = serde_json::to_string(&reply).unwrap_or_default();
            socket.send(Message::Text(text.into())).await.is_ok()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use toolmesh_core::{SecurityLevel, ToolRegistry};
    use tower::ServiceExt;

    fn state() -> AppState {
        AppState::new(McpServer::new(Arc::new(ToolRegistry::new(SecurityLevel::Safe))))
    }

    #[tokio::test]
    async fn test_health() {
        let response = create_router(state())
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_message_for_unknown_session() {
        let uri = format!("/message?sessionId={}", Uuid::new_v4());
        let response = create_router(state())
            .oneshot(
                Request::post(uri)
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"jsonrpc":"2.0","method":"ping","id":1}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_malformed_message_is_rejected() {
        let state = state();
        let (id, _bridge) = state.sessions.open(&state.server);

        let response = create_router(state.clone())
            .oneshot(
                Request::post(format!("/message?sessionId={id}"))
                    .body(Body::from("{not json"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = create_router(state)
            .oneshot(
                Request::post(format!("/message?sessionId={id}"))
                    .body(Body::from(r#"{"jsonrpc":"2.0","method":"ping","id":1}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
    }
}
