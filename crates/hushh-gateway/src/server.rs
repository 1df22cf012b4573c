//! Pass-through proxy: Axum HTTP server relaying agent calls from the browser
//!
//! Routes:
//! - `POST /api/a2a/{agent_id}`: forward to the agent's base URL
//! - `POST /api/hushh/user-details`: forward to the configured user-details endpoint
//! - `GET /api/status`: health
//!
//! The proxy adds no logic beyond forwarding: upstream status and body are
//! relayed as received.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use hushh_a2a::{AgentTransport, TransportResponse};
use hushh_core::AgentRegistry;
use serde_json::{Value, json};
use tower_http::cors::CorsLayer;
use tracing::{debug, info, warn};

/// Shared state for all requests
#[derive(Clone)]
pub struct ProxyState {
    pub registry: Arc<AgentRegistry>,
    pub transport: Arc<dyn AgentTransport>,
    pub user_details_url: Option<String>,
    pub start_time: std::time::Instant,
}

/// The proxy server
pub struct GatewayServer {
    state: ProxyState,
    bind: SocketAddr,
}

impl GatewayServer {
    pub fn new(
        bind: SocketAddr,
        registry: Arc<AgentRegistry>,
        transport: Arc<dyn AgentTransport>,
    ) -> Self {
        let state = ProxyState {
            registry,
            transport,
            user_details_url: None,
            start_time: std::time::Instant::now(),
        };
        Self { state, bind }
    }

    pub fn with_user_details_url(mut self, url: Option<String>) -> Self {
        self.state.user_details_url = url.filter(|u| !u.trim().is_empty());
        self
    }

    /// Build the Axum router
    pub fn router(&self) -> Router {
        Router::new()
            .route("/api/status", get(status_handler))
            .route("/api/a2a/{agent_id}", post(agent_handler))
            .route("/api/hushh/user-details", post(user_details_handler))
            .layer(CorsLayer::permissive())
            .with_state(self.state.clone())
    }

    /// Start the server (blocks until shutdown)
    pub async fn run(self) -> anyhow::Result<()> {
        let router = self.router();
        let listener = tokio::net::TcpListener::bind(self.bind).await?;
        info!(
            "Proxy listening on {} ({} agents)",
            self.bind,
            self.state.registry.len()
        );
        axum::serve(listener, router).await?;
        Ok(())
    }
}

// ── Handlers ──

async fn status_handler(State(state): State<ProxyState>) -> impl IntoResponse {
    axum::Json(json!({
        "status": "ok",
        "agents": state.registry.len(),
        "uptime_secs": state.start_time.elapsed().as_secs(),
    }))
}

async fn agent_handler(
    State(state): State<ProxyState>,
    Path(agent_id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let Some(agent) = state.registry.get(&agent_id) else {
        warn!("Proxy request for unknown agent '{}'", agent_id);
        return error_response(StatusCode::NOT_FOUND, format!("Unknown agent: {}", agent_id));
    };
    let bearer = forwarded_bearer(&headers).or_else(|| agent.auth_token.clone());
    forward(&state, &agent.base_url, bearer.as_deref(), &body).await
}

async fn user_details_handler(
    State(state): State<ProxyState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let Some(url) = state.user_details_url.clone() else {
        return error_response(StatusCode::NOT_FOUND, "user-details endpoint not configured");
    };
    let bearer = forwarded_bearer(&headers);
    forward(&state, &url, bearer.as_deref(), &body).await
}

async fn forward(state: &ProxyState, url: &str, bearer: Option<&str>, body: &[u8]) -> Response {
    let payload: Value = match serde_json::from_slice(body) {
        Ok(v) => v,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, format!("Invalid JSON: {}", e)),
    };

    debug!("Forwarding {} bytes to {}", body.len(), url);
    match state.transport.post_json(url, &payload, bearer).await {
        Ok(upstream) => relay(upstream),
        Err(e) => {
            warn!("Upstream {} unreachable: {}", url, e);
            error_response(StatusCode::BAD_GATEWAY, e.to_string())
        }
    }
}

/// Upstream status and body as received
fn relay(upstream: TransportResponse) -> Response {
    let status = StatusCode::from_u16(upstream.status).unwrap_or(StatusCode::BAD_GATEWAY);
    let content_type = if serde_json::from_str::<Value>(&upstream.body).is_ok() {
        "application/json"
    } else {
        "text/plain; charset=utf-8"
    };
    (status, [(CONTENT_TYPE, content_type)], upstream.body).into_response()
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, axum::Json(json!({ "error": message.into() }))).into_response()
}

/// Caller's bearer token, passed on upstream
fn forwarded_bearer(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?.trim();
    let token = value.strip_prefix("Bearer ")?.trim();
    if token.is_empty() { None } else { Some(token.to_string()) }
}
