//! Integration test: run the proxy on a free port in front of a stub upstream
//! and check that status, body and auth are relayed untouched.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use hushh_a2a::{Dispatcher, HttpTransport, Route};
use hushh_core::{AgentDescriptor, AgentKind, AgentRegistry, extract_text};
use hushh_gateway::GatewayServer;
use serde_json::{Value, json};

async fn serve(router: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local_addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });
    addr
}

/// Echoes the request body and the Authorization header it saw
async fn upstream() -> SocketAddr {
    let router = Router::new()
        .route(
            "/agent",
            post(|headers: HeaderMap, axum::Json(body): axum::Json<Value>| async move {
                let auth = headers
                    .get("authorization")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("")
                    .to_string();
                axum::Json(json!({
                    "result": {"message": {"parts": [{"type": "text", "text": "pong"}]}},
                    "echo": body,
                    "auth": auth,
                }))
            }),
        )
        .route(
            "/fail",
            post(|| async { (StatusCode::SERVICE_UNAVAILABLE, "maintenance") }),
        );
    serve(router).await
}

fn closed_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind free port");
    listener.local_addr().expect("local_addr").port()
}

async fn proxy() -> (SocketAddr, Arc<AgentRegistry>) {
    let up = upstream().await;
    let registry = Arc::new(
        AgentRegistry::new(vec![
            AgentDescriptor::new("hushh", format!("http://{}/agent", up), AgentKind::JsonrpcText)
                .with_auth_token("agent-token"),
            AgentDescriptor::new("broken", format!("http://{}/fail", up), AgentKind::JsonrpcText),
            AgentDescriptor::new(
                "dead",
                format!("http://127.0.0.1:{}/", closed_port()),
                AgentKind::JsonrpcText,
            ),
        ])
        .expect("registry"),
    );

    let gateway = GatewayServer::new(
        "127.0.0.1:0".parse().expect("addr"),
        registry.clone(),
        Arc::new(HttpTransport::new()),
    )
    .with_user_details_url(Some(format!("http://{}/agent", up)));

    (serve(gateway.router()).await, registry)
}

#[tokio::test]
async fn test_relays_json_and_attaches_agent_token() {
    let (addr, _) = proxy().await;
    let resp = reqwest::Client::new()
        .post(format!("http://{}/api/a2a/hushh", addr))
        .json(&json!({"q": "hello"}))
        .send()
        .await
        .expect("send");

    assert_eq!(resp.status().as_u16(), 200);
    let body: Value = resp.json().await.expect("json");
    assert_eq!(body["echo"], json!({"q": "hello"}));
    assert_eq!(body["auth"], "Bearer agent-token");
}

#[tokio::test]
async fn test_caller_authorization_wins() {
    let (addr, _) = proxy().await;
    let body: Value = reqwest::Client::new()
        .post(format!("http://{}/api/a2a/hushh", addr))
        .bearer_auth("caller-token")
        .json(&json!({}))
        .send()
        .await
        .expect("send")
        .json()
        .await
        .expect("json");
    assert_eq!(body["auth"], "Bearer caller-token");
}

#[tokio::test]
async fn test_upstream_errors_are_relayed() {
    let (addr, _) = proxy().await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("http://{}/api/a2a/broken", addr))
        .json(&json!({}))
        .send()
        .await
        .expect("send");
    assert_eq!(resp.status().as_u16(), 503);
    assert_eq!(resp.text().await.expect("text"), "maintenance");

    let resp = client
        .post(format!("http://{}/api/a2a/dead", addr))
        .json(&json!({}))
        .send()
        .await
        .expect("send");
    assert_eq!(resp.status().as_u16(), 502);
    let body: Value = resp.json().await.expect("json");
    assert!(body["error"].as_str().unwrap_or("").starts_with("Network error"));
}

#[tokio::test]
async fn test_rejects_unknown_agent_and_bad_json() {
    let (addr, _) = proxy().await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("http://{}/api/a2a/ghost", addr))
        .json(&json!({}))
        .send()
        .await
        .expect("send");
    assert_eq!(resp.status().as_u16(), 404);
    let body: Value = resp.json().await.expect("json");
    assert_eq!(body["error"], "Unknown agent: ghost");

    let resp = client
        .post(format!("http://{}/api/a2a/hushh", addr))
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .expect("send");
    assert_eq!(resp.status().as_u16(), 400);
}

#[tokio::test]
async fn test_user_details_and_status() {
    let (addr, _) = proxy().await;
    let client = reqwest::Client::new();

    let body: Value = client
        .post(format!("http://{}/api/hushh/user-details", addr))
        .json(&json!({"email": "ada@example.com"}))
        .send()
        .await
        .expect("send")
        .json()
        .await
        .expect("json");
    assert_eq!(body["echo"]["email"], "ada@example.com");

    let status: Value = client
        .get(format!("http://{}/api/status", addr))
        .send()
        .await
        .expect("send")
        .json()
        .await
        .expect("json");
    assert_eq!(status["status"], "ok");
    assert_eq!(status["agents"], 3);
}

#[tokio::test]
async fn test_dispatcher_through_proxy_extracts_text() {
    let (addr, registry) = proxy().await;
    let dispatcher = Dispatcher::new(registry, Arc::new(HttpTransport::new())).with_route(
        Route::Proxy {
            base_url: format!("http://{}", addr),
        },
    );

    let result = dispatcher
        .send("hushh", &hushh_a2a::AgentRequest::text("ping"))
        .await;
    assert!(result.success);
    let data = result.data.expect("data");
    assert_eq!(extract_text(&data), "pong");
    assert_eq!(data["echo"]["method"], "tasks/send");
}
