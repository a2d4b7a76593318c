//! Shared utilities for the gateway integration tests: an in-process mock
//! upstream and a gateway bound to ephemeral ports.

#![allow(dead_code)]

use axum::{
    body::{Body, Bytes},
    http::{header, HeaderMap, Method, StatusCode, Uri},
    response::{Html, IntoResponse},
    routing::{any, get},
    Json, Router,
};
use savager_proxy::{
    config::{AppConfig, TelemetryConfig},
    server::{self, AppState},
};
use serde_json::{json, Value};
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::net::TcpListener;

pub const ALLOWED_ORIGIN: &str = "https://frontend.example";

pub const SWAGGER_HTML: &str = "<!DOCTYPE html>\n<html lang=\"en\">\n<head><title>Swagger UI</title></head>\n<body><div id=\"swagger-ui\"></div><script src=\"./swagger-ui-bundle.js\"></script></body>\n</html>\n";

/// A 1 MiB asset with every byte value represented, so any re-encoding shows.
pub fn bundle_bytes() -> Vec<u8> {
    (0..1_048_576u32)
        .map(|i| (i.wrapping_mul(31) % 251) as u8)
        .collect()
}

/// Upstream JSON whose key order is not sorted.
pub const ORDERED_JSON: &str = r#"{"zeta":1,"alpha":{"y":true,"b":null},"mid":[3,1,2]}"#;

/// Chunks of `/swagger/slow.js`, sent `SLOW_CHUNK_DELAY` apart.
pub const SLOW_CHUNKS: [&str; 4] = ["var ", "a ", "= ", "1;"];
pub const SLOW_CHUNK_DELAY: Duration = Duration::from_millis(600);

pub fn items() -> Value {
    json!([
        { "id": 1, "name": "Morning HIIT", "capacity": 20 },
        { "id": 2, "name": "Evening Yoga", "capacity": 12 }
    ])
}

fn header_str(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// Reflects what the upstream actually received.
async fn echo(method: Method, uri: Uri, headers: HeaderMap, body: Bytes) -> Json<Value> {
    let parsed: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);
    Json(json!({
        "method": method.as_str(),
        "path": uri.path(),
        "query": uri.query(),
        "host": header_str(&headers, "host"),
        "authorization": header_str(&headers, "authorization"),
        "request_id": header_str(&headers, "x-request-id"),
        "body": parsed,
        "body_len": body.len(),
    }))
}

/// An asset whose chunks trickle in; the whole transfer outlasts a 1s timeout.
async fn slow_asset() -> impl IntoResponse {
    let chunks = futures_util::stream::unfold(0usize, |i| async move {
        let chunk: &'static str = SLOW_CHUNKS.get(i).copied()?;
        tokio::time::sleep(SLOW_CHUNK_DELAY).await;
        Some((Ok::<_, std::io::Error>(Bytes::from_static(chunk.as_bytes())), i + 1))
    });
    (
        [(header::CONTENT_TYPE, "application/javascript")],
        Body::from_stream(chunks),
    )
}

async fn create_item(method: Method, body: Bytes) -> impl IntoResponse {
    let received: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);
    (
        StatusCode::CREATED,
        Json(json!({ "method": method.as_str(), "received": received })),
    )
}

fn upstream_router() -> Router {
    Router::new()
        .route("/api/items", get(|| async { Json(items()) }).post(create_item))
        .route(
            "/api/missing",
            any(|| async { (StatusCode::NOT_FOUND, Json(json!({ "message": "not found" }))) }),
        )
        .route("/api/empty", any(|| async { StatusCode::NO_CONTENT }))
        .route(
            "/api/plain-error",
            get(|| async { (StatusCode::BAD_GATEWAY, "Bad Gateway from IIS") }),
        )
        .route(
            "/api/cors-leak",
            get(|| async {
                (
                    [(header::ACCESS_CONTROL_ALLOW_ORIGIN, "*")],
                    Json(json!({ "ok": true })),
                )
            }),
        )
        .route(
            "/api/slow",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(3)).await;
                Json(json!({ "late": true }))
            }),
        )
        .route(
            "/api/ordered",
            get(|| async { ([(header::CONTENT_TYPE, "application/json")], ORDERED_JSON) }),
        )
        .route("/swagger/index.html", get(|| async { Html(SWAGGER_HTML) }))
        .route("/swagger/slow.js", get(slow_asset))
        .route(
            "/swagger/bundle.js",
            get(|| async { ([(header::CONTENT_TYPE, "application/javascript")], bundle_bytes()) }),
        )
        .route(
            "/swagger/missing.css",
            get(|| async { (StatusCode::NOT_FOUND, "no such asset") }),
        )
        .route(
            "/swagger-ui.css",
            get(|| async { ([(header::CONTENT_TYPE, "text/css")], "body { margin: 0; }") }),
        )
        .fallback(echo)
}

/// Starts the mock upstream and returns its base URL.
pub async fn spawn_upstream() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, upstream_router()).await.unwrap();
    });
    format!("http://{}", addr)
}

/// Sets its flag when dropped, i.e. when the server abandons the body.
struct DropFlag(Arc<AtomicBool>);

impl Drop for DropFlag {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

/// Starts an upstream serving `/swagger/endless.js`, a body that never ends.
/// The returned flag turns true once the upstream stops producing it.
pub async fn spawn_endless_upstream() -> (String, Arc<AtomicBool>) {
    let dropped = Arc::new(AtomicBool::new(false));
    let flag = dropped.clone();

    let router = Router::new().route(
        "/swagger/endless.js",
        get(move || {
            let guard = DropFlag(flag.clone());
            async move {
                let chunks = futures_util::stream::unfold(guard, |guard| async move {
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    Some((Ok::<_, std::io::Error>(Bytes::from(vec![b'x'; 16 * 1024])), guard))
                });
                Body::from_stream(chunks)
            }
        }),
    );

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    (format!("http://{}", addr), dropped)
}

/// A base URL nothing listens on.
pub fn closed_upstream() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}", addr)
}

/// Starts a gateway forwarding to `upstream` and returns its base URL.
pub async fn spawn_gateway(upstream: &str, extra: &[(&str, &str)]) -> String {
    let mut vars: HashMap<String, String> = HashMap::new();
    vars.insert("UPSTREAM_URL".into(), upstream.to_string());
    vars.insert("ALLOWED_ORIGIN".into(), ALLOWED_ORIGIN.to_string());
    vars.insert("WORKER_THREADS".into(), "1".into());
    for (key, value) in extra {
        vars.insert(key.to_string(), value.to_string());
    }

    let config = AppConfig::from_lookup(move |key| vars.get(key).cloned()).unwrap();
    let state = AppState::new(config, &TelemetryConfig::default()).unwrap();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(server::serve(listener, state, std::future::pending()));
    format!("http://{}", addr)
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder().no_proxy().build().unwrap()
}

pub fn authority(base_url: &str) -> &str {
    base_url.trim_start_matches("http://")
}
