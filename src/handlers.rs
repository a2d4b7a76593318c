use axum::{
    body::Body,
    extract::State,
    http::{header::CONTENT_TYPE, Request, StatusCode},
    response::{IntoResponse, Response},
};
use tracing::error;

use crate::{
    proxy::{proxy_request, Route},
    server::AppState,
};

pub const ROOT_MESSAGE: &str = "Savager Proxy is running! Use /api for API requests.";

pub async fn root() -> &'static str {
    ROOT_MESSAGE
}

pub async fn health_check() -> impl IntoResponse {
    StatusCode::OK
}

/// Prometheus text exposition of the gateway's request series.
pub async fn render_metrics(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics_handle.render(),
    )
}

pub async fn api_passthrough(State(state): State<AppState>, request: Request<Body>) -> Response {
    forward(&state, Route::Api, request).await
}

pub async fn docs_passthrough(State(state): State<AppState>, request: Request<Body>) -> Response {
    forward(&state, Route::Docs, request).await
}

/// Catches prefixed paths the router patterns miss (`/api/`, `/swagger-ui.css`)
/// and answers everything else with 404.
pub async fn fallback(State(state): State<AppState>, request: Request<Body>) -> Response {
    match Route::classify(request.uri().path()) {
        Some(route) => forward(&state, route, request).await,
        None => {
            let message = format!("Cannot {} {}", request.method(), request.uri().path());
            (StatusCode::NOT_FOUND, message).into_response()
        }
    }
}

async fn forward(state: &AppState, route: Route, request: Request<Body>) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();

    match proxy_request(&state.forwarder, route, request).await {
        Ok(response) => response,
        Err(e) => {
            error!(
                route = route.as_str(),
                method = %method,
                uri = %uri,
                kind = e.kind(),
                "Proxy error: {}",
                e
            );
            e.into_response()
        }
    }
}
