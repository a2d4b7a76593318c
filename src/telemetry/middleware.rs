use super::metrics::MetricsRegistry;
use super::RequestMetrics;
use crate::{error::ProxyFailure, proxy::Route};
use axum::{
    body::{Body, HttpBody},
    extract::State,
    http::{header::CONTENT_LENGTH, HeaderMap, HeaderName, HeaderValue, Request, Response},
    middleware::Next,
};
use std::{sync::Arc, time::Instant};
use tracing::{debug, info_span, Instrument};
use uuid::Uuid;

pub static X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

/// Tags each request with an id, reusing the caller's `x-request-id` when it
/// sent one. The id is forwarded upstream and echoed on the response.
pub async fn request_id_middleware(mut req: Request<Body>, next: Next) -> Response<Body> {
    let request_id = req
        .headers()
        .get(&X_REQUEST_ID)
        .cloned()
        .or_else(|| HeaderValue::from_str(&Uuid::new_v4().to_string()).ok());

    if let Some(id) = &request_id {
        req.headers_mut().insert(X_REQUEST_ID.clone(), id.clone());
    }

    let span = info_span!(
        "request",
        request_id = request_id
            .as_ref()
            .and_then(|id| id.to_str().ok())
            .unwrap_or_default(),
        method = %req.method(),
        path = %req.uri().path(),
    );

    let mut response = next.run(req).instrument(span).await;
    if let Some(id) = request_id {
        response.headers_mut().insert(X_REQUEST_ID.clone(), id);
    }
    response
}

pub async fn metrics_middleware(
    State(registry): State<Arc<MetricsRegistry>>,
    req: Request<Body>,
    next: Next,
) -> Response<Body> {
    let start = Instant::now();

    let path = req.uri().path().to_string();
    let method = req.method().to_string();
    let route = Route::classify(&path)
        .map(|r| r.as_str())
        .unwrap_or("local")
        .to_string();
    let request_size = content_length(req.headers()).or_else(|| req.body().size_hint().exact());

    debug!("Received request: route={}, path={}, method={}", route, path, method);

    let response = next.run(req).await;

    let response_size = content_length(response.headers())
        .or_else(|| response.body().size_hint().exact());
    let error_type = response
        .extensions()
        .get::<ProxyFailure>()
        .map(|failure| failure.0.to_string());

    let metrics = RequestMetrics {
        route,
        method,
        path,
        total_latency: start.elapsed(),
        request_size,
        response_size,
        status_code: response.status().as_u16(),
        error_count: u32::from(error_type.is_some()),
        error_type,
    };

    registry.record_metrics(&metrics).await;
    response
}

fn content_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
}
