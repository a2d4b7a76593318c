use axum::{
    body::Body,
    http::{header::CONTENT_LENGTH, HeaderMap, Request, Response},
};
use bytes::{Bytes, BytesMut};
use futures_util::TryStreamExt;
use tracing::{debug, info, warn};

use crate::error::AppError;

mod client;
mod headers;
mod relay;

pub use client::Forwarder;
pub use headers::{forward_headers, relay_headers, HOP_BY_HOP_HEADERS};
pub use relay::{json_body, relay_response};

/// Path families the gateway forwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// `/swagger*`: documentation UI and its assets.
    Docs,
    /// `/api/*`: the REST API.
    Api,
}

impl Route {
    pub fn classify(path: &str) -> Option<Self> {
        if path.starts_with("/api/") {
            Some(Route::Api)
        } else if path.starts_with("/swagger") {
            Some(Route::Docs)
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Route::Docs => "docs",
            Route::Api => "api",
        }
    }
}

/// How the upstream response body is handed back to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseMode {
    /// Piped through chunk by chunk, never fully materialized.
    Stream,
    /// Read fully and returned verbatim as text.
    BufferedText,
    /// Read fully and returned as JSON; non-JSON text is wrapped in a string.
    BufferedJson,
}

impl ResponseMode {
    /// `original_url` is the inbound path including its query string.
    pub fn select(route: Route, original_url: &str) -> Self {
        match route {
            Route::Api => ResponseMode::BufferedJson,
            Route::Docs if original_url.contains(".html") => ResponseMode::BufferedText,
            Route::Docs => ResponseMode::Stream,
        }
    }
}

pub fn upstream_url(base: &str, original_url: &str) -> String {
    format!("{}{}", base, original_url)
}

/// Forwards one inbound request upstream and relays the answer. A single
/// attempt is made; failures surface as [`AppError`].
pub async fn proxy_request(
    forwarder: &Forwarder,
    route: Route,
    request: Request<Body>,
) -> Result<Response<Body>, AppError> {
    let (parts, body) = request.into_parts();
    let original_url = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    let mode = ResponseMode::select(route, original_url);

    let body = read_body(&parts.headers, body, forwarder.max_body_bytes()).await?;
    debug!(
        route = route.as_str(),
        mode = ?mode,
        body_size = body.len(),
        "Prepared inbound request"
    );

    let upstream = forwarder
        .send(parts.method.clone(), original_url, &parts.headers, body)
        .await?;

    info!(
        route = route.as_str(),
        method = %parts.method,
        url = %upstream.url(),
        status = upstream.status().as_u16(),
        "Upstream responded"
    );

    relay_response(upstream, mode, forwarder.head_timeout()).await
}

/// Buffers the inbound body, refusing anything over `limit` bytes. A declared
/// `Content-Length` is checked up front; chunked bodies are cut off as soon as
/// they cross the limit.
pub async fn read_body(headers: &HeaderMap, body: Body, limit: usize) -> Result<Bytes, AppError> {
    let declared = headers
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok());
    if declared.is_some_and(|len| len > limit as u64) {
        warn!(declared = ?declared, limit, "Rejecting oversized request body");
        return Err(AppError::PayloadTooLarge(limit));
    }

    let mut stream = body.into_data_stream();
    let mut buffer = BytesMut::new();
    while let Some(chunk) = stream.try_next().await? {
        if buffer.len() + chunk.len() > limit {
            warn!(limit, "Request body grew past the limit");
            return Err(AppError::PayloadTooLarge(limit));
        }
        buffer.extend_from_slice(&chunk);
    }
    Ok(buffer.freeze())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_routes_by_prefix() {
        assert_eq!(Route::classify("/api/members"), Some(Route::Api));
        assert_eq!(Route::classify("/api/"), Some(Route::Api));
        assert_eq!(Route::classify("/swagger"), Some(Route::Docs));
        assert_eq!(Route::classify("/swagger/index.html"), Some(Route::Docs));
        assert_eq!(Route::classify("/swagger-ui.css"), Some(Route::Docs));

        assert_eq!(Route::classify("/"), None);
        assert_eq!(Route::classify("/api"), None);
        assert_eq!(Route::classify("/apix/members"), None);
        assert_eq!(Route::classify("/health"), None);
    }

    #[test]
    fn api_is_always_buffered_json() {
        assert_eq!(
            ResponseMode::select(Route::Api, "/api/sessions"),
            ResponseMode::BufferedJson
        );
        assert_eq!(
            ResponseMode::select(Route::Api, "/api/report.html"),
            ResponseMode::BufferedJson
        );
    }

    #[test]
    fn docs_html_is_buffered_text_everything_else_streams() {
        assert_eq!(
            ResponseMode::select(Route::Docs, "/swagger/index.html"),
            ResponseMode::BufferedText
        );
        assert_eq!(
            ResponseMode::select(Route::Docs, "/swagger/oauth2-redirect.html?state=1"),
            ResponseMode::BufferedText
        );
        assert_eq!(
            ResponseMode::select(Route::Docs, "/swagger/swagger-ui-bundle.js"),
            ResponseMode::Stream
        );
        assert_eq!(
            ResponseMode::select(Route::Docs, "/swagger/v1/swagger.json"),
            ResponseMode::Stream
        );
        assert_eq!(ResponseMode::select(Route::Docs, "/swagger"), ResponseMode::Stream);
    }

    #[tokio::test]
    async fn read_body_accepts_up_to_the_limit() {
        let body = read_body(&HeaderMap::new(), Body::from(vec![7u8; 16]), 16)
            .await
            .unwrap();
        assert_eq!(body.len(), 16);

        let empty = read_body(&HeaderMap::new(), Body::empty(), 16).await.unwrap();
        assert!(empty.is_empty());
    }

    #[tokio::test]
    async fn read_body_rejects_declared_and_actual_overflow() {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_LENGTH, "4096".parse().unwrap());
        let err = read_body(&headers, Body::empty(), 1024).await.unwrap_err();
        assert!(matches!(err, AppError::PayloadTooLarge(1024)));

        let err = read_body(&HeaderMap::new(), Body::from(vec![0u8; 17]), 16)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::PayloadTooLarge(16)));
    }

    #[test]
    fn upstream_url_keeps_path_and_query() {
        assert_eq!(
            upstream_url("http://thesavage.runasp.net", "/api/sessions?coachId=4&page=2"),
            "http://thesavage.runasp.net/api/sessions?coachId=4&page=2"
        );
        assert_eq!(
            upstream_url("http://127.0.0.1:8081", "/swagger/index.html"),
            "http://127.0.0.1:8081/swagger/index.html"
        );
    }
}
