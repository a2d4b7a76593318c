use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::{error::Error as _, io, time::Duration};

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{}", describe_upstream(.0))]
    Upstream(#[from] reqwest::Error),

    #[error("Upstream request timed out after {}s", .0.as_secs())]
    UpstreamTimeout(Duration),

    #[error("Failed to read request body: {0}")]
    RequestBody(#[from] axum::Error),

    #[error("Request body exceeds the limit of {0} bytes")]
    PayloadTooLarge(usize),

    #[error("Failed to encode response body: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Marker left in the response extensions when a forwarding attempt failed,
/// so the metrics middleware can report the failure class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProxyFailure(pub &'static str);

impl AppError {
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Upstream(e) if e.is_timeout() => "upstream_timeout",
            AppError::UpstreamTimeout(_) => "upstream_timeout",
            AppError::Upstream(e) if e.is_connect() => "upstream_unreachable",
            AppError::Upstream(_) => "upstream_error",
            AppError::RequestBody(_) => "request_body",
            AppError::PayloadTooLarge(_) => "payload_too_large",
            AppError::Json(_) => "json",
            AppError::Io(_) => "io",
            AppError::Config(_) => "config",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::RequestBody(_) => StatusCode::BAD_REQUEST,
            AppError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// reqwest's display only names the URL; append the cause chain so the caller
/// sees e.g. "connection refused" or "operation timed out".
fn describe_upstream(error: &reqwest::Error) -> String {
    let mut message = if error.is_timeout() {
        format!("Upstream request timed out: {}", error)
    } else {
        error.to_string()
    };

    let mut source = error.source();
    while let Some(cause) = source {
        let text = cause.to_string();
        if !message.contains(&text) {
            message.push_str(": ");
            message.push_str(&text);
        }
        source = cause.source();
    }

    message
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(json!({ "error": self.to_string() }));

        let mut response = (status, body).into_response();
        response.extensions_mut().insert(ProxyFailure(self.kind()));
        response
    }
}
