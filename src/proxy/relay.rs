use axum::{
    body::Body,
    http::{
        header::{CONTENT_TYPE, LOCATION},
        HeaderMap, HeaderValue, Response, StatusCode,
    },
};
use bytes::Bytes;
use futures_util::TryStreamExt;
use serde::de::IgnoredAny;
use std::time::Duration;
use tracing::{debug, error};

use super::{relay_headers, ResponseMode};
use crate::error::AppError;

/// Turns an upstream response into the caller's response. The status code is
/// preserved in every mode. `buffer_deadline` bounds reading a buffered body;
/// streamed bodies run for as long as the upstream keeps sending.
pub async fn relay_response(
    upstream: reqwest::Response,
    mode: ResponseMode,
    buffer_deadline: Duration,
) -> Result<Response<Body>, AppError> {
    let status = upstream.status();
    let mut headers = relay_headers(upstream.headers());

    let body = match mode {
        ResponseMode::Stream => {
            let url = upstream.url().to_string();
            // Chunks are pulled only as the client reads; dropping the body on
            // disconnect drops the upstream transfer with it.
            let stream = upstream.bytes_stream().inspect_err(move |e| {
                error!(url = %url, "Upstream stream error: {}", e);
            });
            Body::from_stream(stream)
        }
        ResponseMode::BufferedText => {
            let bytes = read_buffered(upstream, buffer_deadline).await?;
            if std::str::from_utf8(&bytes).is_err() {
                debug!("Upstream text response is not UTF-8, relaying raw bytes");
            }
            headers
                .entry(CONTENT_TYPE)
                .or_insert(HeaderValue::from_static("text/html; charset=utf-8"));
            Body::from(bytes)
        }
        ResponseMode::BufferedJson => {
            let bytes = read_buffered(upstream, buffer_deadline).await?;
            headers = json_headers(headers);
            if is_bodiless(status) {
                headers.remove(CONTENT_TYPE);
                Body::empty()
            } else {
                Body::from(json_body(bytes)?)
            }
        }
    };

    let mut response = Response::new(body);
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    Ok(response)
}

async fn read_buffered(upstream: reqwest::Response, deadline: Duration) -> Result<Bytes, AppError> {
    match tokio::time::timeout(deadline, upstream.bytes()).await {
        Ok(bytes) => Ok(bytes?),
        Err(_) => Err(AppError::UpstreamTimeout(deadline)),
    }
}

/// JSON replies only keep the redirect target and cookies from upstream, and
/// always declare themselves as JSON.
fn json_headers(upstream: HeaderMap) -> HeaderMap {
    let mut headers = HeaderMap::new();
    for (name, value) in upstream.iter() {
        if name == LOCATION || name == axum::http::header::SET_COOKIE {
            headers.append(name.clone(), value.clone());
        }
    }
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers
}

fn is_bodiless(status: StatusCode) -> bool {
    status == StatusCode::NO_CONTENT || status == StatusCode::NOT_MODIFIED
}

/// Valid JSON is relayed byte for byte, key order and whitespace included.
/// Anything else (an empty body too) becomes a JSON string holding its text.
pub fn json_body(bytes: Bytes) -> Result<Bytes, AppError> {
    if serde_json::from_slice::<IgnoredAny>(&bytes).is_ok() {
        return Ok(bytes);
    }
    let text = String::from_utf8_lossy(&bytes);
    Ok(Bytes::from(serde_json::to_vec(&text)?))
}
