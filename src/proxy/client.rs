use axum::http::{HeaderMap, HeaderValue, Method};
use bytes::Bytes;
use reqwest::redirect::Policy;
use std::time::Duration;
use tracing::debug;

use super::{forward_headers, upstream_url};
use crate::{config::AppConfig, error::AppError};

/// Pooled HTTP client bound to the configured upstream.
#[derive(Clone)]
pub struct Forwarder {
    client: reqwest::Client,
    base: String,
    authority: HeaderValue,
    head_timeout: Duration,
    max_body_bytes: usize,
}

impl Forwarder {
    pub fn new(config: &AppConfig) -> Result<Self, AppError> {
        // No whole-request timeout on the client: it would also cut off streamed
        // bodies after the status has been relayed. `send` bounds the head instead.
        // Redirects are relayed rather than followed: the outbound `Host` is pinned
        // to the upstream authority and must not leak to another host.
        let client = reqwest::Client::builder()
            .pool_idle_timeout(Duration::from_secs(30))
            .pool_max_idle_per_host(32)
            .tcp_keepalive(Duration::from_secs(60))
            .connect_timeout(config.upstream_timeout)
            .redirect(Policy::none())
            .build()?;

        let authority = HeaderValue::from_str(config.upstream_authority()).map_err(|_| {
            AppError::Config(format!(
                "upstream authority {:?} is not a valid Host header",
                config.upstream_authority()
            ))
        })?;

        Ok(Self {
            client,
            base: config.upstream.base().to_string(),
            authority,
            head_timeout: config.upstream_timeout,
            max_body_bytes: config.max_body_bytes,
        })
    }

    /// Deadline for the upstream's status line and headers.
    pub fn head_timeout(&self) -> Duration {
        self.head_timeout
    }

    pub fn max_body_bytes(&self) -> usize {
        self.max_body_bytes
    }

    /// Sends `method original_url` upstream with rewritten headers and the body
    /// untouched. Resolves once the response head has arrived; the body is left
    /// unread. A head that takes longer than the configured timeout becomes
    /// [`AppError::UpstreamTimeout`], transport failures [`AppError::Upstream`].
    /// HTTP error statuses are a normal response.
    pub async fn send(
        &self,
        method: Method,
        original_url: &str,
        inbound: &HeaderMap,
        body: Bytes,
    ) -> Result<reqwest::Response, AppError> {
        let url = upstream_url(&self.base, original_url);
        let headers = forward_headers(inbound, &self.authority);
        debug!(%method, %url, "Forwarding request upstream");

        let mut request = self.client.request(method, url).headers(headers);
        if !body.is_empty() {
            request = request.body(body);
        }

        match tokio::time::timeout(self.head_timeout, request.send()).await {
            Ok(response) => Ok(response?),
            Err(_) => Err(AppError::UpstreamTimeout(self.head_timeout)),
        }
    }
}
