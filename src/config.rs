use std::{env, net::SocketAddr, str::FromStr, time::Duration};

use axum::http::HeaderValue;
use dotenv::dotenv;
use reqwest::Url;

use crate::error::AppError;

pub const DEFAULT_PORT: u16 = 5000;
pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_UPSTREAM_URL: &str = "http://thesavage.runasp.net";
pub const DEFAULT_ALLOWED_ORIGIN: &str = "https://laith4xx4.github.io";
pub const DEFAULT_UPSTREAM_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_MAX_BODY_BYTES: usize = 1024 * 1024;

/// Fixed upstream the gateway forwards to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upstream {
    base: String,
    authority: String,
}

impl Upstream {
    /// Parses an absolute `http`/`https` base URL. A trailing slash is dropped so
    /// that `base + originalPath` never produces `//`.
    pub fn parse(raw: &str) -> Result<Self, AppError> {
        let url = Url::parse(raw.trim())
            .map_err(|e| AppError::Config(format!("UPSTREAM_URL {:?} is not a valid URL: {}", raw, e)))?;

        if !matches!(url.scheme(), "http" | "https") {
            return Err(AppError::Config(format!(
                "UPSTREAM_URL must use http or https, got {:?}",
                url.scheme()
            )));
        }

        let host = url
            .host_str()
            .ok_or_else(|| AppError::Config(format!("UPSTREAM_URL {:?} has no host", raw)))?;

        let authority = match url.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        };

        Ok(Self {
            base: url.as_str().trim_end_matches('/').to_string(),
            authority,
        })
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    /// `host[:port]`, the value sent as the outbound `Host` header.
    pub fn authority(&self) -> &str {
        &self.authority
    }
}

#[derive(Debug)]
pub struct AppConfig {
    pub port: u16,
    pub host: String,
    pub upstream: Upstream,
    pub allowed_origin: HeaderValue,
    /// Bounds the wait for the upstream's response head, not the body transfer.
    pub upstream_timeout: Duration,
    /// Largest inbound request body the gateway buffers before forwarding.
    pub max_body_bytes: usize,
    pub worker_threads: usize,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, AppError> {
        dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let port = parse_var(&lookup, "PORT", DEFAULT_PORT)?;
        let host = lookup("HOST").unwrap_or_else(|| DEFAULT_HOST.to_string());

        let upstream = Upstream::parse(
            &lookup("UPSTREAM_URL").unwrap_or_else(|| DEFAULT_UPSTREAM_URL.to_string()),
        )?;

        let origin = lookup("ALLOWED_ORIGIN").unwrap_or_else(|| DEFAULT_ALLOWED_ORIGIN.to_string());
        let allowed_origin = HeaderValue::from_str(origin.trim().trim_end_matches('/'))
            .map_err(|_| AppError::Config(format!("ALLOWED_ORIGIN {:?} is not a valid header value", origin)))?;

        let timeout_secs = parse_var(&lookup, "UPSTREAM_TIMEOUT_SECS", DEFAULT_UPSTREAM_TIMEOUT_SECS)?;
        if timeout_secs == 0 {
            return Err(AppError::Config("UPSTREAM_TIMEOUT_SECS must be greater than zero".into()));
        }

        let max_body_bytes = parse_var(&lookup, "MAX_BODY_BYTES", DEFAULT_MAX_BODY_BYTES)?;
        if max_body_bytes == 0 {
            return Err(AppError::Config("MAX_BODY_BYTES must be greater than zero".into()));
        }

        let worker_threads = parse_var(&lookup, "WORKER_THREADS", num_cpus::get())?;
        if worker_threads == 0 {
            return Err(AppError::Config("WORKER_THREADS must be greater than zero".into()));
        }

        Ok(Self {
            port,
            host,
            upstream,
            allowed_origin,
            upstream_timeout: Duration::from_secs(timeout_secs),
            max_body_bytes,
            worker_threads,
        })
    }

    pub fn upstream_authority(&self) -> &str {
        self.upstream.authority()
    }

    pub fn bind_addr(&self) -> Result<SocketAddr, AppError> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|_| AppError::Config(format!("HOST {:?} is not a valid IP address", self.host)))
    }
}

fn parse_var<F, T>(lookup: &F, key: &str, default: T) -> Result<T, AppError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| AppError::Config(format!("{} must be a number, got {:?}", key, raw))),
        None => Ok(default),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

#[derive(Debug, Clone, Default)]
pub struct TelemetryConfig {
    pub debug_mode: bool,
    pub log_format: LogFormat,
}

impl TelemetryConfig {
    pub fn from_env() -> Self {
        dotenv().ok();

        let debug_mode = env::var("DEBUG_MODE")
            .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);

        let log_format = match env::var("LOG_FORMAT") {
            Ok(v) if v.eq_ignore_ascii_case("json") => LogFormat::Json,
            _ => LogFormat::Compact,
        };

        Self {
            debug_mode,
            log_format,
        }
    }
}
