pub mod exporters;
pub mod metrics;
pub mod middleware;
pub mod plugins;

pub use self::{
    exporters::prometheus::PrometheusExporter,
    metrics::{MetricsExporter, MetricsRegistry},
    middleware::{metrics_middleware, request_id_middleware, X_REQUEST_ID},
    plugins::ConsolePlugin,
};

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{LogFormat, TelemetryConfig};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestMetrics {
    // Request metadata
    pub route: String,
    pub method: String,
    pub path: String,

    // Timing metrics
    pub total_latency: Duration,

    // Size metrics, only known for fixed-length bodies; streams are never measured
    pub request_size: Option<u64>,
    pub response_size: Option<u64>,

    // Status metrics
    pub status_code: u16,

    // Error metrics
    pub error_count: u32,
    pub error_type: Option<String>,
}

impl Default for RequestMetrics {
    fn default() -> Self {
        Self {
            route: String::new(),
            method: String::new(),
            path: String::new(),
            total_latency: Duration::default(),
            request_size: None,
            response_size: None,
            status_code: 0,
            error_count: 0,
            error_type: None,
        }
    }
}

/// Installs the global tracing subscriber. `RUST_LOG` drives the filter and
/// falls back to `info`.
pub fn init_tracing(config: &TelemetryConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    match config.log_format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Compact => registry.with(tracing_subscriber::fmt::layer().compact()).init(),
    }
}
