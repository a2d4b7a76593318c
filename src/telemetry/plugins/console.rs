use crate::telemetry::{
    metrics::{ExportError, MetricsExporter},
    RequestMetrics,
};
use async_trait::async_trait;
use tracing::info;

/// Logs every request's metrics; registered in debug mode.
pub struct ConsolePlugin;

impl ConsolePlugin {
    pub fn new() -> Self {
        ConsolePlugin
    }
}

impl Default for ConsolePlugin {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MetricsExporter for ConsolePlugin {
    async fn export_metrics(&self, metrics: &RequestMetrics) -> Result<(), ExportError> {
        info!(
            target: "savager_proxy::metrics",
            route = %metrics.route,
            method = %metrics.method,
            path = %metrics.path,
            status = metrics.status_code,
            latency_ms = metrics.total_latency.as_millis() as u64,
            request_size = ?metrics.request_size,
            response_size = ?metrics.response_size,
            error_type = ?metrics.error_type,
            "Request metrics"
        );
        Ok(())
    }

    fn name(&self) -> &'static str {
        "console"
    }
}
