use super::RequestMetrics;
use async_trait::async_trait;
use tracing::{debug, info, warn};

pub type ExportError = Box<dyn std::error::Error + Send + Sync>;

/// A sink for completed-request metrics.
#[async_trait]
pub trait MetricsExporter: Send + Sync {
    async fn export_metrics(&self, metrics: &RequestMetrics) -> Result<(), ExportError>;
    fn name(&self) -> &'static str;
}

/// The exporters a gateway reports to. The set is fixed once the state is
/// built, so recording needs no lock.
#[derive(Default)]
pub struct MetricsRegistry {
    exporters: Vec<Box<dyn MetricsExporter>>,
    debug_mode: bool,
}

impl MetricsRegistry {
    pub fn new(debug_mode: bool) -> Self {
        Self {
            exporters: Vec::new(),
            debug_mode,
        }
    }

    pub fn with_exporter<E>(mut self, exporter: E) -> Self
    where
        E: MetricsExporter + 'static,
    {
        info!(exporter = exporter.name(), "Registering metrics exporter");
        self.exporters.push(Box::new(exporter));
        self
    }

    pub fn exporter_names(&self) -> Vec<&'static str> {
        self.exporters.iter().map(|e| e.name()).collect()
    }

    /// Hands `metrics` to every exporter in registration order. A failing
    /// exporter is logged and skipped; returns how many failed.
    pub async fn record_metrics(&self, metrics: &RequestMetrics) -> usize {
        if self.debug_mode {
            debug!(?metrics, "Request metrics");
        }

        let mut failed = 0;
        for exporter in &self.exporters {
            if let Err(e) = exporter.export_metrics(metrics).await {
                warn!(
                    exporter = exporter.name(),
                    route = %metrics.route,
                    "Failed to export metrics: {}",
                    e
                );
                failed += 1;
            }
        }
        failed
    }
}
