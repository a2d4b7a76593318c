use crate::telemetry::{
    metrics::{ExportError, MetricsExporter},
    RequestMetrics,
};
use async_trait::async_trait;
use metrics::{Key, Label, Level, Metadata, Recorder};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle, PrometheusRecorder};

/// Records request counters and histograms into a Prometheus recorder owned by
/// this exporter, rendered on `GET /metrics` through [`PrometheusExporter::handle`].
/// The recorder is not installed globally, so each gateway keeps its own series.
pub struct PrometheusExporter {
    namespace: String,
    recorder: PrometheusRecorder,
}

impl PrometheusExporter {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            recorder: PrometheusBuilder::new().build_recorder(),
        }
    }

    pub fn handle(&self) -> PrometheusHandle {
        self.recorder.handle()
    }

    fn key(&self, suffix: &str, labels: Vec<Label>) -> Key {
        Key::from_parts(format!("{}_{}", self.namespace, suffix), labels)
    }
}

fn metadata() -> Metadata<'static> {
    Metadata::new(module_path!(), Level::INFO, Some(module_path!()))
}

#[async_trait]
impl MetricsExporter for PrometheusExporter {
    async fn export_metrics(&self, metrics: &RequestMetrics) -> Result<(), ExportError> {
        let labels = vec![
            Label::new("route", metrics.route.clone()),
            Label::new("method", metrics.method.clone()),
            Label::new("status", metrics.status_code.to_string()),
        ];
        let meta = metadata();

        self.recorder
            .register_counter(&self.key("requests_total", labels.clone()), &meta)
            .increment(1);
        self.recorder
            .register_histogram(&self.key("request_latency_seconds", labels.clone()), &meta)
            .record(metrics.total_latency.as_secs_f64());

        if let Some(size) = metrics.request_size {
            self.recorder
                .register_histogram(&self.key("request_size_bytes", labels.clone()), &meta)
                .record(size as f64);
        }
        if let Some(size) = metrics.response_size {
            self.recorder
                .register_histogram(&self.key("response_size_bytes", labels), &meta)
                .record(size as f64);
        }

        if let Some(error_type) = &metrics.error_type {
            let labels = vec![
                Label::new("route", metrics.route.clone()),
                Label::new("error_type", error_type.clone()),
            ];
            self.recorder
                .register_counter(&self.key("errors_total", labels), &meta)
                .increment(u64::from(metrics.error_count));
        }

        Ok(())
    }

    fn name(&self) -> &'static str {
        "prometheus"
    }
}
