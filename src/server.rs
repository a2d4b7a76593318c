use axum::{
    body::Body,
    http::{Method, Request, Response, StatusCode},
    middleware::{from_fn, from_fn_with_state, Next},
    routing::{any, get},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::{future::Future, sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tower_http::cors::{AllowHeaders, AllowOrigin, CorsLayer};
use tracing::{debug, error, info};

use crate::{
    config::{AppConfig, TelemetryConfig},
    error::AppError,
    handlers,
    proxy::Forwarder,
    telemetry::{
        metrics_middleware, request_id_middleware, ConsolePlugin, MetricsRegistry,
        PrometheusExporter,
    },
};

/// Methods a browser on the allowed origin may use.
pub const ALLOWED_METHODS: [Method; 6] = [
    Method::GET,
    Method::HEAD,
    Method::PUT,
    Method::PATCH,
    Method::POST,
    Method::DELETE,
];

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub forwarder: Forwarder,
    pub metrics: Arc<MetricsRegistry>,
    /// Renders this gateway's Prometheus series for `GET /metrics`.
    pub metrics_handle: PrometheusHandle,
}

impl AppState {
    pub fn new(config: AppConfig, telemetry: &TelemetryConfig) -> Result<Self, AppError> {
        let forwarder = Forwarder::new(&config)?;

        let prometheus = PrometheusExporter::new("savager_proxy");
        let metrics_handle = prometheus.handle();

        let mut metrics = MetricsRegistry::new(telemetry.debug_mode).with_exporter(prometheus);
        if telemetry.debug_mode {
            debug!("Registering Console plugin for metrics");
            metrics = metrics.with_exporter(ConsolePlugin::new());
        }

        Ok(Self {
            config: Arc::new(config),
            forwarder,
            metrics: Arc::new(metrics),
            metrics_handle,
        })
    }
}

/// Only `config.allowed_origin` gets permissive CORS headers; other origins
/// are still served but receive no `Access-Control-Allow-Origin`.
pub fn cors_layer(config: &AppConfig) -> CorsLayer {
    CorsLayer::new()
        .allow_origin(AllowOrigin::list([config.allowed_origin.clone()]))
        .allow_methods(ALLOWED_METHODS)
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true)
        .max_age(Duration::from_secs(3600))
}

/// The CORS layer answers preflights itself with 200; browsers and the
/// frontend expect 204 No Content.
pub async fn preflight_no_content(req: Request<Body>, next: Next) -> Response<Body> {
    let is_preflight = req.method() == Method::OPTIONS;
    let mut response = next.run(req).await;
    if is_preflight && response.status() == StatusCode::OK {
        *response.status_mut() = StatusCode::NO_CONTENT;
    }
    response
}

pub fn build_router(state: AppState) -> Router {
    let cors = cors_layer(&state.config);

    Router::new()
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health_check))
        .route("/metrics", get(handlers::render_metrics))
        .route("/api/*path", any(handlers::api_passthrough))
        .route("/swagger", any(handlers::docs_passthrough))
        .route("/swagger/*path", any(handlers::docs_passthrough))
        .fallback(handlers::fallback)
        .layer(from_fn_with_state(state.metrics.clone(), metrics_middleware))
        .layer(from_fn(request_id_middleware))
        .with_state(state)
        .layer(cors)
        .layer(from_fn(preflight_no_content))
}

/// Serves the gateway on an already bound listener until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> Result<(), AppError>
where
    F: Future<Output = ()> + Send + 'static,
{
    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

pub async fn run(config: AppConfig, telemetry: TelemetryConfig) -> Result<(), AppError> {
    let addr = config.bind_addr()?;
    let upstream = config.upstream.base().to_string();
    let origin = config.allowed_origin.to_str().unwrap_or_default().to_string();

    let state = AppState::new(config, &telemetry)?;
    let listener = TcpListener::bind(addr).await?;
    tokio::spawn(metrics_upkeep(state.metrics_handle.clone()));

    info!("Proxy server running on {}", listener.local_addr()?);
    info!(upstream = %upstream, allowed_origin = %origin, "Forwarding /api and /swagger requests");

    serve(listener, state, shutdown_signal()).await
}

/// Keeps histogram buffers bounded between scrapes.
async fn metrics_upkeep(handle: PrometheusHandle) {
    let mut interval = tokio::time::interval(Duration::from_secs(5));
    loop {
        interval.tick().await;
        handle.run_upkeep();
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to install CTRL+C signal handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            debug!("CTRL+C signal received");
        },
        _ = terminate => {
            debug!("Terminate signal received");
        },
    }
    info!("Shutdown signal received, starting graceful shutdown");
}
