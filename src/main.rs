use savager_proxy::{
    config::{AppConfig, TelemetryConfig},
    server, telemetry,
};
use tracing::{debug, error, info};

fn main() {
    let telemetry_config = TelemetryConfig::from_env();

    // Initialize tracing
    telemetry::init_tracing(&telemetry_config);
    debug!(
        "Telemetry configuration: debug_mode={}, log_format={:?}",
        telemetry_config.debug_mode, telemetry_config.log_format
    );

    // Load configuration
    info!("Loading application configuration");
    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    };
    debug!(
        "Configuration loaded: port={}, host={}, worker_threads={}, upstream_timeout={:?}",
        config.port, config.host, config.worker_threads, config.upstream_timeout
    );

    info!(
        "Configuring tokio runtime with {} worker threads",
        config.worker_threads
    );
    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.worker_threads)
        .thread_stack_size(2 * 1024 * 1024)
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to build tokio runtime: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = runtime.block_on(server::run(config, telemetry_config)) {
        error!("Server error: {}", e);
        std::process::exit(1);
    }
}
