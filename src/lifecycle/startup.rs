//! Startup orchestration shared by both service binaries.
//!
//! # Order
//! 1. Resolve configuration (defaults → file → env → CLI) and validate
//! 2. Install the `tracing` subscriber (request records and diagnostics)
//! 3. Build telemetry: metric registry, span pipeline, request logger
//! 4. Build the service's routes and bind the listener
//! 5. Serve until SIGINT/SIGTERM, then drain the span queue

use std::path::PathBuf;
use std::sync::Arc;

use axum::Router;
use clap::Parser;
use opentelemetry::trace::TraceError;
use tokio::net::TcpListener;

use crate::config::validation::validate_config;
use crate::config::{load_config, ConfigError, ServiceConfig};
use crate::http::HttpServer;
use crate::lifecycle::shutdown::Shutdown;
use crate::lifecycle::signals::spawn_signal_listener;
use crate::observability::export::span_exporter;
use crate::observability::metrics::MetricsError;
use crate::observability::{
    init_logging, MetricsRegistry, SpanPipeline, StructuredLogger, Telemetry,
};
use crate::upstream::ClientBuildError;

/// Command-line arguments accepted by both services.
#[derive(Debug, Clone, Default, Parser)]
#[command(version, about)]
pub struct ServiceArgs {
    /// TOML configuration file layered over the built-in defaults.
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Listen address. Takes precedence over the file and `BIND_ADDRESS`.
    #[arg(short, long, value_name = "ADDR")]
    pub bind: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Metrics(#[from] MetricsError),
    #[error("failed to create span exporter: {0}")]
    Exporter(#[from] TraceError),
    #[error(transparent)]
    Upstream(#[from] ClientBuildError),
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },
    #[error("server error: {0}")]
    Serve(std::io::Error),
}

/// Final configuration for a process started with `args`.
pub fn resolve_config(
    defaults: ServiceConfig,
    args: &ServiceArgs,
) -> Result<ServiceConfig, ConfigError> {
    let mut config = load_config(defaults, args.config.as_deref())?;
    if let Some(bind) = &args.bind {
        config.listener.bind_address = bind.clone();
        validate_config(&config).map_err(ConfigError::Validation)?;
    }
    Ok(config)
}

/// Telemetry for one process plus the pipeline that exports its spans.
/// Must run inside a Tokio runtime.
pub fn build_telemetry(config: &ServiceConfig) -> Result<(Telemetry, SpanPipeline), StartupError> {
    let metrics = Arc::new(MetricsRegistry::new()?);
    let pipeline = SpanPipeline::spawn(
        span_exporter(&config.tracing)?,
        &config.service,
        &config.tracing,
        Some(metrics.clone()),
    );
    let logger = StructuredLogger::new(config.service.clone());

    Ok((Telemetry::new(logger, metrics, pipeline.tracer()), pipeline))
}

/// Run one service to completion.
///
/// `build_routes` receives the resolved configuration and the process
/// telemetry and returns the service's routes with state applied.
pub async fn run_service<F>(
    defaults: ServiceConfig,
    args: ServiceArgs,
    build_routes: F,
) -> Result<(), StartupError>
where
    F: FnOnce(&ServiceConfig, Telemetry) -> Result<Router, StartupError>,
{
    let config = resolve_config(defaults, &args)?;
    init_logging(&config.service, &config.observability.log_level);

    tracing::info!(
        service = %config.service.name,
        version = %config.service.version,
        environment = %config.service.environment,
        bind_address = %config.listener.bind_address,
        "Configuration loaded"
    );

    let (telemetry, pipeline) = build_telemetry(&config)?;
    let routes = build_routes(&config, telemetry.clone())?;
    let server = HttpServer::new(routes, telemetry);

    let addr = config.listener.bind_address.clone();
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|source| StartupError::Bind { addr, source })?;

    let shutdown = Shutdown::new();
    spawn_signal_listener(shutdown.clone());

    let served = server.run(listener, shutdown.signalled()).await;

    pipeline.shutdown().await;
    tracing::info!("Shutdown complete");
    served.map_err(StartupError::Serve)
}
