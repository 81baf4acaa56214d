//! HTTP server setup.
//!
//! # Responsibilities
//! - Wrap a service's routes in the shared middleware stack
//! - Serve `/metrics` from the service's own registry
//! - Bind and run with graceful shutdown
//!
//! # Layer order (outermost first)
//! ```text
//! SetRequestId → PropagateRequestId → observe_request → CatchPanic → handler
//! ```

use std::future::Future;

use axum::extract::State;
use axum::http::header;
use axum::middleware::from_fn_with_state;
use axum::response::IntoResponse;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};

use crate::http::middleware::observe_request;
use crate::http::response::panic_response;
use crate::observability::Telemetry;

const PROMETHEUS_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Apply the observability and request-id layers to a finished router.
pub fn with_observability(routes: Router, telemetry: Telemetry) -> Router {
    routes
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(from_fn_with_state(telemetry, observe_request))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
}

/// Prometheus text exposition of the service's registry.
pub async fn metrics_handler(State(telemetry): State<Telemetry>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, PROMETHEUS_CONTENT_TYPE)],
        telemetry.metrics.render(),
    )
}

/// HTTP server for one service.
pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    pub fn new(routes: Router, telemetry: Telemetry) -> Self {
        Self {
            router: with_observability(routes, telemetry),
        }
    }

    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Serve until `shutdown` resolves, then finish in-flight requests.
    pub async fn run<F>(self, listener: TcpListener, shutdown: F) -> Result<(), std::io::Error>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown)
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}
