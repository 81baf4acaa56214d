//! backend-service routes.

use axum::extract::{FromRef, Path, State};
use axum::routing::get;
use axum::{Extension, Json, Router};
use opentelemetry::trace::{SpanKind, TraceContextExt};
use opentelemetry::{Context, KeyValue};
use serde_json::{json, Map, Value};

use crate::http::{metrics_handler, ApiError};
use crate::observability::Telemetry;
use crate::upstream::{UpstreamClient, UpstreamError};

/// Upstream endpoints walked by `/distributed-trace`, in call order.
pub const TRACE_STEPS: [&str; 3] = ["redis", "postgres", "health"];

const ENDPOINTS: &[&str] = &[
    "/health",
    "/metrics",
    "/call-frontend",
    "/call-frontend/redis",
    "/call-frontend/postgres",
    "/distributed-trace",
];

#[derive(Clone)]
pub struct BackendState {
    pub telemetry: Telemetry,
    pub upstream: UpstreamClient,
}

impl FromRef<BackendState> for Telemetry {
    fn from_ref(state: &BackendState) -> Self {
        state.telemetry.clone()
    }
}

pub fn routes(state: BackendState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/metrics", get(metrics_handler))
        .route("/call-frontend", get(call_frontend))
        .route("/call-frontend/{*endpoint}", get(call_frontend_endpoint))
        .route("/distributed-trace", get(distributed_trace))
        .with_state(state)
}

async fn root(
    State(state): State<BackendState>,
    Extension(parent): Extension<Context>,
) -> Json<Value> {
    let telemetry = &state.telemetry;
    let cx = telemetry.start_span(
        "root-request",
        SpanKind::Internal,
        &parent,
        vec![KeyValue::new("endpoint", "/")],
    );

    telemetry.logger.info(
        Some(&cx),
        "Root endpoint called",
        json!({ "event": {"action": "root_endpoint"} }),
    );
    cx.span().end();

    let identity = telemetry.logger.identity();
    Json(json!({
        "service": identity.name,
        "version": identity.version,
        "endpoints": ENDPOINTS,
    }))
}

async fn health(State(state): State<BackendState>) -> Json<Value> {
    let identity = state.telemetry.logger.identity();
    Json(json!({
        "status": "healthy",
        "service": identity.name,
        "version": identity.version,
    }))
}

async fn call_frontend(
    State(state): State<BackendState>,
    Extension(parent): Extension<Context>,
) -> Result<Json<Value>, ApiError> {
    let response = state.upstream.get(&parent, "call-frontend-service", "/").await?;
    Ok(Json(json!({
        "status": "success",
        "upstream_service": state.upstream.service(),
        "upstream_response": response.body,
        "response_time_ms": response.duration_ms(),
    })))
}

async fn call_frontend_endpoint(
    State(state): State<BackendState>,
    Extension(parent): Extension<Context>,
    Path(endpoint): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let endpoint = format!("/{}", endpoint.trim_start_matches('/'));
    let response = state
        .upstream
        .get(&parent, "call-frontend-endpoint", &endpoint)
        .await?;
    Ok(Json(json!({
        "status": "success",
        "upstream_service": state.upstream.service(),
        "upstream_endpoint": endpoint,
        "upstream_response": response.body,
        "response_time_ms": response.duration_ms(),
    })))
}

/// Calls every entry of [`TRACE_STEPS`] one after another under a shared
/// parent span. Any step that got a response counts as a success and carries
/// its status; an unreachable step is reported as an error. The endpoint
/// itself always succeeds.
async fn distributed_trace(
    State(state): State<BackendState>,
    Extension(parent): Extension<Context>,
) -> Json<Value> {
    let logger = &state.telemetry.logger;
    let cx = state.telemetry.start_span(
        "distributed-trace-demo",
        SpanKind::Internal,
        &parent,
        vec![KeyValue::new("operation", "distributed_trace_demo")],
    );

    logger.info(
        Some(&cx),
        "Starting distributed trace demonstration",
        json!({ "event": {"action": "distributed_trace_start"} }),
    );

    let mut results = Map::new();
    for step in TRACE_STEPS {
        let endpoint = format!("/{step}");
        let outcome = state
            .upstream
            .get(&cx, &format!("call-{step}"), &endpoint)
            .await;
        let result = match outcome {
            Ok(response) => Ok(response.status),
            Err(UpstreamError::Rejected { status, .. }) => Ok(status),
            Err(e) => Err(e.to_string()),
        };
        let result = match result {
            Ok(status_code) => {
                logger.info(
                    Some(&cx),
                    &format!("Called frontend {endpoint}"),
                    json!({
                        "event": {"action": "trace_step_complete"},
                        "step": {"name": step, "status": "success", "status_code": status_code},
                    }),
                );
                json!({ "status": "success", "status_code": status_code })
            }
            Err(message) => {
                logger.warn(
                    Some(&cx),
                    &format!("Error calling {endpoint}: {message}"),
                    json!({
                        "event": {"action": "trace_step_error"},
                        "step": {"name": step, "status": "error", "error": message},
                    }),
                );
                json!({ "status": "error", "error": message })
            }
        };
        results.insert(step.to_string(), result);
    }

    logger.info(
        Some(&cx),
        "Distributed trace demonstration complete",
        json!({
            "event": {"action": "distributed_trace_complete"},
            "results": results,
        }),
    );
    cx.span().end();

    Json(json!({
        "status": "success",
        "operation": "distributed_trace_demo",
        "results": results,
        "message": "Check the tracing backend to see the full distributed trace",
    }))
}
