//! frontend-service routes.
//!
//! One `/{name}` route per configured [`DatastoreProbe`], answering the
//! probe's method (GET, or POST for probes that write).

use std::sync::Arc;

use axum::extract::State;
use axum::http::Method;
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use opentelemetry::trace::{SpanKind, TraceContextExt};
use opentelemetry::{Context, KeyValue};
use serde_json::{json, Map, Value};

use crate::datastore::DatastoreProbe;
use crate::http::{metrics_handler, ApiError};
use crate::observability::{record_exception, set_span_error, ErrorInfo, Telemetry};

pub fn routes(telemetry: Telemetry, probes: Vec<Arc<dyn DatastoreProbe>>) -> Router {
    let mut endpoints = vec!["/health".to_string(), "/metrics".to_string()];
    endpoints.extend(probes.iter().map(|p| format!("/{}", p.name())));

    let mut router = Router::new()
        .route("/", get(move |state: State<Telemetry>| root(state, endpoints.clone())))
        .route("/health", get(health))
        .route("/metrics", get(metrics_handler));

    for probe in probes {
        let path = format!("/{}", probe.name());
        let method = probe.method();
        let handler =
            move |State(telemetry): State<Telemetry>, Extension(parent): Extension<Context>| {
                run_probe(telemetry, parent, probe.clone())
            };
        let route = if method == Method::POST {
            post(handler)
        } else {
            get(handler)
        };
        router = router.route(&path, route);
    }

    router.with_state(telemetry)
}

async fn root(State(telemetry): State<Telemetry>, endpoints: Vec<String>) -> Json<Value> {
    let identity = telemetry.logger.identity();
    Json(json!({
        "message": format!("{} example service", identity.name),
        "version": identity.version,
        "endpoints": endpoints,
    }))
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "healthy" }))
}

async fn run_probe(
    telemetry: Telemetry,
    parent: Context,
    probe: Arc<dyn DatastoreProbe>,
) -> Result<Json<Value>, ApiError> {
    let name = probe.name();
    let cx = telemetry.start_span(
        format!("{name}-test"),
        SpanKind::Internal,
        &parent,
        vec![KeyValue::new("db.system", name)],
    );

    let outcome = probe.probe().await;
    let span = cx.span();
    match outcome {
        Ok(fields) => {
            let mut body = Map::new();
            body.insert("status".into(), json!("success"));
            body.insert("service".into(), json!(name));
            body.extend(fields);
            span.end();
            Ok(Json(Value::Object(body)))
        }
        Err(e) => {
            let info = ErrorInfo::from_error(&e);
            set_span_error(&cx, e.to_string());
            record_exception(&cx, &info);
            let err = ApiError::from(e);
            telemetry.logger.error(
                Some(&cx),
                &err.to_string(),
                json!({
                    "event": {"action": "datastore_probe_error"},
                    "datastore": {"name": name},
                }),
                &info,
            );
            span.end();
            Err(err)
        }
    }
}
