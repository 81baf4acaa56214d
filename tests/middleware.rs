//! Observability middleware behaviour independent of either service.

use axum::http::{HeaderMap, StatusCode};
use axum::routing::get;
use axum::{Extension, Json, Router};
use opentelemetry::trace::{SpanId, SpanKind};
use opentelemetry::Context;
use serde_json::{json, Value};

use tracelink::http::with_observability;
use tracelink::observability::inject_context;
use tracelink::observability::metrics::HTTP_REQUESTS_TOTAL;

mod common;
use common::{find_sample, span_is_error, span_named, TestTelemetry};

async fn explode() -> Json<Value> {
    panic!("handler exploded");
}

async fn echo_context(Extension(cx): Extension<Context>) -> Json<Value> {
    let mut headers = HeaderMap::new();
    inject_context(&cx, &mut headers);
    let traceparent = headers["traceparent"].to_str().unwrap_or_default().to_string();
    Json(json!({ "traceparent": traceparent }))
}

fn app(t: &TestTelemetry) -> Router {
    let routes = Router::new()
        .route("/explode", get(explode))
        .route("/context", get(echo_context));
    with_observability(routes, t.telemetry.clone())
}

#[tokio::test]
async fn test_panic_still_counted_and_logged() {
    let mut t = TestTelemetry::new("backend-service");
    let app = app(&t);

    let response = common::get(&app, "/explode", &[]).await;

    assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(response.body["detail"], "Internal server error: handler exploded");
    assert_eq!(
        find_sample(
            &t.metrics(),
            HTTP_REQUESTS_TOTAL,
            &[("endpoint", "/explode"), ("status", "500")]
        ),
        Some(1.0)
    );
    assert_eq!(
        find_sample(
            &t.metrics(),
            "http_request_duration_seconds_count",
            &[("endpoint", "/explode")]
        ),
        Some(1.0)
    );

    assert_eq!(t.logs.with_action("http_request_start").len(), 1);
    let complete = t.logs.with_action("http_request_complete");
    assert_eq!(complete.len(), 1);
    assert_eq!(complete[0]["level"], "ERROR");
    assert_eq!(complete[0]["error.type"], "panic");
    assert_eq!(complete[0]["error.message"], "handler exploded");

    let spans = t.finished_spans().await;
    let server = span_named(&spans, "GET /explode");
    assert!(span_is_error(server));
    assert!(server.events.iter().any(|e| e.name == "exception"));
}

#[tokio::test]
async fn test_handler_sees_server_span() {
    let mut t = TestTelemetry::new("backend-service");
    let app = app(&t);

    let response = common::get(&app, "/context", &[("x-request-id", "req-123")]).await;

    assert_eq!(response.headers["x-request-id"], "req-123");
    let traceparent = response.body["traceparent"].as_str().unwrap().to_string();

    let start = &t.logs.with_action("http_request_start")[0];
    assert_eq!(start["http"]["request"]["id"], "req-123");
    assert!(traceparent.contains(start["trace.span_id"].as_str().unwrap()));

    let spans = t.finished_spans().await;
    let server = span_named(&spans, "GET /context");
    let expected = format!(
        "00-{}-{}-01",
        server.span_context.trace_id(),
        server.span_context.span_id()
    );
    assert_eq!(traceparent, expected);
    assert_eq!(server.parent_span_id, SpanId::INVALID);
    assert_eq!(server.span_kind, SpanKind::Server);
}

#[tokio::test]
async fn test_credentials_never_logged() {
    let t = TestTelemetry::new("backend-service");
    let app = app(&t);

    common::get(&app, "/context", &[("authorization", "Bearer hunter2")]).await;

    let start = &t.logs.with_action("http_request_start")[0];
    assert_eq!(start["http"]["request"]["headers"]["authorization"], "[REDACTED]");
    assert!(t.logs.lines().iter().all(|line| !line.contains("hunter2")));
}

#[tokio::test]
async fn test_concurrent_requests_each_counted_once() {
    let t = TestTelemetry::new("backend-service");
    let app = app(&t);

    let mut tasks = Vec::new();
    for _ in 0..20 {
        let app = app.clone();
        tasks.push(tokio::spawn(async move {
            common::get(&app, "/context", &[]).await.status
        }));
    }
    for task in tasks {
        assert_eq!(task.await.unwrap(), StatusCode::OK);
    }

    assert_eq!(
        find_sample(&t.metrics(), HTTP_REQUESTS_TOTAL, &[("endpoint", "/context")]),
        Some(20.0)
    );
    assert_eq!(t.logs.with_action("http_request_complete").len(), 20);
}
