//! Request observability middleware.
//!
//! Wraps every route. For each request it opens a server span (continuing an
//! inbound `traceparent`), logs `http_request_start`, hands the span context
//! to the handler as an extension, then records exactly one metric sample and
//! logs `http_request_complete` once the response exists.
//!
//! The panic-catching layer sits inside this one, so a panicking handler
//! still reaches the completion path as a 500. A client that disconnects
//! first drops the request future; the completion path then runs from
//! [`RequestObservation`]'s `Drop` with status 499.

use std::time::{Duration, Instant};

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use opentelemetry::trace::{SpanKind, TraceContextExt};
use opentelemetry::{Context, KeyValue};
use serde_json::json;
use tracing::Level;

use crate::http::request::{request_id, route_label, sanitize_headers};
use crate::http::response::HandlerFault;
use crate::observability::{
    extract_context, record_exception, set_span_error, ErrorInfo, RequestMetricSample, Telemetry,
};

/// Status recorded for requests the client abandoned before a response.
pub const CLIENT_CLOSED_REQUEST: u16 = 499;

pub async fn observe_request(
    State(telemetry): State<Telemetry>,
    mut request: Request,
    next: Next,
) -> Response {
    let observation = RequestObservation::start(telemetry, &request);
    request.extensions_mut().insert(observation.cx.clone());

    let response = next.run(request).await;
    observation.complete(&response);
    response
}

/// One in-flight request. Completes exactly once: through
/// [`complete`](Self::complete), or on drop if the request was cancelled.
struct RequestObservation {
    telemetry: Telemetry,
    cx: Context,
    method: String,
    path: String,
    route: String,
    request_id: String,
    started: Instant,
    completed: bool,
}

impl RequestObservation {
    fn start(telemetry: Telemetry, request: &Request) -> Self {
        let started = Instant::now();
        let method = request.method().as_str().to_string();
        let path = request.uri().path().to_string();
        let route = route_label(request);
        let request_id = request_id(request.headers()).unwrap_or_default().to_string();

        let parent = extract_context(request.headers());
        let cx = telemetry.start_span(
            format!("{method} {route}"),
            SpanKind::Server,
            &parent,
            vec![
                KeyValue::new("http.method", method.clone()),
                KeyValue::new("http.route", route.clone()),
                KeyValue::new("http.target", path.clone()),
            ],
        );

        telemetry.logger.info(
            Some(&cx),
            &format!("{method} {path}"),
            json!({
                "event": {"action": "http_request_start"},
                "http": {
                    "request": {
                        "id": request_id,
                        "method": method,
                        "path": path,
                        "headers": sanitize_headers(request.headers()),
                    },
                },
            }),
        );

        Self {
            telemetry,
            cx,
            method,
            path,
            route,
            request_id,
            started,
            completed: false,
        }
    }

    fn complete(mut self, response: &Response) {
        self.completed = true;
        let fault = response.extensions().get::<HandlerFault>().map(|f| &f.0);
        self.finish(response.status().as_u16(), fault, false);
    }

    fn finish(&self, status: u16, fault: Option<&ErrorInfo>, cancelled: bool) {
        let duration = self.started.elapsed();
        self.telemetry.metrics.record_request(&RequestMetricSample {
            method: self.method.clone(),
            route: self.route.clone(),
            status_code: status,
            duration,
            service_name: self.telemetry.service_name().to_string(),
        });

        let span = self.cx.span();
        span.set_attribute(KeyValue::new("http.status_code", i64::from(status)));

        let extra = self.complete_fields(status, duration, cancelled);
        let duration_ms = duration.as_secs_f64() * 1000.0;
        let (method, path) = (&self.method, &self.path);
        let logger = &self.telemetry.logger;

        if let Some(fault) = fault {
            set_span_error(&self.cx, fault.message.clone());
            record_exception(&self.cx, fault);
            let message = format!("{method} {path} - {status} ({duration_ms:.2}ms)");
            logger.error(Some(&self.cx), &message, extra, fault);
        } else if cancelled {
            set_span_error(&self.cx, "request cancelled by client");
            let message = format!("{method} {path} - cancelled ({duration_ms:.2}ms)");
            logger.log(Level::WARN, Some(&self.cx), &message, extra, None);
        } else {
            if status >= 500 {
                set_span_error(&self.cx, format!("HTTP {status}"));
            }
            let message = format!("{method} {path} - {status} ({duration_ms:.2}ms)");
            logger.info(Some(&self.cx), &message, extra);
        }
        span.end();
    }

    fn complete_fields(
        &self,
        status: u16,
        duration: Duration,
        cancelled: bool,
    ) -> serde_json::Value {
        let mut response = json!({
            "status_code": status,
            "duration_ms": duration.as_secs_f64() * 1000.0,
        });
        if cancelled {
            response["cancelled"] = json!(true);
        }
        json!({
            "event": {"action": "http_request_complete", "duration": duration.as_secs_f64()},
            "http": {
                "request": {
                    "id": self.request_id,
                    "method": self.method,
                    "path": self.path,
                    "route": self.route,
                },
                "response": response,
            },
        })
    }
}

impl Drop for RequestObservation {
    fn drop(&mut self) {
        if !self.completed {
            self.completed = true;
            self.finish(CLIENT_CLOSED_REQUEST, None, true);
        }
    }
}
