//! Instrumentation around a single outbound call.
//!
//! One call is one network round trip: no retries, no backoff. The outcome
//! is classified three ways and the distinction is preserved all the way to
//! the HTTP status the caller sees:
//!
//! ```text
//! 2xx            → Ok(UpstreamResponse)         info log, metric sample
//! other status   → Err(UpstreamError::Rejected) warn log, metric sample,
//!                                               status mirrored
//! no response    → Err(UpstreamError::Unreachable) error log + stack, span errored, 503
//! dropped early  → warn log, metric sample with status 499, span errored
//! ```

use std::error::Error;
use std::future::Future;
use std::time::{Duration, Instant};

use opentelemetry::trace::{SpanKind, TraceContextExt};
use opentelemetry::{Context, KeyValue};
use serde_json::{json, Value};

use crate::http::middleware::CLIENT_CLOSED_REQUEST;
use crate::observability::{
    record_exception, set_span_error, ErrorInfo, Telemetry, UpstreamCallMetricSample,
};

pub type BoxError = Box<dyn Error + Send + Sync>;

/// What is being called.
#[derive(Debug, Clone)]
pub struct UpstreamCall {
    pub service: String,
    pub method: String,
    pub endpoint: String,
    pub span_name: String,
}

/// Status and body exactly as the upstream sent them.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    pub body: String,
}

/// A successful upstream call.
#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    pub status: u16,
    /// The upstream body as JSON, or the raw text as a JSON string when the
    /// body is not JSON.
    pub body: Value,
    pub duration: Duration,
}

impl UpstreamResponse {
    pub fn duration_ms(&self) -> f64 {
        self.duration.as_secs_f64() * 1000.0
    }
}

#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    /// The upstream could not be reached at all.
    #[error("{service} unavailable: {source}")]
    Unreachable { service: String, source: BoxError },

    /// The upstream answered with a non-success status.
    #[error("{service} error: {body}")]
    Rejected {
        service: String,
        status: u16,
        body: String,
    },
}

impl UpstreamError {
    /// HTTP status to answer the inbound request with.
    pub fn status_code(&self) -> u16 {
        match self {
            UpstreamError::Unreachable { .. } => 503,
            UpstreamError::Rejected { status, .. } => *status,
        }
    }
}

/// Run `call` under a client span, recording metrics and logs.
///
/// `perform` receives the client span's context so it can propagate it (e.g.
/// as a `traceparent` header). If the returned future is dropped before
/// `perform` settles, the call is recorded as cancelled.
pub async fn instrument_call<F, Fut, E>(
    telemetry: &Telemetry,
    parent: &Context,
    call: &UpstreamCall,
    perform: F,
) -> Result<UpstreamResponse, UpstreamError>
where
    F: FnOnce(Context) -> Fut,
    Fut: Future<Output = Result<RawResponse, E>>,
    E: Error + Send + Sync + 'static,
{
    let cx = telemetry.start_span(
        call.span_name.clone(),
        SpanKind::Client,
        parent,
        vec![
            KeyValue::new("upstream.service", call.service.clone()),
            KeyValue::new("upstream.endpoint", call.endpoint.clone()),
            KeyValue::new("http.method", call.method.clone()),
        ],
    );

    telemetry.logger.info(
        Some(&cx),
        &format!("Calling {} endpoint: {}", call.service, call.endpoint),
        json!({
            "event": {"action": "upstream_call_start"},
            "upstream": {"service": call.service, "endpoint": call.endpoint},
        }),
    );

    let mut pending = PendingCall {
        telemetry,
        call,
        cx: cx.clone(),
        started: Instant::now(),
        settled: false,
    };
    let outcome = perform(cx.clone()).await;
    pending.settled = true;
    let duration = pending.started.elapsed();
    let duration_ms = duration.as_secs_f64() * 1000.0;
    let span = cx.span();

    let raw = match outcome {
        Ok(raw) => raw,
        Err(e) => {
            let info = ErrorInfo::from_error(&e);
            set_span_error(&cx, e.to_string());
            record_exception(&cx, &info);
            telemetry.logger.error(
                Some(&cx),
                &format!("Error calling {}: {}", call.service, e),
                json!({
                    "event": {"action": "upstream_call_error"},
                    "upstream": {"service": call.service, "endpoint": call.endpoint},
                }),
                &info,
            );
            span.end();
            return Err(UpstreamError::Unreachable {
                service: call.service.clone(),
                source: Box::new(e),
            });
        }
    };

    telemetry.metrics.record_upstream(&UpstreamCallMetricSample {
        upstream_service: call.service.clone(),
        method: call.method.clone(),
        status_code: raw.status,
        duration,
    });
    span.set_attribute(KeyValue::new("http.status_code", i64::from(raw.status)));

    if !(200..300).contains(&raw.status) {
        telemetry.logger.warn(
            Some(&cx),
            &format!("{} returned error: {}", call.service, raw.status),
            json!({
                "event": {"action": "upstream_call_error"},
                "upstream": {
                    "service": call.service,
                    "endpoint": call.endpoint,
                    "status_code": raw.status,
                    "duration_ms": duration_ms,
                },
            }),
        );
        span.end();
        return Err(UpstreamError::Rejected {
            service: call.service.clone(),
            status: raw.status,
            body: raw.body,
        });
    }

    telemetry.logger.info(
        Some(&cx),
        &format!("{} {} responded", call.service, call.endpoint),
        json!({
            "event": {"action": "upstream_call_complete"},
            "upstream": {
                "service": call.service,
                "endpoint": call.endpoint,
                "status_code": raw.status,
                "duration_ms": duration_ms,
            },
        }),
    );
    span.end();

    let body = serde_json::from_str(&raw.body).unwrap_or(Value::String(raw.body));
    Ok(UpstreamResponse {
        status: raw.status,
        body,
        duration,
    })
}

/// Records the call as cancelled if dropped before `settled` is set.
struct PendingCall<'a> {
    telemetry: &'a Telemetry,
    call: &'a UpstreamCall,
    cx: Context,
    started: Instant,
    settled: bool,
}

impl Drop for PendingCall<'_> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        let duration = self.started.elapsed();
        self.telemetry.metrics.record_upstream(&UpstreamCallMetricSample {
            upstream_service: self.call.service.clone(),
            method: self.call.method.clone(),
            status_code: CLIENT_CLOSED_REQUEST,
            duration,
        });
        self.telemetry.logger.warn(
            Some(&self.cx),
            &format!("Call to {} cancelled", self.call.service),
            json!({
                "event": {"action": "upstream_call_cancelled"},
                "upstream": {
                    "service": self.call.service,
                    "endpoint": self.call.endpoint,
                    "duration_ms": duration.as_secs_f64() * 1000.0,
                },
            }),
        );
        set_span_error(&self.cx, "call cancelled before completion");
        let span = self.cx.span();
        span.set_attribute(KeyValue::new("http.status_code", i64::from(CLIENT_CLOSED_REQUEST)));
        span.end();
    }
}
