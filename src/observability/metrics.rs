//! Metrics collection and exposition.
//!
//! # Metrics
//! - `http_requests_total` (counter): inbound requests by method, endpoint,
//!   status, service
//! - `http_request_duration_seconds` (histogram): inbound latency by method, endpoint, service
//! - `upstream_requests_total` (counter): outbound calls by upstream_service, method, status
//! - `upstream_request_duration_seconds` (histogram): outbound latency by
//!   upstream_service, method
//! - `trace_spans_dropped_total` (counter): finished spans evicted from a full
//!   export queue
//!
//! # Design Decisions
//! - The registry owns its own Prometheus recorder instead of installing a
//!   global one; whoever builds the HTTP layer holds it for the process lifetime
//! - Metric updates go through the `metrics` macros and are atomic
//! - Histogram buckets match the Prometheus client defaults

use std::time::Duration;

use metrics::{describe_counter, describe_histogram, Unit};
use metrics_exporter_prometheus::{
    BuildError, Matcher, PrometheusBuilder, PrometheusHandle, PrometheusRecorder,
};

pub const HTTP_REQUESTS_TOTAL: &str = "http_requests_total";
pub const HTTP_REQUEST_DURATION: &str = "http_request_duration_seconds";
pub const UPSTREAM_REQUESTS_TOTAL: &str = "upstream_requests_total";
pub const UPSTREAM_REQUEST_DURATION: &str = "upstream_request_duration_seconds";
pub const SPANS_DROPPED_TOTAL: &str = "trace_spans_dropped_total";

const LATENCY_BUCKETS: &[f64] = &[
    0.005, 0.01, 0.025, 0.05, 0.075, 0.1, 0.25, 0.5, 0.75, 1.0, 2.5, 5.0, 7.5, 10.0,
];

#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    #[error("invalid histogram buckets: {0}")]
    Buckets(#[from] BuildError),
}

/// One completed inbound request.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestMetricSample {
    pub method: String,
    pub route: String,
    pub status_code: u16,
    pub duration: Duration,
    pub service_name: String,
}

/// One completed outbound call that produced an HTTP status.
#[derive(Debug, Clone, PartialEq)]
pub struct UpstreamCallMetricSample {
    pub upstream_service: String,
    pub method: String,
    pub status_code: u16,
    pub duration: Duration,
}

/// Process-lifetime metric aggregation.
pub struct MetricsRegistry {
    recorder: PrometheusRecorder,
    handle: PrometheusHandle,
}

impl MetricsRegistry {
    pub fn new() -> Result<Self, MetricsError> {
        let recorder = PrometheusBuilder::new()
            .set_buckets_for_metric(
                Matcher::Suffix("_duration_seconds".to_string()),
                LATENCY_BUCKETS,
            )?
            .build_recorder();
        let handle = recorder.handle();

        let registry = Self { recorder, handle };
        registry.scoped(|| {
            describe_counter!(HTTP_REQUESTS_TOTAL, Unit::Count, "Total HTTP requests");
            describe_histogram!(HTTP_REQUEST_DURATION, Unit::Seconds, "HTTP request duration");
            describe_counter!(
                UPSTREAM_REQUESTS_TOTAL,
                Unit::Count,
                "Total upstream service requests"
            );
            describe_histogram!(
                UPSTREAM_REQUEST_DURATION,
                Unit::Seconds,
                "Upstream service request duration"
            );
            describe_counter!(
                SPANS_DROPPED_TOTAL,
                Unit::Count,
                "Finished spans dropped because the export queue was full"
            );
        });
        Ok(registry)
    }

    /// Run `f` with this registry's recorder as the target of the `metrics` macros.
    fn scoped<T>(&self, f: impl FnOnce() -> T) -> T {
        metrics::with_local_recorder(&self.recorder, f)
    }

    pub fn record_request(&self, sample: &RequestMetricSample) {
        self.scoped(|| {
            metrics::counter!(
                HTTP_REQUESTS_TOTAL,
                "method" => sample.method.clone(),
                "endpoint" => sample.route.clone(),
                "status" => sample.status_code.to_string(),
                "service" => sample.service_name.clone()
            )
            .increment(1);
            metrics::histogram!(
                HTTP_REQUEST_DURATION,
                "method" => sample.method.clone(),
                "endpoint" => sample.route.clone(),
                "service" => sample.service_name.clone()
            )
            .record(sample.duration.as_secs_f64());
        });
    }

    pub fn record_upstream(&self, sample: &UpstreamCallMetricSample) {
        self.scoped(|| {
            metrics::counter!(
                UPSTREAM_REQUESTS_TOTAL,
                "upstream_service" => sample.upstream_service.clone(),
                "method" => sample.method.clone(),
                "status" => sample.status_code.to_string()
            )
            .increment(1);
            metrics::histogram!(
                UPSTREAM_REQUEST_DURATION,
                "upstream_service" => sample.upstream_service.clone(),
                "method" => sample.method.clone()
            )
            .record(sample.duration.as_secs_f64());
        });
    }

    pub fn record_dropped_spans(&self, count: u64) {
        self.scoped(|| metrics::counter!(SPANS_DROPPED_TOTAL).increment(count));
    }

    /// Prometheus text exposition of everything recorded so far.
    pub fn render(&self) -> String {
        self.handle.render()
    }
}
