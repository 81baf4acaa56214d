//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! middleware / handlers / upstream client produce:
//!     → logging.rs (tracing events rendered as one JSON record per line)
//!     → metrics.rs (counters and histograms, rendered at /metrics)
//!     → spans.rs (OpenTelemetry spans, exported in batches via export.rs)
//!
//! context.rs carries the active span between all three.
//! ```
//!
//! # Design Decisions
//! - Trace context is an explicit [`opentelemetry::Context`]; there is no
//!   ambient current span
//! - The metric registry is owned by [`Telemetry`], not installed globally
//! - Every request produces exactly one metric sample and two log records

use std::borrow::Cow;
use std::sync::Arc;

use opentelemetry::trace::{SpanKind, TraceContextExt, Tracer as _};
use opentelemetry::{Context, KeyValue};
use opentelemetry_sdk::trace::Tracer;

pub mod context;
pub mod export;
pub mod logging;
pub mod metrics;
pub mod spans;

#[cfg(test)]
pub(crate) mod testing;

pub use self::context::{current_trace_ids, extract_context, inject_context};
pub use self::logging::{init_logging, ErrorInfo, LogRecord, StructuredLogger};
pub use self::metrics::{MetricsRegistry, RequestMetricSample, UpstreamCallMetricSample};
pub use self::spans::{record_exception, set_span_error, SpanPipeline};

/// Everything request-path code needs to observe itself. Cheap to clone.
#[derive(Clone)]
pub struct Telemetry {
    pub logger: StructuredLogger,
    pub metrics: Arc<MetricsRegistry>,
    pub tracer: Tracer,
}

impl Telemetry {
    pub fn new(logger: StructuredLogger, metrics: Arc<MetricsRegistry>, tracer: Tracer) -> Self {
        Self {
            logger,
            metrics,
            tracer,
        }
    }

    pub fn service_name(&self) -> &str {
        &self.logger.identity().name
    }

    /// Start a span under `parent` and return the context that owns it. The
    /// span ends on an explicit `cx.span().end()` or when the last clone of
    /// the returned context is dropped.
    pub fn start_span(
        &self,
        name: impl Into<Cow<'static, str>>,
        kind: SpanKind,
        parent: &Context,
        attributes: Vec<KeyValue>,
    ) -> Context {
        let span = self
            .tracer
            .span_builder(name)
            .with_kind(kind)
            .with_attributes(attributes)
            .start_with_context(&self.tracer, parent);
        parent.with_span(span)
    }
}
