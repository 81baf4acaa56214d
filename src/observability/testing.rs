//! Helpers shared by the crate's unit tests.

use std::io;
use std::sync::{Arc, OnceLock};

use opentelemetry::trace::{Status, TraceContextExt, Tracer as _, TracerProvider as _};
use opentelemetry::Context;
use opentelemetry_sdk::export::trace::SpanData;
use opentelemetry_sdk::testing::trace::InMemorySpanExporter;
use opentelemetry_sdk::trace::TracerProvider;
use parking_lot::Mutex;
use serde_json::Value;
use tracing::subscriber::DefaultGuard;
use tracing::Level;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;

use crate::config::{ServiceIdentity, TracingConfig};
use crate::observability::logging::{record_layer, StructuredLogger};
use crate::observability::metrics::MetricsRegistry;
use crate::observability::spans::SpanPipeline;
use crate::observability::Telemetry;

/// Value of the first sample line of `name` whose labels include every pair
/// in `labels`. Works on counters and on histogram `_count` / `_sum` series.
pub fn find_sample(exposition: &str, name: &str, labels: &[(&str, &str)]) -> Option<f64> {
    exposition
        .lines()
        .filter(|line| !line.starts_with('#'))
        .filter(|line| {
            line.strip_prefix(name)
                .is_some_and(|rest| rest.starts_with('{') || rest.starts_with(' '))
        })
        .find(|line| {
            labels
                .iter()
                .all(|(key, value)| line.contains(&format!("{key}=\"{value}\"")))
        })
        .and_then(|line| line.rsplit(' ').next())
        .and_then(|value| value.parse().ok())
}

pub fn span_attribute(span: &SpanData, key: &str) -> Option<opentelemetry::Value> {
    span.attributes
        .iter()
        .find(|kv| kv.key.as_str() == key)
        .map(|kv| kv.value.clone())
}

pub fn span_is_error(span: &SpanData) -> bool {
    matches!(span.status, Status::Error { .. })
}

/// Sampled span that nothing exports.
pub fn test_span(name: &'static str) -> Context {
    static PROVIDER: OnceLock<TracerProvider> = OnceLock::new();
    let tracer = PROVIDER
        .get_or_init(|| TracerProvider::builder().build())
        .tracer("test");
    Context::new().with_span(tracer.start_with_context(name, &Context::new()))
}

/// Captures rendered request records.
#[derive(Clone, Default)]
pub struct MemoryWriter {
    buf: Arc<Mutex<Vec<u8>>>,
}

impl MemoryWriter {
    pub fn lines(&self) -> Vec<String> {
        String::from_utf8_lossy(&self.buf.lock())
            .lines()
            .map(str::to_string)
            .collect()
    }

    pub fn records(&self) -> Vec<Value> {
        self.lines()
            .iter()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }
}

impl io::Write for MemoryWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buf.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for MemoryWriter {
    type Writer = MemoryWriter;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

/// Route request records at `min_level` or above into a [`MemoryWriter`]
/// for as long as the guard lives on this thread.
pub fn capture_records(min_level: Level) -> (MemoryWriter, DefaultGuard) {
    let writer = MemoryWriter::default();
    let subscriber = tracing_subscriber::registry().with(record_layer(
        ServiceIdentity::default(),
        min_level,
        writer.clone(),
    ));
    (writer, tracing::subscriber::set_default(subscriber))
}

/// A [`Telemetry`] whose records, metrics and spans can all be inspected.
/// Needs a current-thread Tokio runtime.
pub struct TelemetryHarness {
    pub telemetry: Telemetry,
    pub records: MemoryWriter,
    exporter: InMemorySpanExporter,
    pipeline: Option<SpanPipeline>,
    _guard: DefaultGuard,
}

impl TelemetryHarness {
    pub fn new() -> Self {
        let identity = ServiceIdentity::default();
        let metrics = Arc::new(MetricsRegistry::new().unwrap());
        let exporter = InMemorySpanExporter::default();
        let pipeline = SpanPipeline::spawn(
            Some(Box::new(exporter.clone())),
            &identity,
            &TracingConfig::default(),
            Some(metrics.clone()),
        );
        let (records, guard) = capture_records(Level::DEBUG);
        let telemetry = Telemetry::new(StructuredLogger::new(identity), metrics, pipeline.tracer());

        Self {
            telemetry,
            records,
            exporter,
            pipeline: Some(pipeline),
            _guard: guard,
        }
    }

    /// Drain the pipeline and return every exported span.
    pub async fn spans(&mut self) -> Vec<SpanData> {
        if let Some(pipeline) = self.pipeline.take() {
            pipeline.shutdown().await;
        }
        self.exporter.get_finished_spans().unwrap()
    }
}
