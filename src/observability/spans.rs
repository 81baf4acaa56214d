//! Span pipeline on the OpenTelemetry SDK.
//!
//! # Responsibilities
//! - Own the SDK tracer provider for the process
//! - Hand finished spans to a background export worker
//! - Mark spans as failed and attach exception events
//!
//! # Data Flow
//! ```text
//! Telemetry::start_span ─▶ SDK span (owned by the returned Context)
//!                             │ end() / last Context clone dropped
//!                             ▼
//!              DropOldestSpanProcessor ─▶ SpanQueue (bounded, drop-oldest)
//!                                            │ batch_size reached or flush interval
//!                                            ▼
//!                                      export worker ─▶ SpanExporter (OTLP/HTTP, in-memory)
//! ```
//!
//! # Design Decisions
//! - The SDK's batch processor rejects the newest span when its queue is
//!   full; this processor evicts the oldest and counts it in
//!   `trace_spans_dropped_total`
//! - Closing a span never blocks on the network
//! - Shutdown drains whatever is still queued before the worker exits

use std::borrow::Cow;
use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use opentelemetry::trace::{Status, TraceContextExt, TraceResult, TracerProvider as _};
use opentelemetry::{Context, KeyValue};
use opentelemetry_sdk::export::trace::{SpanData, SpanExporter};
use opentelemetry_sdk::trace::{Config, Span, SpanProcessor, Tracer, TracerProvider};
use opentelemetry_sdk::Resource;
use parking_lot::Mutex;
use tokio::sync::{oneshot, Notify};
use tokio::task::JoinHandle;

use crate::config::{ServiceIdentity, TracingConfig};
use crate::observability::logging::ErrorInfo;
use crate::observability::metrics::MetricsRegistry;

const INSTRUMENTATION_SCOPE: &str = "tracelink";

/// Flag the span active in `cx` as failed.
pub fn set_span_error(cx: &Context, description: impl Into<Cow<'static, str>>) {
    let span = cx.span();
    span.set_attribute(KeyValue::new("error", true));
    span.set_status(Status::error(description));
}

/// Attach an `exception` event carrying the error's type, message and
/// source chain.
pub fn record_exception(cx: &Context, error: &ErrorInfo) {
    cx.span().add_event(
        "exception",
        vec![
            KeyValue::new("exception.type", error.kind.clone()),
            KeyValue::new("exception.message", error.message.clone()),
            KeyValue::new("exception.stacktrace", error.stack_trace.clone()),
        ],
    );
}

/// Bounded buffer of finished spans waiting for export.
pub struct SpanQueue {
    spans: Mutex<VecDeque<SpanData>>,
    capacity: usize,
    batch_size: usize,
    ready: Notify,
    dropped: AtomicU64,
    metrics: Option<Arc<MetricsRegistry>>,
}

impl SpanQueue {
    pub fn new(capacity: usize, batch_size: usize, metrics: Option<Arc<MetricsRegistry>>) -> Self {
        Self {
            spans: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity: capacity.max(1),
            batch_size: batch_size.max(1),
            ready: Notify::new(),
            dropped: AtomicU64::new(0),
            metrics,
        }
    }

    pub fn push(&self, span: SpanData) {
        let (evicted, ready) = {
            let mut spans = self.spans.lock();
            let evicted = if spans.len() >= self.capacity {
                spans.pop_front();
                true
            } else {
                false
            };
            spans.push_back(span);
            (evicted, spans.len() >= self.batch_size)
        };

        if evicted {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            if let Some(metrics) = &self.metrics {
                metrics.record_dropped_spans(1);
            }
        }
        if ready {
            self.ready.notify_one();
        }
    }

    /// Remove up to `batch_size` of the oldest spans.
    pub fn take_batch(&self) -> Vec<SpanData> {
        let mut spans = self.spans.lock();
        let n = spans.len().min(self.batch_size);
        spans.drain(..n).collect()
    }

    pub fn len(&self) -> usize {
        self.spans.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Spans evicted since creation.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl fmt::Debug for SpanQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpanQueue")
            .field("len", &self.len())
            .field("capacity", &self.capacity)
            .field("batch_size", &self.batch_size)
            .field("dropped", &self.dropped())
            .finish()
    }
}

/// Feeds sampled spans into a [`SpanQueue`] as they end.
#[derive(Debug)]
pub struct DropOldestSpanProcessor {
    queue: Arc<SpanQueue>,
}

impl DropOldestSpanProcessor {
    pub fn new(queue: Arc<SpanQueue>) -> Self {
        Self { queue }
    }
}

impl SpanProcessor for DropOldestSpanProcessor {
    fn on_start(&self, _span: &mut Span, _cx: &Context) {}

    fn on_end(&self, span: SpanData) {
        if span.span_context.is_sampled() {
            self.queue.push(span);
        }
    }

    fn force_flush(&self) -> TraceResult<()> {
        self.queue.ready.notify_one();
        Ok(())
    }

    // The export worker is stopped through `SpanPipeline::shutdown`.
    fn shutdown(&self) -> TraceResult<()> {
        Ok(())
    }
}

/// Tracer provider plus the worker that exports its spans. Dropping it
/// without [`shutdown`](Self::shutdown) abandons anything still queued.
pub struct SpanPipeline {
    provider: TracerProvider,
    queue: Arc<SpanQueue>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    worker: Option<JoinHandle<()>>,
}

impl SpanPipeline {
    /// Build the provider and spawn the export worker on the current Tokio
    /// runtime. Without an exporter, finished spans are discarded.
    pub fn spawn(
        exporter: Option<Box<dyn SpanExporter>>,
        identity: &ServiceIdentity,
        config: &TracingConfig,
        metrics: Option<Arc<MetricsRegistry>>,
    ) -> Self {
        let queue = Arc::new(SpanQueue::new(
            config.queue_capacity,
            config.batch_size,
            metrics,
        ));
        let provider = TracerProvider::builder()
            .with_span_processor(DropOldestSpanProcessor::new(queue.clone()))
            .with_config(Config::default().with_resource(resource(identity)))
            .build();

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let interval = Duration::from_millis(config.flush_interval_ms.max(1));
        let worker = tokio::spawn(run_worker(queue.clone(), exporter, interval, shutdown_rx));

        Self {
            provider,
            queue,
            shutdown_tx: Some(shutdown_tx),
            worker: Some(worker),
        }
    }

    pub fn tracer(&self) -> Tracer {
        self.provider.tracer(INSTRUMENTATION_SCOPE)
    }

    pub fn queue(&self) -> &Arc<SpanQueue> {
        &self.queue
    }

    /// Stop the worker after exporting every queued span.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(worker) = self.worker.take() {
            if let Err(e) = worker.await {
                tracing::error!(error = %e, "Span export worker terminated abnormally");
            }
        }
    }
}

fn resource(identity: &ServiceIdentity) -> Resource {
    Resource::new(vec![
        KeyValue::new("service.name", identity.name.clone()),
        KeyValue::new("service.version", identity.version.clone()),
        KeyValue::new("deployment.environment", identity.environment.clone()),
        KeyValue::new("host.name", identity.host_name.clone()),
    ])
}

async fn run_worker(
    queue: Arc<SpanQueue>,
    mut exporter: Option<Box<dyn SpanExporter>>,
    interval: Duration,
    mut shutdown: oneshot::Receiver<()>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = queue.ready.notified() => {}
            _ = &mut shutdown => break,
        }
        export_pending(&queue, &mut exporter).await;
    }

    export_pending(&queue, &mut exporter).await;
    if let Some(exporter) = exporter.as_mut() {
        exporter.shutdown();
    }
    tracing::debug!(dropped = queue.dropped(), "Span export worker stopped");
}

async fn export_pending(queue: &SpanQueue, exporter: &mut Option<Box<dyn SpanExporter>>) {
    loop {
        let batch = queue.take_batch();
        if batch.is_empty() {
            return;
        }
        let Some(exporter) = exporter.as_mut() else {
            continue;
        };
        let count = batch.len();
        if let Err(e) = exporter.export(batch).await {
            tracing::warn!(error = %e, spans = count, "Span export failed");
        }
    }
}
