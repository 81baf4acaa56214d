//! Structured, trace-correlated request logging.
//!
//! Request-path code logs through [`StructuredLogger`], which emits a
//! `tracing` event under the [`RECORD_TARGET`] target. [`RecordLayer`] turns
//! those events into one flat JSON object per line:
//!
//! ```text
//! {"timestamp":"2024-05-01T10:00:00.123456Z","level":"INFO","message":"GET /health",
//!  "service.name":"backend-service","service.version":"1.0.0",
//!  "service.environment":"development","trace.id":"4bf9…4736",
//!  "trace.span_id":"00f0…02b7","process.pid":42,"host.name":"localhost",
//!  "event":{"action":"http_request_start"}, ...}
//! ```
//!
//! Caller fields are merged at the top level. Reserved keys always win: an
//! extra field that would shadow `timestamp`, `level`, `message` or anything
//! in the `service`, `trace`, `process` or `host` namespaces is dropped.
//!
//! Diagnostics about the service itself (startup, export failures) use plain
//! `tracing` macros and go to stderr through `tracing-subscriber`'s JSON
//! formatter. Request records go to stdout.

use std::error::Error;
use std::fmt;
use std::io::Write;
use std::sync::Arc;

use chrono::{SecondsFormat, Utc};
use opentelemetry::Context;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::filter::{filter_fn, FilterExt, Targets};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::{self, Layer, SubscriberExt};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::config::ServiceIdentity;
use crate::observability::context::current_trace_ids;

/// `tracing` target of request records.
pub const RECORD_TARGET: &str = "tracelink::record";

const RESERVED_KEYS: &[&str] = &["timestamp", "level", "message"];
const RESERVED_NAMESPACES: &[&str] = &["service", "trace", "process", "host"];

/// One finished log entry.
#[derive(Debug, Clone, Serialize)]
#[serde(transparent)]
pub struct LogRecord {
    fields: Value,
}

impl LogRecord {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.fields.get(key).is_some()
    }

    pub fn level(&self) -> Option<&str> {
        self.get("level").and_then(Value::as_str)
    }

    pub fn message(&self) -> Option<&str> {
        self.get("message").and_then(Value::as_str)
    }

    pub fn to_json_line(&self) -> String {
        self.fields.to_string()
    }
}

/// Error metadata attached to a record as `error.type`, `error.message`
/// and `error.stack_trace`.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorInfo {
    pub kind: String,
    pub message: String,
    pub stack_trace: String,
}

impl ErrorInfo {
    pub fn new(
        kind: impl Into<String>,
        message: impl Into<String>,
        stack_trace: impl Into<String>,
    ) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
            stack_trace: stack_trace.into(),
        }
    }

    /// Capture an error and its source chain.
    pub fn from_error<E: Error + ?Sized>(err: &E) -> Self {
        let kind = short_type_name(std::any::type_name::<E>());
        let mut stack_trace = format!("{kind}: {err}");
        let mut source = err.source();
        while let Some(cause) = source {
            stack_trace.push_str("\nCaused by: ");
            stack_trace.push_str(&cause.to_string());
            source = cause.source();
        }

        Self {
            kind,
            message: err.to_string(),
            stack_trace,
        }
    }
}

/// `alloc::boxed::Box<my_crate::Error>` → `Error`.
fn short_type_name(full: &str) -> String {
    let innermost = full
        .rsplit('<')
        .next()
        .unwrap_or(full)
        .trim_end_matches('>');
    innermost
        .rsplit("::")
        .next()
        .unwrap_or(innermost)
        .to_string()
}

/// Assemble one record. `trace_ids` are the hex trace and span ids, both or
/// neither.
pub fn build_record(
    identity: &ServiceIdentity,
    level: Level,
    message: &str,
    trace_ids: Option<(String, String)>,
    extra: Value,
    error: Option<&ErrorInfo>,
) -> LogRecord {
    let mut fields = Map::new();

    fields.insert(
        "timestamp".into(),
        Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)),
    );
    fields.insert("level".into(), Value::String(level.as_str().to_string()));
    fields.insert("message".into(), Value::String(message.to_string()));
    fields.insert("service.name".into(), Value::String(identity.name.clone()));
    fields.insert("service.version".into(), Value::String(identity.version.clone()));
    fields.insert(
        "service.environment".into(),
        Value::String(identity.environment.clone()),
    );
    if let Some((trace_id, span_id)) = trace_ids {
        fields.insert("trace.id".into(), Value::String(trace_id));
        fields.insert("trace.span_id".into(), Value::String(span_id));
    }
    fields.insert("process.pid".into(), Value::from(std::process::id()));
    fields.insert("host.name".into(), Value::String(identity.host_name.clone()));

    if let Some(error) = error {
        fields.insert("error.type".into(), Value::String(error.kind.clone()));
        fields.insert("error.message".into(), Value::String(error.message.clone()));
        fields.insert(
            "error.stack_trace".into(),
            Value::String(error.stack_trace.clone()),
        );
    }

    let extra = match extra {
        Value::Object(map) => map,
        Value::Null => Map::new(),
        other => Map::from_iter([("extra".to_string(), other)]),
    };
    for (key, value) in extra {
        if is_reserved(&key, error.is_some()) {
            continue;
        }
        fields.insert(key, value);
    }

    LogRecord {
        fields: Value::Object(fields),
    }
}

fn is_reserved(key: &str, has_error: bool) -> bool {
    if RESERVED_KEYS.contains(&key) {
        return true;
    }
    let namespace = key.split('.').next().unwrap_or(key);
    RESERVED_NAMESPACES.contains(&namespace) || (has_error && namespace == "error")
}

// `tracing` needs the level at compile time.
macro_rules! record_event {
    ($level:expr, $($fields:tt)+) => {{
        let level = $level;
        if level == Level::ERROR {
            tracing::event!(target: RECORD_TARGET, Level::ERROR, $($fields)+)
        } else if level == Level::WARN {
            tracing::event!(target: RECORD_TARGET, Level::WARN, $($fields)+)
        } else if level == Level::INFO {
            tracing::event!(target: RECORD_TARGET, Level::INFO, $($fields)+)
        } else if level == Level::DEBUG {
            tracing::event!(target: RECORD_TARGET, Level::DEBUG, $($fields)+)
        } else {
            tracing::event!(target: RECORD_TARGET, Level::TRACE, $($fields)+)
        }
    }};
}

/// Emits request records for one service. Cheap to clone.
#[derive(Debug, Clone)]
pub struct StructuredLogger {
    identity: Arc<ServiceIdentity>,
}

impl StructuredLogger {
    pub fn new(identity: ServiceIdentity) -> Self {
        Self {
            identity: Arc::new(identity),
        }
    }

    pub fn identity(&self) -> &ServiceIdentity {
        &self.identity
    }

    pub fn log(
        &self,
        level: Level,
        cx: Option<&Context>,
        message: &str,
        extra: Value,
        error: Option<&ErrorInfo>,
    ) {
        let ids = current_trace_ids(cx);
        let trace_id = ids.as_ref().map(|(trace, _)| trace.as_str());
        let span_id = ids.as_ref().map(|(_, span)| span.as_str());
        let error_type = error.map(|e| e.kind.as_str());
        let error_message = error.map(|e| e.message.as_str());
        let error_stack_trace = error.map(|e| e.stack_trace.as_str());

        record_event!(
            level,
            trace_id,
            span_id,
            error_type,
            error_message,
            error_stack_trace,
            extra = %extra,
            "{}",
            message
        );
    }

    pub fn info(&self, cx: Option<&Context>, message: &str, extra: Value) {
        self.log(Level::INFO, cx, message, extra, None);
    }

    pub fn warn(&self, cx: Option<&Context>, message: &str, extra: Value) {
        self.log(Level::WARN, cx, message, extra, None);
    }

    pub fn error(&self, cx: Option<&Context>, message: &str, extra: Value, error: &ErrorInfo) {
        self.log(Level::ERROR, cx, message, extra, Some(error));
    }
}

/// Fields of one record event, as emitted by [`StructuredLogger::log`].
#[derive(Default)]
struct RecordFields {
    message: String,
    trace_id: Option<String>,
    span_id: Option<String>,
    extra: Value,
    error_type: Option<String>,
    error_message: Option<String>,
    error_stack_trace: Option<String>,
}

impl RecordFields {
    fn set(&mut self, name: &str, value: String) {
        match name {
            "message" => self.message = value,
            "trace_id" => self.trace_id = Some(value),
            "span_id" => self.span_id = Some(value),
            "extra" => self.extra = serde_json::from_str(&value).unwrap_or(Value::String(value)),
            "error_type" => self.error_type = Some(value),
            "error_message" => self.error_message = Some(value),
            "error_stack_trace" => self.error_stack_trace = Some(value),
            _ => {}
        }
    }

    fn trace_ids(&mut self) -> Option<(String, String)> {
        self.trace_id.take().zip(self.span_id.take())
    }

    fn error(&mut self) -> Option<ErrorInfo> {
        let kind = self.error_type.take()?;
        Some(ErrorInfo {
            kind,
            message: self.error_message.take().unwrap_or_default(),
            stack_trace: self.error_stack_trace.take().unwrap_or_default(),
        })
    }
}

impl Visit for RecordFields {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.set(field.name(), value.to_string());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.set(field.name(), format!("{value:?}"));
    }
}

/// Renders [`RECORD_TARGET`] events as JSON lines on `make_writer`.
pub struct RecordLayer<W> {
    identity: ServiceIdentity,
    make_writer: W,
}

impl<W> RecordLayer<W> {
    pub fn new(identity: ServiceIdentity, make_writer: W) -> Self {
        Self {
            identity,
            make_writer,
        }
    }
}

impl<S, W> Layer<S> for RecordLayer<W>
where
    S: Subscriber,
    W: for<'w> MakeWriter<'w> + 'static,
{
    fn on_event(&self, event: &Event<'_>, _ctx: layer::Context<'_, S>) {
        if event.metadata().target() != RECORD_TARGET {
            return;
        }
        let mut fields = RecordFields::default();
        event.record(&mut fields);

        let trace_ids = fields.trace_ids();
        let error = fields.error();
        let record = build_record(
            &self.identity,
            *event.metadata().level(),
            &fields.message,
            trace_ids,
            std::mem::take(&mut fields.extra),
            error.as_ref(),
        );

        let mut line = record.to_json_line();
        line.push('\n');
        // One write per record keeps lines whole; a failing writer has
        // nowhere left to report to.
        let _ = self.make_writer.make_writer().write_all(line.as_bytes());
    }
}

/// [`RecordLayer`] that only sees record events at `min_level` or above.
pub fn record_layer<S, W>(
    identity: ServiceIdentity,
    min_level: Level,
    make_writer: W,
) -> impl Layer<S>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    RecordLayer::new(identity, make_writer)
        .with_filter(Targets::new().with_target(RECORD_TARGET, min_level))
}

/// Install the process-wide subscriber: request records on stdout, service
/// diagnostics as `tracing-subscriber` JSON on stderr.
///
/// `RUST_LOG` wins over `level` for diagnostics; request records always
/// follow `level`.
pub fn init_logging(identity: &ServiceIdentity, level: &str) {
    let min_level = level.parse::<Level>().unwrap_or(Level::INFO);
    let diagnostics = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{level},tower_http=warn")))
        .and(filter_fn(|meta| meta.target() != RECORD_TARGET));

    let _ = tracing_subscriber::registry()
        .with(record_layer(identity.clone(), min_level, std::io::stdout))
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr)
                .with_filter(diagnostics),
        )
        .try_init();
}
