//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::http::{HeaderMap, Method, Request, StatusCode};
use axum::Router;
use opentelemetry::trace::Status;
use opentelemetry_sdk::export::trace::SpanData;
use opentelemetry_sdk::testing::trace::InMemorySpanExporter;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tower::ServiceExt;
use tracing::subscriber::DefaultGuard;
use tracing::Level;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;

use tracelink::config::{ServiceIdentity, TracingConfig};
use tracelink::observability::logging::record_layer;
use tracelink::observability::{MetricsRegistry, SpanPipeline, StructuredLogger, Telemetry};

/// One request seen by a mock upstream.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub path: String,
    pub traceparent: Option<String>,
    pub started: Instant,
    pub finished: Instant,
}

pub struct MockUpstream {
    pub addr: SocketAddr,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl MockUpstream {
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().clone()
    }
}

/// Start a mock upstream on an ephemeral port. `f` maps the request path to
/// a status and body; every response is delayed by `delay`.
pub async fn start_programmable_backend<F>(delay: Duration, f: F) -> MockUpstream
where
    F: Fn(&str) -> (u16, String) + Send + Sync + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let requests = Arc::new(Mutex::new(Vec::new()));
    let f = Arc::new(f);

    let recorded = requests.clone();
    tokio::spawn(async move {
        loop {
            let (mut socket, _) = match listener.accept().await {
                Ok(conn) => conn,
                Err(_) => break,
            };
            let f = f.clone();
            let recorded = recorded.clone();
            tokio::spawn(async move {
                let started = Instant::now();
                let head = read_head(&mut socket).await;
                let path = head
                    .lines()
                    .next()
                    .and_then(|line| line.split_whitespace().nth(1))
                    .unwrap_or("/")
                    .to_string();
                let traceparent = head.lines().find_map(|line| {
                    let (name, value) = line.split_once(':')?;
                    name.eq_ignore_ascii_case("traceparent")
                        .then(|| value.trim().to_string())
                });

                tokio::time::sleep(delay).await;
                let (status, body) = f(&path);
                let response = format!(
                    "HTTP/1.1 {} {}\r\n\
                     Content-Type: application/json\r\n\
                     Content-Length: {}\r\n\
                     Connection: close\r\n\r\n{}",
                    status,
                    reason(status),
                    body.len(),
                    body
                );
                recorded.lock().push(RecordedRequest {
                    path,
                    traceparent,
                    started,
                    finished: Instant::now(),
                });
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    MockUpstream { addr, requests }
}

async fn read_head(socket: &mut tokio::net::TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
        match socket.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}

fn reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        404 => "Not Found",
        500 => "Internal Server Error",
        503 => "Service Unavailable",
        _ => "Unknown",
    }
}

/// An address nothing is listening on.
pub fn unreachable_url() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}")
}

/// Request records rendered by the record layer, kept in memory.
#[derive(Clone, Default)]
pub struct MemoryLogs {
    buf: Arc<Mutex<Vec<u8>>>,
}

impl MemoryLogs {
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

    /// Records whose `event.action` equals `action`.
    pub fn with_action(&self, action: &str) -> Vec<Value> {
        self.records()
            .into_iter()
            .filter(|r| r["event"]["action"] == action)
            .collect()
    }
}

impl io::Write for MemoryLogs {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buf.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for MemoryLogs {
    type Writer = MemoryLogs;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

/// Telemetry whose logs and spans stay in memory.
///
/// Records are captured through a thread-local subscriber, so tests using
/// this must run on the default current-thread runtime.
pub struct TestTelemetry {
    pub telemetry: Telemetry,
    pub logs: MemoryLogs,
    spans: InMemorySpanExporter,
    pipeline: Option<SpanPipeline>,
    _subscriber: DefaultGuard,
}

impl TestTelemetry {
    pub fn new(service_name: &str) -> Self {
        let identity = ServiceIdentity {
            name: service_name.to_string(),
            ..ServiceIdentity::default()
        };
        let logs = MemoryLogs::default();
        let spans = InMemorySpanExporter::default();
        let metrics = Arc::new(MetricsRegistry::new().unwrap());
        let pipeline = SpanPipeline::spawn(
            Some(Box::new(spans.clone())),
            &identity,
            &TracingConfig::default(),
            Some(metrics.clone()),
        );
        let subscriber = tracing_subscriber::registry().with(record_layer(
            identity.clone(),
            Level::INFO,
            logs.clone(),
        ));

        Self {
            telemetry: Telemetry::new(StructuredLogger::new(identity), metrics, pipeline.tracer()),
            logs,
            spans,
            pipeline: Some(pipeline),
            _subscriber: tracing::subscriber::set_default(subscriber),
        }
    }

    pub fn metrics(&self) -> String {
        self.telemetry.metrics.render()
    }

    /// Drain the export queue and return every finished span.
    pub async fn finished_spans(&mut self) -> Vec<SpanData> {
        if let Some(pipeline) = self.pipeline.take() {
            pipeline.shutdown().await;
        }
        self.spans.get_finished_spans().unwrap()
    }
}

/// Value of the first sample line of `name` whose labels include every pair
/// in `labels`.
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

pub fn span_named<'a>(spans: &'a [SpanData], name: &str) -> &'a SpanData {
    spans
        .iter()
        .find(|s| s.name == name)
        .unwrap_or_else(|| panic!("no span named {name}"))
}

pub fn span_is_error(span: &SpanData) -> bool {
    matches!(span.status, Status::Error { .. })
}

pub fn span_attribute(span: &SpanData, key: &str) -> Option<opentelemetry::Value> {
    span.attributes
        .iter()
        .find(|kv| kv.key.as_str() == key)
        .map(|kv| kv.value.clone())
}

/// Serve `router` over real TCP on an ephemeral port.
pub async fn serve(router: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });
    addr
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

/// Send one GET through `router` in-process.
pub async fn get(router: &Router, uri: &str, headers: &[(&str, &str)]) -> TestResponse {
    send(router, Method::GET, uri, headers).await
}

/// Send one bodyless request through `router` in-process.
pub async fn send(
    router: &Router,
    method: Method,
    uri: &str,
    headers: &[(&str, &str)],
) -> TestResponse {
    let mut request = Request::builder().method(method).uri(uri);
    for (name, value) in headers {
        request = request.header(*name, *value);
    }
    let response = router
        .clone()
        .oneshot(request.body(Body::empty()).unwrap())
        .await
        .unwrap();

    let status = response.status();
    let headers = response.headers().clone();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()));

    TestResponse { status, headers, body }
}
