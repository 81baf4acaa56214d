//! tracelink: two small HTTP services instrumented for logs, traces and
//! metrics.
//!
//! # Architecture Overview
//!
//! ```text
//!   request ─▶ request-id ─▶ observe_request ─▶ catch-panic ─▶ handler
//!                                 │                              │
//!                  server span, start/complete                   │ UpstreamClient
//!                  logs, request metrics                         ▼
//!                                 │                       instrument_call ─▶ frontend-service
//!                                 ▼                       (client span,      (datastore routes)
//!               Telemetry { logger, metrics, tracer }      traceparent)
//!                    │           │          │
//!            stdout records  /metrics   SDK spans ─▶ drop-oldest queue ─▶ OTLP/HTTP
//! ```
//!
//! Trace context travels explicitly: the middleware puts the server span's
//! [`opentelemetry::Context`] into request extensions, and handlers pass it
//! on to the logger, the span helpers and the upstream client.

// Core subsystems
pub mod config;
pub mod http;
pub mod observability;

// Service logic
pub mod datastore;
pub mod handlers;
pub mod upstream;

// Cross-cutting concerns
pub mod lifecycle;

pub use config::ServiceConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use observability::Telemetry;
