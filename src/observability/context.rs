//! Trace context plumbing.
//!
//! An [`opentelemetry::Context`] holding the active span is passed
//! explicitly down the call chain: the observability middleware puts the
//! server span's context into the request extensions, handlers hand it to
//! the upstream client and the logger. Nothing is attached to the thread.
//!
//! Wire format is W3C Trace Context, handled by [`TraceContextPropagator`]:
//! `traceparent: 00-<32 hex trace id>-<16 hex span id>-<2 hex flags>`.

use axum::http::{HeaderMap, HeaderName, HeaderValue};
use opentelemetry::propagation::{Extractor, Injector, TextMapPropagator};
use opentelemetry::trace::TraceContextExt;
use opentelemetry::Context;
use opentelemetry_sdk::propagation::TraceContextPropagator;

pub const TRACEPARENT: &str = "traceparent";

struct HeaderExtractor<'a>(&'a HeaderMap);

impl Extractor for HeaderExtractor<'_> {
    fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(|v| v.to_str().ok())
    }

    fn keys(&self) -> Vec<&str> {
        self.0.keys().map(HeaderName::as_str).collect()
    }
}

struct HeaderInjector<'a>(&'a mut HeaderMap);

impl Injector for HeaderInjector<'_> {
    fn set(&mut self, key: &str, value: String) {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(key.as_bytes()),
            HeaderValue::from_str(&value),
        ) {
            self.0.insert(name, value);
        }
    }
}

/// Parent context from a valid inbound `traceparent`. A missing or malformed
/// header yields an empty context, so the next span starts a new trace.
pub fn extract_context(headers: &HeaderMap) -> Context {
    TraceContextPropagator::new().extract_with_context(&Context::new(), &HeaderExtractor(headers))
}

/// Write `cx`'s span as `traceparent` (and `tracestate` when present).
pub fn inject_context(cx: &Context, headers: &mut HeaderMap) {
    TraceContextPropagator::new().inject_context(cx, &mut HeaderInjector(headers));
}

/// Hex trace and span ids of the span active in `cx`, if any.
///
/// Absence is normal (startup logs, background work) and never an error.
pub fn current_trace_ids(cx: Option<&Context>) -> Option<(String, String)> {
    let cx = cx?;
    let span = cx.span();
    let span_context = span.span_context();
    span_context.is_valid().then(|| {
        (
            span_context.trace_id().to_string(),
            span_context.span_id().to_string(),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use opentelemetry::trace::{Tracer as _, TracerProvider as _};
    use opentelemetry_sdk::trace::TracerProvider;

    const PARENT: &str = "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01";

    fn headers(traceparent: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(TRACEPARENT, HeaderValue::from_str(traceparent).unwrap());
        headers
    }

    #[test]
    fn test_extract_remote_parent() {
        let cx = extract_context(&headers(PARENT));
        let (trace_id, span_id) = current_trace_ids(Some(&cx)).unwrap();
        assert_eq!(trace_id, "4bf92f3577b34da6a3ce929d0e0e4736");
        assert_eq!(span_id, "00f067aa0ba902b7");
        assert!(cx.span().span_context().is_remote());
        assert!(cx.span().span_context().is_sampled());
    }

    #[test]
    fn test_malformed_or_missing_header_gives_empty_context() {
        for value in [
            "garbage",
            "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7",
            "00-00000000000000000000000000000000-00f067aa0ba902b7-01",
            "00-4bf92f3577b34da6a3ce929d0e0e4736-0000000000000000-01",
            "ff-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01",
        ] {
            let cx = extract_context(&headers(value));
            assert_eq!(current_trace_ids(Some(&cx)), None, "{value}");
        }
        assert_eq!(current_trace_ids(Some(&extract_context(&HeaderMap::new()))), None);
        assert_eq!(current_trace_ids(None), None);
    }

    #[test]
    fn test_child_of_remote_parent_is_injected() {
        let provider = TracerProvider::builder().build();
        let tracer = provider.tracer("context-test");
        let parent = extract_context(&headers(PARENT));
        let child = parent.with_span(tracer.start_with_context("child", &parent));

        let mut outbound = HeaderMap::new();
        inject_context(&child, &mut outbound);
        let value = outbound.get(TRACEPARENT).unwrap().to_str().unwrap();

        let (_, child_span) = current_trace_ids(Some(&child)).unwrap();
        assert_eq!(
            value,
            format!("00-4bf92f3577b34da6a3ce929d0e0e4736-{child_span}-01")
        );
        assert_ne!(child_span, "00f067aa0ba902b7");
    }

    #[test]
    fn test_ids_render_fixed_width_hex() {
        let provider = TracerProvider::builder().build();
        let tracer = provider.tracer("context-test");
        let root = Context::new().with_span(tracer.start_with_context("root", &Context::new()));

        let (trace_id, span_id) = current_trace_ids(Some(&root)).unwrap();
        assert_eq!(trace_id.len(), 32);
        assert_eq!(span_id.len(), 16);
        assert!(trace_id.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }
}
