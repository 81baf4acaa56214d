//! Span exporter selection.
//!
//! Production posts OTLP/JSON to `{endpoint}/v1/traces` through
//! `opentelemetry-otlp`. Export failures are logged by the export worker and
//! the batch is not retried.

use std::time::Duration;

use opentelemetry::trace::TraceError;
use opentelemetry_otlp::{Protocol, WithExportConfig};
use opentelemetry_sdk::export::trace::SpanExporter;

use crate::config::TracingConfig;

/// Full OTLP/HTTP traces URL for a collector base `endpoint`.
pub fn traces_url(endpoint: &str) -> String {
    format!("{}/v1/traces", endpoint.trim_end_matches('/'))
}

/// Exporter for `config`, or `None` when span export is disabled.
pub fn span_exporter(config: &TracingConfig) -> Result<Option<Box<dyn SpanExporter>>, TraceError> {
    if !config.enabled {
        tracing::info!("Span export disabled");
        return Ok(None);
    }

    let url = traces_url(&config.otlp_endpoint);
    let exporter = opentelemetry_otlp::new_exporter()
        .http()
        .with_protocol(Protocol::HttpJson)
        .with_endpoint(url.clone())
        .with_timeout(Duration::from_secs(config.export_timeout_secs))
        .build_span_exporter()?;
    tracing::info!(url = %url, "Exporting spans over OTLP/HTTP");

    Ok(Some(Box::new(exporter)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_traces_url() {
        assert_eq!(traces_url("http://collector:4318/"), "http://collector:4318/v1/traces");
        assert_eq!(traces_url("http://collector:4318"), "http://collector:4318/v1/traces");
    }

    #[test]
    fn test_disabled_export_has_no_exporter() {
        let config = TracingConfig {
            enabled: false,
            ..TracingConfig::default()
        };
        assert!(span_exporter(&config).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_enabled_export_builds_otlp_exporter() {
        let config = TracingConfig {
            otlp_endpoint: "http://127.0.0.1:4318".into(),
            ..TracingConfig::default()
        };
        assert!(span_exporter(&config).unwrap().is_some());
    }
}
