//! HTTP client for the upstream service.

use std::time::Duration;

use axum::http::HeaderMap;
use opentelemetry::Context;
use reqwest::Method;

use crate::config::{TimeoutConfig, UpstreamConfig};
use crate::observability::{inject_context, Telemetry};
use crate::upstream::instrument::{
    instrument_call, RawResponse, UpstreamCall, UpstreamError, UpstreamResponse,
};

#[derive(Debug, thiserror::Error)]
pub enum ClientBuildError {
    #[error("invalid upstream url '{url}': {source}")]
    Url { url: String, source: url::ParseError },
    #[error("failed to build http client: {0}")]
    Http(#[from] reqwest::Error),
}

/// Calls one upstream service. Every call is instrumented and carries the
/// call span's `traceparent`.
#[derive(Clone)]
pub struct UpstreamClient {
    http: reqwest::Client,
    base_url: String,
    service: String,
    telemetry: Telemetry,
}

impl UpstreamClient {
    pub fn new(
        config: &UpstreamConfig,
        timeouts: &TimeoutConfig,
        telemetry: Telemetry,
    ) -> Result<Self, ClientBuildError> {
        url::Url::parse(&config.base_url).map_err(|source| ClientBuildError::Url {
            url: config.base_url.clone(),
            source,
        })?;

        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(timeouts.connect_secs))
            .timeout(Duration::from_secs(timeouts.request_secs))
            .build()?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            service: config.name.clone(),
            telemetry,
        })
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    /// Absolute URL for `endpoint`, which must start with `/`.
    pub fn url(&self, endpoint: &str) -> String {
        format!("{}{}", self.base_url, endpoint)
    }

    pub async fn get(
        &self,
        parent: &Context,
        span_name: &str,
        endpoint: &str,
    ) -> Result<UpstreamResponse, UpstreamError> {
        self.send(parent, span_name, Method::GET, endpoint).await
    }

    pub async fn send(
        &self,
        parent: &Context,
        span_name: &str,
        method: Method,
        endpoint: &str,
    ) -> Result<UpstreamResponse, UpstreamError> {
        let call = UpstreamCall {
            service: self.service.clone(),
            method: method.as_str().to_string(),
            endpoint: endpoint.to_string(),
            span_name: span_name.to_string(),
        };
        let url = self.url(endpoint);
        let http = self.http.clone();

        instrument_call(&self.telemetry, parent, &call, |cx| async move {
            let mut headers = HeaderMap::new();
            inject_context(&cx, &mut headers);
            let response = http
                .request(method, &url)
                .headers(headers)
                .send()
                .await?;
            let status = response.status().as_u16();
            let body = response.text().await?;
            Ok::<_, reqwest::Error>(RawResponse { status, body })
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observability::testing::TelemetryHarness;

    #[tokio::test]
    async fn test_url_joining() {
        let h = TelemetryHarness::new();
        let config = UpstreamConfig {
            name: "frontend-service".into(),
            base_url: "http://fastapi-app:8000/".into(),
        };
        let client = UpstreamClient::new(&config, &TimeoutConfig::default(), h.telemetry.clone())
            .unwrap();
        assert_eq!(client.url("/redis"), "http://fastapi-app:8000/redis");
        assert_eq!(client.url("/a/b"), "http://fastapi-app:8000/a/b");
        assert_eq!(client.service(), "frontend-service");
    }

    #[tokio::test]
    async fn test_rejects_bad_base_url() {
        let h = TelemetryHarness::new();
        let config = UpstreamConfig {
            name: "frontend-service".into(),
            base_url: "not a url".into(),
        };
        let result = UpstreamClient::new(&config, &TimeoutConfig::default(), h.telemetry.clone());
        assert!(matches!(result, Err(ClientBuildError::Url { .. })));
    }
}
