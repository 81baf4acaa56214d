//! Configuration validation.
//!
//! Semantic checks only (serde handles syntax). All problems are collected
//! and returned together; nothing is accepted into the system until the
//! whole config passes.

use std::net::SocketAddr;
use std::str::FromStr;

use crate::config::schema::ServiceConfig;

/// A single semantic problem with a loaded config.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{field}: {reason}")]
pub struct ValidationError {
    pub field: &'static str,
    pub reason: String,
}

impl ValidationError {
    fn new(field: &'static str, reason: impl Into<String>) -> Self {
        Self {
            field,
            reason: reason.into(),
        }
    }
}

pub fn validate_config(config: &ServiceConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.service.name.trim().is_empty() {
        errors.push(ValidationError::new("service.name", "must not be empty"));
    }

    if let Err(e) = config.listener.bind_address.parse::<SocketAddr>() {
        errors.push(ValidationError::new("listener.bind_address", e.to_string()));
    }

    check_http_url(&mut errors, "upstream.base_url", &config.upstream.base_url);
    check_http_url(&mut errors, "tracing.otlp_endpoint", &config.tracing.otlp_endpoint);

    if config.tracing.queue_capacity == 0 {
        errors.push(ValidationError::new("tracing.queue_capacity", "must be greater than 0"));
    }
    if config.tracing.batch_size == 0 {
        errors.push(ValidationError::new("tracing.batch_size", "must be greater than 0"));
    }
    if config.tracing.flush_interval_ms == 0 {
        errors.push(ValidationError::new("tracing.flush_interval_ms", "must be greater than 0"));
    }

    if tracing::Level::from_str(&config.observability.log_level).is_err() {
        errors.push(ValidationError::new(
            "observability.log_level",
            format!("unknown level {:?}", config.observability.log_level),
        ));
    }

    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::new("timeouts.request_secs", "must be greater than 0"));
    }

    let kafka = &config.datastores.kafka;
    if kafka.brokers.split(',').all(|b| b.trim().is_empty()) {
        errors.push(ValidationError::new("datastores.kafka.brokers", "must not be empty"));
    }
    if kafka.topic.trim().is_empty() {
        errors.push(ValidationError::new("datastores.kafka.topic", "must not be empty"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_http_url(errors: &mut Vec<ValidationError>, field: &'static str, value: &str) {
    match url::Url::parse(value) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => {}
        Ok(url) => errors.push(ValidationError::new(
            field,
            format!("unsupported scheme {:?}", url.scheme()),
        )),
        Err(e) => errors.push(ValidationError::new(field, e.to_string())),
    }
}
