//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure shared by both
//! services. All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for a service process.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ServiceConfig {
    /// Service identity stamped on every log record and metric.
    pub service: ServiceIdentity,

    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// The upstream service this process calls.
    pub upstream: UpstreamConfig,

    /// Span export settings.
    pub tracing: TracingConfig,

    /// Logging settings.
    pub observability: ObservabilityConfig,

    /// Outbound HTTP client timeouts.
    pub timeouts: TimeoutConfig,

    /// Datastore connection settings (frontend probes).
    pub datastores: DatastoreConfig,
}

impl ServiceConfig {
    /// Defaults for the backend service binary.
    pub fn backend() -> Self {
        Self::default()
    }

    /// Defaults for the frontend service binary.
    pub fn frontend() -> Self {
        Self {
            service: ServiceIdentity {
                name: "frontend-service".to_string(),
                ..ServiceIdentity::default()
            },
            listener: ListenerConfig {
                bind_address: "0.0.0.0:8000".to_string(),
            },
            ..Self::default()
        }
    }
}

/// Who is emitting telemetry.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ServiceIdentity {
    pub name: String,
    pub version: String,
    pub environment: String,
    /// Reported as `host.name` on log records.
    pub host_name: String,
}

impl Default for ServiceIdentity {
    fn default() -> Self {
        Self {
            name: "backend-service".to_string(),
            version: "1.0.0".to_string(),
            environment: "development".to_string(),
            host_name: "localhost".to_string(),
        }
    }
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8001").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8001".to_string(),
        }
    }
}

/// Upstream service definition.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Identifier used in metric labels, span attributes and error details.
    pub name: String,

    /// Base URL every upstream path is resolved against.
    pub base_url: String,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            name: "frontend-service".to_string(),
            base_url: "http://fastapi-app:8000".to_string(),
        }
    }
}

/// Span export configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TracingConfig {
    /// Export spans to the collector. When false spans are still created
    /// (log correlation needs the ids) but discarded on export.
    pub enabled: bool,

    /// OTLP/HTTP collector base URL; spans are posted to `{endpoint}/v1/traces`.
    pub otlp_endpoint: String,

    /// Maximum finished spans buffered before the oldest is dropped.
    pub queue_capacity: usize,

    /// Spans per export request.
    pub batch_size: usize,

    /// Upper bound on how long a finished span waits before export.
    pub flush_interval_ms: u64,

    /// Timeout for a single export request.
    pub export_timeout_secs: u64,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            otlp_endpoint: "http://otel-collector:4318".to_string(),
            queue_capacity: 2048,
            batch_size: 512,
            flush_interval_ms: 5000,
            export_timeout_secs: 10,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Minimum level for structured request logs and diagnostics
    /// (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

/// Timeout configuration for outbound HTTP.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Connection establishment timeout in seconds.
    pub connect_secs: u64,

    /// Total time for one upstream request/response in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: 5,
            request_secs: 30,
        }
    }
}

/// Datastores probed by the frontend service.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct DatastoreConfig {
    pub redis: RedisConfig,
    pub postgres: PostgresConfig,
    pub mysql: MysqlConfig,
    pub mongodb: MongoConfig,
    pub kafka: KafkaConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RedisConfig {
    pub host: String,
    pub port: u16,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            host: "redis-master".to_string(),
            port: 6379,
        }
    }
}

impl RedisConfig {
    pub fn url(&self) -> String {
        format!("redis://{}:{}/", self.host, self.port)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PostgresConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self {
            host: "postgres-lb".to_string(),
            port: 5432,
            user: "postgres".to_string(),
            password: "changeme123".to_string(),
            database: "greenfield".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MysqlConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
}

impl Default for MysqlConfig {
    fn default() -> Self {
        Self {
            host: "mysql-lb".to_string(),
            port: 3306,
            user: "mysql".to_string(),
            password: "changeme123".to_string(),
            database: "greenfield".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MongoConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
}

impl Default for MongoConfig {
    fn default() -> Self {
        Self {
            host: "mongodb-lb".to_string(),
            port: 27017,
            user: "admin".to_string(),
            password: "changeme123".to_string(),
        }
    }
}

impl MongoConfig {
    pub fn uri(&self) -> String {
        format!(
            "mongodb://{}:{}@{}:{}/",
            self.user, self.password, self.host, self.port
        )
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct KafkaConfig {
    /// Comma-separated `host:port` bootstrap list.
    pub brokers: String,

    /// Topic the probe message is produced to.
    pub topic: String,
}

impl Default for KafkaConfig {
    fn default() -> Self {
        Self {
            brokers: "kafka-lb:9092".to_string(),
            topic: "test-topic".to_string(),
        }
    }
}
