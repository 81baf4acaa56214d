//! Datastore connectivity probes for the frontend service.
//!
//! A probe opens a fresh connection, issues one trivial command and closes
//! the connection again. Nothing is pooled or cached between requests.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use axum::http::Method;
use serde_json::{Map, Value};

pub mod kafka;
pub mod mongodb;
pub mod mysql;
pub mod postgres;
pub mod redis;

pub use self::kafka::KafkaProbe;
pub use self::mongodb::MongoProbe;
pub use self::mysql::MysqlProbe;
pub use self::postgres::PostgresProbe;
pub use self::redis::RedisProbe;

#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("{0}")]
    Redis(#[from] ::redis::RedisError),

    #[error("{0}")]
    Postgres(#[from] tokio_postgres::Error),

    #[error("{0}")]
    Mysql(#[from] mysql_async::Error),

    #[error("{0}")]
    Mongo(#[from] ::mongodb::error::Error),

    #[error("{0}")]
    Kafka(#[from] rdkafka::error::KafkaError),

    #[error("{message}")]
    Unavailable { store: &'static str, message: String },
}

impl ProbeError {
    /// Display name of the store that failed, as used in error details.
    pub fn store(&self) -> &'static str {
        match self {
            ProbeError::Redis(_) => "Redis",
            ProbeError::Postgres(_) => "PostgreSQL",
            ProbeError::Mysql(_) => "MySQL",
            ProbeError::Mongo(_) => "MongoDB",
            ProbeError::Kafka(_) => "Kafka",
            ProbeError::Unavailable { store, .. } => store,
        }
    }
}

#[async_trait]
pub trait DatastoreProbe: Send + Sync {
    /// Route segment and `service` value in the response, e.g. `redis`.
    fn name(&self) -> &'static str;

    /// Probes that write something (Kafka produces a message) are POST.
    fn method(&self) -> Method {
        Method::GET
    }

    /// Fields added to the success body (`value`, `version`, ...).
    async fn probe(&self) -> Result<Map<String, Value>, ProbeError>;
}

/// Bound a probe so an unreachable store cannot hold a request forever.
pub(crate) async fn with_deadline<T, F>(
    store: &'static str,
    limit: Duration,
    fut: F,
) -> Result<T, ProbeError>
where
    F: Future<Output = Result<T, ProbeError>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(ProbeError::Unavailable {
            store,
            message: format!("timed out after {limit:?}"),
        }),
    }
}
