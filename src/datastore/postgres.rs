use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio_postgres::NoTls;

use crate::config::schema::PostgresConfig;
use crate::datastore::{with_deadline, DatastoreProbe, ProbeError};

/// `SELECT version();` over a fresh connection.
pub struct PostgresProbe {
    config: tokio_postgres::Config,
    deadline: Duration,
}

impl PostgresProbe {
    pub fn new(config: &PostgresConfig, deadline: Duration) -> Self {
        let mut pg = tokio_postgres::Config::new();
        pg.host(&config.host)
            .port(config.port)
            .user(&config.user)
            .password(&config.password)
            .dbname(&config.database)
            .connect_timeout(deadline);
        Self { config: pg, deadline }
    }
}

#[async_trait]
impl DatastoreProbe for PostgresProbe {
    fn name(&self) -> &'static str {
        "postgres"
    }

    async fn probe(&self) -> Result<Map<String, Value>, ProbeError> {
        with_deadline("PostgreSQL", self.deadline, async {
            let (client, connection) = self.config.connect(NoTls).await?;
            let driver = tokio::spawn(async move {
                if let Err(e) = connection.await {
                    tracing::debug!(error = %e, "postgres connection closed with error");
                }
            });

            let row = client.query_one("SELECT version();", &[]).await?;
            let version: String = row.try_get(0)?;
            drop(client);
            let _ = driver.await;

            let mut fields = Map::new();
            fields.insert("version".into(), Value::String(version));
            Ok::<_, ProbeError>(fields)
        })
        .await
    }
}
