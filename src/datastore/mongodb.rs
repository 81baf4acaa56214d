use std::time::Duration;

use async_trait::async_trait;
use mongodb::bson::doc;
use serde_json::{Map, Value};

use crate::config::schema::MongoConfig;
use crate::datastore::{with_deadline, DatastoreProbe, ProbeError};

/// `serverStatus` against the `admin` database.
pub struct MongoProbe {
    uri: String,
    deadline: Duration,
}

impl MongoProbe {
    pub fn new(config: &MongoConfig, deadline: Duration) -> Self {
        Self {
            uri: config.uri(),
            deadline,
        }
    }
}

#[async_trait]
impl DatastoreProbe for MongoProbe {
    fn name(&self) -> &'static str {
        "mongodb"
    }

    async fn probe(&self) -> Result<Map<String, Value>, ProbeError> {
        with_deadline("MongoDB", self.deadline, async {
            let client = mongodb::Client::with_uri_str(&self.uri).await?;
            let status = client
                .database("admin")
                .run_command(doc! { "serverStatus": 1 })
                .await?;
            let version = status.get_str("version").unwrap_or("unknown").to_string();
            client.shutdown().await;

            let mut fields = Map::new();
            fields.insert("version".into(), Value::String(version));
            Ok::<_, ProbeError>(fields)
        })
        .await
    }
}
