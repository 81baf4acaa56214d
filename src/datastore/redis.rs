use std::time::Duration;

use async_trait::async_trait;
use redis::AsyncCommands;
use serde_json::{Map, Value};

use crate::config::schema::RedisConfig;
use crate::datastore::{with_deadline, DatastoreProbe, ProbeError};

const TEST_KEY: &str = "test_key";
const TEST_VALUE: &str = "test_value";

/// `SET test_key test_value` followed by `GET test_key`.
pub struct RedisProbe {
    url: String,
    deadline: Duration,
}

impl RedisProbe {
    pub fn new(config: &RedisConfig, deadline: Duration) -> Self {
        Self {
            url: config.url(),
            deadline,
        }
    }
}

#[async_trait]
impl DatastoreProbe for RedisProbe {
    fn name(&self) -> &'static str {
        "redis"
    }

    async fn probe(&self) -> Result<Map<String, Value>, ProbeError> {
        with_deadline("Redis", self.deadline, async {
            let client = redis::Client::open(self.url.as_str())?;
            let mut con = client.get_multiplexed_async_connection().await?;
            let _: () = con.set(TEST_KEY, TEST_VALUE).await?;
            let value: Option<String> = con.get(TEST_KEY).await?;

            let mut fields = Map::new();
            fields.insert("value".into(), value.map_or(Value::Null, Value::String));
            Ok::<_, ProbeError>(fields)
        })
        .await
    }
}
