use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use axum::http::Method;
use rdkafka::config::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord};
use serde_json::{json, Map, Value};

use crate::config::schema::KafkaConfig;
use crate::datastore::{with_deadline, DatastoreProbe, ProbeError};

/// Produces one JSON message and reports where the broker stored it.
///
/// A producer is built per call, the same as every other probe opens a fresh
/// connection.
pub struct KafkaProbe {
    brokers: String,
    topic: String,
    deadline: Duration,
}

impl KafkaProbe {
    pub fn new(config: &KafkaConfig, deadline: Duration) -> Self {
        Self {
            brokers: config.brokers.clone(),
            topic: config.topic.clone(),
            deadline,
        }
    }

    fn producer(&self) -> Result<FutureProducer, ProbeError> {
        let producer = ClientConfig::new()
            .set("bootstrap.servers", &self.brokers)
            .set("message.timeout.ms", self.deadline.as_millis().to_string())
            .set("acks", "1")
            .create()?;
        Ok(producer)
    }
}

/// `{"test": "message", "timestamp": <unix seconds>}`.
fn probe_message(now: SystemTime) -> String {
    let timestamp = now
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0);
    json!({ "test": "message", "timestamp": timestamp }).to_string()
}

#[async_trait]
impl DatastoreProbe for KafkaProbe {
    fn name(&self) -> &'static str {
        "kafka"
    }

    fn method(&self) -> Method {
        Method::POST
    }

    async fn probe(&self) -> Result<Map<String, Value>, ProbeError> {
        with_deadline("Kafka", self.deadline, async {
            let producer = self.producer()?;
            let payload = probe_message(SystemTime::now());
            let record = FutureRecord::<(), str>::to(&self.topic).payload(payload.as_str());
            let (partition, offset) = producer
                .send(record, Duration::from_secs(0))
                .await
                .map_err(|(e, _)| e)?;

            let mut fields = Map::new();
            fields.insert("topic".into(), Value::String(self.topic.clone()));
            fields.insert("partition".into(), Value::from(partition));
            fields.insert("offset".into(), Value::from(offset));
            Ok::<_, ProbeError>(fields)
        })
        .await
    }
}
