//! frontend-service: health, metrics and datastore connectivity probes.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;

use tracelink::config::ServiceConfig;
use tracelink::datastore::{
    DatastoreProbe, KafkaProbe, MongoProbe, MysqlProbe, PostgresProbe, RedisProbe,
};
use tracelink::handlers::frontend;
use tracelink::lifecycle::{run_service, ServiceArgs};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = ServiceArgs::parse();

    run_service(ServiceConfig::frontend(), args, |config, telemetry| {
        let deadline = Duration::from_secs(config.timeouts.request_secs);
        let stores = &config.datastores;
        let probes: Vec<Arc<dyn DatastoreProbe>> = vec![
            Arc::new(RedisProbe::new(&stores.redis, deadline)),
            Arc::new(PostgresProbe::new(&stores.postgres, deadline)),
            Arc::new(MysqlProbe::new(&stores.mysql, deadline)),
            Arc::new(MongoProbe::new(&stores.mongodb, deadline)),
            Arc::new(KafkaProbe::new(&stores.kafka, deadline)),
        ];
        Ok(frontend::routes(telemetry, probes))
    })
    .await?;

    Ok(())
}
