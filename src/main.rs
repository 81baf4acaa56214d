//! backend-service: calls the frontend service and demonstrates trace
//! propagation across service boundaries.

use clap::Parser;

use tracelink::config::ServiceConfig;
use tracelink::handlers::backend::{self, BackendState};
use tracelink::lifecycle::{run_service, ServiceArgs};
use tracelink::upstream::UpstreamClient;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = ServiceArgs::parse();

    run_service(ServiceConfig::backend(), args, |config, telemetry| {
        let upstream = UpstreamClient::new(&config.upstream, &config.timeouts, telemetry.clone())?;
        Ok(backend::routes(BackendState { telemetry, upstream }))
    })
    .await?;

    Ok(())
}
