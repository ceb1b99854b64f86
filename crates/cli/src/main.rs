//! `webhook-relay` binary.

use anyhow::Result;
use clap::Parser;
use tracing::info;
use webhook_relay::telemetry::{self, TelemetryConfig};
use webhook_relay::{start, Args, RelayConfig};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = RelayConfig::from_args(args)?;

    let telemetry = telemetry::init(&TelemetryConfig {
        log_level: config.log_level.clone(),
        otlp_endpoint: config.otlp_endpoint.clone(),
    })?;

    let relay = start(config).await?;
    info!(
        ingress = %relay.ingress_addr(),
        admin = %relay.admin_addr(),
        "Press Ctrl+C to stop"
    );

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");

    let result = relay.shutdown().await;
    telemetry.shutdown();
    result
}
