//! Standalone Elasticsearch exporter
//!
//! Loads the YAML configuration and serves `/metrics` until interrupted.

use anyhow::Context;
use elastic_metrics_exporter::{ConfigLoader, Exporter, MetricsServer};
use std::sync::Arc;
use tracing::info;

const CONFIG_ENV: &str = "ELASTIC_EXPORTER_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "elastic_exporter.yml";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .json()
        .init();

    let config_path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var(CONFIG_ENV).ok())
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());

    let config = ConfigLoader::from_yaml(&config_path)
        .with_context(|| format!("loading configuration from {}", config_path))?;
    info!(
        config = %config_path,
        targets = config.targets.len(),
        collectors = config.collectors.len(),
        "Configuration loaded"
    );

    let exporter = Arc::new(Exporter::new(config).context("building exporter")?);
    let (addr, handle) = MetricsServer::new(exporter)
        .start()
        .await
        .context("starting metrics server")?;

    info!(address = %addr, "Elasticsearch exporter started");

    tokio::signal::ctrl_c().await?;

    info!("Shutting down...");
    handle.abort();

    Ok(())
}
