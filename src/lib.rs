//! Elasticsearch Metrics Exporter Library
//!
//! Turns Elasticsearch aggregation queries into Prometheus metrics. Each scrape
//! runs the configured queries against one or more clusters and streams the
//! resulting samples into a single exposition.
//!
//! # Features
//!
//! - Terms, stats and single-value aggregations mapped onto labeled samples
//! - Per-collector result caching with a minimum refresh interval
//! - Deadline and cancellation propagation through every stage of a scrape
//! - Configurable via YAML, environment variables, or programmatic API
//! - Mock search backend for testing
//!
//! # Example
//!
//! ```no_run
//! use elastic_metrics_exporter::{ConfigLoader, Exporter, MetricsServer};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), elastic_metrics_exporter::ExporterError> {
//! let config = ConfigLoader::from_yaml("elastic_exporter.yml")?;
//! let exporter = Arc::new(Exporter::new(config)?);
//!
//! let (addr, _handle) = MetricsServer::new(exporter).start().await?;
//! println!("serving on {}", addr);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod api;
pub mod backend;
pub mod config;
pub mod context;
pub mod error;
pub mod exposition;
pub mod metrics;
pub mod mock;
pub mod scrape;
pub mod server;

// Re-export public API
pub use api::public::Exporter;
pub use backend::{Connector, ElasticsearchClient, SearchBackend};
pub use config::loader::ConfigLoader;
pub use config::{
    AggregationConfig, CollectorConfig, Config, ConfigBuilder, GlobalConfig, MetricConfig,
    QueryConfig, TARGET_NAME_LABEL, TargetConfig, ValueTransform, ValueType,
};
pub use context::ScrapeContext;
pub use error::{CollectError, CollectErrorKind, ExporterConfigError, ExporterError};
pub use metrics::{LabelPair, Metric, Sample};
pub use mock::MockSearchBackend;
pub use server::MetricsServer;

use tracing_subscriber::EnvFilter;

/// Initialize structured logging
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false)
        .try_init();
}
