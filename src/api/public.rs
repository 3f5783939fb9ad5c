//! Public API for embedded library usage
//!
//! Wires configured targets into a single scrape entry point and renders the result.

use futures::future::join_all;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, info};

use crate::backend::Connector;
use crate::config::{Config, ValueType};
use crate::context::ScrapeContext;
use crate::error::ExporterError;
use crate::exposition;
use crate::metrics::{AutomaticMetricDesc, Metric, MetricDesc, metric_channel};
use crate::scrape::Target;

/// Name of the counter of samples that could not be exported
pub const SCRAPE_ERRORS_NAME: &str = "elastic_exporter_scrape_errors_total";
const SCRAPE_ERRORS_HELP: &str = "Total number of errors encountered while gathering metrics";

/// Main exporter instance
///
/// Owns one [`Target`] per configured target and runs them all on every scrape.
///
/// # Example
///
/// ```no_run
/// use elastic_metrics_exporter::{ConfigLoader, Exporter};
/// use std::time::Duration;
///
/// # async fn example() -> Result<(), elastic_metrics_exporter::ExporterError> {
/// let config = ConfigLoader::from_yaml("elastic_exporter.yml")?;
/// let exporter = Exporter::new(config)?;
///
/// let text = exporter.render(Duration::from_secs(10)).await;
/// println!("{}", text);
/// # Ok(())
/// # }
/// ```
pub struct Exporter {
    config: Config,
    targets: Vec<Target>,
    scrape_errors: AtomicU64,
    scrape_errors_desc: Arc<dyn MetricDesc>,
}

impl Exporter {
    /// Create an exporter talking to the configured clusters over HTTP
    ///
    /// Returns `Err(ExporterError::Config)` if the configuration is invalid or a
    /// collector cannot be built.
    pub fn new(config: Config) -> Result<Self, ExporterError> {
        Self::build(config, |target, collectors, global| {
            Target::new(target, collectors, global)
        })
    }

    /// Create an exporter whose targets all obtain their client from `connector`
    pub fn with_connector(
        config: Config,
        connector: Arc<dyn Connector>,
    ) -> Result<Self, ExporterError> {
        Self::build(config, |target, collectors, global| {
            Target::with_connector(target, collectors, global, connector.clone())
        })
    }

    fn build<F>(config: Config, mut make_target: F) -> Result<Self, ExporterError>
    where
        F: FnMut(
            &crate::config::TargetConfig,
            &[&crate::config::CollectorConfig],
            &crate::config::GlobalConfig,
        ) -> Result<Target, crate::error::ExporterConfigError>,
    {
        config.validate()?;

        let mut targets = Vec::with_capacity(config.targets.len());
        for target in &config.targets {
            let collectors = config.collectors_for(target);
            targets.push(make_target(target, &collectors, &config.global)?);
        }

        info!(
            targets = targets.len(),
            collectors = config.collectors.len(),
            "Exporter initialized"
        );

        Ok(Self {
            config,
            targets,
            scrape_errors: AtomicU64::new(0),
            scrape_errors_desc: Arc::new(AutomaticMetricDesc::new(
                "exporter",
                SCRAPE_ERRORS_NAME,
                SCRAPE_ERRORS_HELP,
                ValueType::Counter,
                Vec::new(),
            )),
        })
    }

    /// Configuration the exporter was built from
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Targets in configuration order
    pub fn targets(&self) -> &[Target] {
        &self.targets
    }

    /// Errors counted over the exporter's lifetime
    pub fn scrape_errors(&self) -> u64 {
        self.scrape_errors.load(Ordering::Relaxed)
    }

    /// Run every target once under a shared `timeout` and return what they emitted
    pub async fn gather(&self, timeout: Duration) -> Vec<Metric> {
        let ctx = ScrapeContext::with_timeout(timeout);
        let (tx, mut rx) = metric_channel();
        let mut metrics = Vec::new();

        let produce = async move {
            join_all(self.targets.iter().map(|t| t.collect(&ctx, &tx))).await;
        };
        let consume = async {
            while let Some(metric) = rx.recv().await {
                metrics.push(metric);
            }
        };
        tokio::join!(produce, consume);

        debug!(
            metrics = metrics.len(),
            timeout_ms = timeout.as_millis() as u64,
            "Scrape gathered"
        );
        metrics
    }

    /// Run a scrape and render it in the Prometheus text format
    pub async fn render(&self, timeout: Duration) -> String {
        let metrics = self.gather(timeout).await;
        let rendered = exposition::render(&metrics);

        let total_errors =
            self.scrape_errors.fetch_add(rendered.errors, Ordering::Relaxed) + rendered.errors;
        let errors_metric = Metric::sample(
            self.scrape_errors_desc.clone(),
            total_errors as f64,
            None,
        );

        let mut text = rendered.text;
        text.push_str(&exposition::render(&[errors_metric]).text);
        text
    }
}
