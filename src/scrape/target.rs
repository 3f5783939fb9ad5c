//! Targets: one cluster, its collectors and the synthetic `up`/duration metrics

use futures::future::join_all;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tokio::time::Instant;
use tracing::warn;

use crate::backend::{Connector, ElasticsearchConnector, SearchBackend};
use crate::config::{CollectorConfig, GlobalConfig, TargetConfig, ValueType};
use crate::context::ScrapeContext;
use crate::error::{CollectError, ExporterConfigError};
use crate::metrics::{AutomaticMetricDesc, LabelPair, Metric, MetricDesc, MetricSender, emit};
use crate::scrape::collector::{Collector, new_collector};

/// Name of the target availability metric
pub const UP_METRIC_NAME: &str = "up";
const UP_METRIC_HELP: &str = "1 if the target is reachable, or 0 if the scrape failed";

/// Name of the scrape duration metric
pub const SCRAPE_DURATION_NAME: &str = "scrape_duration_seconds";
const SCRAPE_DURATION_HELP: &str = "How long it took to scrape the target in seconds";

/// Collects metrics from a single cluster
///
/// The backend client is created on the first scrape and shared read-only by all
/// collectors afterwards. Targets without a name run in single-target mode and
/// export no synthetic metrics.
pub struct Target {
    name: Option<String>,
    connector: Arc<dyn Connector>,
    client: OnceCell<Arc<dyn SearchBackend>>,
    collectors: Vec<Box<dyn Collector>>,
    up_desc: Arc<dyn MetricDesc>,
    scrape_duration_desc: Arc<dyn MetricDesc>,
    log_context: String,
}

impl Target {
    /// Build a target that talks to Elasticsearch over HTTP
    pub fn new(
        config: &TargetConfig,
        collectors: &[&CollectorConfig],
        global: &GlobalConfig,
    ) -> Result<Self, ExporterConfigError> {
        let connector = Arc::new(ElasticsearchConnector::new(config));
        Self::with_connector(config, collectors, global, connector)
    }

    /// Build a target whose backend client comes from `connector`
    pub fn with_connector(
        config: &TargetConfig,
        collectors: &[&CollectorConfig],
        global: &GlobalConfig,
        connector: Arc<dyn Connector>,
    ) -> Result<Self, ExporterConfigError> {
        let log_context = match &config.name {
            Some(name) => format!("target={:?}", name),
            None => "target=\"\"".to_string(),
        };

        let const_labels: Vec<LabelPair> = config
            .const_labels()
            .iter()
            .map(|(k, v)| LabelPair::new(k.as_str(), v.as_str()))
            .collect();

        let collectors = collectors
            .iter()
            .map(|cc| new_collector(&log_context, cc, global, &const_labels))
            .collect::<Result<Vec<_>, _>>()?;

        let up_desc: Arc<dyn MetricDesc> = Arc::new(AutomaticMetricDesc::new(
            log_context.as_str(),
            UP_METRIC_NAME,
            UP_METRIC_HELP,
            ValueType::Gauge,
            const_labels.clone(),
        ));
        let scrape_duration_desc: Arc<dyn MetricDesc> = Arc::new(AutomaticMetricDesc::new(
            log_context.as_str(),
            SCRAPE_DURATION_NAME,
            SCRAPE_DURATION_HELP,
            ValueType::Gauge,
            const_labels,
        ));

        Ok(Self {
            name: config.name.clone(),
            connector,
            client: OnceCell::new(),
            collectors,
            up_desc,
            scrape_duration_desc,
            log_context,
        })
    }

    /// Target name; `None` in single-target mode
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Run one scrape, streaming samples to `ch`
    pub async fn collect(&self, ctx: &ScrapeContext, ch: &MetricSender) {
        let scrape_start = Instant::now();

        let client = match self.ensure_up(ctx).await {
            Ok(client) => Some(client),
            Err(err) => {
                warn!(error = %err, "Target is down");
                emit(ch, Metric::Invalid(err)).await;
                None
            }
        };

        if self.name.is_some() {
            // Export `up` as early as we know it.
            let up = if client.is_some() { 1.0 } else { 0.0 };
            emit(ch, Metric::sample(self.up_desc.clone(), up, None)).await;
        }

        // Don't bother with the collectors if the target is down.
        if let Some(client) = &client {
            join_all(
                self.collectors
                    .iter()
                    .map(|c| c.collect(ctx, client.as_ref(), ch)),
            )
            .await;
        }

        if self.name.is_some() {
            emit(
                ch,
                Metric::sample(
                    self.scrape_duration_desc.clone(),
                    scrape_start.elapsed().as_secs_f64(),
                    None,
                ),
            )
            .await;
        }
    }

    /// Create the client if needed and probe cluster health
    async fn ensure_up(&self, ctx: &ScrapeContext) -> Result<Arc<dyn SearchBackend>, CollectError> {
        let client = self
            .client
            .get_or_try_init(|| async { self.connector.connect() })
            .await
            .map_err(|kind| CollectError::new(&self.log_context, kind))?;

        if let Some(kind) = ctx.err() {
            return Err(CollectError::new(&self.log_context, kind));
        }

        client
            .health()
            .await
            .map_err(|kind| CollectError::new(&self.log_context, kind))?;

        if let Some(kind) = ctx.err() {
            return Err(CollectError::new(&self.log_context, kind));
        }

        Ok(client.clone())
    }
}
