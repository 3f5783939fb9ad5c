//! Collectors: groups of queries run concurrently, optionally behind a cache

use async_trait::async_trait;
use futures::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

use crate::backend::SearchBackend;
use crate::config::{CollectorConfig, GlobalConfig};
use crate::context::ScrapeContext;
use crate::error::{CollectError, ExporterConfigError};
use crate::metrics::{LabelPair, Metric, MetricFamily, MetricSender, emit, metric_channel};
use crate::scrape::query::Query;

/// A self-contained group of queries and metric families
#[async_trait]
pub trait Collector: Send + Sync {
    /// Stream this collector's samples to `ch`; returns once all work is finished
    async fn collect(&self, ctx: &ScrapeContext, client: &dyn SearchBackend, ch: &MetricSender);
}

/// Build the collector described by `config`, wrapped in a cache when its
/// minimum interval is non-zero
pub fn new_collector(
    log_context: &str,
    config: &CollectorConfig,
    global: &GlobalConfig,
    const_labels: &[LabelPair],
) -> Result<Box<dyn Collector>, ExporterConfigError> {
    let raw = QueryCollector::new(log_context, config, const_labels)?;
    let min_interval = config.min_interval(global);
    if min_interval.is_zero() {
        return Ok(Box::new(raw));
    }

    debug!(
        collector = %raw.log_context,
        min_interval_secs = min_interval.as_secs(),
        "Non-zero min_interval, using caching collector"
    );
    Ok(Box::new(CachingCollector::new(raw, min_interval)))
}

/// Runs all of its queries concurrently against one client
#[derive(Debug)]
pub struct QueryCollector {
    queries: Vec<Query>,
    log_context: String,
}

impl QueryCollector {
    /// Instantiate metric families and the queries feeding them
    pub fn new(
        log_context: &str,
        config: &CollectorConfig,
        const_labels: &[LabelPair],
    ) -> Result<Self, ExporterConfigError> {
        let log_context = format!("{}, collector={:?}", log_context, config.name);

        // Maps each query name to the families it populates, in metric order.
        let mut query_families: HashMap<&str, Vec<Arc<MetricFamily>>> = HashMap::new();
        for metric in &config.metrics {
            let family = MetricFamily::new(&log_context, metric, const_labels)?;
            query_families
                .entry(metric.query_ref.as_str())
                .or_default()
                .push(Arc::new(family));
        }

        let mut queries = Vec::with_capacity(query_families.len());
        for query in &config.queries {
            // Queries no metric refers to are never executed.
            let Some(families) = query_families.remove(query.name.as_str()) else {
                continue;
            };
            queries.push(Query::new(&log_context, query, families)?);
        }

        if let Some(name) = query_families.keys().next() {
            return Err(ExporterConfigError::UnknownReference(format!(
                "[{}] metric references unknown query {:?}",
                log_context, name
            )));
        }

        Ok(Self {
            queries,
            log_context,
        })
    }

    /// Log context of this collector
    pub fn log_context(&self) -> &str {
        &self.log_context
    }

    /// Number of queries executed per collection
    pub fn query_count(&self) -> usize {
        self.queries.len()
    }
}

#[async_trait]
impl Collector for QueryCollector {
    async fn collect(&self, ctx: &ScrapeContext, client: &dyn SearchBackend, ch: &MetricSender) {
        // Only return once all queries have been processed.
        join_all(self.queries.iter().map(|q| q.collect(ctx, client, ch))).await;
    }
}

/// The single cache slot of a [`CachingCollector`]
#[derive(Debug, Default)]
struct CacheEntry {
    /// When the cached metrics were collected; `None` before the first collection
    timestamp: Option<Instant>,
    /// Metrics saved from the last refresh
    metrics: Vec<Metric>,
}

/// Serves a [`QueryCollector`]'s last result while it is younger than `min_interval`
#[derive(Debug)]
pub struct CachingCollector {
    raw: QueryCollector,
    min_interval: Duration,
    cache: Mutex<CacheEntry>,
}

impl CachingCollector {
    /// Wrap `raw` with a cache refreshed at most once per `min_interval`
    pub fn new(raw: QueryCollector, min_interval: Duration) -> Self {
        Self {
            raw,
            min_interval,
            cache: Mutex::new(CacheEntry::default()),
        }
    }

    /// Run the wrapped collector, forwarding and recording everything it emits
    async fn refresh(
        &self,
        ctx: &ScrapeContext,
        client: &dyn SearchBackend,
        ch: &MetricSender,
    ) -> Vec<Metric> {
        let (tx, mut rx) = metric_channel();
        let mut fresh = Vec::new();

        let produce = async move {
            self.raw.collect(ctx, client, &tx).await;
        };
        let consume = async {
            while let Some(metric) = rx.recv().await {
                fresh.push(metric.clone());
                emit(ch, metric).await;
            }
        };
        tokio::join!(produce, consume);

        fresh
    }
}

#[async_trait]
impl Collector for CachingCollector {
    async fn collect(&self, ctx: &ScrapeContext, client: &dyn SearchBackend, ch: &MetricSender) {
        if let Some(kind) = ctx.err() {
            emit(ch, Metric::Invalid(CollectError::new(&self.raw.log_context, kind))).await;
            return;
        }

        let mut cache = tokio::select! {
            guard = self.cache.lock() => guard,
            kind = ctx.done() => {
                emit(ch, Metric::Invalid(CollectError::new(&self.raw.log_context, kind))).await;
                return;
            }
        };

        let now = Instant::now();
        match cache.timestamp.map(|ts| now.duration_since(ts)) {
            Some(age) if age <= self.min_interval => {
                debug!(
                    collector = %self.raw.log_context,
                    min_interval_secs = self.min_interval.as_secs_f64(),
                    cache_age_secs = age.as_secs_f64(),
                    "Returning cached metrics"
                );
                for metric in &cache.metrics {
                    emit(ch, metric.clone()).await;
                }
            }
            age => {
                debug!(
                    collector = %self.raw.log_context,
                    min_interval_secs = self.min_interval.as_secs_f64(),
                    cache_age_secs = age.map(|a| a.as_secs_f64()),
                    "Collecting fresh metrics"
                );
                let metrics = self.refresh(ctx, client, ch).await;
                *cache = CacheEntry {
                    timestamp: Some(now),
                    metrics,
                };
            }
        }
        // The guard drops here, handing the slot to the next caller.
    }
}
