//! Query execution and aggregation dispatch

use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::backend::{SearchBackend, SearchRequest, hits_total};
use crate::config::QueryConfig;
use crate::context::ScrapeContext;
use crate::error::{CollectError, ExporterConfigError};
use crate::metrics::{
    AggregationHandler, AggregationKind, Metric, MetricDatum, MetricFamily, MetricSender, emit,
};

/// A search plus the metric families populated from its result
#[derive(Debug)]
pub struct Query {
    request: SearchRequest,
    handlers: HashMap<String, AggregationHandler>,
    metric_families: Vec<Arc<MetricFamily>>,
    log_context: String,
}

impl Query {
    /// Build a query from `config` feeding `metric_families` in the given order
    pub fn new(
        log_context: &str,
        config: &QueryConfig,
        metric_families: Vec<Arc<MetricFamily>>,
    ) -> Result<Self, ExporterConfigError> {
        let log_context = format!("{}, query={:?}", log_context, config.name);

        let mut handlers = HashMap::with_capacity(config.aggregations.len());
        let mut aggs = Map::new();
        for aggregation in &config.aggregations {
            let kind: AggregationKind = aggregation.kind.parse()?;
            handlers.insert(
                aggregation.name.clone(),
                AggregationHandler::for_kind(kind, &aggregation.name),
            );

            let mut body = Map::new();
            body.insert(kind.as_str().to_string(), aggregation.params.clone());
            aggs.insert(aggregation.name.clone(), Value::Object(body));
        }

        Ok(Self {
            request: SearchRequest::query_string(&config.query, aggs),
            handlers,
            metric_families,
            log_context,
        })
    }

    /// Log context of this query
    pub fn log_context(&self) -> &str {
        &self.log_context
    }

    /// Run the search and stream the resulting samples to `ch`
    ///
    /// Failures are reported as a single invalid sample; no family sees partial data.
    pub async fn collect(&self, ctx: &ScrapeContext, client: &dyn SearchBackend, ch: &MetricSender) {
        if let Some(kind) = ctx.err() {
            emit(ch, Metric::Invalid(CollectError::new(&self.log_context, kind))).await;
            return;
        }

        let response = match client.search(&self.request).await {
            Ok(response) => response,
            Err(kind) => {
                let err = CollectError::new(&self.log_context, kind);
                warn!(error = %err, "Query failed");
                emit(ch, Metric::Invalid(err)).await;
                return;
            }
        };

        let total = hits_total(&response);
        let data = self.extract(&response);
        debug!(
            query = %self.log_context,
            total = total,
            data_points = data.len(),
            "Query returned"
        );

        for family in &self.metric_families {
            family.collect(&data, total, ch).await;
        }
    }

    /// Dispatch every aggregation in `response` to its handler
    ///
    /// Aggregations are visited in the key order of the response map, which for
    /// `serde_json::Map` is alphabetical by aggregation name, not the order of the
    /// search response or of the query configuration. Data from all handlers is
    /// accumulated in that order.
    fn extract(&self, response: &Value) -> Vec<MetricDatum> {
        let Some(aggregations) = response.get("aggregations").and_then(Value::as_object) else {
            return Vec::new();
        };

        let mut data = Vec::new();
        for (name, result) in aggregations {
            match self.handlers.get(name) {
                Some(handler) => data = handler.handle(result, data),
                None => warn!(
                    query = %self.log_context,
                    aggregation = %name,
                    "No handler registered for aggregation, skipping"
                ),
            }
        }
        data
    }
}
