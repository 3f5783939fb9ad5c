//! Shared fixtures for integration tests

#![allow(dead_code)]

use elastic_metrics_exporter::config::{
    AggregationConfig, CollectorConfig, MetricConfig, QueryConfig, TargetConfig,
};
use elastic_metrics_exporter::metrics::metric_channel;
use elastic_metrics_exporter::metrics::{MetricReceiver, MetricSender};
use elastic_metrics_exporter::{LabelPair, Metric};
use serde_json::{Value, json};
use std::collections::BTreeMap;

/// Search response with a `http_code` terms aggregation over 100 hits
pub fn http_code_response() -> Value {
    json!({
        "hits": { "total": { "value": 100 } },
        "aggregations": {
            "http_code": {
                "buckets": [
                    { "key": "200", "doc_count": 80 },
                    { "key": "500", "doc_count": 20 }
                ]
            }
        }
    })
}

pub fn terms_aggregation(name: &str, field: &str) -> AggregationConfig {
    AggregationConfig {
        name: name.to_string(),
        kind: "terms".to_string(),
        params: json!({ "field": field }),
    }
}

pub fn query(name: &str, aggregations: Vec<AggregationConfig>) -> QueryConfig {
    QueryConfig {
        name: name.to_string(),
        query: "*".to_string(),
        aggregations,
    }
}

pub fn metric(name: &str, query_ref: &str) -> MetricConfig {
    MetricConfig {
        name: name.to_string(),
        help: format!("{} help", name),
        value_type: Default::default(),
        transform: Default::default(),
        query_ref: query_ref.to_string(),
        aggregation: None,
        filters: Vec::new(),
        static_labels: BTreeMap::new(),
        track_total: false,
    }
}

/// Collector `requests` with one `http_code` terms query feeding `requests_total`
pub fn http_code_collector() -> CollectorConfig {
    let mut requests = metric("requests_total", "http");
    requests.track_total = true;
    CollectorConfig {
        name: "requests".to_string(),
        min_interval_secs: None,
        queries: vec![query("http", vec![terms_aggregation("http_code", "status")])],
        metrics: vec![requests],
    }
}

pub fn target(name: Option<&str>) -> TargetConfig {
    TargetConfig {
        name: name.map(str::to_string),
        dsn: "http://localhost:9200".to_string(),
        username: None,
        password: None,
        labels: BTreeMap::new(),
        collectors: Vec::new(),
    }
}

/// Drive `collect` with a fresh channel and return everything it emitted
pub async fn gather<F, Fut>(collect: F) -> Vec<Metric>
where
    F: FnOnce(MetricSender) -> Fut,
    Fut: std::future::Future<Output = ()>,
{
    let (tx, mut rx): (MetricSender, MetricReceiver) = metric_channel();
    let mut metrics = Vec::new();
    let produce = collect(tx);
    let consume = async {
        while let Some(metric) = rx.recv().await {
            metrics.push(metric);
        }
    };
    tokio::join!(produce, consume);
    metrics
}

/// `(name, value, labels)` of every valid sample
pub fn samples(metrics: &[Metric]) -> Vec<(String, f64, Vec<LabelPair>)> {
    metrics
        .iter()
        .filter_map(Metric::as_sample)
        .map(|s| (s.name().to_string(), s.value(), s.label_pairs().to_vec()))
        .collect()
}

pub fn errors(metrics: &[Metric]) -> usize {
    metrics.iter().filter(|m| m.as_error().is_some()).count()
}
