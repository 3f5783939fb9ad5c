//! Integration tests for queries, collectors and targets against a mock backend

mod common;

use async_trait::async_trait;
use common::*;
use elastic_metrics_exporter::backend::{SearchBackend, SearchRequest};
use elastic_metrics_exporter::config::{GlobalConfig, ValueTransform};
use elastic_metrics_exporter::metrics::MetricFamily;
use elastic_metrics_exporter::scrape::{
    CachingCollector, Collector, Query, QueryCollector, SCRAPE_DURATION_NAME, Target,
    UP_METRIC_NAME,
};
use elastic_metrics_exporter::{
    CollectErrorKind, LabelPair, MockSearchBackend, ScrapeContext,
};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;

fn family(config: &elastic_metrics_exporter::MetricConfig) -> Arc<MetricFamily> {
    Arc::new(MetricFamily::new("test", config, &[]).unwrap())
}

#[tokio::test]
async fn test_terms_query_emits_buckets_then_total() {
    let backend = MockSearchBackend::new(http_code_response());
    let mut config = metric("requests_total", "http");
    config.track_total = true;
    let query = Query::new(
        "test",
        &query("http", vec![terms_aggregation("http_code", "status")]),
        vec![family(&config)],
    )
    .unwrap();

    let ctx = ScrapeContext::background();
    let metrics = gather(|tx| async move { query.collect(&ctx, &backend, &tx).await }).await;

    assert_eq!(
        samples(&metrics),
        vec![
            (
                "requests_total".to_string(),
                80.0,
                vec![LabelPair::new("http_code", "200")]
            ),
            (
                "requests_total".to_string(),
                20.0,
                vec![LabelPair::new("http_code", "500")]
            ),
            ("requests_total".to_string(), 100.0, vec![]),
        ]
    );
    assert_eq!(errors(&metrics), 0);
}

#[tokio::test]
async fn test_search_request_carries_aggregations() {
    let backend = MockSearchBackend::new(http_code_response());
    let query = Query::new(
        "test",
        &query("http", vec![terms_aggregation("http_code", "status")]),
        vec![family(&metric("requests_total", "http"))],
    )
    .unwrap();

    let ctx = ScrapeContext::background();
    let probe = backend.clone();
    gather(|tx| async move { query.collect(&ctx, &probe, &tx).await }).await;

    let requests = backend.requests().await;
    assert_eq!(requests.len(), 1);
    assert_eq!(
        serde_json::to_value(&requests[0]).unwrap(),
        json!({
            "query": { "query_string": { "query": "*" } },
            "aggs": { "http_code": { "terms": { "field": "status" } } }
        })
    );
}

#[tokio::test]
async fn test_percentage_transform() {
    let backend = MockSearchBackend::new(json!({
        "hits": { "total": { "value": 200 } },
        "aggregations": { "errors": { "value": 50 } }
    }));
    let mut config = metric("error_ratio", "q");
    config.transform = ValueTransform::Percentage;
    let query = Query::new(
        "test",
        &query(
            "q",
            vec![elastic_metrics_exporter::AggregationConfig {
                name: "errors".to_string(),
                kind: "sum".to_string(),
                params: json!({ "field": "errors" }),
            }],
        ),
        vec![family(&config)],
    )
    .unwrap();

    let ctx = ScrapeContext::background();
    let metrics = gather(|tx| async move { query.collect(&ctx, &backend, &tx).await }).await;

    assert_eq!(samples(&metrics), vec![("error_ratio".to_string(), 25.0, vec![])]);
}

#[tokio::test]
async fn test_aggregations_are_handled_in_key_order() {
    let response: Value = serde_json::from_str(
        r#"{
            "hits": { "total": { "value": 3 } },
            "aggregations": {
                "zone": { "buckets": [{ "key": "eu", "doc_count": 1 }] },
                "app": { "buckets": [{ "key": "web", "doc_count": 2 }] }
            }
        }"#,
    )
    .unwrap();
    let backend = MockSearchBackend::new(response);
    let query = Query::new(
        "test",
        &query(
            "q",
            vec![
                terms_aggregation("zone", "zone"),
                terms_aggregation("app", "app"),
            ],
        ),
        vec![family(&metric("docs", "q"))],
    )
    .unwrap();

    let ctx = ScrapeContext::background();
    let metrics = gather(|tx| async move { query.collect(&ctx, &backend, &tx).await }).await;

    assert_eq!(
        samples(&metrics),
        vec![
            ("docs".to_string(), 2.0, vec![LabelPair::new("app", "web")]),
            ("docs".to_string(), 1.0, vec![LabelPair::new("zone", "eu")]),
        ]
    );
}

#[tokio::test]
async fn test_unregistered_aggregation_is_skipped() {
    let mut response = http_code_response();
    response["aggregations"]["unexpected"] = json!({ "value": 7 });
    let backend = MockSearchBackend::new(response);
    let query = Query::new(
        "test",
        &query("http", vec![terms_aggregation("http_code", "status")]),
        vec![family(&metric("requests_total", "http"))],
    )
    .unwrap();

    let ctx = ScrapeContext::background();
    let metrics = gather(|tx| async move { query.collect(&ctx, &backend, &tx).await }).await;

    assert_eq!(samples(&metrics).len(), 2);
    assert_eq!(errors(&metrics), 0);
}

#[tokio::test]
async fn test_cancelled_context_skips_search() {
    let backend = MockSearchBackend::new(http_code_response());
    let query = Query::new(
        "test",
        &query("http", vec![terms_aggregation("http_code", "status")]),
        vec![family(&metric("requests_total", "http"))],
    )
    .unwrap();

    let ctx = ScrapeContext::background();
    ctx.cancel();
    let probe = backend.clone();
    let metrics = gather(|tx| async move { query.collect(&ctx, &probe, &tx).await }).await;

    assert_eq!(metrics.len(), 1);
    assert_eq!(
        metrics[0].as_error().unwrap().kind(),
        &CollectErrorKind::Cancelled
    );
    assert_eq!(backend.search_calls().await, 0);
}

#[tokio::test]
async fn test_failed_search_reports_one_invalid_sample() {
    let backend = MockSearchBackend::failing(CollectErrorKind::Status(503));
    let query = Query::new(
        "test",
        &query("http", vec![terms_aggregation("http_code", "status")]),
        vec![family(&metric("requests_total", "http"))],
    )
    .unwrap();

    let ctx = ScrapeContext::background();
    let metrics = gather(|tx| async move { query.collect(&ctx, &backend, &tx).await }).await;

    assert_eq!(metrics.len(), 1);
    let err = metrics[0].as_error().unwrap();
    assert_eq!(err.kind(), &CollectErrorKind::Status(503));
    assert!(err.to_string().contains("query=\"http\""));
}

/// Fails every search that asks for the `broken` aggregation
struct PartiallyBrokenBackend;

#[async_trait]
impl SearchBackend for PartiallyBrokenBackend {
    async fn search(&self, request: &SearchRequest) -> Result<Value, CollectErrorKind> {
        if request.aggs.contains_key("broken") {
            return Err(CollectErrorKind::Transport("connection reset".to_string()));
        }
        Ok(http_code_response())
    }

    async fn health(&self) -> Result<(), CollectErrorKind> {
        Ok(())
    }
}

#[tokio::test]
async fn test_failing_query_does_not_affect_siblings() {
    let mut collector = http_code_collector();
    collector
        .queries
        .push(query("other", vec![terms_aggregation("broken", "x")]));
    collector.metrics.push(metric("other_total", "other"));
    let collector = QueryCollector::new("test", &collector, &[]).unwrap();
    assert_eq!(collector.query_count(), 2);

    let ctx = ScrapeContext::background();
    let metrics = gather(|tx| async move {
        collector.collect(&ctx, &PartiallyBrokenBackend, &tx).await
    })
    .await;

    assert_eq!(errors(&metrics), 1);
    let names: Vec<String> = samples(&metrics).into_iter().map(|(n, _, _)| n).collect();
    assert_eq!(names, vec!["requests_total"; 3]);
}

#[tokio::test]
async fn test_unreferenced_queries_are_not_executed() {
    let mut config = http_code_collector();
    config.queries.push(query("unused", Vec::new()));
    let collector = QueryCollector::new("test", &config, &[]).unwrap();
    assert_eq!(collector.query_count(), 1);
}

#[tokio::test]
async fn test_caching_collector_replays_within_interval() {
    let backend = MockSearchBackend::new(http_code_response());
    let raw = QueryCollector::new("test", &http_code_collector(), &[]).unwrap();
    let collector = CachingCollector::new(raw, Duration::from_secs(60));

    let ctx = ScrapeContext::background();
    let (ctx, backend_ref, collector) = (&ctx, &backend, &collector);
    let first = gather(|tx| async move { collector.collect(ctx, backend_ref, &tx).await }).await;
    let second = gather(|tx| async move { collector.collect(ctx, backend_ref, &tx).await }).await;

    assert_eq!(backend.search_calls().await, 1);
    assert_eq!(samples(&first), samples(&second));
    assert_eq!(samples(&second).len(), 3);
}

#[tokio::test]
async fn test_caching_collector_refreshes_stale_results() {
    let backend = MockSearchBackend::new(http_code_response());
    let raw = QueryCollector::new("test", &http_code_collector(), &[]).unwrap();
    let collector = CachingCollector::new(raw, Duration::from_millis(50));

    let ctx = ScrapeContext::background();
    let (ctx, backend_ref, collector) = (&ctx, &backend, &collector);
    gather(|tx| async move { collector.collect(ctx, backend_ref, &tx).await }).await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    let mut response = http_code_response();
    response["hits"]["total"]["value"] = json!(150);
    backend.set_search_result(Ok(response)).await;
    let second = gather(|tx| async move { collector.collect(ctx, backend_ref, &tx).await }).await;

    assert_eq!(backend.search_calls().await, 2);
    assert_eq!(samples(&second)[2].1, 150.0);
}

#[tokio::test]
async fn test_caching_collector_with_expired_context() {
    let backend = MockSearchBackend::new(http_code_response());
    let raw = QueryCollector::new("test", &http_code_collector(), &[]).unwrap();
    let collector = CachingCollector::new(raw, Duration::from_secs(60));

    let ctx = ScrapeContext::with_timeout(Duration::ZERO);
    let (ctx, backend_ref, collector) = (&ctx, &backend, &collector);
    let metrics = gather(|tx| async move { collector.collect(ctx, backend_ref, &tx).await }).await;

    assert_eq!(metrics.len(), 1);
    assert_eq!(
        metrics[0].as_error().unwrap().kind(),
        &CollectErrorKind::DeadlineExceeded
    );
    assert_eq!(backend.search_calls().await, 0);
}

#[tokio::test]
async fn test_concurrent_cached_collections_search_once() {
    let backend = MockSearchBackend::new(http_code_response()).with_delay(Duration::from_millis(50));
    let raw = QueryCollector::new("test", &http_code_collector(), &[]).unwrap();
    let collector = CachingCollector::new(raw, Duration::from_secs(60));

    let ctx = ScrapeContext::background();
    let (ctx, backend_ref, collector) = (&ctx, &backend, &collector);
    let (a, b) = tokio::join!(
        gather(|tx| async move { collector.collect(ctx, backend_ref, &tx).await }),
        gather(|tx| async move { collector.collect(ctx, backend_ref, &tx).await }),
    );

    assert_eq!(backend.search_calls().await, 1);
    assert_eq!(samples(&a), samples(&b));
}

#[tokio::test]
async fn test_caching_collector_cancelled_while_waiting_for_slot() {
    let backend =
        MockSearchBackend::new(http_code_response()).with_delay(Duration::from_millis(300));
    let raw = QueryCollector::new("test", &http_code_collector(), &[]).unwrap();
    let collector = CachingCollector::new(raw, Duration::from_secs(60));

    let background = ScrapeContext::background();
    let (background, backend_ref, collector) = (&background, &backend, &collector);

    let refresh = async move {
        let metrics =
            gather(|tx| async move { collector.collect(background, backend_ref, &tx).await })
                .await;
        (metrics, tokio::time::Instant::now())
    };
    let waiter = async move {
        // Let the refresh take the slot first.
        tokio::time::sleep(Duration::from_millis(10)).await;
        let ctx = ScrapeContext::with_timeout(Duration::from_millis(50));
        let ctx = &ctx;
        let metrics =
            gather(|tx| async move { collector.collect(ctx, backend_ref, &tx).await }).await;
        (metrics, tokio::time::Instant::now())
    };
    let ((refreshed, refresh_done), (cancelled, waiter_done)) = tokio::join!(refresh, waiter);

    assert_eq!(cancelled.len(), 1);
    assert_eq!(
        cancelled[0].as_error().unwrap().kind(),
        &CollectErrorKind::DeadlineExceeded
    );
    assert!(waiter_done < refresh_done);
    assert_eq!(samples(&refreshed).len(), 3);
    assert_eq!(backend.search_calls().await, 1);

    // The slot holds the refreshed results for later scrapes.
    let replayed =
        gather(|tx| async move { collector.collect(background, backend_ref, &tx).await }).await;
    assert_eq!(samples(&replayed), samples(&refreshed));
    assert_eq!(backend.search_calls().await, 1);
}

#[tokio::test]
async fn test_named_target_exports_up_and_duration() {
    let backend = Arc::new(MockSearchBackend::new(http_code_response()));
    let collector = http_code_collector();
    let mut config = target(Some("es1"));
    config
        .labels
        .insert("cluster".to_string(), "prod".to_string());
    let target = Target::with_connector(
        &config,
        &[&collector],
        &GlobalConfig::default(),
        backend.clone(),
    )
    .unwrap();

    let ctx = ScrapeContext::background();
    let (ctx, target) = (&ctx, &target);
    let metrics = gather(|tx| async move { target.collect(ctx, &tx).await }).await;
    let samples = samples(&metrics);

    assert_eq!(samples.len(), 5);
    assert_eq!(samples[0].0, UP_METRIC_NAME);
    assert_eq!(samples[0].1, 1.0);
    assert_eq!(samples[4].0, SCRAPE_DURATION_NAME);
    assert_eq!(
        samples[1].2,
        vec![
            LabelPair::new("cluster", "prod"),
            LabelPair::new("http_code", "200"),
            LabelPair::new("instance", "es1")
        ]
    );
    assert_eq!(
        samples[0].2,
        vec![
            LabelPair::new("cluster", "prod"),
            LabelPair::new("instance", "es1")
        ]
    );

    gather(|tx| async move { target.collect(ctx, &tx).await }).await;
    assert_eq!(backend.connect_calls(), 1);
    assert_eq!(backend.health_calls().await, 2);
}

#[tokio::test]
async fn test_unhealthy_target_skips_collectors() {
    let backend = Arc::new(MockSearchBackend::new(http_code_response()));
    backend
        .set_health(Err(CollectErrorKind::Unhealthy("cluster status is red".to_string())))
        .await;
    let collector = http_code_collector();
    let target = Target::with_connector(
        &target(Some("es1")),
        &[&collector],
        &GlobalConfig::default(),
        backend.clone(),
    )
    .unwrap();

    let ctx = ScrapeContext::background();
    let (ctx, target) = (&ctx, &target);
    let metrics = gather(|tx| async move { target.collect(ctx, &tx).await }).await;
    let samples = samples(&metrics);

    assert_eq!(errors(&metrics), 1);
    assert_eq!(samples.len(), 2);
    assert_eq!((samples[0].0.as_str(), samples[0].1), (UP_METRIC_NAME, 0.0));
    assert_eq!(samples[1].0, SCRAPE_DURATION_NAME);
    assert_eq!(backend.search_calls().await, 0);
}

#[tokio::test]
async fn test_unnamed_target_exports_no_synthetic_metrics() {
    let backend = Arc::new(MockSearchBackend::new(http_code_response()));
    let collector = http_code_collector();
    let target = Target::with_connector(
        &target(None),
        &[&collector],
        &GlobalConfig::default(),
        backend,
    )
    .unwrap();

    let ctx = ScrapeContext::background();
    let (ctx, target) = (&ctx, &target);
    let metrics = gather(|tx| async move { target.collect(ctx, &tx).await }).await;
    let names: Vec<String> = samples(&metrics).into_iter().map(|(n, _, _)| n).collect();

    assert_eq!(names, vec!["requests_total"; 3]);
}
