//! Search backend abstraction
//!
//! The collection pipeline only needs two calls from a backend: a search that
//! returns hit totals and aggregations, and a health probe.

pub mod elasticsearch;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value, json};
use std::sync::Arc;

use crate::error::CollectErrorKind;

pub use elasticsearch::{ElasticsearchClient, ElasticsearchConnector};

/// Body of a search request: a query plus named aggregations
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchRequest {
    /// Query clause
    pub query: Value,
    /// Named aggregation bodies
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub aggs: Map<String, Value>,
}

impl SearchRequest {
    /// A `query_string` search with the given aggregations
    pub fn query_string(query: &str, aggs: Map<String, Value>) -> Self {
        Self {
            query: json!({ "query_string": { "query": query } }),
            aggs,
        }
    }
}

/// A client able to run searches against one cluster
#[async_trait]
pub trait SearchBackend: Send + Sync {
    /// Run `request` returning only hit totals and aggregations (no documents)
    async fn search(&self, request: &SearchRequest) -> Result<Value, CollectErrorKind>;

    /// Probe whether the cluster is reachable and usable
    async fn health(&self) -> Result<(), CollectErrorKind>;
}

/// Creates the backend client of a target on first use
pub trait Connector: Send + Sync {
    /// Build a client; called at most once successfully per target
    fn connect(&self) -> Result<Arc<dyn SearchBackend>, CollectErrorKind>;
}

/// Hit total of a search response; accepts `{"total": {"value": n}}` and a bare `{"total": n}`
pub fn hits_total(response: &Value) -> f64 {
    let total = &response["hits"]["total"];
    total
        .get("value")
        .and_then(Value::as_f64)
        .or_else(|| total.as_f64())
        .unwrap_or_default()
}
