//! Mock search backend for testing
//!
//! Serves a canned search response (or error), a configurable health result,
//! and records every call so tests can assert how often the backend was hit.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;

use crate::backend::{Connector, SearchBackend, SearchRequest};
use crate::error::CollectErrorKind;

/// Mock backend state
#[derive(Debug)]
struct MockBackendState {
    /// Result returned by `search`
    search_result: Result<Value, CollectErrorKind>,
    /// Result returned by `health`
    health_result: Result<(), CollectErrorKind>,
    /// Requests received by `search`
    requests: Vec<SearchRequest>,
    /// Count of `health` calls
    health_calls: u64,
}

/// Mock search backend for testing
#[derive(Debug, Clone)]
pub struct MockSearchBackend {
    state: Arc<RwLock<MockBackendState>>,
    connects: Arc<AtomicU64>,
    delay: Option<Duration>,
}

impl MockSearchBackend {
    /// A healthy backend answering every search with `response`
    pub fn new(response: Value) -> Self {
        Self::with_result(Ok(response))
    }

    /// A healthy backend failing every search with `error`
    pub fn failing(error: CollectErrorKind) -> Self {
        Self::with_result(Err(error))
    }

    fn with_result(search_result: Result<Value, CollectErrorKind>) -> Self {
        Self {
            state: Arc::new(RwLock::new(MockBackendState {
                search_result,
                health_result: Ok(()),
                requests: Vec::new(),
                health_calls: 0,
            })),
            connects: Arc::new(AtomicU64::new(0)),
            delay: None,
        }
    }

    /// Delay every search by `delay` before answering
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Replace the search result
    pub async fn set_search_result(&self, result: Result<Value, CollectErrorKind>) {
        self.state.write().await.search_result = result;
    }

    /// Replace the health result
    pub async fn set_health(&self, result: Result<(), CollectErrorKind>) {
        self.state.write().await.health_result = result;
    }

    /// Number of searches received
    pub async fn search_calls(&self) -> usize {
        self.state.read().await.requests.len()
    }

    /// Number of health probes received
    pub async fn health_calls(&self) -> u64 {
        self.state.read().await.health_calls
    }

    /// Requests received so far
    pub async fn requests(&self) -> Vec<SearchRequest> {
        self.state.read().await.requests.clone()
    }

    /// Number of times a client was created through [`Connector::connect`]
    pub fn connect_calls(&self) -> u64 {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SearchBackend for MockSearchBackend {
    async fn search(&self, request: &SearchRequest) -> Result<Value, CollectErrorKind> {
        let result = {
            let mut state = self.state.write().await;
            state.requests.push(request.clone());
            state.search_result.clone()
        };
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        result
    }

    async fn health(&self) -> Result<(), CollectErrorKind> {
        let mut state = self.state.write().await;
        state.health_calls += 1;
        state.health_result.clone()
    }
}

impl Connector for MockSearchBackend {
    fn connect(&self) -> Result<Arc<dyn SearchBackend>, CollectErrorKind> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(self.clone()))
    }
}
