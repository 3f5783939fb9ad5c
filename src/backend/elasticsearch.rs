//! Elasticsearch HTTP client
//!
//! Runs size-zero searches with tracked hit totals and probes cluster health.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info};

use crate::backend::{Connector, SearchBackend, SearchRequest};
use crate::config::TargetConfig;
use crate::error::CollectErrorKind;

/// Search backend speaking the Elasticsearch REST API
#[derive(Debug, Clone)]
pub struct ElasticsearchClient {
    base_url: String,
    username: Option<String>,
    password: Option<SecretString>,
    client: reqwest::Client,
}

impl ElasticsearchClient {
    /// Create a client for the cluster at `dsn`
    pub fn new(
        dsn: &str,
        username: Option<String>,
        password: Option<SecretString>,
    ) -> Result<Self, CollectErrorKind> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| CollectErrorKind::Connect(format!("Failed to create HTTP client: {}", e)))?;

        info!(dsn = %dsn, "Created Elasticsearch client");

        Ok(Self {
            base_url: dsn.trim_end_matches('/').to_string(),
            username,
            password,
            client,
        })
    }

    /// Add basic auth when credentials are configured
    fn add_auth(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.username {
            Some(username) => request.basic_auth(
                username,
                self.password.as_ref().map(|p| p.expose_secret().as_str()),
            ),
            None => request,
        }
    }
}

#[async_trait]
impl SearchBackend for ElasticsearchClient {
    async fn search(&self, request: &SearchRequest) -> Result<Value, CollectErrorKind> {
        let http_request = self
            .client
            .post(format!("{}/_search", self.base_url))
            .query(&[("track_total_hits", "true"), ("size", "0")])
            .json(request);

        let response = self
            .add_auth(http_request)
            .send()
            .await
            .map_err(|e| CollectErrorKind::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(CollectErrorKind::Status(status.as_u16()));
        }

        let body = response
            .json::<Value>()
            .await
            .map_err(|e| CollectErrorKind::InvalidResponse(e.to_string()))?;

        debug!(url = %self.base_url, "Search completed");
        Ok(body)
    }

    async fn health(&self) -> Result<(), CollectErrorKind> {
        let response = self
            .add_auth(self.client.get(format!("{}/_cluster/health", self.base_url)))
            .send()
            .await
            .map_err(|e| CollectErrorKind::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(CollectErrorKind::Unhealthy(format!(
                "health check returned status {}",
                status.as_u16()
            )));
        }

        let body = response
            .json::<Value>()
            .await
            .map_err(|e| CollectErrorKind::InvalidResponse(e.to_string()))?;

        match body.get("status").and_then(Value::as_str) {
            Some("red") => Err(CollectErrorKind::Unhealthy(
                "cluster status is red".to_string(),
            )),
            _ => Ok(()),
        }
    }
}

/// Builds an [`ElasticsearchClient`] from a target's connection settings
#[derive(Debug, Clone)]
pub struct ElasticsearchConnector {
    dsn: String,
    username: Option<String>,
    password: Option<SecretString>,
}

impl ElasticsearchConnector {
    /// Connector for `target`
    pub fn new(target: &TargetConfig) -> Self {
        Self {
            dsn: target.dsn.clone(),
            username: target.username.clone(),
            password: target.password.clone(),
        }
    }
}

impl Connector for ElasticsearchConnector {
    fn connect(&self) -> Result<Arc<dyn SearchBackend>, CollectErrorKind> {
        let client =
            ElasticsearchClient::new(&self.dsn, self.username.clone(), self.password.clone())?;
        Ok(Arc::new(client))
    }
}
