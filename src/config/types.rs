//! Configuration type definitions
//!
//! Defines the exporter configuration: global settings, targets, collectors and
//! the queries and metrics each collector owns.

use secrecy::SecretString;
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::time::Duration;

use crate::error::ExporterConfigError;
use crate::metrics::aggregation::AggregationKind;

/// Label carrying the target name on every sample of a named target
pub const TARGET_NAME_LABEL: &str = "instance";

/// Prometheus metric type of a family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueType {
    /// Monotonic counter
    Counter,
    /// Point-in-time gauge
    #[default]
    Gauge,
}

/// How a datum value is turned into the emitted sample value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueTransform {
    /// Pass the raw value through
    #[default]
    Absolute,
    /// `value * 100 / total`
    Percentage,
}

/// Settings shared by every target and collector
#[derive(Debug, Clone, Deserialize)]
pub struct GlobalConfig {
    /// Upper bound for one scrape in seconds (default: 10)
    #[serde(default = "default_scrape_timeout_secs")]
    pub scrape_timeout_secs: u64,

    /// Subtracted from the timeout Prometheus announces for a scrape (default: 500)
    #[serde(default = "default_scrape_timeout_offset_ms")]
    pub scrape_timeout_offset_ms: u64,

    /// Default minimum refresh interval for collectors in seconds (default: 0, no caching)
    #[serde(default)]
    pub min_interval_secs: u64,

    /// Address the metrics endpoint binds to (default: 0.0.0.0:9114)
    #[serde(default = "default_listen_address")]
    pub listen_address: String,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            scrape_timeout_secs: default_scrape_timeout_secs(),
            scrape_timeout_offset_ms: default_scrape_timeout_offset_ms(),
            min_interval_secs: 0,
            listen_address: default_listen_address(),
        }
    }
}

impl GlobalConfig {
    /// Scrape timeout as a `Duration`
    pub fn scrape_timeout(&self) -> Duration {
        Duration::from_secs(self.scrape_timeout_secs)
    }

    /// Scrape timeout offset as a `Duration`
    pub fn scrape_timeout_offset(&self) -> Duration {
        Duration::from_millis(self.scrape_timeout_offset_ms)
    }
}

/// One Elasticsearch cluster to collect from
#[derive(Debug, Clone, Deserialize)]
pub struct TargetConfig {
    /// Target name; absent in single-target mode
    #[serde(default)]
    pub name: Option<String>,

    /// Cluster URL, e.g. `http://localhost:9200`
    pub dsn: String,

    /// Basic auth user name
    #[serde(default)]
    pub username: Option<String>,

    /// Basic auth password
    #[serde(default)]
    pub password: Option<SecretString>,

    /// Constant labels applied to every sample of this target
    #[serde(default)]
    pub labels: BTreeMap<String, String>,

    /// Collector names to run; empty means all collectors
    #[serde(default)]
    pub collectors: Vec<String>,
}

/// A group of queries and the metrics they populate
#[derive(Debug, Clone, Deserialize)]
pub struct CollectorConfig {
    /// Collector name
    pub name: String,

    /// Minimum refresh interval in seconds; overrides the global default
    #[serde(default)]
    pub min_interval_secs: Option<u64>,

    /// Queries executed by this collector
    #[serde(default)]
    pub queries: Vec<QueryConfig>,

    /// Metric families populated from the queries
    #[serde(default)]
    pub metrics: Vec<MetricConfig>,
}

impl CollectorConfig {
    /// Effective minimum interval, falling back to `global`
    pub fn min_interval(&self, global: &GlobalConfig) -> Duration {
        Duration::from_secs(self.min_interval_secs.unwrap_or(global.min_interval_secs))
    }

    /// Look up a query by name
    pub fn query(&self, name: &str) -> Option<&QueryConfig> {
        self.queries.iter().find(|q| q.name == name)
    }
}

/// A search with its named aggregations
#[derive(Debug, Clone, Deserialize)]
pub struct QueryConfig {
    /// Query name
    pub name: String,

    /// Query string query text
    pub query: String,

    /// Named aggregations attached to the search
    #[serde(default)]
    pub aggregations: Vec<AggregationConfig>,
}

impl QueryConfig {
    /// Look up an aggregation by name
    pub fn aggregation(&self, name: &str) -> Option<&AggregationConfig> {
        self.aggregations.iter().find(|a| a.name == name)
    }
}

/// A named aggregation: its kind and the body parameters sent to the backend
#[derive(Debug, Clone, Deserialize)]
pub struct AggregationConfig {
    /// Aggregation name, also the label key of terms buckets
    pub name: String,

    /// Aggregation type (terms, stats, min, max, sum, avg, cardinality)
    #[serde(rename = "type")]
    pub kind: String,

    /// Aggregation parameters, e.g. `{field: status, size: 10}`
    #[serde(default = "default_params")]
    pub params: serde_json::Value,
}

/// One exported metric family
#[derive(Debug, Clone, Deserialize)]
pub struct MetricConfig {
    /// Metric name
    pub name: String,

    /// Help text
    #[serde(default)]
    pub help: String,

    /// Prometheus metric type (default: gauge)
    #[serde(rename = "type", default)]
    pub value_type: ValueType,

    /// Value transform (default: absolute)
    #[serde(rename = "value", default)]
    pub transform: ValueTransform,

    /// Name of the query in the same collector feeding this metric
    pub query_ref: String,

    /// Aggregation the `filters` allow-list applies to
    #[serde(default)]
    pub aggregation: Option<String>,

    /// Allowed label values for `aggregation`
    #[serde(default)]
    pub filters: Vec<String>,

    /// Labels added to every sample of this metric
    #[serde(default)]
    pub static_labels: BTreeMap<String, String>,

    /// Also emit the query's hit total as an unlabeled sample
    #[serde(default)]
    pub track_total: bool,
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Global settings
    #[serde(default)]
    pub global: GlobalConfig,

    /// Targets to scrape
    #[serde(default)]
    pub targets: Vec<TargetConfig>,

    /// Collector definitions referenced by targets
    #[serde(default)]
    pub collectors: Vec<CollectorConfig>,
}

impl Config {
    /// Whether targets are exported under their own names with `up` and duration metrics
    pub fn is_multi_target(&self) -> bool {
        self.targets.iter().any(|t| t.name.is_some())
    }

    /// Collectors selected by `target`, in configuration order
    pub fn collectors_for<'a>(&'a self, target: &TargetConfig) -> Vec<&'a CollectorConfig> {
        if target.collectors.is_empty() {
            return self.collectors.iter().collect();
        }
        self.collectors
            .iter()
            .filter(|c| target.collectors.contains(&c.name))
            .collect()
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ExporterConfigError> {
        if self.global.scrape_timeout_secs == 0 {
            return Err(ExporterConfigError::InvalidInterval(
                "Scrape timeout must be greater than 0".to_string(),
            ));
        }

        if self.global.scrape_timeout_offset_ms >= self.global.scrape_timeout_secs * 1000 {
            return Err(ExporterConfigError::InvalidInterval(
                "Scrape timeout offset must be smaller than the scrape timeout".to_string(),
            ));
        }

        if self.global.listen_address.is_empty() {
            return Err(ExporterConfigError::MissingRequiredField(
                "global.listen_address".to_string(),
            ));
        }

        if self.targets.is_empty() {
            return Err(ExporterConfigError::MissingRequiredField(
                "at least one target is required".to_string(),
            ));
        }

        if self.collectors.is_empty() {
            return Err(ExporterConfigError::MissingRequiredField(
                "at least one collector is required".to_string(),
            ));
        }

        let mut collector_names = HashSet::new();
        for collector in &self.collectors {
            if !collector_names.insert(collector.name.as_str()) {
                return Err(ExporterConfigError::ValidationFailed(format!(
                    "duplicate collector name {:?}",
                    collector.name
                )));
            }
            collector.validate()?;
        }

        let multi_target = self.is_multi_target();
        let mut target_names = HashSet::new();
        for target in &self.targets {
            target.validate()?;

            match &target.name {
                Some(name) => {
                    if !target_names.insert(name.as_str()) {
                        return Err(ExporterConfigError::ValidationFailed(format!(
                            "duplicate target name {:?}",
                            name
                        )));
                    }
                }
                None if multi_target => {
                    return Err(ExporterConfigError::MissingRequiredField(
                        "every target needs a name when more than one target is named"
                            .to_string(),
                    ));
                }
                None => {}
            }

            for name in &target.collectors {
                if !collector_names.contains(name.as_str()) {
                    return Err(ExporterConfigError::UnknownReference(format!(
                        "target {:?} references unknown collector {:?}",
                        target.name.as_deref().unwrap_or(""),
                        name
                    )));
                }
            }

            let const_labels = target.const_labels();
            for collector in self.collectors_for(target) {
                collector.check_labels(&const_labels)?;
            }
        }

        if !multi_target && self.targets.len() > 1 {
            return Err(ExporterConfigError::ValidationFailed(
                "single-target mode allows exactly one target".to_string(),
            ));
        }

        Ok(())
    }
}

impl TargetConfig {
    /// Validate the connection settings
    pub fn validate(&self) -> Result<(), ExporterConfigError> {
        if self.dsn.is_empty() {
            return Err(ExporterConfigError::MissingRequiredField(
                "target dsn".to_string(),
            ));
        }

        let parsed = url::Url::parse(&self.dsn)
            .map_err(|e| ExporterConfigError::InvalidUrl(format!("{}: {}", self.dsn, e)))?;
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return Err(ExporterConfigError::InvalidUrl(
                "Target dsn must use http:// or https:// scheme".to_string(),
            ));
        }

        if matches!(&self.name, Some(name) if name.is_empty()) {
            return Err(ExporterConfigError::ValidationFailed(
                "target name cannot be empty".to_string(),
            ));
        }

        if self.password.is_some() && self.username.is_none() {
            return Err(ExporterConfigError::MissingRequiredField(
                "username is required when a password is set".to_string(),
            ));
        }

        if self.name.is_some() && self.labels.contains_key(TARGET_NAME_LABEL) {
            return Err(ExporterConfigError::InconsistentLabel(format!(
                "label {:?} is reserved for the name of target {:?}",
                TARGET_NAME_LABEL,
                self.name.as_deref().unwrap_or("")
            )));
        }

        Ok(())
    }

    /// Constant labels of every sample from this target
    ///
    /// The configured `labels`, plus `instance=<name>` for a named target.
    pub fn const_labels(&self) -> BTreeMap<String, String> {
        let mut labels = self.labels.clone();
        if let Some(name) = &self.name {
            labels.insert(TARGET_NAME_LABEL.to_string(), name.clone());
        }
        labels
    }
}

impl CollectorConfig {
    /// Validate names, references and aggregation kinds
    pub fn validate(&self) -> Result<(), ExporterConfigError> {
        if self.name.is_empty() {
            return Err(ExporterConfigError::MissingRequiredField(
                "collector name".to_string(),
            ));
        }

        let mut query_names = HashSet::new();
        for query in &self.queries {
            if query.name.is_empty() {
                return Err(ExporterConfigError::MissingRequiredField(format!(
                    "query name in collector {:?}",
                    self.name
                )));
            }
            if !query_names.insert(query.name.as_str()) {
                return Err(ExporterConfigError::ValidationFailed(format!(
                    "duplicate query name {:?} in collector {:?}",
                    query.name, self.name
                )));
            }

            let mut aggregation_names = HashSet::new();
            for aggregation in &query.aggregations {
                if aggregation.name.is_empty() {
                    return Err(ExporterConfigError::MissingRequiredField(format!(
                        "aggregation name in query {:?}",
                        query.name
                    )));
                }
                if !aggregation_names.insert(aggregation.name.as_str()) {
                    return Err(ExporterConfigError::ValidationFailed(format!(
                        "duplicate aggregation name {:?} in query {:?}",
                        aggregation.name, query.name
                    )));
                }
                aggregation.kind.parse::<AggregationKind>()?;
            }
        }

        for metric in &self.metrics {
            if metric.name.is_empty() {
                return Err(ExporterConfigError::MissingRequiredField(format!(
                    "metric name in collector {:?}",
                    self.name
                )));
            }

            let query = self.query(&metric.query_ref).ok_or_else(|| {
                ExporterConfigError::UnknownReference(format!(
                    "metric {:?} references unknown query {:?}",
                    metric.name, metric.query_ref
                ))
            })?;

            if let Some(aggregation) = &metric.aggregation
                && query.aggregation(aggregation).is_none()
            {
                return Err(ExporterConfigError::UnknownReference(format!(
                    "metric {:?} references unknown aggregation {:?} of query {:?}",
                    metric.name, aggregation, query.name
                )));
            }

            if !metric.filters.is_empty() && metric.aggregation.is_none() {
                return Err(ExporterConfigError::MissingRequiredField(format!(
                    "metric {:?} declares filters without an aggregation",
                    metric.name
                )));
            }
        }

        Ok(())
    }

    /// Reject label keys defined both as constant labels and per metric or per bucket
    pub fn check_labels(
        &self,
        target_labels: &BTreeMap<String, String>,
    ) -> Result<(), ExporterConfigError> {
        for metric in &self.metrics {
            if let Some(key) = metric
                .static_labels
                .keys()
                .find(|key| target_labels.contains_key(*key))
            {
                return Err(ExporterConfigError::InconsistentLabel(format!(
                    "label {:?} of metric {:?} is also a target label",
                    key, metric.name
                )));
            }

            let Some(query) = self.query(&metric.query_ref) else {
                continue;
            };
            for aggregation in &query.aggregations {
                let Some(key) = bucket_label_key(aggregation) else {
                    continue;
                };
                if target_labels.contains_key(key) || metric.static_labels.contains_key(key) {
                    return Err(ExporterConfigError::InconsistentLabel(format!(
                        "aggregation label {:?} of metric {:?} collides with a constant label",
                        key, metric.name
                    )));
                }
            }
        }

        Ok(())
    }
}

/// Label key an aggregation writes onto its data, if it writes one at all
fn bucket_label_key(aggregation: &AggregationConfig) -> Option<&str> {
    match aggregation.kind.parse::<AggregationKind>() {
        Ok(AggregationKind::Terms) => Some(aggregation.name.as_str()),
        Ok(AggregationKind::Stats) => Some("stat"),
        _ => None,
    }
}

/// Builder for creating configurations programmatically
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a new configuration builder
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    /// Set the scrape timeout in seconds
    pub fn scrape_timeout_secs(mut self, secs: u64) -> Self {
        self.config.global.scrape_timeout_secs = secs;
        self
    }

    /// Set the default collector refresh interval in seconds
    pub fn min_interval_secs(mut self, secs: u64) -> Self {
        self.config.global.min_interval_secs = secs;
        self
    }

    /// Set the listen address
    pub fn listen_address(mut self, address: impl Into<String>) -> Self {
        self.config.global.listen_address = address.into();
        self
    }

    /// Add a target
    pub fn target(mut self, target: TargetConfig) -> Self {
        self.config.targets.push(target);
        self
    }

    /// Add a collector
    pub fn collector(mut self, collector: CollectorConfig) -> Self {
        self.config.collectors.push(collector);
        self
    }

    /// Build the configuration with validation
    pub fn build(self) -> Result<Config, ExporterConfigError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

// Default value functions
fn default_scrape_timeout_secs() -> u64 {
    10
}

fn default_scrape_timeout_offset_ms() -> u64 {
    500
}

fn default_listen_address() -> String {
    "0.0.0.0:9114".to_string()
}

fn default_params() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}
