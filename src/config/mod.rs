//! Configuration module
//!
//! Provides configuration management for the exporter including loading from
//! YAML files, environment variable overrides, and a programmatic builder.

pub mod loader;
pub mod types;

pub use loader::ConfigLoader;
pub use types::{
    AggregationConfig, CollectorConfig, Config, ConfigBuilder, GlobalConfig, MetricConfig,
    QueryConfig, TARGET_NAME_LABEL, TargetConfig, ValueTransform, ValueType,
};
