//! Aggregation result shaping
//!
//! Each [`AggregationHandler`] variant turns one raw aggregation result from a
//! search response into [`MetricDatum`] values.

use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use crate::error::ExporterConfigError;
use crate::metrics::sample::MetricDatum;

/// Label key used for the fields of a stats aggregation
pub const STATS_LABEL: &str = "stat";

const STATS_FIELDS: [&str; 5] = ["count", "min", "max", "avg", "sum"];

/// Aggregation types the exporter knows how to read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregationKind {
    /// Bucketed `terms`
    Terms,
    /// Multi-value `stats`
    Stats,
    /// Single-value `min`
    Min,
    /// Single-value `max`
    Max,
    /// Single-value `sum`
    Sum,
    /// Single-value `avg`
    Avg,
    /// Single-value `cardinality`
    Cardinality,
}

impl AggregationKind {
    /// Name of the aggregation in the search request body
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Terms => "terms",
            Self::Stats => "stats",
            Self::Min => "min",
            Self::Max => "max",
            Self::Sum => "sum",
            Self::Avg => "avg",
            Self::Cardinality => "cardinality",
        }
    }
}

impl fmt::Display for AggregationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AggregationKind {
    type Err = ExporterConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "terms" => Ok(Self::Terms),
            "stats" => Ok(Self::Stats),
            "min" => Ok(Self::Min),
            "max" => Ok(Self::Max),
            "sum" => Ok(Self::Sum),
            "avg" => Ok(Self::Avg),
            "cardinality" => Ok(Self::Cardinality),
            _ => Err(ExporterConfigError::UnsupportedAggregationKind(s.to_string())),
        }
    }
}

/// Converts one raw aggregation result into metric data
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AggregationHandler {
    /// One labeled datum per bucket, keyed by the aggregation name
    Terms {
        /// Label key written onto every bucket datum
        name: String,
    },
    /// One unlabeled datum from the `value` field
    SingleValue,
    /// Five data labeled `stat=<field>`
    Stats,
}

impl AggregationHandler {
    /// Handler for an aggregation of type `kind` named `name`
    pub fn new(kind: &str, name: &str) -> Result<Self, ExporterConfigError> {
        Ok(Self::for_kind(kind.parse()?, name))
    }

    /// Handler for an already parsed kind
    pub fn for_kind(kind: AggregationKind, name: &str) -> Self {
        match kind {
            AggregationKind::Terms => Self::Terms {
                name: name.to_string(),
            },
            AggregationKind::Stats => Self::Stats,
            AggregationKind::Min
            | AggregationKind::Max
            | AggregationKind::Sum
            | AggregationKind::Avg
            | AggregationKind::Cardinality => Self::SingleValue,
        }
    }

    /// Append the data extracted from `result` to `data` and return it
    pub fn handle(&self, result: &Value, mut data: Vec<MetricDatum>) -> Vec<MetricDatum> {
        match self {
            Self::Terms { name } => {
                let buckets = result
                    .get("buckets")
                    .and_then(Value::as_array)
                    .map(Vec::as_slice)
                    .unwrap_or_default();
                for bucket in buckets {
                    let key = bucket.get("key").map(key_to_string).unwrap_or_default();
                    data.push(MetricDatum::labeled(
                        number_field(bucket, "doc_count"),
                        name.as_str(),
                        key,
                    ));
                }
            }
            Self::SingleValue => {
                data.push(MetricDatum::new(number_field(result, "value")));
            }
            Self::Stats => {
                for field in STATS_FIELDS {
                    data.push(MetricDatum::labeled(
                        number_field(result, field),
                        STATS_LABEL,
                        field,
                    ));
                }
            }
        }
        data
    }
}

/// Numeric field of an aggregation object; missing, null and non-numeric read as 0
fn number_field(value: &Value, field: &str) -> f64 {
    match value.get(field) {
        Some(Value::Number(n)) => n.as_f64().unwrap_or_default(),
        Some(Value::String(s)) => s.parse().unwrap_or_default(),
        _ => 0.0,
    }
}

/// Bucket keys may be strings, numbers or booleans; numbers keep their JSON spelling
fn key_to_string(key: &Value) -> String {
    match key {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
