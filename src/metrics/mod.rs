//! Metric model
//!
//! Label pairs, intermediate data, descriptors and samples, plus the two stages
//! that shape raw aggregation results into samples.

pub mod aggregation;
pub mod family;
pub mod sample;

pub use aggregation::{AggregationHandler, AggregationKind};
pub use family::MetricFamily;
pub use sample::{
    AutomaticMetricDesc, LabelPair, Metric, MetricDatum, MetricDesc, MetricReceiver,
    MetricSender, Sample, emit, metric_channel,
};
