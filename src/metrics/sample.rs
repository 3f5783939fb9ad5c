//! Samples and their descriptors
//!
//! A [`Sample`] is one observation with a stable identity: the descriptor's name
//! plus a label set sorted by key. Failures travel through the same stream as
//! [`Metric::Invalid`].

use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::config::ValueType;
use crate::error::CollectError;

/// Capacity of the channels samples are streamed through
pub const METRIC_CHANNEL_CAPACITY: usize = 1000;

/// Sending half of a sample stream
pub type MetricSender = mpsc::Sender<Metric>;

/// Receiving half of a sample stream
pub type MetricReceiver = mpsc::Receiver<Metric>;

/// Create a bounded sample stream
pub fn metric_channel() -> (MetricSender, MetricReceiver) {
    mpsc::channel(METRIC_CHANNEL_CAPACITY)
}

/// A label key and value
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LabelPair {
    key: String,
    value: String,
}

impl LabelPair {
    /// Create a label pair
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Label key
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Label value
    pub fn value(&self) -> &str {
        &self.value
    }
}

/// Sort label pairs by key, the order the exposition format identifies series by
pub fn sort_label_pairs(pairs: &mut [LabelPair]) {
    pairs.sort_by(|a, b| a.key.cmp(&b.key));
}

/// A value extracted from an aggregation, optionally tagged with the bucket it came from
#[derive(Debug, Clone, PartialEq)]
pub struct MetricDatum {
    /// Raw value
    pub value: f64,
    /// Bucket label; `None` for single-value aggregations
    pub label: Option<LabelPair>,
}

impl MetricDatum {
    /// An unlabeled datum
    pub fn new(value: f64) -> Self {
        Self { value, label: None }
    }

    /// A datum tagged with `key=value`
    pub fn labeled(value: f64, key: impl Into<String>, label_value: impl Into<String>) -> Self {
        Self {
            value,
            label: Some(LabelPair::new(key, label_value)),
        }
    }
}

/// Static identity of a metric family
pub trait MetricDesc: fmt::Debug + Send + Sync {
    /// Metric name
    fn name(&self) -> &str;
    /// Help text
    fn help(&self) -> &str;
    /// Counter or gauge
    fn value_type(&self) -> ValueType;
    /// Labels attached to every sample, sorted by key
    fn const_labels(&self) -> &[LabelPair];
    /// Context used in log records and errors
    fn log_context(&self) -> &str;
}

/// Descriptor for metrics generated by the exporter itself (`up`, `scrape_duration_seconds`)
#[derive(Debug, Clone)]
pub struct AutomaticMetricDesc {
    name: String,
    help: String,
    value_type: ValueType,
    const_labels: Vec<LabelPair>,
    log_context: String,
}

impl AutomaticMetricDesc {
    /// Create a descriptor; `const_labels` are sorted here
    pub fn new(
        log_context: impl Into<String>,
        name: impl Into<String>,
        help: impl Into<String>,
        value_type: ValueType,
        mut const_labels: Vec<LabelPair>,
    ) -> Self {
        sort_label_pairs(&mut const_labels);
        Self {
            name: name.into(),
            help: help.into(),
            value_type,
            const_labels,
            log_context: log_context.into(),
        }
    }
}

impl MetricDesc for AutomaticMetricDesc {
    fn name(&self) -> &str {
        &self.name
    }

    fn help(&self) -> &str {
        &self.help
    }

    fn value_type(&self) -> ValueType {
        self.value_type
    }

    fn const_labels(&self) -> &[LabelPair] {
        &self.const_labels
    }

    fn log_context(&self) -> &str {
        &self.log_context
    }
}

/// One observation ready for exposition
#[derive(Debug, Clone)]
pub struct Sample {
    desc: Arc<dyn MetricDesc>,
    value: f64,
    label_pairs: Vec<LabelPair>,
}

impl Sample {
    /// Create a sample; `labels` are merged with the descriptor's constant labels and sorted
    pub fn new(
        desc: Arc<dyn MetricDesc>,
        value: f64,
        labels: impl IntoIterator<Item = LabelPair>,
    ) -> Self {
        let mut label_pairs: Vec<LabelPair> = labels.into_iter().collect();
        if label_pairs.is_empty() {
            label_pairs = desc.const_labels().to_vec();
        } else {
            label_pairs.extend_from_slice(desc.const_labels());
            sort_label_pairs(&mut label_pairs);
        }

        Self {
            desc,
            value,
            label_pairs,
        }
    }

    /// Descriptor of the family this sample belongs to
    pub fn desc(&self) -> &dyn MetricDesc {
        self.desc.as_ref()
    }

    /// Metric name
    pub fn name(&self) -> &str {
        self.desc.name()
    }

    /// Sample value
    pub fn value(&self) -> f64 {
        self.value
    }

    /// All labels, sorted by key
    pub fn label_pairs(&self) -> &[LabelPair] {
        &self.label_pairs
    }

    /// Value of the label named `key`
    pub fn label(&self, key: &str) -> Option<&str> {
        self.label_pairs
            .iter()
            .find(|pair| pair.key == key)
            .map(LabelPair::value)
    }
}

/// An item of the sample stream: a sample or the error that replaced it
#[derive(Debug, Clone)]
pub enum Metric {
    /// A valid sample
    Sample(Sample),
    /// A collection failure
    Invalid(CollectError),
}

impl Metric {
    /// Shorthand for `Metric::Sample(Sample::new(..))`
    pub fn sample(
        desc: Arc<dyn MetricDesc>,
        value: f64,
        labels: impl IntoIterator<Item = LabelPair>,
    ) -> Self {
        Self::Sample(Sample::new(desc, value, labels))
    }

    /// The sample, if this is not an error
    pub fn as_sample(&self) -> Option<&Sample> {
        match self {
            Self::Sample(sample) => Some(sample),
            Self::Invalid(_) => None,
        }
    }

    /// The error, if this is an invalid sample
    pub fn as_error(&self) -> Option<&CollectError> {
        match self {
            Self::Sample(_) => None,
            Self::Invalid(err) => Some(err),
        }
    }
}

/// Send `metric` downstream; a closed receiver means nobody is listening anymore
pub async fn emit(ch: &MetricSender, metric: Metric) {
    if ch.send(metric).await.is_err() {
        tracing::debug!("Sample stream closed, dropping sample");
    }
}
