//! Metric families
//!
//! A [`MetricFamily`] owns a configured metric's identity and turns the data of
//! one query execution into samples, applying its value transform and label filters.

use std::sync::Arc;
use tracing::debug;

use crate::config::{MetricConfig, ValueTransform, ValueType};
use crate::error::ExporterConfigError;
use crate::metrics::sample::{
    LabelPair, Metric, MetricDatum, MetricDesc, MetricSender, emit, sort_label_pairs,
};

/// A configured metric and the logic to populate it from query results
#[derive(Debug)]
pub struct MetricFamily {
    config: MetricConfig,
    const_labels: Vec<LabelPair>,
    log_context: String,
}

impl MetricFamily {
    /// Create a family from `config`; `const_labels` (e.g. target labels) are
    /// merged with the metric's static labels
    pub fn new(
        log_context: &str,
        config: &MetricConfig,
        const_labels: &[LabelPair],
    ) -> Result<Self, ExporterConfigError> {
        let log_context = format!("{}, metric={:?}", log_context, config.name);

        let mut labels = const_labels.to_vec();
        for (key, value) in &config.static_labels {
            if labels.iter().any(|pair| pair.key() == key) {
                return Err(ExporterConfigError::InconsistentLabel(format!(
                    "[{}] static label {:?} is already a constant label",
                    log_context, key
                )));
            }
            labels.push(LabelPair::new(key.as_str(), value.as_str()));
        }
        sort_label_pairs(&mut labels);

        Ok(Self {
            config: config.clone(),
            const_labels: labels,
            log_context,
        })
    }

    /// Emit one sample per supported datum, then the total if tracked
    pub async fn collect(self: &Arc<Self>, data: &[MetricDatum], total: f64, ch: &MetricSender) {
        let desc: Arc<dyn MetricDesc> = self.clone();

        for datum in data {
            let label = match &datum.label {
                Some(pair) if !self.supported(pair) => continue,
                Some(pair) => Some(pair.clone()),
                None => None,
            };
            let value = self.calculate_value(datum.value, total);
            emit(ch, Metric::sample(desc.clone(), value, label)).await;
        }

        if self.config.track_total {
            emit(ch, Metric::sample(desc, total, None)).await;
        }
    }

    /// Apply the configured value transform
    pub fn calculate_value(&self, value: f64, total: f64) -> f64 {
        match self.config.transform {
            ValueTransform::Absolute => value,
            ValueTransform::Percentage if total == 0.0 => {
                debug!(
                    metric = %self.log_context,
                    value = value,
                    "Percentage of an empty result set, emitting NaN"
                );
                f64::NAN
            }
            ValueTransform::Percentage => value * 100.0 / total,
        }
    }

    /// Whether a labeled datum passes the family's label filters
    pub fn supported(&self, pair: &LabelPair) -> bool {
        if pair.key().is_empty() || pair.value().is_empty() {
            return false;
        }
        match &self.config.aggregation {
            Some(aggregation) if aggregation == pair.key() && !self.config.filters.is_empty() => {
                self.config.filters.iter().any(|f| f == pair.value())
            }
            _ => true,
        }
    }
}

impl MetricDesc for MetricFamily {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn help(&self) -> &str {
        &self.config.help
    }

    fn value_type(&self) -> ValueType {
        self.config.value_type
    }

    fn const_labels(&self) -> &[LabelPair] {
        &self.const_labels
    }

    fn log_context(&self) -> &str {
        &self.log_context
    }
}
