//! Prometheus text exposition
//!
//! Groups samples into families, drops duplicates and invalid samples, and
//! encodes the rest with the `prometheus` text encoder.

use prometheus::{Encoder, TextEncoder, proto};
use std::collections::{BTreeMap, HashSet};
use tracing::{error, warn};

use crate::config::ValueType;
use crate::metrics::{LabelPair, Metric, Sample};

/// Content type of the rendered text
pub const TEXT_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Rendered exposition and the number of samples rejected while rendering
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Rendered {
    /// Text format body
    pub text: String,
    /// Invalid, duplicate or inconsistent samples encountered
    pub errors: u64,
}

struct Family<'a> {
    help: &'a str,
    value_type: ValueType,
    samples: Vec<&'a Sample>,
    seen: HashSet<&'a [LabelPair]>,
}

/// Render `metrics` in the Prometheus text format
///
/// Families are ordered by name; samples keep their arrival order within a family.
pub fn render(metrics: &[Metric]) -> Rendered {
    let mut families: BTreeMap<&str, Family<'_>> = BTreeMap::new();
    let mut errors = 0;

    for metric in metrics {
        let sample = match metric {
            Metric::Sample(sample) => sample,
            Metric::Invalid(err) => {
                warn!(error = %err, "Error gathering metrics");
                errors += 1;
                continue;
            }
        };

        let desc = sample.desc();
        let family = families.entry(desc.name()).or_insert_with(|| Family {
            help: desc.help(),
            value_type: desc.value_type(),
            samples: Vec::new(),
            seen: HashSet::new(),
        });

        if family.help != desc.help() || family.value_type != desc.value_type() {
            warn!(
                metric = %desc.name(),
                context = %desc.log_context(),
                "Sample has inconsistent help or type for its family, dropping"
            );
            errors += 1;
            continue;
        }

        if !family.seen.insert(sample.label_pairs()) {
            warn!(
                metric = %desc.name(),
                context = %desc.log_context(),
                "Sample was collected before with the same name and label values, dropping"
            );
            errors += 1;
            continue;
        }

        family.samples.push(sample);
    }

    let families: Vec<proto::MetricFamily> = families
        .into_iter()
        .filter(|(_, family)| !family.samples.is_empty())
        .map(|(name, family)| encode_family(name, family))
        .collect();

    let mut buffer = Vec::new();
    if let Err(e) = TextEncoder::new().encode(&families, &mut buffer) {
        error!(error = %e, "Failed to encode metric families");
        return Rendered {
            text: String::new(),
            errors: errors + families.len() as u64,
        };
    }

    Rendered {
        text: String::from_utf8_lossy(&buffer).into_owned(),
        errors,
    }
}

fn encode_family(name: &str, family: Family<'_>) -> proto::MetricFamily {
    let mut encoded = proto::MetricFamily::default();
    encoded.set_name(name.to_string());
    encoded.set_help(family.help.to_string());
    encoded.set_field_type(match family.value_type {
        ValueType::Counter => proto::MetricType::COUNTER,
        ValueType::Gauge => proto::MetricType::GAUGE,
    });

    for sample in family.samples {
        let mut metric = proto::Metric::default();
        for pair in sample.label_pairs() {
            let mut label = proto::LabelPair::default();
            label.set_name(pair.key().to_string());
            label.set_value(pair.value().to_string());
            metric.mut_label().push(label);
        }
        match family.value_type {
            ValueType::Counter => {
                let mut counter = proto::Counter::default();
                counter.set_value(sample.value());
                metric.set_counter(counter);
            }
            ValueType::Gauge => {
                let mut gauge = proto::Gauge::default();
                gauge.set_value(sample.value());
                metric.set_gauge(gauge);
            }
        }
        encoded.mut_metric().push(metric);
    }

    encoded
}
