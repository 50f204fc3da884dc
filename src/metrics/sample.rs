use std::any::type_name;

use tokio::sync::mpsc;

use super::Metric;

/// A single measurement of a [`Metric`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MetricSample {
    pub metric: Metric,

    /// One value per [`Metric::labels`], in the same order.
    pub label_values: Vec<String>,

    pub value: i64,
}

impl MetricSample {
    pub fn new(metric: Metric, label_values: Vec<String>, value: i64) -> Self {
        debug_assert_eq!(
            metric.labels().len(),
            label_values.len(),
            "Metric '{}' expects labels {:?}",
            metric.name(),
            metric.labels()
        );

        Self {
            metric,
            label_values,
            value,
        }
    }
}

/// Receives the [`MetricSample`]s produced while scraping.
///
/// Implementors must tolerate concurrent calls from multiple tasks.
pub trait MetricEmitter: Send + Sync {
    fn emit(&self, sample: MetricSample);
}

impl MetricEmitter for mpsc::UnboundedSender<MetricSample> {
    fn emit(&self, sample: MetricSample) {
        if let Err(e) = self.send(sample) {
            error!("Failed to emit {}: {e}", type_name::<MetricSample>());
        }
    }
}

/// Every [`MetricSample`] produced by one scrape, in the order they were emitted.
///
/// Immutable once created: it can be shared by all the callers that asked for the same scrape.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ScrapeResult {
    samples: Vec<MetricSample>,
}

impl From<Vec<MetricSample>> for ScrapeResult {
    fn from(samples: Vec<MetricSample>) -> Self {
        Self {
            samples,
        }
    }
}

impl ScrapeResult {
    pub fn samples(&self) -> &[MetricSample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }
}

#[cfg(test)]
impl ScrapeResult {
    /// Value of the sample of `metric` with the given label values, if any.
    pub fn value(&self, metric: Metric, label_values: &[&str]) -> Option<i64> {
        self.samples
            .iter()
            .find(|s| s.metric == metric && s.label_values.iter().map(String::as_str).eq(label_values.iter().copied()))
            .map(|s| s.value)
    }

    /// All the samples of `metric`.
    pub fn of(&self, metric: Metric) -> Vec<&MetricSample> {
        self.samples.iter().filter(|s| s.metric == metric).collect()
    }
}
