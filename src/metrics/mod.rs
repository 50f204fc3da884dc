mod catalogue;
mod exposition;
mod sample;

pub use catalogue::Metric;
pub use exposition::render;
pub use sample::{MetricEmitter, MetricSample, ScrapeResult};

use prometheus::Registry;

/// Namespace of the metrics describing the Kafka cluster.
pub const NAMESPACE: &str = "kafka";

/// Namespace of the metrics describing this service itself.
pub const INTERNAL_NAMESPACE: &str = "kollector";

pub const LABEL_ID: &str = "id";
pub const LABEL_ADDRESS: &str = "address";
pub const LABEL_GROUP: &str = "group";
pub const LABEL_TOPIC: &str = "topic";
pub const LABEL_PARTITION: &str = "partition";

/// Creates the [`Registry`] that the service internal metrics register with.
pub fn init() -> Registry {
    Registry::new_custom(Some(INTERNAL_NAMESPACE.to_string()), None)
        .unwrap_or_else(|e| panic!("Unable to create a Prometheus Metrics Registry: {e}"))
}
