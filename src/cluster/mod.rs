// Inner modules
mod client;
mod errors;
mod rdkafka_client;

// Exports
pub use client::{ClusterClient, OffsetPosition};
pub use errors::{ClusterError, ClusterResult};
pub use rdkafka_client::RdKafkaClusterClient;
