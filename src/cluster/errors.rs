use rdkafka::error::KafkaError;
use thiserror::Error;
use tokio::task::JoinError;

/// Possible errors when talking to the Kafka cluster via a [`super::ClusterClient`].
#[derive(Error, Debug)]
pub enum ClusterError {
    #[error("Kafka client failed: {0}")]
    Kafka(#[from] KafkaError),

    /// Cluster metadata was never fetched successfully.
    #[error("Cluster metadata not available (yet)")]
    MetadataUnavailable,

    #[error("Topic '{0}' not found")]
    TopicNotFound(String),

    #[error("Partition '{0}:{1}' not found")]
    PartitionNotFound(String, u32),

    #[error("Partition '{0}:{1}' has no leader")]
    LeaderNotAvailable(String, u32),

    /// A blocking call to the cluster, executed on a dedicated thread, failed to complete.
    #[error("Blocking cluster call did not complete: {0}")]
    BlockingTask(#[from] JoinError),
}

pub type ClusterResult<T> = Result<T, ClusterError>;
