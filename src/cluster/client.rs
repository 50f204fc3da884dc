use std::collections::HashMap;

use async_trait::async_trait;

use super::errors::ClusterResult;
use crate::kafka_types::{Broker, CommittedOffset, GroupDescription, TopicPartition};

/// Which end of a Partition log to read the offset of.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OffsetPosition {
    /// Offset that the next produced record will receive (aka "high watermark")
    Newest,
    /// Earliest offset still available (aka "low watermark")
    Oldest,
}

/// Access to the state of a Kafka cluster.
///
/// Topology accessors (brokers, topics, partitions, leaders, replicas) answer from the
/// metadata cached by the last successful [`Self::refresh_metadata`]. Offsets and Consumer Groups
/// are always requested to the cluster.
///
/// Every method is fallible independently from the others: a failure concerns only what was requested.
#[async_trait]
pub trait ClusterClient: Send + Sync {
    /// Fetches fresh cluster metadata, replacing the cached one.
    ///
    /// On failure, the previously cached metadata (if any) is kept.
    async fn refresh_metadata(&self) -> ClusterResult<()>;

    /// Brokers constituting the cluster.
    async fn brokers(&self) -> Vec<Broker>;

    /// Names of all the Topics in the cluster.
    async fn topics(&self) -> ClusterResult<Vec<String>>;

    /// Partition identifiers of a Topic.
    async fn partitions(&self, topic: &str) -> ClusterResult<Vec<u32>>;

    /// Identifier of the Broker leading a Partition.
    async fn leader(&self, topic: &str, partition: u32) -> ClusterResult<u32>;

    /// Offset at the given [`OffsetPosition`] of a Partition.
    async fn offset(&self, topic: &str, partition: u32, position: OffsetPosition) -> ClusterResult<i64>;

    /// Identifiers of the Brokers replicating a Partition: the first is the preferred leader.
    async fn replicas(&self, topic: &str, partition: u32) -> ClusterResult<Vec<u32>>;

    /// Identifiers of the Brokers whose replica of a Partition is in-sync.
    async fn in_sync_replicas(&self, topic: &str, partition: u32) -> ClusterResult<Vec<u32>>;

    /// Identifiers of all the Consumer Groups, keyed by the identifier of the [`Broker`] coordinating them.
    async fn list_groups(&self) -> ClusterResult<HashMap<u32, Vec<String>>>;

    /// Describes the given Consumer Groups, coordinated by the given [`Broker`].
    ///
    /// Groups that can't be described are not part of the result.
    async fn describe_groups(&self, broker: &Broker, groups: &[String]) -> ClusterResult<Vec<GroupDescription>>;

    /// Offsets committed by a Consumer Group for the given [`TopicPartition`]s.
    async fn fetch_committed_offsets(
        &self,
        broker: &Broker,
        group: &str,
        partitions: &[TopicPartition],
    ) -> ClusterResult<Vec<CommittedOffset>>;
}
