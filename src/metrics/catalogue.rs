use const_format::formatcp;

use super::{LABEL_ADDRESS, LABEL_GROUP, LABEL_ID, LABEL_PARTITION, LABEL_TOPIC, NAMESPACE};

const LABELS_NONE: &[&str] = &[];
const LABELS_BROKER: &[&str] = &[LABEL_ID, LABEL_ADDRESS];
const LABELS_TOPIC: &[&str] = &[LABEL_TOPIC];
const LABELS_TOPIC_PARTITION: &[&str] = &[LABEL_TOPIC, LABEL_PARTITION];
const LABELS_GROUP: &[&str] = &[LABEL_GROUP];
const LABELS_GROUP_TOPIC: &[&str] = &[LABEL_GROUP, LABEL_TOPIC];
const LABELS_GROUP_TOPIC_PARTITION: &[&str] = &[LABEL_GROUP, LABEL_TOPIC, LABEL_PARTITION];

/// Every metric a scrape can produce about the Kafka cluster.
///
/// Each metric has a fixed name and a fixed, ordered set of labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Metric {
    Brokers,
    BrokerInfo,
    TopicPartitions,
    TopicPartitionCurrentOffset,
    TopicPartitionOldestOffset,
    TopicPartitionLeader,
    TopicPartitionReplicas,
    TopicPartitionInSyncReplica,
    TopicPartitionLeaderIsPreferred,
    TopicPartitionUnderReplicatedPartition,
    ConsumerGroupCurrentOffset,
    ConsumerGroupCurrentOffsetSum,
    ConsumerGroupLag,
    ConsumerGroupLagSum,
    ConsumerGroupMembers,
    ConsumerGroupLagAlternateSource,
}

impl Metric {
    /// All the metrics, in exposition order.
    pub const ALL: [Metric; 16] = [
        Metric::Brokers,
        Metric::BrokerInfo,
        Metric::TopicPartitions,
        Metric::TopicPartitionCurrentOffset,
        Metric::TopicPartitionOldestOffset,
        Metric::TopicPartitionLeader,
        Metric::TopicPartitionReplicas,
        Metric::TopicPartitionInSyncReplica,
        Metric::TopicPartitionLeaderIsPreferred,
        Metric::TopicPartitionUnderReplicatedPartition,
        Metric::ConsumerGroupCurrentOffset,
        Metric::ConsumerGroupCurrentOffsetSum,
        Metric::ConsumerGroupLag,
        Metric::ConsumerGroupLagSum,
        Metric::ConsumerGroupMembers,
        Metric::ConsumerGroupLagAlternateSource,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Metric::Brokers => formatcp!("{NAMESPACE}_brokers"),
            Metric::BrokerInfo => formatcp!("{NAMESPACE}_broker_info"),
            Metric::TopicPartitions => formatcp!("{NAMESPACE}_topic_partitions"),
            Metric::TopicPartitionCurrentOffset => formatcp!("{NAMESPACE}_topic_partition_current_offset"),
            Metric::TopicPartitionOldestOffset => formatcp!("{NAMESPACE}_topic_partition_oldest_offset"),
            Metric::TopicPartitionLeader => formatcp!("{NAMESPACE}_topic_partition_leader"),
            Metric::TopicPartitionReplicas => formatcp!("{NAMESPACE}_topic_partition_replicas"),
            Metric::TopicPartitionInSyncReplica => formatcp!("{NAMESPACE}_topic_partition_in_sync_replica"),
            Metric::TopicPartitionLeaderIsPreferred => formatcp!("{NAMESPACE}_topic_partition_leader_is_preferred"),
            Metric::TopicPartitionUnderReplicatedPartition => {
                formatcp!("{NAMESPACE}_topic_partition_under_replicated_partition")
            },
            Metric::ConsumerGroupCurrentOffset => formatcp!("{NAMESPACE}_consumergroup_current_offset"),
            Metric::ConsumerGroupCurrentOffsetSum => formatcp!("{NAMESPACE}_consumergroup_current_offset_sum"),
            Metric::ConsumerGroupLag => formatcp!("{NAMESPACE}_consumergroup_lag"),
            Metric::ConsumerGroupLagSum => formatcp!("{NAMESPACE}_consumergroup_lag_sum"),
            Metric::ConsumerGroupMembers => formatcp!("{NAMESPACE}_consumergroup_members"),
            Metric::ConsumerGroupLagAlternateSource => formatcp!("{NAMESPACE}_consumergroup_lag_alternate_source"),
        }
    }

    pub fn help(&self) -> &'static str {
        match self {
            Metric::Brokers => "Number of Brokers in the Kafka Cluster.",
            Metric::BrokerInfo => "Information about the Kafka Broker.",
            Metric::TopicPartitions => "Number of partitions for this Topic",
            Metric::TopicPartitionCurrentOffset => "Current Offset of a Broker at Topic/Partition",
            Metric::TopicPartitionOldestOffset => "Oldest Offset of a Broker at Topic/Partition",
            Metric::TopicPartitionLeader => "Leader Broker ID of this Topic/Partition",
            Metric::TopicPartitionReplicas => "Number of Replicas for this Topic/Partition",
            Metric::TopicPartitionInSyncReplica => "Number of In-Sync Replicas for this Topic/Partition",
            Metric::TopicPartitionLeaderIsPreferred => "1 if Topic/Partition is using the Preferred Broker",
            Metric::TopicPartitionUnderReplicatedPartition => "1 if Topic/Partition is under Replicated",
            Metric::ConsumerGroupCurrentOffset => "Current Offset of a ConsumerGroup at Topic/Partition",
            Metric::ConsumerGroupCurrentOffsetSum => "Current Offset of a ConsumerGroup at Topic for all partitions",
            Metric::ConsumerGroupLag => {
                "Current Approximate Lag of a ConsumerGroup at Topic/Partition. NOTE: '-1' means 'no committed offset'."
            },
            Metric::ConsumerGroupLagSum => "Current Approximate Lag of a ConsumerGroup at Topic for all partitions",
            Metric::ConsumerGroupMembers => "Amount of members in a consumer group",
            Metric::ConsumerGroupLagAlternateSource => {
                "Current Approximate Lag of a ConsumerGroup at Topic/Partition, based on commits read from __consumer_offsets"
            },
        }
    }

    /// Names of the labels of this metric: every sample carries one value per label, in this order.
    pub fn labels(&self) -> &'static [&'static str] {
        match self {
            Metric::Brokers => LABELS_NONE,
            Metric::BrokerInfo => LABELS_BROKER,
            Metric::TopicPartitions => LABELS_TOPIC,
            Metric::TopicPartitionCurrentOffset
            | Metric::TopicPartitionOldestOffset
            | Metric::TopicPartitionLeader
            | Metric::TopicPartitionReplicas
            | Metric::TopicPartitionInSyncReplica
            | Metric::TopicPartitionLeaderIsPreferred
            | Metric::TopicPartitionUnderReplicatedPartition => LABELS_TOPIC_PARTITION,
            Metric::ConsumerGroupCurrentOffset
            | Metric::ConsumerGroupLag
            | Metric::ConsumerGroupLagAlternateSource => LABELS_GROUP_TOPIC_PARTITION,
            Metric::ConsumerGroupCurrentOffsetSum | Metric::ConsumerGroupLagSum => LABELS_GROUP_TOPIC,
            Metric::ConsumerGroupMembers => LABELS_GROUP,
        }
    }
}
