mod broker;
mod group;
mod topic_partition;
mod topic_partitions_status;

pub use broker::Broker;
pub use group::{CommittedOffset, Group, GroupDescription, GroupMember, Member, NO_COMMITTED_OFFSET};
pub use topic_partition::TopicPartition;
pub use topic_partitions_status::{PartitionStatus, TopicPartitionsStatus};
